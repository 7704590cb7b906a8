use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Event emitted by the pipeline to its consumer.
///
/// This tagged union is the only thing the core exposes to a presentation
/// layer: a consumer switches on the variant, never on payload shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Coarse phase progress, `fraction` in `0.0..=1.0`.
    Progress { fraction: f64, message: String },
    /// Fine-grained progress within a phase (segmentation, transcription).
    SubProgress { fraction: f64, message: String },
    /// One incremental delta of generated output, in arrival order.
    LlmChunk { delta: String },
    /// Non-fatal notice; the job keeps running.
    Error { message: String },
    /// Fatal failure; no further phase runs after this.
    PersistentError { message: String },
    /// Job succeeded; `output_path` is the persisted artifact.
    Done { output_path: PathBuf, message: String },
}

/// Sending half of the pipeline event stream.
pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;

/// Receiving half handed to the presentation layer.
pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Create a fresh event channel pair.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Send an event, ignoring a departed consumer.
///
/// A consumer that stopped listening must not take the pipeline down with it.
pub fn emit(events: &EventSender, event: PipelineEvent) {
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_tagged_by_kind() {
        let event = PipelineEvent::Progress {
            fraction: 0.5,
            message: "halfway".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "progress");
        assert_eq!(json["fraction"], 0.5);

        let event = PipelineEvent::LlmChunk {
            delta: "text".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "llm_chunk");
        assert_eq!(json["delta"], "text");
    }

    #[test]
    fn test_emit_survives_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);
        emit(
            &tx,
            PipelineEvent::Error {
                message: "notice".to_string(),
            },
        );
    }

    #[tokio::test]
    async fn test_events_arrive_in_emission_order() {
        let (tx, mut rx) = channel();
        emit(
            &tx,
            PipelineEvent::Progress {
                fraction: 0.0,
                message: "start".to_string(),
            },
        );
        emit(
            &tx,
            PipelineEvent::Done {
                output_path: PathBuf::from("out.md"),
                message: "done".to_string(),
            },
        );
        drop(tx);

        assert!(matches!(
            rx.recv().await,
            Some(PipelineEvent::Progress { .. })
        ));
        assert!(matches!(rx.recv().await, Some(PipelineEvent::Done { .. })));
        assert!(rx.recv().await.is_none());
    }
}
