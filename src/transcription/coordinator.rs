use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use super::{ChunkTranscriber, TranscriptionError};
use crate::segment::AudioChunk;

/// Job-level decision on what a single chunk's terminal failure means.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Any chunk failure aborts the whole job; in-flight chunks are abandoned.
    Strict,
    /// A failed chunk leaves its slot empty and the job continues; the job
    /// fails only when every chunk failed.
    #[default]
    Lenient,
}

#[derive(thiserror::Error, Debug)]
pub enum CoordinatorError {
    #[error("chunk {index} failed: {source}")]
    ChunkFailed {
        index: usize,
        source: TranscriptionError,
    },

    #[error("all {total} chunks failed to transcribe")]
    AllChunksFailed { total: usize },

    #[error("worker pool error: {0}")]
    Pool(String),
}

/// Progress signal raised while chunks are in flight. The orchestrator
/// translates these into the uniform event stream.
#[derive(Debug, Clone)]
pub enum TranscriptionSignal {
    /// A slot was filled (successfully or, under lenient policy, empty).
    SlotFilled { completed: usize, total: usize },
    /// A chunk reached terminal failure that the lenient policy absorbed.
    ChunkFailed { index: usize, message: String },
}

pub type SignalFn<'a> = &'a (dyn Fn(TranscriptionSignal) + Send + Sync);

/// Fans chunks out across a bounded worker pool and collects the results
/// into index-addressed slots.
///
/// Each worker writes exactly one slot it exclusively owns, so completion
/// order never influences assembly order.
pub struct TranscriptionCoordinator<T: ChunkTranscriber + ?Sized + 'static> {
    transcriber: Arc<T>,
    concurrency: usize,
    policy: FailurePolicy,
}

impl<T: ChunkTranscriber + ?Sized + 'static> TranscriptionCoordinator<T> {
    pub fn new(transcriber: Arc<T>, concurrency: usize, policy: FailurePolicy) -> Self {
        Self {
            transcriber,
            concurrency: concurrency.max(1),
            policy,
        }
    }

    /// Worker-pool width for a given chunk count: never wider than the work.
    fn effective_concurrency(&self, chunks: usize) -> usize {
        self.concurrency.min(chunks).max(1)
    }

    /// Transcribe every chunk; returns one text slot per chunk, in chunk
    /// index order. A failed chunk's slot holds an empty string under the
    /// lenient policy.
    pub async fn transcribe_all(
        &self,
        chunks: &[AudioChunk],
        signal: SignalFn<'_>,
    ) -> Result<Vec<String>, CoordinatorError> {
        let total = chunks.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let width = self.effective_concurrency(total);
        info!("🎤 Transcribing {} chunks across {} workers", total, width);

        let semaphore = Arc::new(Semaphore::new(width));
        let (tx, mut rx) = mpsc::channel(total);

        for chunk in chunks.iter().cloned() {
            let transcriber = Arc::clone(&self.transcriber);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();

            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                let index = chunk.index;
                let result = transcriber.transcribe(&chunk).await;
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let mut slots: Vec<Option<String>> = vec![None; total];
        let mut completed = 0usize;
        let mut failed = 0usize;

        while let Some((index, result)) = rx.recv().await {
            match result {
                Ok(transcript) => {
                    slots[index] = Some(transcript.text);
                }
                Err(e) => match self.policy {
                    FailurePolicy::Strict => {
                        // In-flight workers keep running; their results are
                        // discarded along with the channel.
                        return Err(CoordinatorError::ChunkFailed { index, source: e });
                    }
                    FailurePolicy::Lenient => {
                        warn!("chunk {} failed, continuing without it: {}", index, e);
                        signal(TranscriptionSignal::ChunkFailed {
                            index,
                            message: e.to_string(),
                        });
                        slots[index] = Some(String::new());
                        failed += 1;
                    }
                },
            }

            completed += 1;
            signal(TranscriptionSignal::SlotFilled { completed, total });
        }

        if completed < total {
            return Err(CoordinatorError::Pool(format!(
                "only {} of {} chunks reported a result",
                completed, total
            )));
        }

        if failed == total {
            return Err(CoordinatorError::AllChunksFailed { total });
        }

        Ok(slots.into_iter().map(Option::unwrap_or_default).collect())
    }
}

/// Join the non-empty slots with a blank line, in slot (chunk index) order.
pub fn assemble_transcript(slots: &[String]) -> String {
    slots
        .iter()
        .filter(|s| !s.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::ChunkTranscript;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    fn make_chunks(n: usize) -> Vec<AudioChunk> {
        (0..n)
            .map(|i| AudioChunk {
                index: i,
                path: PathBuf::from(format!("chunk_{:03}.wav", i)),
                duration: Duration::from_secs(600),
            })
            .collect()
    }

    /// Scripted transcriber: per-index text or failure, with per-index
    /// delays to force arbitrary completion interleavings.
    struct ScriptedTranscriber {
        texts: Vec<Option<&'static str>>,
        delays_ms: Vec<u64>,
    }

    impl ScriptedTranscriber {
        fn new(texts: Vec<Option<&'static str>>) -> Self {
            let delays_ms = vec![0; texts.len()];
            Self { texts, delays_ms }
        }

        fn with_delays(mut self, delays_ms: Vec<u64>) -> Self {
            self.delays_ms = delays_ms;
            self
        }
    }

    #[async_trait]
    impl ChunkTranscriber for ScriptedTranscriber {
        async fn transcribe(
            &self,
            chunk: &AudioChunk,
        ) -> Result<ChunkTranscript, TranscriptionError> {
            tokio::time::sleep(Duration::from_millis(self.delays_ms[chunk.index])).await;
            match self.texts[chunk.index] {
                Some(text) => Ok(ChunkTranscript {
                    chunk_index: chunk.index,
                    text: text.to_string(),
                    attempts: 1,
                }),
                None => Err(TranscriptionError::Service(format!(
                    "chunk {} rejected",
                    chunk.index
                ))),
            }
        }
    }

    fn no_signal() -> impl Fn(TranscriptionSignal) + Send + Sync {
        |_| {}
    }

    #[tokio::test]
    async fn test_assembly_order_is_index_order_not_completion_order() {
        // Chunk 0 finishes last, chunk 2 first.
        let transcriber = Arc::new(
            ScriptedTranscriber::new(vec![Some("a"), Some("b"), Some("c")])
                .with_delays(vec![60, 30, 0]),
        );
        let coordinator =
            TranscriptionCoordinator::new(transcriber, 10, FailurePolicy::Lenient);

        let slots = coordinator
            .transcribe_all(&make_chunks(3), &no_signal())
            .await
            .unwrap();

        assert_eq!(slots, vec!["a", "b", "c"]);
        assert_eq!(assemble_transcript(&slots), "a\n\nb\n\nc");
    }

    #[tokio::test]
    async fn test_lenient_policy_skips_failed_chunk() {
        let transcriber =
            Arc::new(ScriptedTranscriber::new(vec![Some("a"), None, Some("c")]));
        let coordinator =
            TranscriptionCoordinator::new(transcriber, 2, FailurePolicy::Lenient);

        let failures = Mutex::new(Vec::new());
        let slots = coordinator
            .transcribe_all(&make_chunks(3), &|signal| {
                if let TranscriptionSignal::ChunkFailed { index, .. } = signal {
                    failures.lock().unwrap().push(index);
                }
            })
            .await
            .unwrap();

        assert_eq!(slots, vec!["a", "", "c"]);
        assert_eq!(assemble_transcript(&slots), "a\n\nc");
        assert_eq!(*failures.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_strict_policy_aborts_on_first_failure() {
        let transcriber =
            Arc::new(ScriptedTranscriber::new(vec![Some("a"), None, Some("c")]));
        let coordinator =
            TranscriptionCoordinator::new(transcriber, 3, FailurePolicy::Strict);

        let result = coordinator.transcribe_all(&make_chunks(3), &no_signal()).await;

        match result {
            Err(CoordinatorError::ChunkFailed { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected chunk failure, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_all_chunks_failed_is_fatal_even_under_lenient() {
        let transcriber = Arc::new(ScriptedTranscriber::new(vec![None, None, None]));
        let coordinator =
            TranscriptionCoordinator::new(transcriber, 3, FailurePolicy::Lenient);

        let result = coordinator.transcribe_all(&make_chunks(3), &no_signal()).await;

        assert!(matches!(
            result,
            Err(CoordinatorError::AllChunksFailed { total: 3 })
        ));
    }

    #[tokio::test]
    async fn test_progress_signal_fires_once_per_slot() {
        let transcriber = Arc::new(ScriptedTranscriber::new(vec![
            Some("a"),
            Some("b"),
            Some("c"),
            Some("d"),
        ]));
        let coordinator =
            TranscriptionCoordinator::new(transcriber, 2, FailurePolicy::Lenient);

        let fractions = Mutex::new(Vec::new());
        coordinator
            .transcribe_all(&make_chunks(4), &|signal| {
                if let TranscriptionSignal::SlotFilled { completed, total } = signal {
                    fractions.lock().unwrap().push((completed, total));
                }
            })
            .await
            .unwrap();

        let fractions = fractions.into_inner().unwrap();
        assert_eq!(fractions, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    #[tokio::test]
    async fn test_pool_width_never_exceeds_chunk_count() {
        let transcriber = Arc::new(ScriptedTranscriber::new(vec![Some("a")]));
        let coordinator =
            TranscriptionCoordinator::new(transcriber, 10, FailurePolicy::Lenient);

        assert_eq!(coordinator.effective_concurrency(3), 3);
        assert_eq!(coordinator.effective_concurrency(100), 10);
        assert_eq!(coordinator.effective_concurrency(1), 1);
    }

    #[tokio::test]
    async fn test_empty_chunk_list_yields_empty_slots() {
        let transcriber = Arc::new(ScriptedTranscriber::new(vec![]));
        let coordinator =
            TranscriptionCoordinator::new(transcriber, 10, FailurePolicy::Lenient);

        let slots = coordinator.transcribe_all(&[], &no_signal()).await.unwrap();
        assert!(slots.is_empty());
        assert_eq!(assemble_transcript(&slots), "");
    }

    #[test]
    fn test_assemble_skips_empty_entries() {
        let slots = vec![
            "a".to_string(),
            String::new(),
            "c".to_string(),
            String::new(),
        ];
        assert_eq!(assemble_transcript(&slots), "a\n\nc");
    }
}
