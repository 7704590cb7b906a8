//! Chunk transcription against an asynchronous submit/poll speech service.

pub mod client;
pub mod coordinator;

pub use client::SpeechClient;
pub use coordinator::{
    assemble_transcript, CoordinatorError, FailurePolicy, TranscriptionCoordinator,
    TranscriptionSignal,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::segment::AudioChunk;

/// State of one transcription task on the speech service.
///
/// `Submitted → {Processing, Queued} → Completed | Failed | TimedOut`;
/// the last three are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskState {
    Submitted,
    Processing,
    Queued,
    Completed,
    Failed,
    TimedOut,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::TimedOut
        )
    }
}

/// One submit/poll attempt for a chunk.
///
/// The task id is regenerated on every resubmission, so a retried chunk never
/// collides with its previous attempt on the service side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionTask {
    pub chunk_index: usize,
    pub task_id: String,
    pub attempt: u32,
    pub state: TaskState,
}

/// Successful transcription of one chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkTranscript {
    pub chunk_index: usize,
    pub text: String,
    /// Number of submit/poll cycles it took, including the successful one.
    pub attempts: u32,
}

/// Error taxonomy for a single chunk's transcription.
#[derive(thiserror::Error, Debug)]
pub enum TranscriptionError {
    /// Transport-level failure (connection reset, timeout). Retryable.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Could not read the chunk file from disk.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The service rejected the submission.
    #[error("submit rejected: {0}")]
    Submit(String),

    /// The service reported the task as failed while polling.
    #[error("task failed: {0}")]
    Service(String),

    /// The poll budget ran out while the task was still in progress.
    #[error("task timed out after {attempts} polls")]
    TimedOut { attempts: u32 },

    /// A reply the protocol does not account for.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TranscriptionError {
    /// Only transport failures are worth resubmitting; everything else is a
    /// protocol or service verdict that a retry cannot change.
    pub fn is_transient(&self) -> bool {
        matches!(self, TranscriptionError::Network(_))
    }
}

/// Seam between the coordinator and whatever transcribes one chunk.
#[async_trait]
pub trait ChunkTranscriber: Send + Sync {
    async fn transcribe(&self, chunk: &AudioChunk) -> Result<ChunkTranscript, TranscriptionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::TimedOut.is_terminal());
        assert!(!TaskState::Submitted.is_terminal());
        assert!(!TaskState::Processing.is_terminal());
        assert!(!TaskState::Queued.is_terminal());
    }

    #[test]
    fn test_timeout_is_distinct_from_service_failure() {
        let timeout = TranscriptionError::TimedOut { attempts: 60 };
        let failed = TranscriptionError::Service("decode error".to_string());

        assert!(matches!(timeout, TranscriptionError::TimedOut { .. }));
        assert!(matches!(failed, TranscriptionError::Service(_)));
        assert!(!timeout.is_transient());
        assert!(!failed.is_transient());
    }
}
