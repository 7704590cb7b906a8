//! notegen - turn lecture media and documents into structured study content
//!
//! Segments media into bounded audio chunks, transcribes them concurrently
//! against an asynchronous submit/poll speech service, assembles an
//! order-preserving transcript, and streams a generation response into a
//! Markdown artifact. A single tagged event stream is the pipeline's only
//! observable output.

pub mod config;
pub mod event;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod retry;
pub mod segment;
pub mod transcription;

// Re-export main types for easy access
pub use crate::config::Config;
pub use crate::event::{EventReceiver, EventSender, PipelineEvent};
pub use crate::ingest::{InputKind, Job};
pub use crate::llm::{ContentGenerator, GenerationError, PromptLibrary, StreamingCompleter};
pub use crate::pipeline::{Pipeline, PipelineError};
pub use crate::retry::RetryPolicy;
pub use crate::segment::{AudioChunk, FfmpegSegmenter, MediaSegmenter};
pub use crate::transcription::{
    assemble_transcript, ChunkTranscriber, CoordinatorError, FailurePolicy, SpeechClient,
    TaskState, TranscriptionCoordinator, TranscriptionError,
};
