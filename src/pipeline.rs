use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::event::{emit, EventSender, PipelineEvent};
use crate::ingest::{InputKind, Job};
use crate::llm::{
    ContentGenerator, DeepSeekCompleter, GenerationError, PromptLibrary, StreamingCompleter,
};
use crate::segment::{FfmpegSegmenter, MediaSegmenter, SegmentError};
use crate::transcription::{
    assemble_transcript, ChunkTranscriber, CoordinatorError, SpeechClient,
    TranscriptionCoordinator, TranscriptionSignal,
};

/// Terminal failure of a pipeline run. The orchestrator is the only place
/// that turns component failures into consumer-facing events.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("unsupported input type '{0}'")]
    UnsupportedInput(String),

    #[error("cannot read input {path}: {source}")]
    Ingest {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("segmentation failed: {0}")]
    Segmentation(#[from] SegmentError),

    #[error("no audio chunks were produced from the input")]
    NoChunks,

    #[error(transparent)]
    Transcription(#[from] CoordinatorError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Drives a job through Ingest → Segment → Transcribe → Assemble → Generate,
/// translating component signals into the uniform event stream.
///
/// Text-document jobs skip segmentation and transcription; the document's
/// content becomes the transcript directly.
pub struct Pipeline {
    config: Config,
    prompts: PromptLibrary,
    segmenter: Arc<dyn MediaSegmenter>,
    transcriber: Arc<dyn ChunkTranscriber>,
    generator: ContentGenerator,
}

impl Pipeline {
    /// Build a pipeline with the real service clients.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let prompts = match &config.generation.prompt_dir {
            Some(dir) => PromptLibrary::with_overrides(dir).await,
            None => PromptLibrary::builtin(),
        };

        let segmenter = Arc::new(FfmpegSegmenter::new(
            Duration::from_secs(config.segmenter.chunk_duration_secs),
            config.segmenter.sample_rate,
        ));
        let transcriber = Arc::new(SpeechClient::new(config.transcription.clone())?);
        let completer = DeepSeekCompleter::new(config.generation.clone())?;

        Ok(Self {
            config,
            prompts,
            segmenter,
            transcriber,
            generator: ContentGenerator::new(Box::new(completer)),
        })
    }

    /// Build a pipeline over caller-supplied collaborators.
    pub fn with_components(
        config: Config,
        prompts: PromptLibrary,
        segmenter: Arc<dyn MediaSegmenter>,
        transcriber: Arc<dyn ChunkTranscriber>,
        completer: Box<dyn StreamingCompleter>,
    ) -> Self {
        Self {
            config,
            prompts,
            segmenter,
            transcriber,
            generator: ContentGenerator::new(completer),
        }
    }

    /// Run one job to its terminal outcome. Every observable effect goes out
    /// through `events`; the returned path duplicates the `done` payload for
    /// programmatic callers.
    pub async fn run(
        &self,
        input_path: PathBuf,
        mode: &str,
        output_base_name: &str,
        events: &EventSender,
    ) -> Result<PathBuf, PipelineError> {
        match self.execute(input_path, mode, output_base_name, events).await {
            Ok(path) => Ok(path),
            Err(e) => {
                error!("pipeline failed: {}", e);
                let message = failure_message(&e);
                // The original surfaces an unsupported upload as a plain
                // error; every other terminal failure is persistent.
                if matches!(e, PipelineError::UnsupportedInput(_)) {
                    emit(events, PipelineEvent::Error { message });
                } else {
                    emit(events, PipelineEvent::PersistentError { message });
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        input_path: PathBuf,
        mode: &str,
        output_base_name: &str,
        events: &EventSender,
    ) -> Result<PathBuf, PipelineError> {
        // Ingest: classify the input before anything else runs.
        let kind = InputKind::detect(&input_path, &self.config.ingest).ok_or_else(|| {
            let ext = input_path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            PipelineError::UnsupportedInput(ext)
        })?;

        let job = Job::new(input_path, kind, mode, output_base_name);
        info!(
            "🚀 Starting job: {} ({:?}, mode '{}')",
            job.input_path.display(),
            job.kind,
            job.mode
        );

        let total_steps = match kind {
            InputKind::Text => 2,
            InputKind::Audio => 3,
            InputKind::Video => 4,
        };
        let mut step = 0usize;
        let progress = |step: usize, message: String| {
            emit(
                events,
                PipelineEvent::Progress {
                    fraction: step as f64 / total_steps as f64,
                    message,
                },
            );
        };

        let transcript = if kind.is_media() {
            self.transcribe_media(&job, total_steps, &mut step, events)
                .await?
        } else {
            progress(
                step,
                format!("Step 1/{}: Reading text document...", total_steps),
            );
            let text = tokio::fs::read_to_string(&job.input_path).await.map_err(|e| {
                PipelineError::Ingest {
                    path: job.input_path.display().to_string(),
                    source: e,
                }
            })?;
            step += 1;
            text
        };

        // Generate: resolve the mode, stream deltas, persist.
        progress(
            step,
            format!(
                "Step {}/{}: Generating content with the language model...",
                step + 1,
                total_steps
            ),
        );

        let template = self.prompts.resolve(&job.mode)?;
        let output_path = job.output_path();
        let generated = self
            .generator
            .generate(&transcript, template, &output_path, &|delta| {
                emit(
                    events,
                    PipelineEvent::LlmChunk {
                        delta: delta.to_string(),
                    },
                )
            })
            .await?;

        step += 1;
        progress(step, "Processing complete!".to_string());
        emit(
            events,
            PipelineEvent::Done {
                output_path: generated.path.clone(),
                message: "🎉 Your generated content is ready!".to_string(),
            },
        );

        info!("🎉 Job finished: {}", generated.path.display());
        Ok(generated.path)
    }

    /// Segment → Transcribe → Assemble for media inputs.
    async fn transcribe_media(
        &self,
        job: &Job,
        total_steps: usize,
        step: &mut usize,
        events: &EventSender,
    ) -> Result<String, PipelineError> {
        let kind_name = match job.kind {
            InputKind::Video => "video",
            _ => "audio",
        };
        let work_dir = self.config.segmenter.work_dir.clone();
        let progress = |step: usize, message: String| {
            emit(
                events,
                PipelineEvent::Progress {
                    fraction: step as f64 / total_steps as f64,
                    message,
                },
            );
        };

        // Segment phase: the segmenter reports its own progress.
        progress(
            *step,
            format!(
                "Step {}/{}: Splitting {} into audio chunks...",
                *step + 1,
                total_steps,
                kind_name
            ),
        );

        let chunks = self
            .segmenter
            .segment(&job.input_path, &work_dir, &|completed, total| {
                emit(
                    events,
                    PipelineEvent::SubProgress {
                        fraction: completed as f64 / total as f64,
                        message: format!("Splitting... ({}/{})", completed, total),
                    },
                )
            })
            .await?;

        if chunks.is_empty() {
            return Err(PipelineError::NoChunks);
        }

        emit(
            events,
            PipelineEvent::SubProgress {
                fraction: 1.0,
                message: format!("✅ {} splitting complete!", kind_name),
            },
        );
        *step += 1;
        progress(
            *step,
            format!("✅ {} split into {} chunks", kind_name, chunks.len()),
        );

        // Transcribe phase: bounded fan-out, slots filled by chunk index.
        progress(
            *step,
            format!(
                "Step {}/{}: Transcribing {} audio chunks...",
                *step + 1,
                total_steps,
                chunks.len()
            ),
        );

        let coordinator = TranscriptionCoordinator::new(
            Arc::clone(&self.transcriber),
            self.config.transcription.concurrency,
            self.config.pipeline.failure_policy,
        );

        let slots = coordinator
            .transcribe_all(&chunks, &|signal| match signal {
                TranscriptionSignal::SlotFilled { completed, total } => emit(
                    events,
                    PipelineEvent::SubProgress {
                        fraction: completed as f64 / total as f64,
                        message: format!("Transcribing... ({}/{})", completed, total),
                    },
                ),
                TranscriptionSignal::ChunkFailed { index, message } => emit(
                    events,
                    PipelineEvent::Error {
                        message: format!(
                            "**Audio chunk {} failed to transcribe**\n\nThe chunk was skipped.\n\n**Original error:**\n`{}`",
                            index + 1,
                            message
                        ),
                    },
                ),
            })
            .await?;

        emit(
            events,
            PipelineEvent::SubProgress {
                fraction: 1.0,
                message: "✅ Audio transcription complete!".to_string(),
            },
        );
        *step += 1;
        progress(*step, "All audio chunks transcribed!".to_string());

        // Assemble phase; its own step for video jobs.
        if job.kind == InputKind::Video {
            progress(
                *step,
                format!(
                    "Step {}/{}: Assembling and saving the transcript...",
                    *step + 1,
                    total_steps
                ),
            );
        }

        let transcript = assemble_transcript(&slots);

        // The transcript file is a convenience artifact; failing to write it
        // must not fail the job.
        let transcript_path = &self.config.pipeline.transcript_path;
        if let Err(e) = tokio::fs::write(transcript_path, &transcript).await {
            warn!("could not save transcript to {}: {}", transcript_path.display(), e);
            emit(
                events,
                PipelineEvent::Error {
                    message: format!("Could not save the transcript file: {}", e),
                },
            );
        }

        if job.kind == InputKind::Video {
            *step += 1;
            progress(*step, "Transcript assembled.".to_string());
        }

        if !self.config.pipeline.keep_intermediate {
            if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
                warn!("could not clean up {}: {}", work_dir.display(), e);
            }
        }

        Ok(transcript)
    }
}

/// Human-readable explanation for a terminal failure, naming the trigger.
fn failure_message(error: &PipelineError) -> String {
    match error {
        PipelineError::UnsupportedInput(ext) => format!(
            "**Unsupported file type**\n\nThe uploaded file type (`.{}`) is not currently supported.",
            ext
        ),
        PipelineError::Ingest { path, source } => format!(
            "**Failed to read file**\n\nCould not read the uploaded text document '{}'.\n\n**Original error:**\n`{}`",
            path, source
        ),
        PipelineError::Segmentation(e) => format!(
            "**Media segmentation failed**\n\nCould not process the uploaded media file.\n\n**Original error:**\n`{}`",
            e
        ),
        PipelineError::NoChunks => {
            "**Media segmentation failed**\n\nNo audio chunks could be extracted from your file."
                .to_string()
        }
        PipelineError::Transcription(CoordinatorError::AllChunksFailed { total }) => format!(
            "**All audio chunks failed to transcribe**\n\nAll {} chunks failed during transcription.",
            total
        ),
        PipelineError::Transcription(e) => format!(
            "**Audio transcription failed**\n\nAn error occurred while converting speech to text.\n\n**Original error:**\n`{}`",
            e
        ),
        PipelineError::Generation(GenerationError::UnknownMode(mode)) => format!(
            "**Invalid generation mode**\n\nThe requested mode '{}' is not a valid option.",
            mode
        ),
        PipelineError::Generation(GenerationError::Authentication(_)) => {
            "**Authentication failed**\n\nThe generation API key is invalid or expired. Check your API key configuration."
                .to_string()
        }
        PipelineError::Generation(GenerationError::RateLimited(_)) => {
            "**Rate limit exceeded**\n\nThe generation service rate limit was reached. Try again later."
                .to_string()
        }
        PipelineError::Generation(GenerationError::Persist { path, source }) => format!(
            "**Failed to save the generated file**\n\nCould not write the generated content to '{}'.\n\n**Original error:**\n`{}`",
            path, source
        ),
        PipelineError::Generation(e) => format!(
            "**API error**\n\nAn error occurred while calling the generation service:\n`{}`",
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::TranscriptionError;

    #[test]
    fn test_failure_messages_name_the_trigger() {
        let message = failure_message(&PipelineError::UnsupportedInput("exe".to_string()));
        assert!(message.contains("`.exe`"));

        let message = failure_message(&PipelineError::Generation(
            GenerationError::UnknownMode("poetry".to_string()),
        ));
        assert!(message.contains("'poetry'"));

        let message = failure_message(&PipelineError::Transcription(
            CoordinatorError::AllChunksFailed { total: 7 },
        ));
        assert!(message.contains("7"));
    }

    #[test]
    fn test_strict_chunk_failure_message_carries_the_error() {
        let message = failure_message(&PipelineError::Transcription(
            CoordinatorError::ChunkFailed {
                index: 2,
                source: TranscriptionError::TimedOut { attempts: 60 },
            },
        ));
        assert!(message.contains("60 polls"));
    }
}
