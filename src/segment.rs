use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// One bounded-duration audio segment derived from the input media file.
///
/// Chunks carry a dense 0-based index; the transcript is always assembled in
/// index order no matter which chunk finishes transcription first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    pub index: usize,
    pub path: PathBuf,
    /// Nominal upper bound on the chunk's duration.
    pub duration: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum SegmentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffprobe failed for {0}")]
    Probe(String),

    #[error("segmentation failed: {0}")]
    Split(String),
}

/// Progress callback: `(completed_chunks, total_chunks)`.
pub type SegmentProgress<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Boundary to the media-segmentation collaborator.
///
/// An implementation produces a sequence of mono 16 kHz 16-bit PCM WAV files
/// of bounded duration and reports its own progress through the callback.
#[async_trait]
pub trait MediaSegmenter: Send + Sync {
    async fn segment(
        &self,
        input: &Path,
        work_dir: &Path,
        progress: SegmentProgress<'_>,
    ) -> Result<Vec<AudioChunk>, SegmentError>;
}

/// ffmpeg-backed segmenter.
///
/// Decodes whatever container/codec the input uses straight to the fixed
/// format the speech service expects, one ffmpeg invocation per chunk.
pub struct FfmpegSegmenter {
    chunk_duration: Duration,
    sample_rate: u32,
}

impl FfmpegSegmenter {
    pub fn new(chunk_duration: Duration, sample_rate: u32) -> Self {
        Self {
            chunk_duration,
            sample_rate,
        }
    }

    /// Total duration of the input's first audio stream, via ffprobe.
    async fn probe_duration(&self, input: &Path) -> Result<Duration, SegmentError> {
        let output = tokio::process::Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
            ])
            .arg(input)
            .output()
            .await?;

        if !output.status.success() {
            return Err(SegmentError::Probe(input.display().to_string()));
        }

        let data: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| SegmentError::Probe(format!("{}: {}", input.display(), e)))?;

        let seconds: f64 = data["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| SegmentError::Probe(format!("no duration for {}", input.display())))?;

        Ok(Duration::from_secs_f64(seconds))
    }
}

#[async_trait]
impl MediaSegmenter for FfmpegSegmenter {
    async fn segment(
        &self,
        input: &Path,
        work_dir: &Path,
        progress: SegmentProgress<'_>,
    ) -> Result<Vec<AudioChunk>, SegmentError> {
        tokio::fs::create_dir_all(work_dir).await?;

        let total_duration = self.probe_duration(input).await?;
        let chunk_seconds = self.chunk_duration.as_secs_f64();
        let num_chunks = (total_duration.as_secs_f64() / chunk_seconds).ceil().max(1.0) as usize;

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string());

        info!(
            "✂️ Splitting {} into {} chunks of {:.0}s",
            input.display(),
            num_chunks,
            chunk_seconds
        );

        let mut chunks = Vec::with_capacity(num_chunks);

        for i in 0..num_chunks {
            let start = i as f64 * chunk_seconds;
            let chunk_path = work_dir.join(format!("{}_chunk_{:03}.wav", stem, i));

            let status = tokio::process::Command::new("ffmpeg")
                .args(["-ss", &start.to_string()])
                .args(["-t", &chunk_seconds.to_string()])
                .arg("-i")
                .arg(input)
                .args([
                    "-vn",
                    "-acodec",
                    "pcm_s16le",
                    "-ar",
                    &self.sample_rate.to_string(),
                    "-ac",
                    "1",
                    "-f",
                    "wav",
                    "-y",
                ])
                .arg(&chunk_path)
                .status()
                .await?;

            if !status.success() {
                warn!("ffmpeg failed on chunk {} of {}", i, input.display());
                return Err(SegmentError::Split(format!(
                    "chunk {} of {}",
                    i,
                    input.display()
                )));
            }

            chunks.push(AudioChunk {
                index: i,
                path: chunk_path,
                duration: self.chunk_duration,
            });
            progress(i + 1, num_chunks);
        }

        info!("✅ Created {} audio chunks", chunks.len());
        Ok(chunks)
    }
}
