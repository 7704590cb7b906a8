use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::IngestConfig;

/// Kind of input artifact, detected from the file extension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InputKind {
    Video,
    Audio,
    Text,
}

impl InputKind {
    /// Classify a path against the configured extension catalogs.
    ///
    /// Returns `None` for an unsupported or missing extension; the caller
    /// decides how to report that.
    pub fn detect(path: &Path, config: &IngestConfig) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();

        if config.video_extensions.iter().any(|e| e == &ext) {
            Some(InputKind::Video)
        } else if config.audio_extensions.iter().any(|e| e == &ext) {
            Some(InputKind::Audio)
        } else if config.text_extensions.iter().any(|e| e == &ext) {
            Some(InputKind::Text)
        } else {
            None
        }
    }

    /// Media inputs go through segmentation and transcription; text inputs
    /// are read as the transcript directly.
    pub fn is_media(&self) -> bool {
        matches!(self, InputKind::Video | InputKind::Audio)
    }
}

/// One unit of work for the pipeline, immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Path to the uploaded artifact.
    pub input_path: PathBuf,
    /// Detected input kind.
    pub kind: InputKind,
    /// Requested generation mode (e.g. "notes", "qa", "quiz").
    pub mode: String,
    /// Base name of the output artifact; the pipeline appends `.md`.
    pub output_base_name: String,
}

impl Job {
    pub fn new(
        input_path: PathBuf,
        kind: InputKind,
        mode: impl Into<String>,
        output_base_name: impl Into<String>,
    ) -> Self {
        Self {
            input_path,
            kind,
            mode: mode.into(),
            output_base_name: output_base_name.into(),
        }
    }

    /// Path of the final generated artifact.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.md", self.output_base_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_detection() {
        let config = IngestConfig::default();

        assert_eq!(
            InputKind::detect(Path::new("lecture.mp4"), &config),
            Some(InputKind::Video)
        );
        assert_eq!(
            InputKind::detect(Path::new("lecture.M4A"), &config),
            Some(InputKind::Audio)
        );
        assert_eq!(
            InputKind::detect(Path::new("slides.pdf"), &config),
            Some(InputKind::Text)
        );
        assert_eq!(InputKind::detect(Path::new("setup.exe"), &config), None);
        assert_eq!(InputKind::detect(Path::new("no_extension"), &config), None);
    }

    #[test]
    fn test_media_classification() {
        assert!(InputKind::Video.is_media());
        assert!(InputKind::Audio.is_media());
        assert!(!InputKind::Text.is_media());
    }

    #[test]
    fn test_output_path_appends_markdown_extension() {
        let job = Job::new(
            PathBuf::from("talk.mp4"),
            InputKind::Video,
            "notes",
            "my_notes",
        );
        assert_eq!(job.output_path(), PathBuf::from("my_notes.md"));
    }
}
