//! Content generation from an assembled transcript.

pub mod generator;

pub use generator::{
    ContentGenerator, DeepSeekCompleter, DeltaFn, GeneratedContent, StreamingCompleter,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Chat message for the completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Error taxonomy for the generation stage. All variants are terminal; none
/// are retried automatically.
#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    #[error("unknown generation mode '{0}'")]
    UnknownMode(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("generation service error: {0}")]
    Service(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("failed to persist output to {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Placeholder substituted with the assembled transcript.
const TRANSCRIPT_PLACEHOLDER: &str = "{transcript}";

/// Prompt pair for one generation mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// System-role text sent as-is.
    pub system: String,
    /// User-role text containing the `{transcript}` placeholder.
    pub user: String,
}

impl PromptTemplate {
    /// Build the message pair for a transcript.
    pub fn render(&self, transcript: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(&self.system),
            ChatMessage::user(self.user.replace(TRANSCRIPT_PLACEHOLDER, transcript)),
        ]
    }
}

/// The closed catalog of generation modes, plus any file-based overrides.
///
/// Loaded once at pipeline construction and passed in explicitly; never read
/// as ambient state afterwards.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptLibrary {
    const SYSTEM_PROMPT: &'static str = "You are a professional content summarization assistant.";

    /// Built-in templates for the notes / qa / quiz modes.
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            "notes".to_string(),
            PromptTemplate {
                system: Self::SYSTEM_PROMPT.to_string(),
                user: "Generate structured study notes in Markdown format from the following text:\n\n{transcript}".to_string(),
            },
        );
        templates.insert(
            "qa".to_string(),
            PromptTemplate {
                system: Self::SYSTEM_PROMPT.to_string(),
                user: "Generate question-and-answer pairs (Q&A) from the following text:\n\n{transcript}".to_string(),
            },
        );
        templates.insert(
            "quiz".to_string(),
            PromptTemplate {
                system: Self::SYSTEM_PROMPT.to_string(),
                user: "Generate quiz questions from the following text:\n\n{transcript}".to_string(),
            },
        );
        Self { templates }
    }

    /// Built-in templates overlaid with `<mode>.txt` files from a prompt
    /// directory. Each file's first line is the system text; the remainder is
    /// the user template. Unreadable files keep the built-in template.
    pub async fn with_overrides(prompt_dir: &Path) -> Self {
        let mut library = Self::builtin();

        let Ok(mut entries) = tokio::fs::read_dir(prompt_dir).await else {
            warn!(
                "prompt directory {} not readable, using built-in templates",
                prompt_dir.display()
            );
            return library;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().map_or(true, |e| e != "txt") {
                continue;
            }
            let Some(mode) = path.file_stem().map(|s| s.to_string_lossy().to_lowercase()) else {
                continue;
            };
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    let (system, user) = match content.split_once('\n') {
                        Some((first, rest)) => (first.trim().to_string(), rest.trim().to_string()),
                        None => (Self::SYSTEM_PROMPT.to_string(), content.trim().to_string()),
                    };
                    debug!("loaded prompt template '{}' from {}", mode, path.display());
                    library.templates.insert(mode, PromptTemplate { system, user });
                }
                Err(e) => warn!("failed to read prompt file {}: {}", path.display(), e),
            }
        }

        library
    }

    /// Resolve a mode name to its template. An unrecognized mode is a fatal
    /// configuration error, not something to retry.
    pub fn resolve(&self, mode: &str) -> Result<&PromptTemplate, GenerationError> {
        self.templates
            .get(&mode.to_lowercase())
            .ok_or_else(|| GenerationError::UnknownMode(mode.to_string()))
    }

    /// Names of all known modes, sorted for stable display.
    pub fn mode_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }
}
