use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::{ChatMessage, GenerationError, PromptTemplate};
use crate::config::GenerationConfig;

/// Callback invoked with each text delta as it arrives.
pub type DeltaFn<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Seam to the streaming completion backend.
#[async_trait]
pub trait StreamingCompleter: Send + Sync {
    /// Issue one streaming completion call; forward every delta to
    /// `on_delta` and return the accumulated text.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        on_delta: DeltaFn<'_>,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// One parsed server-sent-event line.
#[derive(Debug, PartialEq)]
pub(crate) enum SsePayload {
    Delta(String),
    Done,
    Ignored,
}

/// Parse one complete SSE line into a payload.
pub(crate) fn parse_sse_line(line: &str) -> SsePayload {
    let Some(data) = line.strip_prefix("data:") else {
        return SsePayload::Ignored;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return SsePayload::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .first()
            .and_then(|c| c.delta.content.clone())
            .filter(|content| !content.is_empty())
            .map(SsePayload::Delta)
            .unwrap_or(SsePayload::Ignored),
        Err(_) => SsePayload::Ignored,
    }
}

/// Reassembles complete lines from network chunks that may split anywhere.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    carry: String,
}

impl LineBuffer {
    /// Feed one network chunk; returns every line completed by it.
    pub(crate) fn push(&mut self, chunk: &str) -> Vec<String> {
        self.carry.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.carry.find('\n') {
            let line: String = self.carry.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }
}

/// Streaming completion client for an OpenAI-compatible chat endpoint.
pub struct DeepSeekCompleter {
    config: GenerationConfig,
    client: reqwest::Client,
}

impl DeepSeekCompleter {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Service(e.to_string()))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl StreamingCompleter for DeepSeekCompleter {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        on_delta: DeltaFn<'_>,
    ) -> Result<String, GenerationError> {
        let request = CompletionRequest {
            model: self.config.model.clone(),
            messages,
            stream: true,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!("Sending streaming completion request to {}", self.config.endpoint);

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Service(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                reqwest::StatusCode::UNAUTHORIZED => GenerationError::Authentication(body),
                reqwest::StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited(body),
                _ => GenerationError::Service(format!("{}: {}", status, body)),
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = LineBuffer::default();
        let mut accumulated = String::new();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| GenerationError::Stream(e.to_string()))?;
            let text = String::from_utf8_lossy(&chunk);

            for line in buffer.push(&text) {
                match parse_sse_line(&line) {
                    SsePayload::Delta(delta) => {
                        on_delta(&delta);
                        accumulated.push_str(&delta);
                    }
                    SsePayload::Done => break 'outer,
                    SsePayload::Ignored => {}
                }
            }
        }

        Ok(accumulated)
    }
}

/// Output of one generation run.
#[derive(Debug, Clone)]
pub struct GeneratedContent {
    pub path: PathBuf,
    pub content: String,
}

/// Builds the mode prompt, drives the streaming call, and persists the
/// accumulated output verbatim.
pub struct ContentGenerator {
    completer: Box<dyn StreamingCompleter>,
}

impl ContentGenerator {
    pub fn new(completer: Box<dyn StreamingCompleter>) -> Self {
        Self { completer }
    }

    /// Generate content from a transcript and persist it to `output_path`.
    ///
    /// Deltas already forwarded to `on_delta` stay valid even when
    /// persistence fails afterwards; only the success outcome is withheld.
    pub async fn generate(
        &self,
        transcript: &str,
        template: &PromptTemplate,
        output_path: &Path,
        on_delta: DeltaFn<'_>,
    ) -> Result<GeneratedContent, GenerationError> {
        let messages = template.render(transcript);
        let content = self.completer.complete(messages, on_delta).await?;

        tokio::fs::write(output_path, &content)
            .await
            .map_err(|e| GenerationError::Persist {
                path: output_path.display().to_string(),
                source: e,
            })?;

        info!(
            "💾 Generated content saved to {} ({} chars)",
            output_path.display(),
            content.len()
        );

        Ok(GeneratedContent {
            path: output_path.to_path_buf(),
            content,
        })
    }
}
