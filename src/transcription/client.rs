use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ChunkTranscriber, ChunkTranscript, TaskState, TranscriptionError, TranscriptionTask};
use crate::config::TranscriptionConfig;
use crate::retry::RetryPolicy;
use crate::segment::AudioChunk;

const HEADER_APP_KEY: &str = "X-Api-App-Key";
const HEADER_ACCESS_KEY: &str = "X-Api-Access-Key";
const HEADER_RESOURCE_ID: &str = "X-Api-Resource-Id";
const HEADER_REQUEST_ID: &str = "X-Api-Request-Id";
const HEADER_SEQUENCE: &str = "X-Api-Sequence";
const HEADER_STATUS_CODE: &str = "X-Api-Status-Code";
const HEADER_MESSAGE: &str = "X-Api-Message";
const HEADER_LOG_ID: &str = "X-Tt-Logid";

const STATUS_SUCCESS: &str = "20000000";
const STATUS_PROCESSING: &str = "20000001";
const STATUS_QUEUED: &str = "20000002";

#[derive(Debug, Serialize)]
struct SubmitRequest {
    user: UserMeta,
    audio: AudioPayload,
    request: RequestOptions,
}

#[derive(Debug, Serialize)]
struct UserMeta {
    uid: String,
}

#[derive(Debug, Serialize)]
struct AudioPayload {
    data: String,
    format: String,
    codec: String,
    rate: u32,
    bits: u32,
    channel: u32,
}

#[derive(Debug, Serialize)]
struct RequestOptions {
    model_name: String,
    show_utterances: bool,
    corpus: Corpus,
}

#[derive(Debug, Serialize)]
struct Corpus {
    correct_table_name: String,
    context: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Option<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    utterances: Vec<Utterance>,
}

#[derive(Debug, Deserialize)]
struct Utterance {
    #[serde(default)]
    text: String,
}

/// One poll reply, bucketed by the service status code.
#[derive(Debug)]
pub(crate) enum PollReply {
    Completed(String),
    InProgress(TaskState),
    Failed(String),
}

/// Bucket a service status code into a task state.
pub(crate) fn classify_status(code: &str) -> TaskState {
    match code {
        STATUS_SUCCESS => TaskState::Completed,
        STATUS_PROCESSING => TaskState::Processing,
        STATUS_QUEUED => TaskState::Queued,
        _ => TaskState::Failed,
    }
}

/// Join the ordered utterances of a completed result into the chunk's text.
fn extract_transcript(body: &QueryResponse) -> String {
    body.result
        .as_ref()
        .map(|r| {
            r.utterances
                .iter()
                .map(|u| u.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Drive a poll closure until a terminal reply or the attempt budget runs out.
///
/// Returns the transcript text and the number of polls it took. A transport
/// error from the closure aborts the loop; the caller's retry layer decides
/// whether the whole submit+poll cycle re-runs.
pub(crate) async fn drive_poll<F, Fut>(
    max_attempts: u32,
    interval: Duration,
    mut poll: F,
) -> Result<(String, u32), TranscriptionError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollReply, TranscriptionError>>,
{
    for attempt in 1..=max_attempts {
        match poll(attempt).await? {
            PollReply::Completed(text) => return Ok((text, attempt)),
            PollReply::InProgress(state) => {
                debug!("task in progress ({:?}), poll {}/{}", state, attempt, max_attempts);
                if attempt < max_attempts {
                    tokio::time::sleep(interval).await;
                }
            }
            PollReply::Failed(message) => return Err(TranscriptionError::Service(message)),
        }
    }
    Err(TranscriptionError::TimedOut {
        attempts: max_attempts,
    })
}

/// Client for the submit/poll speech recognition service.
///
/// One call drives a chunk through submit → poll → fetch; transport failures
/// re-run the whole cycle under the configured retry policy with a fresh task
/// id, while service verdicts surface immediately.
pub struct SpeechClient {
    config: TranscriptionConfig,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl SpeechClient {
    pub fn new(config: TranscriptionConfig) -> Result<Self, TranscriptionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let retry = RetryPolicy::new(
            config.max_retries,
            Duration::from_secs(config.retry_delay_secs),
        );

        Ok(Self {
            config,
            client,
            retry,
        })
    }

    fn identity_headers(&self, builder: reqwest::RequestBuilder, task_id: &str) -> reqwest::RequestBuilder {
        builder
            .header(HEADER_APP_KEY, &self.config.app_key)
            .header(HEADER_ACCESS_KEY, &self.config.access_key)
            .header(HEADER_RESOURCE_ID, &self.config.resource_id)
            .header(HEADER_REQUEST_ID, task_id)
    }

    /// Submit the encoded audio; returns the service log id to echo on polls.
    async fn submit(
        &self,
        task: &TranscriptionTask,
        audio_b64: &str,
    ) -> Result<String, TranscriptionError> {
        let payload = SubmitRequest {
            user: UserMeta {
                uid: self.config.uid.clone(),
            },
            audio: AudioPayload {
                data: audio_b64.to_string(),
                format: "wav".to_string(),
                codec: "raw".to_string(),
                rate: 16000,
                bits: 16,
                channel: 1,
            },
            request: RequestOptions {
                model_name: self.config.model_name.clone(),
                show_utterances: self.config.show_utterances,
                corpus: Corpus {
                    correct_table_name: String::new(),
                    context: String::new(),
                },
            },
        };

        let response = self
            .identity_headers(self.client.post(&self.config.submit_url), &task.task_id)
            .header(HEADER_SEQUENCE, "-1")
            .json(&payload)
            .send()
            .await?;

        let status = header_str(&response, HEADER_STATUS_CODE)
            .ok_or_else(|| TranscriptionError::Malformed("missing status-code header".to_string()))?;

        if status != STATUS_SUCCESS {
            let message = header_str(&response, HEADER_MESSAGE)
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(TranscriptionError::Submit(message));
        }

        let log_id = header_str(&response, HEADER_LOG_ID).unwrap_or_default();
        debug!(
            "chunk {} submitted, task id {}, log id {}",
            task.chunk_index, task.task_id, log_id
        );
        Ok(log_id)
    }

    async fn poll_once(&self, task_id: &str, log_id: &str) -> Result<PollReply, TranscriptionError> {
        let response = self
            .identity_headers(self.client.post(&self.config.query_url), task_id)
            .header(HEADER_LOG_ID, log_id)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = header_str(&response, HEADER_STATUS_CODE)
            .ok_or_else(|| TranscriptionError::Malformed("missing status-code header".to_string()))?;

        match classify_status(&status) {
            TaskState::Completed => {
                let body: QueryResponse = response
                    .json()
                    .await
                    .map_err(|e| TranscriptionError::Malformed(e.to_string()))?;
                Ok(PollReply::Completed(extract_transcript(&body)))
            }
            state @ (TaskState::Processing | TaskState::Queued) => {
                Ok(PollReply::InProgress(state))
            }
            _ => {
                let message = header_str(&response, HEADER_MESSAGE)
                    .unwrap_or_else(|| "unknown error".to_string());
                Ok(PollReply::Failed(message))
            }
        }
    }

    /// One full submit+poll cycle under a fresh task id.
    async fn run_cycle(
        &self,
        chunk_index: usize,
        attempt: u32,
        audio_b64: &str,
    ) -> Result<String, TranscriptionError> {
        let mut task = TranscriptionTask {
            chunk_index,
            task_id: Uuid::new_v4().to_string(),
            attempt,
            state: TaskState::Submitted,
        };

        let log_id = self.submit(&task, audio_b64).await?;

        let interval = Duration::from_secs(self.config.poll_interval_secs);
        let result = drive_poll(self.config.max_poll_attempts, interval, |_| {
            self.poll_once(&task.task_id, &log_id)
        })
        .await;

        task.state = match &result {
            Ok(_) => TaskState::Completed,
            Err(TranscriptionError::TimedOut { .. }) => TaskState::TimedOut,
            Err(_) => TaskState::Failed,
        };
        debug!(
            "task {} reached terminal state {:?}",
            task.task_id, task.state
        );

        let (text, polls) = result?;

        info!(
            "✅ chunk {} transcribed after {} polls ({} chars)",
            chunk_index,
            polls,
            text.len()
        );
        Ok(text)
    }
}

#[async_trait::async_trait]
impl ChunkTranscriber for SpeechClient {
    async fn transcribe(&self, chunk: &AudioChunk) -> Result<ChunkTranscript, TranscriptionError> {
        let audio = tokio::fs::read(&chunk.path).await?;
        let audio_b64 = base64::engine::general_purpose::STANDARD.encode(audio);

        let (text, attempts) = self
            .retry
            .run(
                "transcription",
                |attempt| {
                    let audio_b64 = &audio_b64;
                    async move {
                        let text = self.run_cycle(chunk.index, attempt, audio_b64).await?;
                        Ok::<_, TranscriptionError>((text, attempt))
                    }
                },
                TranscriptionError::is_transient,
            )
            .await?;

        Ok(ChunkTranscript {
            chunk_index: chunk.index,
            text,
            attempts,
        })
    }
}

fn header_str(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_status_bucketing() {
        assert_eq!(classify_status("20000000"), TaskState::Completed);
        assert_eq!(classify_status("20000001"), TaskState::Processing);
        assert_eq!(classify_status("20000002"), TaskState::Queued);
        assert_eq!(classify_status("45000001"), TaskState::Failed);
        assert_eq!(classify_status(""), TaskState::Failed);
    }

    #[test]
    fn test_utterances_join_with_newlines() {
        let body: QueryResponse = serde_json::from_str(
            r#"{"result": {"utterances": [{"text": "first"}, {"text": "second"}, {"text": "third"}]}}"#,
        )
        .unwrap();
        assert_eq!(extract_transcript(&body), "first\nsecond\nthird");
    }

    #[test]
    fn test_empty_result_yields_empty_transcript() {
        let body: QueryResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(extract_transcript(&body), "");
    }

    #[tokio::test]
    async fn test_poll_completes_after_in_progress_replies() {
        let calls = Cell::new(0u32);
        let result = drive_poll(60, Duration::ZERO, |_| {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n <= 5 {
                    Ok(PollReply::InProgress(TaskState::Processing))
                } else {
                    Ok(PollReply::Completed("done".to_string()))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, ("done".to_string(), 6));
    }

    #[tokio::test]
    async fn test_poll_budget_exhaustion_is_timeout() {
        let result = drive_poll(60, Duration::ZERO, |_| async {
            Ok(PollReply::InProgress(TaskState::Queued))
        })
        .await;

        match result {
            Err(TranscriptionError::TimedOut { attempts }) => assert_eq!(attempts, 60),
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_service_failure_aborts_polling() {
        let calls = Cell::new(0u32);
        let result = drive_poll(60, Duration::ZERO, |_| {
            calls.set(calls.get() + 1);
            async { Ok(PollReply::Failed("audio decode error".to_string())) }
        })
        .await;

        assert_eq!(calls.get(), 1);
        match result {
            Err(TranscriptionError::Service(message)) => {
                assert_eq!(message, "audio decode error")
            }
            other => panic!("expected service failure, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_transport_error_bubbles_out_of_poll_loop() {
        let result = drive_poll(60, Duration::ZERO, |_| async {
            Err::<PollReply, _>(TranscriptionError::Malformed("no header".to_string()))
        })
        .await;

        assert!(matches!(result, Err(TranscriptionError::Malformed(_))));
    }
}
