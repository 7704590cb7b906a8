use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transcription::FailurePolicy;

/// Configuration for the notegen pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Input classification settings
    pub ingest: IngestConfig,

    /// Media segmentation settings
    pub segmenter: SegmenterConfig,

    /// Speech recognition service settings
    pub transcription: TranscriptionConfig,

    /// Content generation service settings
    pub generation: GenerationConfig,

    /// Pipeline-level behavior
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Extensions treated as video input
    pub video_extensions: Vec<String>,

    /// Extensions treated as audio input
    pub audio_extensions: Vec<String>,

    /// Extensions treated as text-document input
    pub text_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Upper bound on chunk duration in seconds
    pub chunk_duration_secs: u64,

    /// Sample rate of the produced chunks (speech service requirement)
    pub sample_rate: u32,

    /// Directory for intermediate chunk files
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Task submission endpoint
    pub submit_url: String,

    /// Task query endpoint
    pub query_url: String,

    /// Application key passed through to the service
    pub app_key: String,

    /// Access key passed through to the service
    pub access_key: String,

    /// Service resource identifier
    pub resource_id: String,

    /// Caller identity reported in the submit payload
    pub uid: String,

    /// Recognition model name
    pub model_name: String,

    /// Ask the service for per-utterance results
    pub show_utterances: bool,

    /// Seconds between result polls
    pub poll_interval_secs: u64,

    /// Maximum polls before a task counts as timed out
    pub max_poll_attempts: u32,

    /// Submit+poll cycles per chunk before giving up
    pub max_retries: u32,

    /// Seconds between retry cycles
    pub retry_delay_secs: u64,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,

    /// Worker pool width for concurrent chunk transcription
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Chat completions endpoint (OpenAI-compatible)
    pub endpoint: String,

    /// API key for the generation service
    pub api_key: String,

    /// Model name
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Whole-call HTTP timeout in seconds; covers the full stream
    pub timeout_secs: u64,

    /// Optional directory of `<mode>.txt` prompt template overrides
    pub prompt_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// What a single chunk's terminal transcription failure means
    pub failure_policy: FailurePolicy,

    /// Where the assembled transcript is saved
    pub transcript_path: PathBuf,

    /// Keep chunk files and the transcript after the job finishes
    pub keep_intermediate: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let to_vec = |exts: &[&str]| exts.iter().map(|e| e.to_string()).collect();
        Self {
            video_extensions: to_vec(&["mp4", "mov", "mpeg", "webm"]),
            audio_extensions: to_vec(&["mp3", "m4a", "wav", "amr", "mpga"]),
            text_extensions: to_vec(&[
                "txt", "md", "mdx", "markdown", "pdf", "html", "xlsx", "xls", "doc", "docx",
                "csv", "eml", "msg", "pptx", "ppt", "xml", "epub",
            ]),
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            chunk_duration_secs: 600,
            sample_rate: 16000,
            work_dir: PathBuf::from("output_chunks"),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            submit_url: "https://openspeech.bytedance.com/api/v3/auc/bigmodel/submit".to_string(),
            query_url: "https://openspeech.bytedance.com/api/v3/auc/bigmodel/query".to_string(),
            app_key: String::new(),
            access_key: String::new(),
            resource_id: "volc.bigasr.auc".to_string(),
            uid: "notegen".to_string(),
            model_name: "bigmodel".to_string(),
            show_utterances: true,
            poll_interval_secs: 2,
            max_poll_attempts: 60,
            max_retries: 3,
            retry_delay_secs: 5,
            request_timeout_secs: 30,
            concurrency: 10,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.deepseek.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "deepseek-chat".to_string(),
            max_tokens: 4000,
            temperature: 0.7,
            timeout_secs: 600,
            prompt_dir: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Lenient,
            transcript_path: PathBuf::from("source_transcript.txt"),
            keep_intermediate: false,
        }
    }
}

impl Config {
    /// Load configuration from the first readable file among the usual
    /// locations.
    pub fn load() -> Result<Self> {
        let mut config_paths = vec![
            PathBuf::from("notegen.toml"),
            PathBuf::from("config/notegen.toml"),
        ];
        if let Ok(home) = std::env::var("HOME") {
            config_paths.push(PathBuf::from(home).join(".config/notegen/config.toml"));
        }

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    }
                }
            }
        }

        Err(anyhow!("No configuration file found"))
    }

    /// Load a specific configuration file.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read config file {}: {}", path.display(), e))?;
        let config = toml::from_str(&config_str)
            .map_err(|e| anyhow!("Cannot parse config file {}: {}", path.display(), e))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Override settings from environment variables. Credentials usually
    /// arrive this way rather than through the config file.
    pub fn apply_env(&mut self) {
        if let Ok(app_key) = std::env::var("NOTEGEN_APP_KEY") {
            self.transcription.app_key = app_key;
        }
        if let Ok(access_key) = std::env::var("NOTEGEN_ACCESS_KEY") {
            self.transcription.access_key = access_key;
        }
        if let Ok(api_key) = std::env::var("DEEPSEEK_API_KEY") {
            self.generation.api_key = api_key;
        }
        if let Ok(workers) = std::env::var("NOTEGEN_WORKERS") {
            if let Ok(workers) = workers.parse() {
                self.transcription.concurrency = workers;
            }
        }
        if let Ok(policy) = std::env::var("NOTEGEN_FAILURE_POLICY") {
            match policy.to_lowercase().as_str() {
                "strict" => self.pipeline.failure_policy = FailurePolicy::Strict,
                "lenient" => self.pipeline.failure_policy = FailurePolicy::Lenient,
                other => tracing::warn!("Unknown NOTEGEN_FAILURE_POLICY '{}', keeping default", other),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.transcription.concurrency == 0 {
            return Err(anyhow!("transcription.concurrency must be greater than 0"));
        }
        if self.transcription.max_poll_attempts == 0 {
            return Err(anyhow!("transcription.max_poll_attempts must be greater than 0"));
        }
        if self.transcription.max_retries == 0 {
            return Err(anyhow!("transcription.max_retries must be greater than 0"));
        }
        if self.segmenter.chunk_duration_secs == 0 {
            return Err(anyhow!("segmenter.chunk_duration_secs must be greater than 0"));
        }
        if self.segmenter.sample_rate == 0 {
            return Err(anyhow!("segmenter.sample_rate must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.segmenter.chunk_duration_secs, 600);
        assert_eq!(config.segmenter.sample_rate, 16000);
        assert_eq!(config.transcription.concurrency, 10);
        assert_eq!(config.transcription.max_poll_attempts, 60);
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::Lenient);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let mut broken = Config::default();
        broken.transcription.concurrency = 0;
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(
            parsed.transcription.submit_url,
            config.transcription.submit_url
        );
        assert_eq!(parsed.pipeline.failure_policy, config.pipeline.failure_policy);
    }

    #[test]
    fn test_failure_policy_parses_from_toml() {
        let toml_str = r#"
            [pipeline]
            failure_policy = "strict"
            transcript_path = "transcript.txt"
            keep_intermediate = false
        "#;
        #[derive(Deserialize)]
        struct Wrapper {
            pipeline: PipelineConfig,
        }
        let wrapper: Wrapper = toml::from_str(toml_str).unwrap();
        assert_eq!(wrapper.pipeline.failure_policy, FailurePolicy::Strict);
    }
}
