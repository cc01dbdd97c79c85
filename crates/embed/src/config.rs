use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

/// Configuration for the embedding client.
///
/// With `api_url` set the client talks to an OpenAI-compatible HTTP
/// backend; without it a deterministic stub is used (tests, offline
/// deployments).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// Batch embedding endpoint (e.g. `http://gpu-node:8080/v1/embeddings`).
    /// `None` selects the stub embedder.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Optional single-text fallback endpoint. When absent, the fallback
    /// posts single-element batches to `api_url`.
    #[serde(default)]
    pub single_url: Option<String>,

    /// Model identifier sent with every request and recorded on templates.
    #[serde(default = "default_model")]
    pub model: String,

    /// Fixed output dimension for the configured model.
    #[serde(default = "default_dim")]
    pub dim: usize,

    /// Maximum number of texts per batch request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Total request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Global cap on in-flight requests across all ingest workers.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Pause between consecutive batches, for thermal management of the
    /// serving hardware. Zero disables the pause.
    #[serde(default)]
    pub inter_batch_delay_ms: u64,

    /// Value for the `Authorization` header, if the backend wants one.
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            single_url: None,
            model: default_model(),
            dim: default_dim(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            inter_batch_delay_ms: 0,
            auth_header: None,
            retry: RetryConfig::default(),
        }
    }
}

impl EmbedderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.dim == 0 {
            return Err("embed.dim must be >= 1".to_string());
        }
        if self.batch_size == 0 {
            return Err("embed.batch_size must be >= 1".to_string());
        }
        if self.max_concurrency == 0 {
            return Err("embed.max_concurrency must be >= 1".to_string());
        }
        Ok(())
    }
}

fn default_model() -> String {
    "qwen3-embedding-8b".to_string()
}

fn default_dim() -> usize {
    4096
}

fn default_batch_size() -> usize {
    50
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_concurrency() -> usize {
    4
}
