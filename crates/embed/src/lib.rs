//! DevMesh Embedding Client
//!
//! Batched, resilient access to an external vector-embedding backend. The
//! backend speaks the OpenAI-compatible shape: POST a list of strings plus a
//! model identifier, receive an equal-length list of fixed-dimension float
//! vectors.
//!
//! Two implementations of the [`Embedder`] seam ship here:
//!
//! - [`HttpEmbedder`] — the production client. Prefers the batch endpoint
//!   (the per-item endpoint is roughly 30× slower and is used only as a
//!   fallback), retries transient failures with backoff, enforces a global
//!   concurrency cap so the serving hardware is never overrun, and supports
//!   an inter-batch delay knob for thermal management.
//! - [`StubEmbedder`] — deterministic hash-seeded vectors with no I/O, for
//!   tests and offline deployments.
//!
//! Callers treat [`EmbedError::Unavailable`] as a soft failure: live ingest
//! persists templates without vectors and the safety-net worker completes
//! them later.

mod client;
mod config;
mod error;
mod normalize;
mod retry;
mod stub;

pub use crate::client::HttpEmbedder;
pub use crate::config::EmbedderConfig;
pub use crate::error::EmbedError;
pub use crate::retry::{execute_with_retry, RetryConfig, RetryResult, RetryStep};
pub use crate::stub::StubEmbedder;

use std::sync::Arc;

/// The embedding seam: anything that can turn text into fixed-dimension
/// vectors. The returned list is always 1:1 with the input.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. Empty input yields an empty output.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Model identifier recorded alongside every vector this embedder produces.
    fn model(&self) -> &str;

    /// Fixed output dimension for this embedder's model.
    fn dim(&self) -> usize;

    /// Convenience wrapper for single-text callers (query embedding).
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_batch(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::Malformed("backend returned no vector".into()))
    }
}

/// Build an embedder from configuration: HTTP when an `api_url` is
/// configured, the deterministic stub otherwise.
pub fn build_embedder(cfg: &EmbedderConfig) -> Result<Arc<dyn Embedder>, EmbedError> {
    cfg.validate().map_err(EmbedError::InvalidConfig)?;
    match cfg.api_url.as_deref() {
        Some(_) => Ok(Arc::new(HttpEmbedder::new(cfg.clone())?)),
        None => Ok(Arc::new(StubEmbedder::new(cfg.model.clone(), cfg.dim))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_embedder_defaults_to_stub() {
        let cfg = EmbedderConfig::default();
        let embedder = build_embedder(&cfg).expect("stub embedder builds");
        assert_eq!(embedder.dim(), cfg.dim);

        let vectors = embedder
            .embed_batch(&["hello".to_string(), "world".to_string()])
            .await
            .expect("stub embeds");
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), cfg.dim);
    }

    #[tokio::test]
    async fn embed_one_returns_single_vector() {
        let embedder = StubEmbedder::new("stub-model".into(), 64);
        let v = embedder.embed_one("query text").await.expect("embed one");
        assert_eq!(v.len(), 64);
    }
}
