//! HTTP client for OpenAI-compatible embedding backends.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::config::EmbedderConfig;
use crate::error::EmbedError;
use crate::retry::{execute_with_retry, is_retryable_status, RetryStep};
use crate::Embedder;

/// Production embedder talking to an HTTP backend.
///
/// Prefers the batch endpoint; falls back to per-item requests when the
/// backend rejects the batch payload outright. A process-wide semaphore
/// caps in-flight requests so parallel ingest workers cannot overrun the
/// serving hardware.
pub struct HttpEmbedder {
    cfg: EmbedderConfig,
    http: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl HttpEmbedder {
    pub fn new(cfg: EmbedderConfig) -> Result<Self, EmbedError> {
        cfg.validate().map_err(EmbedError::InvalidConfig)?;
        if cfg.api_url.is_none() {
            return Err(EmbedError::InvalidConfig(
                "api_url is required for the http embedder".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(cfg.max_concurrency.max(1))
            .build()
            .map_err(|e| EmbedError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        let permits = Arc::new(Semaphore::new(cfg.max_concurrency));
        Ok(Self { cfg, http, permits })
    }

    fn batch_url(&self) -> &str {
        self.cfg.api_url.as_deref().unwrap_or_default()
    }

    fn single_url(&self) -> &str {
        self.cfg
            .single_url
            .as_deref()
            .unwrap_or_else(|| self.batch_url())
    }

    async fn post_payload(&self, url: &str, payload: &Value) -> Result<Value, RetryStep> {
        let mut request = self.http.post(url).header("Content-Type", "application/json");
        if let Some(header) = self.cfg.auth_header.as_deref() {
            request = request.header("Authorization", header);
        }

        let response = request
            .json(payload)
            .send()
            .await
            .map_err(|e| RetryStep::transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {status}: {body}");
            return if is_retryable_status(status.as_u16()) {
                Err(RetryStep::transient(message))
            } else {
                Err(RetryStep::fatal(message))
            };
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| RetryStep::transient(format!("invalid JSON response: {e}")))
    }

    async fn request_vectors(&self, url: &str, payload: Value) -> RequestOutcome {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return RequestOutcome::Transient("embedding client shut down".into());
            }
        };

        let result = execute_with_retry(&self.cfg.retry, |attempt| {
            let payload = payload.clone();
            async move {
                if attempt > 0 {
                    tracing::debug!(attempt, "retrying embedding request");
                }
                self.post_payload(url, &payload).await
            }
        })
        .await;

        if result.succeeded {
            match result.into_result() {
                Ok(value) => RequestOutcome::Ok(value),
                Err(message) => RequestOutcome::Transient(message),
            }
        } else if result.fatal {
            RequestOutcome::Rejected(result.result.err().unwrap_or_default())
        } else {
            RequestOutcome::Transient(result.result.err().unwrap_or_default())
        }
    }

    /// One batch request for a chunk of at most `batch_size` texts.
    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let payload = json!({ "input": texts, "model": self.cfg.model });
        match self.request_vectors(self.batch_url(), payload).await {
            RequestOutcome::Ok(value) => {
                let vectors = parse_embeddings(value)?;
                self.check_shape(texts.len(), vectors)
            }
            RequestOutcome::Rejected(reason) => {
                // The batch endpoint refused the payload shape; fall back to
                // per-item requests (roughly 30x slower, so log it).
                tracing::warn!(%reason, "batch embedding rejected, falling back to per-item");
                self.embed_items(texts).await
            }
            RequestOutcome::Transient(reason) => Err(EmbedError::Unavailable(reason)),
        }
    }

    /// Per-item fallback path.
    async fn embed_items(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let payload = json!({ "input": text, "model": self.cfg.model });
            match self.request_vectors(self.single_url(), payload).await {
                RequestOutcome::Ok(value) => {
                    let mut parsed = parse_embeddings(value)?;
                    match parsed.pop() {
                        Some(vector) if parsed.is_empty() => vectors.push(vector),
                        _ => {
                            return Err(EmbedError::Malformed(
                                "single-text endpoint returned an unexpected vector count".into(),
                            ))
                        }
                    }
                }
                RequestOutcome::Rejected(reason) | RequestOutcome::Transient(reason) => {
                    return Err(EmbedError::Unavailable(reason));
                }
            }
        }
        self.check_shape(texts.len(), vectors)
    }

    fn check_shape(
        &self,
        sent: usize,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        if vectors.len() != sent {
            return Err(EmbedError::CountMismatch {
                sent,
                got: vectors.len(),
            });
        }
        for vector in &vectors {
            if vector.len() != self.cfg.dim {
                return Err(EmbedError::DimensionMismatch {
                    expected: self.cfg.dim,
                    got: vector.len(),
                });
            }
        }
        Ok(vectors)
    }
}

enum RequestOutcome {
    Ok(Value),
    /// Non-retryable rejection (4xx): the payload shape is the problem.
    Rejected(String),
    /// Transient failure that exhausted its retries.
    Transient(String),
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(texts.len());
        let chunks: Vec<&[String]> = texts.chunks(self.cfg.batch_size).collect();
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            out.extend(self.embed_chunk(chunk).await?);
            if self.cfg.inter_batch_delay_ms > 0 && i < last {
                tokio::time::sleep(Duration::from_millis(self.cfg.inter_batch_delay_ms)).await;
            }
        }
        Ok(out)
    }

    fn model(&self) -> &str {
        &self.cfg.model
    }

    fn dim(&self) -> usize {
        self.cfg.dim
    }
}

/// Parse the supported response shapes into a list of vectors:
/// `{"data": [{"embedding": [...]}, ...]}` (OpenAI), `{"embeddings": [...]}`,
/// or a bare array of vectors.
fn parse_embeddings(value: Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    match value {
        Value::Object(mut map) => {
            if let Some(embeddings) = map.remove("embeddings") {
                return parse_vector_collection(embeddings);
            }

            if let Some(Value::Array(items)) = map.remove("data") {
                let mut vectors = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(mut obj) => {
                            let embedding = obj.remove("embedding").ok_or_else(|| {
                                EmbedError::Malformed(
                                    "missing `embedding` field in data item".into(),
                                )
                            })?;
                            vectors.push(parse_vector(embedding)?);
                        }
                        _ => {
                            return Err(EmbedError::Malformed(
                                "unexpected entry inside `data` array".into(),
                            ))
                        }
                    }
                }
                return Ok(vectors);
            }

            Err(EmbedError::Malformed("unsupported response shape".into()))
        }
        other => parse_vector_collection(other),
    }
}

fn parse_vector_collection(value: Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                Ok(Vec::new())
            } else if items.iter().all(|item| matches!(item, Value::Array(_))) {
                items.into_iter().map(parse_vector).collect()
            } else {
                parse_vector(Value::Array(items)).map(|v| vec![v])
            }
        }
        other => Err(EmbedError::Malformed(format!(
            "embedding collection must be an array, got {other:?}"
        ))),
    }
}

fn parse_vector(value: Value) -> Result<Vec<f32>, EmbedError> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .map(|entry| match entry {
                Value::Number(num) => num
                    .as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| EmbedError::Malformed("non-finite embedding value".into())),
                other => Err(EmbedError::Malformed(format!(
                    "embedding entries must be numbers, got {other:?}"
                ))),
            })
            .collect(),
        other => Err(EmbedError::Malformed(format!(
            "embedding vector must be an array, got {other:?}"
        ))),
    }
}
