use fxhash::hash64;

use crate::error::EmbedError;
use crate::normalize::l2_normalize_in_place;
use crate::Embedder;

/// Deterministic embedder used by tests and offline deployments.
///
/// Generates sinusoid values derived from a hash of the input text to
/// guarantee reproducible vectors with minimal CPU cost. Vectors are
/// L2-normalized so cosine distances behave like the real backend's.
pub struct StubEmbedder {
    model: String,
    dim: usize,
}

impl StubEmbedder {
    pub fn new(model: String, dim: usize) -> Self {
        Self { model, dim }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let h = hash64(text.as_bytes());
        for (idx, value) in v.iter_mut().enumerate() {
            *value = ((h >> (idx % 32)) as f32 * 0.0001).sin();
        }
        l2_normalize_in_place(&mut v);
        v
    }
}

#[async_trait::async_trait]
impl Embedder for StubEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub() -> StubEmbedder {
        StubEmbedder::new("stub-model".into(), 128)
    }

    #[tokio::test]
    async fn stub_is_deterministic() {
        let e = stub();
        let a = e.embed_batch(&["same text".to_string()]).await.unwrap();
        let b = e.embed_batch(&["same text".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_text_different_vector() {
        let e = stub();
        let a = e.embed_one("hello").await.unwrap();
        let b = e.embed_one("world").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn vectors_are_normalized() {
        let e = stub();
        let v = e.embed_one("check the norm").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm={norm}");
    }

    #[tokio::test]
    async fn batch_is_one_to_one() {
        let e = stub();
        let texts: Vec<String> = (0..7).map(|i| format!("text {i}")).collect();
        let vectors = e.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 7);
        assert!(vectors.iter().all(|v| v.len() == 128));
    }
}
