use thiserror::Error;

/// Errors produced by the embedding client.
///
/// `Unavailable` is the soft-failure variant: callers on the live ingest
/// path absorb it and leave templates unembedded for the safety net.
#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    #[error("invalid embedder config: {0}")]
    InvalidConfig(String),

    /// The backend could not be reached or kept failing after retries.
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered but the response shape was not parseable.
    #[error("malformed embedding response: {0}")]
    Malformed(String),

    /// A vector came back with the wrong dimension for the configured model.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// The backend returned a different number of vectors than texts sent.
    #[error("embedding count mismatch: sent {sent} texts, got {got} vectors")]
    CountMismatch { sent: usize, got: usize },
}

impl EmbedError {
    /// True when the failure is transient and the safety net should simply
    /// try again later.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EmbedError::Unavailable(_))
    }
}
