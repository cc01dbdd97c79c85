use thiserror::Error;

/// Errors produced by the canonicalization pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CanonicalError {
    /// The configuration is structurally invalid (e.g. version 0).
    #[error("invalid canonicalize config: {0}")]
    InvalidConfig(String),

    /// The configured version has no registered rule set.
    #[error("no canonicalization rules registered for version {0}")]
    UnknownVersion(u32),
}
