use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use pipeline::PipelineError;

pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The ingest gate is full. The shipper retries from its cursor.
    #[error("ingest pipeline busy, retry later")]
    Busy,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("embedding error: {0}")]
    Embed(#[from] embed::EmbedError),

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found")]
    NotFound,
}

impl ServerError {
    /// Get HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServerError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            // Storage outages are whole-batch failures the caller retries.
            ServerError::Pipeline(PipelineError::Storage(_)) | ServerError::Store(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServerError::Pipeline(_) | ServerError::Embed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Internal(_) | ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    fn error_code(&self) -> &'static str {
        match self {
            ServerError::Authentication(_) => "AUTH_FAILED",
            ServerError::Busy => "BUSY",
            ServerError::BadRequest(_) => "BAD_REQUEST",
            ServerError::Pipeline(PipelineError::Storage(_)) | ServerError::Store(_) => {
                "STORAGE_UNAVAILABLE"
            }
            ServerError::Pipeline(_) => "PIPELINE_ERROR",
            ServerError::Embed(_) => "EMBED_ERROR",
            ServerError::Internal(_) => "INTERNAL_ERROR",
            ServerError::Config(_) => "CONFIG_ERROR",
            ServerError::NotFound => "NOT_FOUND",
        }
    }

    /// Whether the caller should retry the identical request later.
    fn retryable(&self) -> bool {
        matches!(
            self,
            ServerError::Busy
                | ServerError::Pipeline(PipelineError::Storage(_))
                | ServerError::Store(_)
        )
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "retryable": self.retryable(),
            }
        }));
        (status, body).into_response()
    }
}

impl From<std::net::AddrParseError> for ServerError {
    fn from(err: std::net::AddrParseError) -> Self {
        ServerError::Config(format!("invalid address: {err}"))
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(format!("IO error: {err}"))
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_maps_to_retryable_503() {
        let err = ServerError::Busy;
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.retryable());
    }

    #[test]
    fn storage_failures_are_retryable() {
        let err = ServerError::Store(store::StoreError::Backend("down".into()));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.retryable());
    }

    #[test]
    fn bad_request_is_not_retryable() {
        let err = ServerError::BadRequest("broken".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.retryable());
    }
}
