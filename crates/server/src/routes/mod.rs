pub mod health;
pub mod ingest;
pub mod query;
pub mod search;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Root endpoint: service identification and the route map.
pub async fn api_info() -> impl IntoResponse {
    Json(json!({
        "service": "devmesh",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "ingest": "POST /ingest/logs",
            "query": "GET /query/logs",
            "search_templates": "GET /search/templates",
            "search_logs": "GET /search/logs",
            "health": "GET /health",
            "info": "GET /info",
        }
    }))
}

/// Fallback for unknown routes.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {
                "code": "NOT_FOUND",
                "message": "no such endpoint",
            }
        })),
    )
}
