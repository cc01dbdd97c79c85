use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::ServerResult;
use crate::state::ServerState;

/// Global server start time for uptime calculation
static SERVER_START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

fn uptime_seconds() -> u64 {
    SERVER_START_TIME.elapsed().map(|d| d.as_secs()).unwrap_or(0)
}

/// `GET /health` — liveness. No side effects, never authenticated.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "devmesh",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
    }))
}

/// `GET /info` — build and store metadata plus pipeline counters. No side
/// effects.
pub async fn info(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    let canon = state.pipeline.canon_config();
    Ok(Json(json!({
        "service": "devmesh",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime_seconds(),
        "canon_version": canon.version,
        "events": state.event_store.len(),
        "templates": state.template_store.len(),
        "embedding_dim": state.template_store.dim(),
        "stats": state.stats.snapshot(),
    })))
}
