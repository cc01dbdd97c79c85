use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use store::EventFilter;

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// `GET /query/logs` — plain relational selection over raw events; the
/// vector path is never touched.
pub async fn query_logs(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<LogsQuery>,
) -> ServerResult<impl IntoResponse> {
    let level = params
        .level
        .map(|s| s.parse().map_err(ServerError::BadRequest))
        .transpose()?;

    let filter = EventFilter {
        service: params.service,
        host: params.host,
        level,
        start: params.start,
        end: params.end,
        limit: params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
        offset: params.offset.unwrap_or(0),
    };

    let events = state.search.query_logs(&filter)?;
    Ok(Json(json!({
        "count": events.len(),
        "events": events,
    })))
}
