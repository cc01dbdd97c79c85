use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use pipeline::SearchFilter;

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;

#[derive(Debug, Deserialize)]
pub struct TemplateSearchQuery {
    /// Natural-language query text.
    pub q: String,
    /// Top-K templates. `limit` accepted as an alias.
    #[serde(default, alias = "limit")]
    pub k: Option<usize>,
    /// Representative events per template.
    #[serde(default)]
    pub examples: Option<usize>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct EventSearchQuery {
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

fn build_filter(
    service: Option<String>,
    level: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> ServerResult<SearchFilter> {
    let level = level
        .map(|s| s.parse().map_err(ServerError::BadRequest))
        .transpose()?;
    Ok(SearchFilter {
        service,
        level,
        start,
        end,
    })
}

/// `GET /search/templates` — the primary semantic surface: templates ranked
/// by ascending cosine distance, each with representative events. Returns
/// an empty, `degraded`-flagged set when the embedding backend is down.
pub async fn search_templates(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<TemplateSearchQuery>,
) -> ServerResult<impl IntoResponse> {
    if params.q.trim().is_empty() {
        return Err(ServerError::BadRequest("query text must not be empty".into()));
    }
    let filter = build_filter(params.service, params.level, params.start, params.end)?;

    let results = state
        .search
        .search_templates(
            &params.q,
            params.k.unwrap_or(0),
            params.examples.unwrap_or(0),
            &filter,
        )
        .await?;
    Ok(Json(results))
}

/// `GET /search/logs` — legacy event-level semantic search, retained for
/// compatibility with older consumers.
pub async fn search_logs(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<EventSearchQuery>,
) -> ServerResult<impl IntoResponse> {
    if params.q.trim().is_empty() {
        return Err(ServerError::BadRequest("query text must not be empty".into()));
    }
    let filter = build_filter(params.service, params.level, params.start, params.end)?;

    let (hits, degraded) = state
        .search
        .search_events(&params.q, params.limit.unwrap_or(0), &filter)
        .await?;
    Ok(Json(json!({
        "count": hits.len(),
        "degraded": degraded,
        "results": hits,
    })))
}
