use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

use pipeline::IngestRecord;

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;

/// `POST /ingest/logs` — one shipper submission: a JSON array of event
/// records. Responds with accepted/duplicate counts and per-record errors.
///
/// Back-pressure: when all ingest permits are in flight the endpoint
/// answers 503 `busy` without reading the pipeline; shippers hold a durable
/// cursor and retry, so nothing is lost.
pub async fn ingest_logs(
    State(state): State<Arc<ServerState>>,
    Json(records): Json<Vec<IngestRecord>>,
) -> ServerResult<impl IntoResponse> {
    let _permit = state
        .ingest_gate
        .clone()
        .try_acquire_owned()
        .map_err(|_| ServerError::Busy)?;

    let report = state.pipeline.ingest_batch(records).await?;
    Ok(Json(report))
}
