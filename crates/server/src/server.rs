//! Server initialization and routing
//!
//! Router construction, the middleware stack, the background safety-net
//! and retention workers, and graceful shutdown handling.

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{log_requests, request_id, shared_secret_auth};
use crate::routes::{api_info, health, ingest, not_found, query, search};
use crate::state::ServerState;

/// Build the Axum router with all routes and middleware.
///
/// Routes are divided into:
/// - System routes: `/`, `/health`, `/info` (no auth)
/// - Data routes: ingest, query, and search (shared secret when configured)
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let system_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/info", get(health::info));

    let data_routes = Router::new()
        .route("/ingest/logs", post(ingest::ingest_logs))
        .route("/query/logs", get(query::query_logs))
        .route("/search/templates", get(search::search_templates))
        .route("/search/logs", get(search::search_logs))
        .layer(from_fn_with_state(state.clone(), shared_secret_auth));

    Router::new()
        .merge(system_routes)
        .merge(data_routes)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.config.max_body_size()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(state.config.timeout_secs),
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(from_fn(request_id))
        .layer(from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the DevMesh HTTP server and its background workers.
///
/// Blocks until SIGTERM or Ctrl+C. The safety-net and retention workers
/// run as detached tasks on their configured cadences; they die with the
/// process, which is safe because both are cursor-resumable.
pub async fn start_server(state: Arc<ServerState>) -> anyhow::Result<()> {
    spawn_workers(state.clone());

    let app = build_router(state.clone());
    let addr = state.config.socket_addr()?;

    tracing::info!(
        %addr,
        auth = state.config.shared_secret.is_some(),
        queue_depth = state.config.ingest_queue_depth,
        "starting devmesh server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Spawn the periodic safety-net and retention tasks.
fn spawn_workers(state: Arc<ServerState>) {
    let backfill_state = state.clone();
    let backfill_every = Duration::from_secs(state.config.backfill_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(backfill_every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = backfill_state.safety_net.template_backfill_pass().await {
                tracing::warn!(error = %err, "template backfill pass failed");
            }
            if let Err(err) = backfill_state.safety_net.embedding_backfill_pass().await {
                tracing::warn!(error = %err, "embedding backfill pass failed");
            }
        }
    });

    let retention_state = state.clone();
    let retention_every = Duration::from_secs(state.config.retention_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(retention_every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = retention_state.safety_net.run_retention() {
                tracing::warn!(error = %err, "retention sweep failed");
            }
        }
    });
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("received SIGTERM, shutting down..."),
    }
}
