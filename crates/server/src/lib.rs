//! DevMesh HTTP server.
//!
//! The external surface of the core pipeline:
//!
//! - `POST /ingest/logs` — batched event ingest with back-pressure
//! - `GET /query/logs` — plain relational queries
//! - `GET /search/templates` — the primary two-step semantic surface
//! - `GET /search/logs` — legacy event-level semantic search
//! - `GET /health`, `GET /info` — liveness and metadata, never authenticated
//!
//! Authentication is a shared secret header when configured, nothing when
//! not. Back-pressure is a bounded permit gate: a full pipeline answers
//! `busy` (503) and the shipper retries from its cursor, so nothing is
//! lost.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{CoreOptions, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
