//! Workspace umbrella crate for DevMesh.
//!
//! DevMesh is an AI-native log memory for small self-hosted fleets: every
//! node's journal events are ingested, canonicalized into a much smaller
//! universe of templates, embedded, and made searchable in natural
//! language. The `devmesh` crate re-exports the canonical, embedding,
//! store, pipeline, and server layers so applications can drive the whole
//! system through a single dependency, and ships the `devmesh` server
//! binary.
//!
//! ## The pipeline
//!
//! ```text
//! shipper ──▶ /ingest/logs ──▶ validate ─▶ dedup ─▶ canonicalize
//!                                   │                   │
//!                                   ▼                   ▼
//!                              Event Store ◀─── Template Store ◀──▶ Embedder
//!                                   ▲                   ▲
//!                                   └── Search Layer ───┘
//! ```
//!
//! Raw events are kept losslessly for audit; only the deduplicated
//! canonical templates are embedded (observed compression in the reference
//! deployment is on the order of 150×). Duplicate submissions are dropped
//! by fingerprint, never errored, so shippers can replay freely.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use server::{CoreOptions, ServerConfig, ServerState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let state = Arc::new(ServerState::new(
//!         ServerConfig::default(),
//!         CoreOptions::default(),
//!     )?);
//!     server::start_server(state).await
//! }
//! ```
//!
//! Configuration is richer in practice: see [`config::DevMeshConfig`] for
//! the YAML file format covering every stage (canonicalization version,
//! embedding backend, cache sizing, backfill cadence, retention).

pub mod config;

pub use canonical::{canonicalize, log_hash, template_hash, CanonicalError, CanonicalizeConfig};
pub use embed::{build_embedder, EmbedError, Embedder, EmbedderConfig, HttpEmbedder, StubEmbedder};
pub use pipeline::{
    IngestPipeline, IngestRecord, IngestReport, PipelineConfig, PipelineError, PipelineStats,
    SafetyNet, SafetyNetConfig, SearchFilter, SearchLayer, ValidationConfig,
};
pub use server::{build_router, start_server, CoreOptions, ServerConfig, ServerState};
pub use store::{
    Event, EventFilter, EventStore, LogLevel, StoreError, Template, TemplateStore,
    TemplateStoreConfig,
};
