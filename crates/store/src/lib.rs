//! DevMesh Store Layer
//!
//! Durable-ish storage for the two halves of the log memory:
//!
//! - [`EventStore`] — append-only raw events with a unique `log_hash` dedup
//!   constraint, timestamp/service/host/level/template secondary indexes,
//!   and TTL deletion.
//! - [`TemplateStore`] — the deduplicated template universe with a unique
//!   `template_hash` constraint, a bounded LRU hash→id cache fronting the
//!   durable rows, monotone counters, and a cosine ANN index over the
//!   attached embeddings.
//!
//! Rows are bincode-encoded (optionally zstd-compressed) and live behind
//! the pluggable [`StoreBackend`] key-value seam; the in-memory backend is
//! the default and anything with ordered scans and atomic batch writes can
//! replace it. Uniqueness and insert-or-fetch race resolution happen in the
//! store structs, under one writer lock per store, so callers never see a
//! half-created row.

pub mod ann;
mod backend;
mod codec;
mod error;
mod event;
mod model;
mod template;

pub use crate::ann::{AnnConfig, AnnResult};
pub use crate::backend::{BackendConfig, InMemoryBackend, StoreBackend};
pub use crate::codec::{CompressionCodec, CompressionConfig};
pub use crate::error::StoreError;
pub use crate::event::{EventFilter, EventStore, InsertOutcome};
pub use crate::model::{Event, LogLevel, NewEvent, NewTemplate, Template};
pub use crate::template::{TemplateFilter, TemplateStore, TemplateStoreConfig};
