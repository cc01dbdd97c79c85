//! DevMesh Pipeline Layer
//!
//! The write path and the read paths over the stores:
//!
//! - [`IngestPipeline`] — the central write path: validate → hash → dedup →
//!   canonicalize → resolve/create templates → embed new templates →
//!   persist events → bump counters, per shipper batch.
//! - [`SearchLayer`] — two-step semantic retrieval (template vector search,
//!   then event sampling per template), the legacy event-level semantic
//!   surface, and plain relational queries.
//! - [`SafetyNet`] — idempotent, cursor-resumable backfill of missing
//!   `template_id`s and missing embeddings, plus the TTL retention sweep.
//!
//! Embedding unavailability is a soft failure everywhere: events and
//! templates persist without vectors and the safety net closes the gap.

mod backfill;
mod ingest;
mod record;
mod search;
mod stats;

pub use crate::backfill::{RetentionReport, SafetyNet, SafetyNetConfig};
pub use crate::ingest::{IngestPipeline, IngestReport, PipelineConfig};
pub use crate::record::{IngestRecord, RecordError, ValidationConfig};
pub use crate::search::{
    EventHit, SearchFilter, SearchLayer, TemplateHit, TemplateSearchResults, TemplateSummary,
};
pub use crate::stats::{PipelineStats, PipelineStatsSnapshot};

use thiserror::Error;

/// Hard failures on the pipeline paths. Soft failures (duplicates,
/// per-record validation, embedding unavailability) are absorbed into
/// reports and counters instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The durable store failed: the whole batch fails and the caller
    /// retries.
    #[error("storage unavailable: {0}")]
    Storage(#[from] store::StoreError),

    /// Canonicalizer misconfiguration (bad version). Per-message
    /// canonicalization bugs are per-record soft failures, not this.
    #[error("canonicalizer error: {0}")]
    Canonical(#[from] canonical::CanonicalError),

    /// Embedding failure on a path where it cannot be absorbed (the search
    /// layer reports degradation instead of surfacing this).
    #[error("embedding error: {0}")]
    Embed(#[from] embed::EmbedError),
}
