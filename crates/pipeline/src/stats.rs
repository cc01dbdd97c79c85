//! Process-wide pipeline counters, surfaced on the `/info` endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    accepted: AtomicU64,
    duplicates: AtomicU64,
    record_errors: AtomicU64,
    templates_created: AtomicU64,
    embeddings_attached: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct PipelineStatsSnapshot {
    pub accepted: u64,
    pub duplicates: u64,
    pub record_errors: u64,
    pub templates_created: u64,
    pub embeddings_attached: u64,
}

impl PipelineStats {
    pub fn record_ingest(&self, accepted: u64, duplicates: u64, errors: u64) {
        self.accepted.fetch_add(accepted, Ordering::Relaxed);
        self.duplicates.fetch_add(duplicates, Ordering::Relaxed);
        self.record_errors.fetch_add(errors, Ordering::Relaxed);
    }

    pub fn record_templates_created(&self, count: u64) {
        self.templates_created.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_embeddings_attached(&self, count: u64) {
        self.embeddings_attached.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            record_errors: self.record_errors.load(Ordering::Relaxed),
            templates_created: self.templates_created.load(Ordering::Relaxed),
            embeddings_attached: self.embeddings_attached.load(Ordering::Relaxed),
        }
    }
}
