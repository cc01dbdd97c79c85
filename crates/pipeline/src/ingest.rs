//! The central write path.
//!
//! Per batch: validate → hash → dedup filter → canonicalize → resolve or
//! create templates → embed the never-seen templates → persist events →
//! bump counters. Steps run serially within a batch; independent batches
//! run concurrently and converge through the stores' unique constraints.
//!
//! Failure policy (soft unless noted):
//! - duplicate event: dropped silently, counted
//! - per-record validation / canonicalization failure: that record fails,
//!   the batch proceeds
//! - template resolution failure: event persists with a null `template_id`
//! - embedding backend unavailable: template persists unembedded
//! - event-store failure: hard, the whole batch fails and the shipper retries

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use canonical::{canonicalize, log_hash, template_hash, CanonicalizeConfig};
use embed::Embedder;
use serde::Serialize;
use store::{EventStore, NewEvent, NewTemplate, TemplateStore};

use crate::record::{IngestRecord, RecordError, ValidationConfig};
use crate::stats::PipelineStats;
use crate::PipelineError;

/// Static configuration of the write path.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub canon: CanonicalizeConfig,
    /// Chunking generation recorded on templates (single-chunk for logs).
    pub chunk_version: u32,
    pub validation: ValidationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canon: CanonicalizeConfig::default(),
            chunk_version: 1,
            validation: ValidationConfig::default(),
        }
    }
}

/// What one shipper submission produced.
#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub accepted: u64,
    pub duplicates: u64,
    pub errors: Vec<RecordError>,
}

pub struct IngestPipeline {
    cfg: PipelineConfig,
    event_store: Arc<EventStore>,
    template_store: Arc<TemplateStore>,
    embedder: Arc<dyn Embedder>,
    stats: Arc<PipelineStats>,
}

struct TemplateGroup {
    canonical_text: String,
    service: String,
    level: store::LogLevel,
    first_seen: DateTime<Utc>,
}

impl IngestPipeline {
    pub fn new(
        cfg: PipelineConfig,
        event_store: Arc<EventStore>,
        template_store: Arc<TemplateStore>,
        embedder: Arc<dyn Embedder>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            cfg,
            event_store,
            template_store,
            embedder,
            stats,
        }
    }

    pub fn canon_config(&self) -> CanonicalizeConfig {
        self.cfg.canon
    }

    /// Ingest one batch of candidate events. Replaying the same batch any
    /// number of times yields the same store contents as one submission.
    pub async fn ingest_batch(
        &self,
        records: Vec<IngestRecord>,
    ) -> Result<IngestReport, PipelineError> {
        let mut report = IngestReport::default();
        if records.is_empty() {
            return Ok(report);
        }

        // Validate and fingerprint. Index pairs survive so per-record
        // failures can point back into the submitted batch.
        let now = Utc::now();
        let mut working: Vec<(usize, NewEvent)> = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            match record.validate(&self.cfg.validation, now) {
                Ok(mut event) => {
                    event.log_hash = log_hash(
                        event.timestamp.timestamp_micros(),
                        &event.service,
                        &event.host,
                        &event.message,
                    );
                    working.push((index, event));
                }
                Err(reason) => report.errors.push(RecordError { index, reason }),
            }
        }

        // Dedup filter against the store. In-batch duplicates fall out of
        // the insert itself later.
        let hashes: Vec<String> = working.iter().map(|(_, e)| e.log_hash.clone()).collect();
        let existing = self.event_store.existing_hashes(&hashes)?;
        let before = working.len();
        working.retain(|(_, e)| !existing.contains(&e.log_hash));
        report.duplicates += (before - working.len()) as u64;

        // Canonicalize survivors and group them by template fingerprint.
        let mut groups: HashMap<String, TemplateGroup> = HashMap::new();
        let mut keyed: Vec<(NewEvent, Option<String>)> = Vec::with_capacity(working.len());
        for (index, event) in working {
            match canonicalize(&event.message, &self.cfg.canon) {
                Ok(text) => {
                    let hash = template_hash(
                        &event.service,
                        event.level.as_str(),
                        self.cfg.canon.version,
                        &text,
                    );
                    groups.entry(hash.clone()).or_insert_with(|| TemplateGroup {
                        canonical_text: text,
                        service: event.service.clone(),
                        level: event.level,
                        first_seen: event.timestamp,
                    });
                    keyed.push((event, Some(hash)));
                }
                Err(err) => {
                    report.errors.push(RecordError {
                        index,
                        reason: format!("canonicalization failed: {err}"),
                    });
                }
            }
        }

        // Resolve or create each template group. A template-store hiccup
        // leaves the group's events with a null template_id for the safety
        // net; it does not fail the batch.
        let mut resolved: HashMap<String, u64> = HashMap::with_capacity(groups.len());
        let mut pending_embed: Vec<(u64, String)> = Vec::new();
        for (hash, group) in groups {
            match self.resolve_template(&hash, group) {
                Ok((id, created_text)) => {
                    resolved.insert(hash, id);
                    if let Some(text) = created_text {
                        pending_embed.push((id, text));
                    }
                }
                Err(err) => {
                    tracing::warn!(template_hash = %hash, error = %err,
                        "template resolution failed; events continue unlinked");
                }
            }
        }
        self.stats.record_templates_created(pending_embed.len() as u64);

        // Embed the never-seen templates. Unavailability degrades to
        // null-embedding rows.
        if !pending_embed.is_empty() {
            self.embed_pending(&pending_embed).await;
        }

        // Persist events with their resolved template ids.
        let events: Vec<NewEvent> = keyed
            .into_iter()
            .map(|(mut event, hash)| {
                event.template_id = hash.and_then(|h| resolved.get(&h).copied());
                event
            })
            .collect();
        let outcome = self.event_store.insert_batch(events)?;
        report.duplicates += outcome.duplicates as u64;
        report.accepted = outcome.accepted.len() as u64;

        // Counter update, driven by the successful inserts so replays can
        // never double-count.
        let mut bumps: HashMap<u64, (u64, DateTime<Utc>, DateTime<Utc>)> = HashMap::new();
        for event in &outcome.accepted {
            if let Some(tid) = event.template_id {
                let entry = bumps
                    .entry(tid)
                    .or_insert((0, event.timestamp, event.timestamp));
                entry.0 += 1;
                entry.1 = entry.1.min(event.timestamp);
                entry.2 = entry.2.max(event.timestamp);
            }
        }
        for (tid, (count, seen_min, seen_max)) in bumps {
            if let Err(err) = self.template_store.bump_counters(tid, count, seen_min, seen_max) {
                tracing::warn!(template_id = tid, error = %err, "counter bump failed");
            }
        }

        self.stats.record_ingest(
            report.accepted,
            report.duplicates,
            report.errors.len() as u64,
        );
        Ok(report)
    }

    /// Cache → durable lookup → insert-or-fetch. Returns the id plus the
    /// canonical text when this call created the row (it then needs an
    /// embedding).
    fn resolve_template(
        &self,
        hash: &str,
        group: TemplateGroup,
    ) -> Result<(u64, Option<String>), store::StoreError> {
        if let Some(id) = self.template_store.lookup(hash)? {
            return Ok((id, None));
        }
        let text = group.canonical_text.clone();
        let (id, created) = self.template_store.create_if_absent(NewTemplate {
            template_hash: hash.to_string(),
            canonical_text: group.canonical_text,
            service: group.service,
            level: group.level,
            canon_version: self.cfg.canon.version,
            chunk_version: self.cfg.chunk_version,
            first_seen: group.first_seen,
        })?;
        Ok((id, created.then_some(text)))
    }

    async fn embed_pending(&self, pending: &[(u64, String)]) {
        let texts: Vec<String> = pending.iter().map(|(_, t)| t.clone()).collect();
        match self.embedder.embed_batch(&texts).await {
            Ok(vectors) => {
                let mut attached = 0u64;
                for ((id, _), vector) in pending.iter().zip(vectors) {
                    match self.template_store.attach_embedding(
                        *id,
                        vector,
                        self.embedder.model(),
                        self.embedder.dim(),
                    ) {
                        Ok(()) => attached += 1,
                        Err(err) => {
                            tracing::warn!(template_id = *id, error = %err,
                                "failed to attach embedding");
                        }
                    }
                }
                self.stats.record_embeddings_attached(attached);
            }
            Err(err) => {
                tracing::warn!(error = %err,
                    "embedding backend unavailable; templates left for the safety net");
            }
        }
    }
}
