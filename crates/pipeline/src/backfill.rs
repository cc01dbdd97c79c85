//! The safety net: idempotent, cursor-resumable backfill workers plus the
//! retention sweep.
//!
//! Both backfill jobs walk by *id cursor* ("last id processed") rather than
//! filtering on NULL columns, because the NULL-predicate plan degrades as
//! the NULL fraction shrinks. Races with live ingest resolve through the
//! stores' insert-or-fetch and write-once semantics: when another writer
//! already filled a slot, the worker's attempt is a no-op.

use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};

use canonical::{canonicalize, template_hash, CanonicalizeConfig};
use embed::Embedder;
use serde::Serialize;
use store::{Event, EventStore, NewTemplate, TemplateStore};

use crate::stats::PipelineStats;
use crate::PipelineError;

#[derive(Debug, Clone)]
pub struct SafetyNetConfig {
    pub canon: CanonicalizeConfig,
    pub chunk_version: u32,
    /// Rows examined per scan step.
    pub batch_size: usize,
    /// Pause between scan steps within one pass.
    pub inter_batch_delay_ms: u64,
    /// Retention horizon for events and unreferenced templates.
    pub retention_max_age_secs: u64,
}

impl Default for SafetyNetConfig {
    fn default() -> Self {
        Self {
            canon: CanonicalizeConfig::default(),
            chunk_version: 1,
            batch_size: 500,
            inter_batch_delay_ms: 0,
            retention_max_age_secs: 90 * 24 * 60 * 60,
        }
    }
}

/// What one retention sweep removed.
#[derive(Debug, Default, Serialize)]
pub struct RetentionReport {
    pub events_removed: usize,
    pub templates_removed: usize,
}

pub struct SafetyNet {
    cfg: SafetyNetConfig,
    event_store: Arc<EventStore>,
    template_store: Arc<TemplateStore>,
    embedder: Arc<dyn Embedder>,
    stats: Arc<PipelineStats>,
    template_cursor: Mutex<u64>,
    embed_cursor: Mutex<u64>,
}

impl SafetyNet {
    pub fn new(
        cfg: SafetyNetConfig,
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
            template_cursor: Mutex::new(0),
            embed_cursor: Mutex::new(0),
        }
    }

    /// One full template-backfill pass: walk events from the current cursor
    /// to the end, assigning templates to events the live path left
    /// unlinked. Returns how many events were linked.
    pub async fn template_backfill_pass(&self) -> Result<usize, PipelineError> {
        let mut linked = 0usize;
        loop {
            let cursor = self.load_cursor(&self.template_cursor);
            let (missing, new_cursor) = self
                .event_store
                .scan_missing_template(cursor, self.cfg.batch_size)?;
            if new_cursor == cursor {
                // End of the table: the next pass starts over.
                self.store_cursor(&self.template_cursor, 0);
                break;
            }

            for event in missing {
                if self.assign_template(&event)? {
                    linked += 1;
                }
            }

            self.store_cursor(&self.template_cursor, new_cursor);
            self.pause().await;
        }

        if linked > 0 {
            tracing::info!(linked, "template backfill pass linked events");
        }
        Ok(linked)
    }

    /// One full embedding-backfill pass: walk templates from the current
    /// cursor, embedding those with no vector or a stale model. Returns how
    /// many embeddings were attached. An unavailable backend ends the pass
    /// early; the next pass resumes from the cursor.
    pub async fn embedding_backfill_pass(&self) -> Result<usize, PipelineError> {
        let mut attached = 0usize;
        loop {
            let cursor = self.load_cursor(&self.embed_cursor);
            let (pending, new_cursor) = self.template_store.scan_unembedded(
                cursor,
                self.cfg.batch_size,
                self.embedder.model(),
            )?;
            if new_cursor == cursor {
                self.store_cursor(&self.embed_cursor, 0);
                break;
            }

            if !pending.is_empty() {
                let texts: Vec<String> =
                    pending.iter().map(|t| t.canonical_text.clone()).collect();
                match self.embedder.embed_batch(&texts).await {
                    Ok(vectors) => {
                        for (template, vector) in pending.iter().zip(vectors) {
                            match self.template_store.attach_embedding(
                                template.id,
                                vector,
                                self.embedder.model(),
                                self.embedder.dim(),
                            ) {
                                Ok(()) => attached += 1,
                                Err(err) => {
                                    tracing::warn!(template_id = template.id, error = %err,
                                        "embedding backfill attach failed");
                                }
                            }
                        }
                    }
                    Err(err) => {
                        // Skip and move on; this pass ends, the next retries.
                        tracing::warn!(error = %err,
                            "embedding backend unavailable during backfill");
                        self.store_cursor(&self.embed_cursor, new_cursor);
                        break;
                    }
                }
            }

            self.store_cursor(&self.embed_cursor, new_cursor);
            self.pause().await;
        }

        if attached > 0 {
            self.stats.record_embeddings_attached(attached as u64);
            self.template_store.rebuild_ann()?;
            tracing::info!(attached, "embedding backfill pass attached vectors");
        }
        Ok(attached)
    }

    /// Remove events beyond the retention horizon, then templates that no
    /// remaining event references. Referenced templates are never deleted.
    pub fn run_retention(&self) -> Result<RetentionReport, PipelineError> {
        let cutoff = Utc::now() - Duration::seconds(self.cfg.retention_max_age_secs as i64);

        let events_removed = self.event_store.delete_older_than(cutoff)?;
        let referenced = self.event_store.referenced_template_ids()?;
        let templates_removed = self.template_store.delete_unreferenced(cutoff, &referenced)?;

        if events_removed > 0 || templates_removed > 0 {
            tracing::info!(events_removed, templates_removed, "retention sweep complete");
        }
        Ok(RetentionReport {
            events_removed,
            templates_removed,
        })
    }

    /// Canonicalize one event and link it to its (possibly new) template.
    /// Returns whether this call did the linking; a concurrent writer
    /// having filled the slot first makes this a no-op.
    fn assign_template(&self, event: &Event) -> Result<bool, PipelineError> {
        let text = match canonicalize(&event.message, &self.cfg.canon) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(event_id = event.id, error = %err,
                    "canonicalization failed during backfill");
                return Ok(false);
            }
        };
        let hash = template_hash(
            &event.service,
            event.level.as_str(),
            self.cfg.canon.version,
            &text,
        );

        let template_id = match self.template_store.lookup(&hash)? {
            Some(id) => id,
            None => {
                let (id, created) = self.template_store.create_if_absent(NewTemplate {
                    template_hash: hash,
                    canonical_text: text,
                    service: event.service.clone(),
                    level: event.level,
                    canon_version: self.cfg.canon.version,
                    chunk_version: self.cfg.chunk_version,
                    first_seen: event.timestamp,
                })?;
                if created {
                    self.stats.record_templates_created(1);
                }
                id
            }
        };

        let changed = self.event_store.set_template_id(event.id, template_id)?;
        if changed {
            self.template_store.bump_counters(
                template_id,
                1,
                event.timestamp,
                event.timestamp,
            )?;
        }
        Ok(changed)
    }

    fn load_cursor(&self, cursor: &Mutex<u64>) -> u64 {
        cursor.lock().map(|c| *c).unwrap_or(0)
    }

    fn store_cursor(&self, cursor: &Mutex<u64>, value: u64) {
        if let Ok(mut guard) = cursor.lock() {
            *guard = value;
        }
    }

    async fn pause(&self) {
        if self.cfg.inter_batch_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.cfg.inter_batch_delay_ms))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IngestPipeline, IngestRecord, PipelineConfig, PipelineStats};
    use chrono::TimeZone;
    use embed::{EmbedError, StubEmbedder};
    use store::{BackendConfig, TemplateStoreConfig};

    const DIM: usize = 16;

    struct DownEmbedder;

    #[async_trait::async_trait]
    impl Embedder for DownEmbedder {
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Err(EmbedError::Unavailable("refused".into()))
        }

        fn model(&self) -> &str {
            "stub"
        }

        fn dim(&self) -> usize {
            DIM
        }
    }

    fn stores() -> (Arc<EventStore>, Arc<TemplateStore>) {
        (
            Arc::new(EventStore::new(BackendConfig::in_memory().build().unwrap())),
            Arc::new(TemplateStore::new(
                BackendConfig::in_memory().build().unwrap(),
                TemplateStoreConfig {
                    dim: DIM,
                    ..Default::default()
                },
            )),
        )
    }

    fn record(message: &str, micros: i64) -> IngestRecord {
        IngestRecord {
            timestamp: Utc.timestamp_micros(micros).unwrap(),
            source: "journal".into(),
            service: "s".into(),
            host: "h".into(),
            level: "INFO".into(),
            message: message.into(),
            trace_id: None,
            span_id: None,
            event_type: None,
            error_code: None,
            meta: serde_json::Map::new(),
        }
    }

    fn safety_net(
        events: Arc<EventStore>,
        templates: Arc<TemplateStore>,
        embedder: Arc<dyn Embedder>,
    ) -> SafetyNet {
        SafetyNet::new(
            SafetyNetConfig {
                batch_size: 2,
                ..Default::default()
            },
            events,
            templates,
            embedder,
            Arc::new(PipelineStats::default()),
        )
    }

    #[tokio::test]
    async fn embedding_backfill_closes_the_gap_without_touching_events() {
        let (events, templates) = stores();

        // Live ingest with the backend down.
        let live = IngestPipeline::new(
            PipelineConfig::default(),
            events.clone(),
            templates.clone(),
            Arc::new(DownEmbedder),
            Arc::new(PipelineStats::default()),
        );
        live.ingest_batch(vec![record("fresh fingerprint", 1)])
            .await
            .unwrap();

        let template = templates.all().unwrap().pop().unwrap();
        assert!(!template.has_embedding());
        let event_before = events.get(1).unwrap().unwrap();

        // Backend comes back; the safety net completes the template.
        let net = safety_net(
            events.clone(),
            templates.clone(),
            Arc::new(StubEmbedder::new("stub".into(), DIM)),
        );
        let attached = net.embedding_backfill_pass().await.unwrap();
        assert_eq!(attached, 1);

        let template = templates.all().unwrap().pop().unwrap();
        assert!(template.has_embedding());
        assert_eq!(template.embedding_dim, Some(DIM));

        // No event row changed.
        let event_after = events.get(1).unwrap().unwrap();
        assert_eq!(event_after.template_id, event_before.template_id);
        assert_eq!(event_after.message, event_before.message);
    }

    #[tokio::test]
    async fn embedding_backfill_skips_when_backend_down() {
        let (events, templates) = stores();
        templates
            .create_if_absent(NewTemplate {
                template_hash: "t1".into(),
                canonical_text: "orphan".into(),
                service: "s".into(),
                level: store::LogLevel::Info,
                canon_version: 1,
                chunk_version: 1,
                first_seen: Utc.timestamp_micros(1).unwrap(),
            })
            .unwrap();

        let net = safety_net(events, templates.clone(), Arc::new(DownEmbedder));
        let attached = net.embedding_backfill_pass().await.unwrap();
        assert_eq!(attached, 0);
        assert!(!templates.all().unwrap()[0].has_embedding());
    }

    #[tokio::test]
    async fn template_backfill_links_orphaned_events() {
        let (events, templates) = stores();

        // Simulate a live path that failed template resolution: events with
        // no template_id.
        let mut batch = Vec::new();
        for i in 0..5i64 {
            let r = record(&format!("pid={i} orphan event"), i);
            let mut e = r
                .validate(&crate::ValidationConfig::default(), Utc::now())
                .unwrap();
            e.log_hash = canonical::log_hash(i, "s", "h", &e.message);
            batch.push(e);
        }
        events.insert_batch(batch).unwrap();

        let net = safety_net(
            events.clone(),
            templates.clone(),
            Arc::new(StubEmbedder::new("stub".into(), DIM)),
        );
        let linked = net.template_backfill_pass().await.unwrap();
        assert_eq!(linked, 5);

        // All events share one template; counters reflect the linked events.
        assert_eq!(templates.len(), 1);
        let template = templates.all().unwrap().pop().unwrap();
        assert_eq!(template.canonical_text, "pid=<PID> orphan event");
        assert_eq!(template.event_count, 5);

        let (still_missing, _) = events.scan_missing_template(0, 100).unwrap();
        assert!(still_missing.is_empty());

        // A second pass is a no-op.
        let linked_again = net.template_backfill_pass().await.unwrap();
        assert_eq!(linked_again, 0);
        let template = templates.all().unwrap().pop().unwrap();
        assert_eq!(template.event_count, 5);
    }

    #[tokio::test]
    async fn retention_removes_events_then_unreferenced_templates() {
        let (events, templates) = stores();
        let live = IngestPipeline::new(
            PipelineConfig::default(),
            events.clone(),
            templates.clone(),
            Arc::new(StubEmbedder::new("stub".into(), DIM)),
            Arc::new(PipelineStats::default()),
        );

        // Old events (timestamps near the epoch, far beyond any horizon).
        let mut batch = Vec::new();
        for i in 0..10i64 {
            batch.push(record(&format!("old event kind {}", i % 5), i));
        }
        live.ingest_batch(batch).await.unwrap();
        assert_eq!(events.len(), 10);
        assert_eq!(templates.len(), 5);

        let net = SafetyNet::new(
            SafetyNetConfig {
                retention_max_age_secs: 1,
                ..Default::default()
            },
            events.clone(),
            templates.clone(),
            Arc::new(StubEmbedder::new("stub".into(), DIM)),
            Arc::new(PipelineStats::default()),
        );
        let report = net.run_retention().unwrap();
        assert_eq!(report.events_removed, 10);
        assert_eq!(report.templates_removed, 5);
        assert!(events.is_empty());
        assert!(templates.is_empty());
    }

    #[tokio::test]
    async fn retention_never_deletes_referenced_templates() {
        let (events, templates) = stores();
        let live = IngestPipeline::new(
            PipelineConfig::default(),
            events.clone(),
            templates.clone(),
            Arc::new(StubEmbedder::new("stub".into(), DIM)),
            Arc::new(PipelineStats::default()),
        );

        // One ancient event and one recent event of the same shape.
        let old = record("shared shape 7777", 1);
        let mut recent = record("shared shape 8888", 1);
        recent.timestamp = Utc::now();
        live.ingest_batch(vec![old, recent]).await.unwrap();
        assert_eq!(templates.len(), 1);

        let net = SafetyNet::new(
            SafetyNetConfig {
                retention_max_age_secs: 3600,
                ..Default::default()
            },
            events.clone(),
            templates.clone(),
            Arc::new(StubEmbedder::new("stub".into(), DIM)),
            Arc::new(PipelineStats::default()),
        );
        let report = net.run_retention().unwrap();
        assert_eq!(report.events_removed, 1);
        assert_eq!(report.templates_removed, 0);
        assert_eq!(templates.len(), 1);
    }
}
