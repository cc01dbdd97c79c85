//! Two-step semantic retrieval and plain relational queries.
//!
//! The primary surface is template search: embed the query, vector-search
//! the template universe, then sample representative events per hit. The
//! legacy event-level surface is implemented over the same two steps and
//! flattens the samples. When the embedding backend is unreachable, both
//! semantic surfaces return empty results flagged `degraded` instead of
//! erroring.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use embed::Embedder;
use store::{Event, EventFilter, EventStore, LogLevel, Template, TemplateFilter, TemplateStore};

use crate::PipelineError;

/// Upper bounds and defaults for the semantic surfaces.
const MAX_TEMPLATES: usize = 100;
const MAX_EXAMPLES: usize = 10;
pub const DEFAULT_TEMPLATES: usize = 20;
pub const DEFAULT_EXAMPLES: usize = 3;

/// Filters shared by the search surfaces.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub service: Option<String>,
    pub level: Option<LogLevel>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// A template as the search surface exposes it: everything except the
/// embedding vector, which is backend-internal and large.
#[derive(Debug, Serialize)]
pub struct TemplateSummary {
    pub id: u64,
    pub template_hash: String,
    pub canonical_text: String,
    pub service: String,
    pub level: LogLevel,
    pub canon_version: u32,
    pub event_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub embedding_model: Option<String>,
}

impl From<Template> for TemplateSummary {
    fn from(t: Template) -> Self {
        Self {
            id: t.id,
            template_hash: t.template_hash,
            canonical_text: t.canonical_text,
            service: t.service,
            level: t.level,
            canon_version: t.canon_version,
            event_count: t.event_count,
            first_seen: t.first_seen,
            last_seen: t.last_seen,
            embedding_model: t.embedding_model,
        }
    }
}

/// One ranked template with its representative events.
#[derive(Debug, Serialize)]
pub struct TemplateHit {
    pub template: TemplateSummary,
    pub distance: f32,
    pub examples: Vec<Event>,
}

/// Ranked results plus the degradation marker.
#[derive(Debug, Serialize)]
pub struct TemplateSearchResults {
    pub hits: Vec<TemplateHit>,
    /// True when the embedding backend was unreachable and the result set
    /// is therefore empty rather than meaningful.
    pub degraded: bool,
}

/// One event on the legacy event-level surface.
#[derive(Debug, Serialize)]
pub struct EventHit {
    pub event: Event,
    pub distance: f32,
}

pub struct SearchLayer {
    event_store: Arc<EventStore>,
    template_store: Arc<TemplateStore>,
    embedder: Arc<dyn Embedder>,
}

impl SearchLayer {
    pub fn new(
        event_store: Arc<EventStore>,
        template_store: Arc<TemplateStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            event_store,
            template_store,
            embedder,
        }
    }

    /// The primary semantic surface: top-K templates by cosine distance,
    /// each with up to N example events inside the filter window.
    pub async fn search_templates(
        &self,
        query: &str,
        k: usize,
        n: usize,
        filter: &SearchFilter,
    ) -> Result<TemplateSearchResults, PipelineError> {
        let k = if k == 0 { DEFAULT_TEMPLATES } else { k.min(MAX_TEMPLATES) };
        let n = if n == 0 { DEFAULT_EXAMPLES } else { n.min(MAX_EXAMPLES) };

        let query_vector = match self.embedder.embed_one(query).await {
            Ok(vector) => vector,
            Err(err) if err.is_unavailable() => {
                tracing::warn!(error = %err, "semantic search degraded");
                return Ok(TemplateSearchResults {
                    hits: Vec::new(),
                    degraded: true,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let template_filter = TemplateFilter {
            service: filter.service.clone(),
            level: filter.level,
        };
        let ranked = self
            .template_store
            .vector_search(&query_vector, k, &template_filter)?;

        let ids: Vec<u64> = ranked.iter().map(|(t, _)| t.id).collect();
        let mut samples =
            self.event_store
                .sample_by_template(&ids, n, (filter.start, filter.end))?;

        let hits = ranked
            .into_iter()
            .map(|(template, distance)| {
                let examples = samples.remove(&template.id).unwrap_or_default();
                TemplateHit {
                    template: template.into(),
                    distance,
                    examples,
                }
            })
            .collect();

        Ok(TemplateSearchResults {
            hits,
            degraded: false,
        })
    }

    /// Legacy event-level semantic search, retained for compatibility:
    /// two-step under the hood, flattened to events.
    pub async fn search_events(
        &self,
        query: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<(Vec<EventHit>, bool), PipelineError> {
        let limit = if limit == 0 { DEFAULT_TEMPLATES } else { limit.min(MAX_TEMPLATES) };

        let results = self
            .search_templates(query, limit, DEFAULT_EXAMPLES, filter)
            .await?;
        if results.degraded {
            return Ok((Vec::new(), true));
        }

        let mut hits: Vec<EventHit> = Vec::with_capacity(limit);
        for hit in results.hits {
            for event in hit.examples {
                hits.push(EventHit {
                    event,
                    distance: hit.distance,
                });
                if hits.len() >= limit {
                    return Ok((hits, false));
                }
            }
        }
        Ok((hits, false))
    }

    /// Plain relational selection; bypasses the vector path entirely.
    pub fn query_logs(&self, filter: &EventFilter) -> Result<Vec<Event>, PipelineError> {
        Ok(self.event_store.query(filter)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IngestPipeline, IngestRecord, PipelineConfig, PipelineStats};
    use chrono::TimeZone;
    use embed::{EmbedError, StubEmbedder};
    use store::{BackendConfig, TemplateStoreConfig};

    const DIM: usize = 32;

    struct DownEmbedder;

    #[async_trait::async_trait]
    impl Embedder for DownEmbedder {
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Err(EmbedError::Unavailable("refused".into()))
        }

        fn model(&self) -> &str {
            "down"
        }

        fn dim(&self) -> usize {
            DIM
        }
    }

    fn record(service: &str, message: &str, micros: i64) -> IngestRecord {
        IngestRecord {
            timestamp: Utc.timestamp_micros(micros).unwrap(),
            source: "journal".into(),
            service: service.into(),
            host: "h".into(),
            level: "ERROR".into(),
            message: message.into(),
            trace_id: None,
            span_id: None,
            event_type: None,
            error_code: None,
            meta: serde_json::Map::new(),
        }
    }

    async fn seeded() -> (SearchLayer, Arc<EventStore>, Arc<TemplateStore>) {
        let events = Arc::new(EventStore::new(BackendConfig::in_memory().build().unwrap()));
        let templates = Arc::new(TemplateStore::new(
            BackendConfig::in_memory().build().unwrap(),
            TemplateStoreConfig {
                dim: DIM,
                ..Default::default()
            },
        ));
        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder::new("stub".into(), DIM));
        let pipeline = IngestPipeline::new(
            PipelineConfig::default(),
            events.clone(),
            templates.clone(),
            embedder.clone(),
            Arc::new(PipelineStats::default()),
        );

        let mut batch = Vec::new();
        for i in 0..10i64 {
            batch.push(record("web", &format!("connection refused from peer {i}{i}{i}{i}"), i));
            batch.push(record("web", &format!("request completed in {i}{i}ms"), 100 + i));
            batch.push(record("db", &format!("slow query took {i}.{i}s"), 200 + i));
        }
        pipeline.ingest_batch(batch).await.unwrap();

        (
            SearchLayer::new(events.clone(), templates.clone(), embedder),
            events,
            templates,
        )
    }

    #[tokio::test]
    async fn two_step_search_returns_ranked_templates_with_examples() {
        let (search, _, templates) = seeded().await;
        assert_eq!(templates.len(), 3);

        let results = search
            .search_templates("connection refused from peer <N>", 10, 2, &SearchFilter::default())
            .await
            .unwrap();
        assert!(!results.degraded);
        assert_eq!(results.hits.len(), 3);

        // Distances ascend.
        for pair in results.hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        // The stub embeds identical text identically, so the exact
        // canonical query is the closest hit.
        assert_eq!(
            results.hits[0].template.canonical_text,
            "connection refused from peer <N>"
        );
        assert!(results.hits[0].distance < 1e-5);
        // Up to two examples each, drawn from the right template.
        for hit in &results.hits {
            assert!(hit.examples.len() <= 2);
            for event in &hit.examples {
                assert_eq!(event.template_id, Some(hit.template.id));
            }
        }
    }

    #[tokio::test]
    async fn service_filter_restricts_hits() {
        let (search, _, _) = seeded().await;
        let results = search
            .search_templates(
                "slow query",
                10,
                1,
                &SearchFilter {
                    service: Some("db".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].template.service, "db");
    }

    #[tokio::test]
    async fn degraded_when_backend_down() {
        let (search, events, templates) = seeded().await;
        let degraded_search = SearchLayer::new(events, templates, Arc::new(DownEmbedder));

        let results = degraded_search
            .search_templates("anything", 5, 2, &SearchFilter::default())
            .await
            .unwrap();
        assert!(results.degraded);
        assert!(results.hits.is_empty());

        let (hits, degraded) = degraded_search
            .search_events("anything", 5, &SearchFilter::default())
            .await
            .unwrap();
        assert!(degraded);
        assert!(hits.is_empty());
        drop(search);
    }

    #[tokio::test]
    async fn legacy_event_search_flattens_samples() {
        let (search, _, _) = seeded().await;
        let (hits, degraded) = search
            .search_events("request completed", 4, &SearchFilter::default())
            .await
            .unwrap();
        assert!(!degraded);
        assert_eq!(hits.len(), 4);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[tokio::test]
    async fn query_logs_bypasses_vectors() {
        let (search, _, _) = seeded().await;
        let events = search
            .query_logs(&EventFilter {
                service: Some("db".into()),
                limit: 5,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.service == "db"));
    }
}
