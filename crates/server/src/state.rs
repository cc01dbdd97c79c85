use std::sync::Arc;
use tokio::sync::Semaphore;

use embed::build_embedder;
use pipeline::{
    IngestPipeline, PipelineStats, SafetyNet, SafetyNetConfig, SearchLayer,
};
use store::{BackendConfig, EventStore, TemplateStore, TemplateStoreConfig};

use crate::config::{CoreOptions, ServerConfig};
use crate::error::ServerResult;

/// Shared application state: the long-lived process-wide pieces (stores,
/// template cache, embedding client, configuration) created at startup and
/// torn down on shutdown.
pub struct ServerState {
    pub config: Arc<ServerConfig>,
    pub event_store: Arc<EventStore>,
    pub template_store: Arc<TemplateStore>,
    pub pipeline: Arc<IngestPipeline>,
    pub search: Arc<SearchLayer>,
    pub safety_net: Arc<SafetyNet>,
    pub stats: Arc<PipelineStats>,
    /// Back-pressure gate for the ingest endpoint; exhausted permits mean
    /// `busy`.
    pub ingest_gate: Arc<Semaphore>,
}

impl ServerState {
    /// Assemble the full core from configuration.
    pub fn new(config: ServerConfig, core: CoreOptions) -> ServerResult<Self> {
        let event_store = Arc::new(EventStore::new(BackendConfig::in_memory().build()?));
        let template_store = Arc::new(TemplateStore::new(
            BackendConfig::in_memory().build()?,
            TemplateStoreConfig {
                cache_capacity: core.template_cache_capacity,
                dim: core.embedder.dim,
                ..Default::default()
            },
        ));

        let embedder = build_embedder(&core.embedder)?;
        let stats = Arc::new(PipelineStats::default());

        let pipeline = Arc::new(IngestPipeline::new(
            core.pipeline_config(),
            event_store.clone(),
            template_store.clone(),
            embedder.clone(),
            stats.clone(),
        ));
        let search = Arc::new(SearchLayer::new(
            event_store.clone(),
            template_store.clone(),
            embedder.clone(),
        ));
        let safety_net = Arc::new(SafetyNet::new(
            SafetyNetConfig {
                canon: core.canon,
                chunk_version: core.chunk_version,
                batch_size: core.backfill_batch_size,
                inter_batch_delay_ms: core.backfill_delay_ms,
                retention_max_age_secs: core.retention_max_age_secs,
            },
            event_store.clone(),
            template_store.clone(),
            embedder,
            stats.clone(),
        ));

        // Rehydrate indexes and warm the template cache before serving.
        event_store.rehydrate()?;
        template_store.rehydrate()?;
        if core.warm_cache > 0 {
            let warmed = template_store.warm_cache(core.warm_cache)?;
            if warmed > 0 {
                tracing::info!(warmed, "template cache warmed");
            }
        }

        let ingest_gate = Arc::new(Semaphore::new(config.ingest_queue_depth.max(1)));
        Ok(Self {
            config: Arc::new(config),
            event_store,
            template_store,
            pipeline,
            search,
            safety_net,
            stats,
            ingest_gate,
        })
    }

    /// Check the shared secret. With no secret configured, everything
    /// passes.
    pub fn is_authorized(&self, presented: Option<&str>) -> bool {
        match self.config.shared_secret.as_deref() {
            None => true,
            Some(secret) => presented == Some(secret),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state(secret: Option<&str>) -> ServerState {
        let config = ServerConfig {
            shared_secret: secret.map(|s| s.to_string()),
            ..Default::default()
        };
        ServerState::new(config, CoreOptions::default()).expect("state builds")
    }

    #[test]
    fn unauthenticated_when_no_secret() {
        let state = test_state(None);
        assert!(state.is_authorized(None));
        assert!(state.is_authorized(Some("anything")));
    }

    #[test]
    fn secret_must_match_exactly() {
        let state = test_state(Some("hunter2"));
        assert!(state.is_authorized(Some("hunter2")));
        assert!(!state.is_authorized(Some("HUNTER2")));
        assert!(!state.is_authorized(None));
    }

    #[test]
    fn gate_has_configured_depth() {
        let state = test_state(None);
        assert_eq!(
            state.ingest_gate.available_permits(),
            state.config.ingest_queue_depth
        );
    }
}
