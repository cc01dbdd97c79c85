//! The template store: unique canonical patterns with counters, an LRU
//! hash→id cache, and a cosine ANN index over attached embeddings.
//!
//! `create_if_absent` is the insert-or-fetch primitive the ingest pipeline
//! leans on: under concurrent first-sight of one `template_hash`, exactly
//! one row is created and every other caller observes it. Uniqueness is
//! enforced under the writer lock, so there is no window where two rows
//! share a hash.

use chrono::{DateTime, Utc};
use lru::LruCache;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Mutex, RwLock};

use crate::ann::{AnnConfig, AnnIndex};
use crate::backend::id_key;
use crate::codec::CompressionConfig;
use crate::model::{LogLevel, NewTemplate, Template};
use crate::{StoreBackend, StoreError};

/// Post-filters applied to vector search results.
#[derive(Debug, Clone, Default)]
pub struct TemplateFilter {
    pub service: Option<String>,
    pub level: Option<LogLevel>,
}

#[derive(Debug, Clone)]
pub struct TemplateStoreConfig {
    /// Bound on the in-memory hash→id cache. Entries never expire on time;
    /// they are only evicted by recency.
    pub cache_capacity: usize,
    /// Embedding dimension the ANN index is built for.
    pub dim: usize,
    pub ann: AnnConfig,
}

impl Default for TemplateStoreConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 100_000,
            dim: 4096,
            ann: AnnConfig::default(),
        }
    }
}

struct TemplateIndexes {
    next_id: u64,
    /// Unique constraint: template_hash -> id.
    by_hash: HashMap<String, u64>,
    /// id -> template_hash, for ordered cursor walks.
    by_id: BTreeMap<u64, String>,
}

impl Default for TemplateIndexes {
    fn default() -> Self {
        Self {
            // Ids start at 1 so a zero cursor ("nothing processed yet")
            // always precedes the first row.
            next_id: 1,
            by_hash: HashMap::new(),
            by_id: BTreeMap::new(),
        }
    }
}

pub struct TemplateStore {
    backend: Box<dyn StoreBackend>,
    codec: CompressionConfig,
    cfg: TemplateStoreConfig,
    indexes: RwLock<TemplateIndexes>,
    cache: Mutex<LruCache<String, u64>>,
    ann: RwLock<AnnIndex>,
}

impl TemplateStore {
    pub fn new(backend: Box<dyn StoreBackend>, cfg: TemplateStoreConfig) -> Self {
        let capacity =
            NonZeroUsize::new(cfg.cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        let ann = AnnIndex::new(cfg.dim, cfg.ann);
        Self {
            backend,
            codec: CompressionConfig::default(),
            cfg,
            indexes: RwLock::new(TemplateIndexes::default()),
            cache: Mutex::new(LruCache::new(capacity)),
            ann: RwLock::new(ann),
        }
    }

    /// Rebuild indexes and the ANN population from a full backend scan,
    /// then build the vector index. Called once at startup.
    pub fn rehydrate(&self) -> Result<usize, StoreError> {
        let mut count = 0usize;
        {
            let mut indexes = self.write_indexes()?;
            let mut ann = self.write_ann()?;
            self.backend.scan_from("", &mut |_key, value| {
                let template: Template = self.codec.decode(value)?;
                indexes.next_id = indexes.next_id.max(template.id + 1);
                indexes
                    .by_hash
                    .insert(template.template_hash.clone(), template.id);
                indexes
                    .by_id
                    .insert(template.id, template.template_hash.clone());
                if let Some(vector) = &template.embedding {
                    ann.upsert(template.id, vector.clone());
                }
                count += 1;
                Ok(true)
            })?;
            ann.build();
        }
        tracing::debug!(templates = count, "template store rehydrated");
        Ok(count)
    }

    /// Cache-then-durable lookup of a template id by hash.
    pub fn lookup(&self, template_hash: &str) -> Result<Option<u64>, StoreError> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(&id) = cache.get(template_hash) {
                return Ok(Some(id));
            }
        }
        let indexes = self.read_indexes()?;
        let found = indexes.by_hash.get(template_hash).copied();
        drop(indexes);
        if let Some(id) = found {
            if let Ok(mut cache) = self.cache.lock() {
                cache.put(template_hash.to_string(), id);
            }
        }
        Ok(found)
    }

    pub fn get(&self, id: u64) -> Result<Option<Template>, StoreError> {
        match self.backend.get(&id_key(id))? {
            Some(data) => Ok(Some(self.codec.decode(&data)?)),
            None => Ok(None),
        }
    }

    /// Atomic insert-or-fetch on `template_hash`. Returns the id and
    /// whether this call created the row. Losing a first-sight race means
    /// observing the winner's id, never an error.
    pub fn create_if_absent(&self, new: NewTemplate) -> Result<(u64, bool), StoreError> {
        let mut indexes = self.write_indexes()?;
        if let Some(&id) = indexes.by_hash.get(&new.template_hash) {
            return Ok((id, false));
        }

        let id = indexes.next_id;
        indexes.next_id += 1;
        let template = Template {
            id,
            template_hash: new.template_hash.clone(),
            canonical_text: new.canonical_text,
            service: new.service,
            level: new.level,
            embedding: None,
            embedding_model: None,
            embedding_dim: None,
            canon_version: new.canon_version,
            chunk_version: new.chunk_version,
            event_count: 0,
            first_seen: new.first_seen,
            last_seen: new.first_seen,
        };

        self.backend.put(&id_key(id), &self.codec.encode(&template)?)?;
        indexes.by_hash.insert(new.template_hash.clone(), id);
        indexes.by_id.insert(id, new.template_hash.clone());
        drop(indexes);

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(new.template_hash, id);
        }
        Ok((id, true))
    }

    /// Attach (or migrate) the embedding for a template. Idempotent when the
    /// same (model, dim) pair is already attached; a different pair is the
    /// versioned-migration path and overwrites.
    pub fn attach_embedding(
        &self,
        id: u64,
        vector: Vec<f32>,
        model: &str,
        dim: usize,
    ) -> Result<(), StoreError> {
        if vector.len() != dim {
            return Err(StoreError::DimensionMismatch {
                declared: dim,
                got: vector.len(),
            });
        }

        let _guard = self.write_indexes()?;
        let Some(mut template) = self.get(id)? else {
            return Err(StoreError::TemplateNotFound(id));
        };

        let already_attached = template.embedding.is_some()
            && template.embedding_model.as_deref() == Some(model)
            && template.embedding_dim == Some(dim);
        if already_attached {
            return Ok(());
        }

        template.embedding = Some(vector.clone());
        template.embedding_model = Some(model.to_string());
        template.embedding_dim = Some(dim);
        self.backend.put(&id_key(id), &self.codec.encode(&template)?)?;

        if let Ok(mut ann) = self.ann.write() {
            ann.upsert(id, vector);
        }
        Ok(())
    }

    /// Fold `newly_accepted` events into the counters and widen the
    /// `[first_seen, last_seen]` interval. The interval only ever grows.
    pub fn bump_counters(
        &self,
        id: u64,
        newly_accepted: u64,
        seen_min: DateTime<Utc>,
        seen_max: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_indexes()?;
        let Some(mut template) = self.get(id)? else {
            return Err(StoreError::TemplateNotFound(id));
        };
        template.event_count += newly_accepted;
        template.first_seen = template.first_seen.min(seen_min);
        template.last_seen = template.last_seen.max(seen_max);
        self.backend.put(&id_key(id), &self.codec.encode(&template)?)?;
        Ok(())
    }

    /// Cosine search over embedded templates with service/level
    /// post-filters. Ties on distance break toward the more recently seen
    /// template, then the lower id.
    pub fn vector_search(
        &self,
        query: &[f32],
        limit: usize,
        filter: &TemplateFilter,
    ) -> Result<Vec<(Template, f32)>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        // Oversample before post-filtering so filtered-out neighbors don't
        // starve the result set.
        let oversample = limit.saturating_mul(4).max(limit);
        let candidates = {
            let ann = self
                .ann
                .read()
                .map_err(|_| StoreError::backend("poisoned ann lock"))?;
            ann.search(query, oversample)
        };

        let mut hits = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Some(template) = self.get(candidate.template_id)? else {
                continue;
            };
            if let Some(service) = &filter.service {
                if &template.service != service {
                    continue;
                }
            }
            if let Some(level) = filter.level {
                if template.level != level {
                    continue;
                }
            }
            hits.push((template, candidate.distance));
        }

        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.last_seen.cmp(&a.0.last_seen))
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Preload the cache with the `n` most recently updated templates.
    pub fn warm_cache(&self, n: usize) -> Result<usize, StoreError> {
        let mut templates = self.all()?;
        templates.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        templates.truncate(n);

        let mut warmed = 0usize;
        if let Ok(mut cache) = self.cache.lock() {
            // Insert oldest-first so the most recent end up most recently used.
            for template in templates.iter().rev() {
                cache.put(template.template_hash.clone(), template.id);
                warmed += 1;
            }
        }
        Ok(warmed)
    }

    /// Walk templates with `id > cursor` in id order, returning those whose
    /// embedding is missing or was produced by a different model, plus the
    /// new cursor. Same id-cursor rationale as the event-side scan: a NULL
    /// predicate degenerates as the NULL fraction shrinks.
    pub fn scan_unembedded(
        &self,
        cursor: u64,
        limit: usize,
        model: &str,
    ) -> Result<(Vec<Template>, u64), StoreError> {
        let indexes = self.read_indexes()?;
        let mut pending = Vec::new();
        let mut new_cursor = cursor;
        let mut visited = 0usize;

        for (&id, _hash) in indexes.by_id.range(cursor.saturating_add(1)..) {
            new_cursor = id;
            visited += 1;
            if let Some(template) = self.get(id)? {
                let stale = template.embedding.is_none()
                    || template.embedding_model.as_deref() != Some(model);
                if stale {
                    pending.push(template);
                }
            }
            if visited >= limit {
                break;
            }
        }
        Ok((pending, new_cursor))
    }

    /// Retention: remove templates not referenced by any live event whose
    /// `last_seen` is older than the cutoff. Referenced templates are never
    /// deleted.
    pub fn delete_unreferenced(
        &self,
        cutoff: DateTime<Utc>,
        referenced: &HashSet<u64>,
    ) -> Result<usize, StoreError> {
        let mut indexes = self.write_indexes()?;
        let candidates: Vec<(u64, String)> = indexes
            .by_id
            .iter()
            .map(|(&id, hash)| (id, hash.clone()))
            .collect();

        let mut removed = 0usize;
        for (id, hash) in candidates {
            if referenced.contains(&id) {
                continue;
            }
            let Some(template) = self.get(id)? else { continue };
            if template.last_seen >= cutoff {
                continue;
            }

            self.backend.delete(&id_key(id))?;
            indexes.by_hash.remove(&hash);
            indexes.by_id.remove(&id);
            if let Ok(mut cache) = self.cache.lock() {
                cache.pop(&hash);
            }
            if let Ok(mut ann) = self.ann.write() {
                ann.remove(id);
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// (Re)build the vector index over the currently embedded templates.
    pub fn rebuild_ann(&self) -> Result<(), StoreError> {
        let mut ann = self.write_ann()?;
        ann.build();
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<Template>, StoreError> {
        let indexes = self.read_indexes()?;
        let mut out = Vec::with_capacity(indexes.by_id.len());
        for &id in indexes.by_id.keys() {
            if let Some(template) = self.get(id)? {
                out.push(template);
            }
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.read_indexes().map(|i| i.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> usize {
        self.cfg.dim
    }

    fn read_indexes(&self) -> Result<std::sync::RwLockReadGuard<'_, TemplateIndexes>, StoreError> {
        self.indexes
            .read()
            .map_err(|_| StoreError::backend("poisoned template index lock"))
    }

    fn write_indexes(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, TemplateIndexes>, StoreError> {
        self.indexes
            .write()
            .map_err(|_| StoreError::backend("poisoned template index lock"))
    }

    fn write_ann(&self) -> Result<std::sync::RwLockWriteGuard<'_, AnnIndex>, StoreError> {
        self.ann
            .write()
            .map_err(|_| StoreError::backend("poisoned ann lock"))
    }
}
