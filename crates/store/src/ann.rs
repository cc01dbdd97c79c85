//! Approximate nearest neighbor search over template embeddings.
//!
//! HNSW (via `hnsw_rs`) with cosine distance, fronted by a linear-scan
//! fallback while the template universe is small. The index only holds
//! templates with non-null embeddings; bootstrap therefore builds it after
//! the first embedding backfill, and inserts mark it stale so searches can
//! trigger a rebuild.

use hnsw_rs::prelude::*;
use std::collections::HashMap;

/// Configuration for ANN index construction.
#[derive(Debug, Clone, Copy)]
pub struct AnnConfig {
    /// Number of neighbors per node (higher = better recall, slower build).
    pub m: usize,
    /// Candidate list size during construction.
    pub ef_construction: usize,
    /// Candidate list size during search.
    pub ef_search: usize,
    /// Hard cap on results returned from one search.
    pub max_results: usize,
    /// Whether to use HNSW at all (false = always linear scan).
    pub enabled: bool,
    /// Below this vector count a linear scan is used even when enabled.
    pub min_vectors_for_ann: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            max_results: 100,
            enabled: true,
            min_vectors_for_ann: 1000,
        }
    }
}

impl AnnConfig {
    /// Check if HNSW should be used given the current dataset size.
    pub fn should_use_ann(&self, num_vectors: usize) -> bool {
        self.enabled && num_vectors >= self.min_vectors_for_ann
    }
}

/// Result from ANN search.
#[derive(Debug, Clone)]
pub struct AnnResult {
    /// Template id the vector belongs to.
    pub template_id: u64,
    /// Cosine distance to the query (lower = closer).
    pub distance: f32,
}

/// Vector index mapping template ids to embeddings.
pub struct AnnIndex {
    config: AnnConfig,
    dimension: usize,
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    id_to_slot: HashMap<u64, usize>,
    slot_to_id: Vec<u64>,
    vectors: Vec<Vec<f32>>,
    built: bool,
}

impl AnnIndex {
    pub fn new(dimension: usize, config: AnnConfig) -> Self {
        Self {
            config,
            dimension,
            hnsw: None,
            id_to_slot: HashMap::new(),
            slot_to_id: Vec::new(),
            vectors: Vec::new(),
            built: false,
        }
    }

    /// Insert or replace the vector for a template. Marks the index stale.
    pub fn upsert(&mut self, template_id: u64, vector: Vec<f32>) {
        debug_assert_eq!(vector.len(), self.dimension);
        match self.id_to_slot.get(&template_id) {
            Some(&slot) => {
                self.vectors[slot] = vector;
            }
            None => {
                let slot = self.vectors.len();
                self.vectors.push(vector);
                self.slot_to_id.push(template_id);
                self.id_to_slot.insert(template_id, slot);
            }
        }
        self.built = false;
    }

    /// Drop a template's vector (retention). The slot keeps its position so
    /// already-built graphs stay consistent until the next rebuild; removed
    /// slots are skipped at search time.
    pub fn remove(&mut self, template_id: u64) {
        if let Some(slot) = self.id_to_slot.remove(&template_id) {
            self.vectors[slot].clear();
            self.built = false;
        }
    }

    pub fn len(&self) -> usize {
        self.id_to_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_slot.is_empty()
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Search for the `k` nearest templates by cosine distance.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<AnnResult> {
        let k = k.min(self.config.max_results);
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        if self.built && self.config.should_use_ann(self.len()) && self.hnsw.is_some() {
            self.hnsw_search(query, k)
        } else {
            self.linear_search(query, k)
        }
    }

    fn hnsw_search(&self, query: &[f32], k: usize) -> Vec<AnnResult> {
        let Some(hnsw) = self.hnsw.as_ref() else {
            return self.linear_search(query, k);
        };
        let results: Vec<Neighbour> = hnsw.search(query, k, self.config.ef_search);
        results
            .into_iter()
            .filter_map(|neighbour| {
                let slot = neighbour.get_origin_id();
                let id = *self.slot_to_id.get(slot)?;
                // Removed slots have cleared vectors; skip them.
                if self.vectors[slot].is_empty() || !self.id_to_slot.contains_key(&id) {
                    return None;
                }
                Some(AnnResult {
                    template_id: id,
                    distance: neighbour.distance,
                })
            })
            .collect()
    }

    fn linear_search(&self, query: &[f32], k: usize) -> Vec<AnnResult> {
        let mut distances: Vec<AnnResult> = self
            .id_to_slot
            .iter()
            .map(|(&id, &slot)| AnnResult {
                template_id: id,
                distance: cosine_distance(query, &self.vectors[slot]),
            })
            .collect();

        distances.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.template_id.cmp(&b.template_id))
        });
        distances.truncate(k);
        distances
    }

    /// Build the HNSW graph. Cheap no-op below the minimum population where
    /// linear scans win anyway.
    pub fn build(&mut self) {
        if self.vectors.is_empty() {
            return;
        }

        let nb_elem = self.vectors.len();
        if nb_elem < self.config.min_vectors_for_ann.max(10) {
            // Small universe: mark built, keep using linear search.
            self.built = true;
            self.hnsw = None;
            return;
        }

        let nb_layer = 16.min((nb_elem as f32).ln().trunc() as usize);
        let hnsw = Hnsw::<f32, DistCosine>::new(
            self.config.m,
            nb_elem,
            nb_layer,
            self.config.ef_construction,
            DistCosine {},
        );

        let data_for_insertion: Vec<(&Vec<f32>, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(_, vec)| !vec.is_empty())
            .map(|(slot, vec)| (vec, slot))
            .collect();
        hnsw.parallel_insert(&data_for_insertion);

        self.hnsw = Some(hnsw);
        self.built = true;
    }
}

/// Cosine distance (1 - cosine similarity). Lower means more similar.
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if b.is_empty() || a.is_empty() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let similarity = dot / (norm_a * norm_b);
    1.0 - similarity.clamp(-1.0, 1.0)
}
