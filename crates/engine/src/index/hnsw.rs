//! HNSW (Hierarchical Navigable Small World) approximate index
//!
//! O(log n) expected search time, built incrementally.
//!
//! ## Algorithm
//!
//! HNSW builds a multi-layer graph where:
//! - Layer 0 contains all nodes with up to 2*M connections each
//! - Higher layers contain a subset of nodes with up to M connections each
//! - Search starts from the top layer and greedily descends to layer 0
//! - At each layer, a beam search keeps the `ef` closest candidates
//!
//! ## Recall
//!
//! Results are approximate: recall is below 1.0 and improves with
//! `ef_search` at the cost of latency. `ef_construction` trades build time
//! for graph quality. A query never returns a record that is not live.
//!
//! ## Deletes and overwrites
//!
//! Removing or overwriting a key tombstones its graph node. Tombstoned
//! nodes stay in the graph as waypoints, so the graph stays connected, but
//! they are never returned. The owning collection replaces the whole index
//! with a fresh build once tombstones pass its configured share.
//!
//! ## Determinism
//!
//! - Fixed seed + SplitMix64 counter for level assignment
//! - BTreeMap node storage and BTreeSet neighbor lists
//! - Final ranking by (distance asc, key asc)

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashSet};

use serde::{Deserialize, Serialize};
use vecdb_core::{DistanceMetric, IndexKind, VectorError, VectorId, VectorResult};

use super::distance::compute_distance;
use super::heap::{KeyMap, VectorHeap};
use super::SimilarityIndex;

/// Seed for level assignment
const LEVEL_SEED: u64 = 42;

/// HNSW configuration parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Max connections per layer (default: 16)
    pub m: usize,
    /// Build-time beam width (default: 200)
    pub ef_construction: usize,
    /// Search-time beam width (default: 50)
    pub ef_search: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
        }
    }
}

impl HnswConfig {
    /// Level multiplier: 1/ln(m)
    pub fn ml(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }

    /// Max connections for layer 0 (2*M)
    fn max_connections_layer0(&self) -> usize {
        self.m * 2
    }

    /// Max connections for layers > 0
    fn max_connections(&self) -> usize {
        self.m
    }

    /// Validate parameters
    pub fn validate(&self) -> VectorResult<()> {
        if self.m < 2 {
            return Err(VectorError::invalid_argument("hnsw.m must be at least 2"));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(VectorError::invalid_argument(
                "hnsw.ef_construction and hnsw.ef_search must be positive",
            ));
        }
        Ok(())
    }
}

/// A node in the HNSW graph
#[derive(Debug, Clone)]
struct HnswNode {
    /// neighbors[layer] = set of neighbor VectorIds
    neighbors: Vec<BTreeSet<VectorId>>,
    deleted: bool,
}

impl HnswNode {
    fn new(max_layer: usize) -> Self {
        Self {
            neighbors: (0..=max_layer).map(|_| BTreeSet::new()).collect(),
            deleted: false,
        }
    }
}

/// Candidate ordered by (distance asc, VectorId asc)
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoredId {
    distance: f32,
    id: VectorId,
}

impl Eq for ScoredId {}

impl PartialOrd for ScoredId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredId {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap<ScoredId> pops the farthest; BinaryHeap<Reverse<_>> the nearest
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Graph structure. Embeddings live in the `VectorHeap` passed to each call.
struct HnswGraph {
    config: HnswConfig,
    metric: DistanceMetric,
    nodes: BTreeMap<VectorId, HnswNode>,
    entry_point: Option<VectorId>,
    max_level: usize,
    rng_counter: u64,
    deleted_count: usize,
}

impl HnswGraph {
    fn new(config: HnswConfig, metric: DistanceMetric) -> Self {
        Self {
            config,
            metric,
            nodes: BTreeMap::new(),
            entry_point: None,
            max_level: 0,
            rng_counter: 0,
            deleted_count: 0,
        }
    }

    // ========================================================================
    // Level Assignment
    // ========================================================================

    /// Draw a level from the exponential distribution, deterministically
    fn assign_level(&mut self) -> usize {
        self.rng_counter += 1;
        let hash = splitmix64(LEVEL_SEED.wrapping_add(self.rng_counter));
        let uniform = ((hash as f64) / (u64::MAX as f64)).max(1e-15);
        (-uniform.ln() * self.config.ml()) as usize
    }

    fn is_deleted(&self, id: VectorId) -> bool {
        self.nodes.get(&id).map(|n| n.deleted).unwrap_or(false)
    }

    fn distance_to(&self, query: &[f32], id: VectorId, heap: &VectorHeap) -> Option<f32> {
        heap.get(id)
            .map(|embedding| compute_distance(query, embedding, self.metric))
    }

    // ========================================================================
    // Graph Traversal
    // ========================================================================

    /// Beam search at a single layer
    ///
    /// Returns up to `ef` closest live nodes, nearest first. Tombstoned
    /// nodes are expanded but never collected.
    fn search_layer(
        &self,
        query: &[f32],
        entry_id: VectorId,
        ef: usize,
        layer: usize,
        heap: &VectorHeap,
    ) -> Vec<ScoredId> {
        let Some(entry_distance) = self.distance_to(query, entry_id, heap) else {
            return Vec::new();
        };
        let entry = ScoredId {
            distance: entry_distance,
            id: entry_id,
        };

        let mut visited = HashSet::new();
        visited.insert(entry_id);

        // Candidates: nearest on top
        let mut candidates = BinaryHeap::new();
        candidates.push(Reverse(entry));

        // Results: farthest on top for eviction
        let mut results: BinaryHeap<ScoredId> = BinaryHeap::new();
        if !self.is_deleted(entry_id) {
            results.push(entry);
        }

        // Bound used for pruning; tracks traversal through tombstones too
        let mut frontier_bound = entry_distance;

        while let Some(Reverse(nearest)) = candidates.pop() {
            let worst = results.peek().map(|r| r.distance).unwrap_or(frontier_bound);
            if results.len() >= ef && nearest.distance > worst {
                break;
            }

            let Some(node) = self.nodes.get(&nearest.id) else {
                continue;
            };
            let Some(neighbors) = node.neighbors.get(layer) else {
                continue;
            };

            for &neighbor_id in neighbors {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                let Some(distance) = self.distance_to(query, neighbor_id, heap) else {
                    continue;
                };

                let worst = results
                    .peek()
                    .map(|r| r.distance)
                    .unwrap_or(f32::INFINITY);
                if results.len() < ef || distance < worst {
                    let scored = ScoredId {
                        distance,
                        id: neighbor_id,
                    };
                    candidates.push(Reverse(scored));
                    frontier_bound = frontier_bound.max(distance);

                    if !self.is_deleted(neighbor_id) {
                        results.push(scored);
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Greedy descent from `from_layer` down to `to_layer`
    ///
    /// At each layer, moves to the best neighbor until no neighbor is closer.
    fn greedy_search_to_layer(
        &self,
        query: &[f32],
        entry_id: VectorId,
        from_layer: usize,
        to_layer: usize,
        heap: &VectorHeap,
    ) -> VectorId {
        let mut current = entry_id;
        let Some(mut current_distance) = self.distance_to(query, current, heap) else {
            return current;
        };

        for layer in (to_layer..=from_layer).rev() {
            loop {
                let mut best = ScoredId {
                    distance: current_distance,
                    id: current,
                };

                if let Some(neighbors) = self
                    .nodes
                    .get(&current)
                    .and_then(|n| n.neighbors.get(layer))
                {
                    for &neighbor_id in neighbors {
                        if let Some(distance) = self.distance_to(query, neighbor_id, heap) {
                            let candidate = ScoredId {
                                distance,
                                id: neighbor_id,
                            };
                            if candidate < best {
                                best = candidate;
                            }
                        }
                    }
                }

                if best.id == current {
                    break;
                }
                current = best.id;
                current_distance = best.distance;
            }
        }

        current
    }

    /// Trim a node's neighbor list at `layer` to its closest `max_connections`
    fn prune_neighbors_for(
        &mut self,
        id: VectorId,
        layer: usize,
        max_connections: usize,
        heap: &VectorHeap,
    ) {
        let Some(embedding) = heap.get(id) else {
            return;
        };
        let Some(neighbors) = self.nodes.get(&id).and_then(|n| n.neighbors.get(layer)) else {
            return;
        };

        let mut scored: Vec<ScoredId> = neighbors
            .iter()
            .filter_map(|&nid| {
                heap.get(nid).map(|n_emb| ScoredId {
                    distance: compute_distance(embedding, n_emb, self.metric),
                    id: nid,
                })
            })
            .collect();
        scored.sort();

        let keep: BTreeSet<VectorId> = scored.iter().take(max_connections).map(|s| s.id).collect();
        if let Some(layer_neighbors) = self
            .nodes
            .get_mut(&id)
            .and_then(|n| n.neighbors.get_mut(layer))
        {
            *layer_neighbors = keep;
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Insert a node whose embedding is already in `heap`
    fn insert(&mut self, id: VectorId, embedding: &[f32], heap: &VectorHeap) {
        let level = self.assign_level();
        self.nodes.insert(id, HnswNode::new(level));

        let Some(entry_id) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_level = level;
            return;
        };

        let mut current_entry = entry_id;
        if self.max_level > level {
            current_entry =
                self.greedy_search_to_layer(embedding, entry_id, self.max_level, level + 1, heap);
        }

        let start_layer = level.min(self.max_level);
        for layer in (0..=start_layer).rev() {
            let candidates = self.search_layer(
                embedding,
                current_entry,
                self.config.ef_construction,
                layer,
                heap,
            );

            // The new node links to its M closest live candidates
            let selected: Vec<VectorId> = candidates
                .iter()
                .filter(|s| s.id != id)
                .take(self.config.m)
                .map(|s| s.id)
                .collect();

            if let Some(layer_neighbors) = self
                .nodes
                .get_mut(&id)
                .and_then(|n| n.neighbors.get_mut(layer))
            {
                layer_neighbors.extend(selected.iter().copied());
            }

            let max_conn = if layer == 0 {
                self.config.max_connections_layer0()
            } else {
                self.config.max_connections()
            };

            for &neighbor_id in &selected {
                let needs_prune = match self
                    .nodes
                    .get_mut(&neighbor_id)
                    .and_then(|n| n.neighbors.get_mut(layer))
                {
                    Some(layer_neighbors) => {
                        layer_neighbors.insert(id);
                        layer_neighbors.len() > max_conn
                    }
                    None => false,
                };
                if needs_prune {
                    self.prune_neighbors_for(neighbor_id, layer, max_conn, heap);
                }
            }

            if let Some(closest) = candidates.first() {
                current_entry = closest.id;
            }
        }

        if level > self.max_level {
            self.entry_point = Some(id);
            self.max_level = level;
        }
    }

    /// Tombstone a node. Returns true if it was live.
    fn mark_deleted(&mut self, id: VectorId) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if !node.deleted => {
                node.deleted = true;
                self.deleted_count += 1;
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Up to `ef` live nodes near `query`, nearest first
    fn search(&self, query: &[f32], ef: usize, heap: &VectorHeap) -> Vec<ScoredId> {
        let Some(entry_id) = self.entry_point else {
            return Vec::new();
        };
        if self.nodes.len() == self.deleted_count {
            return Vec::new();
        }

        let mut current_entry = entry_id;
        if self.max_level > 0 {
            current_entry = self.greedy_search_to_layer(query, entry_id, self.max_level, 1, heap);
        }
        self.search_layer(query, current_entry, ef, 0, heap)
    }
}

/// SplitMix64 hash for deterministic pseudo-random levels
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

/// HNSW similarity index
///
/// The heap holds embeddings for every graph node, tombstoned ones
/// included, until the index is rebuilt.
pub struct HnswIndex {
    heap: VectorHeap,
    keys: KeyMap,
    graph: HnswGraph,
}

impl HnswIndex {
    /// Create an empty index
    pub fn new(dimension: usize, metric: DistanceMetric, config: HnswConfig) -> Self {
        HnswIndex {
            heap: VectorHeap::new(dimension),
            keys: KeyMap::new(),
            graph: HnswGraph::new(config, metric),
        }
    }

}

impl SimilarityIndex for HnswIndex {
    fn insert(&mut self, key: &str, vector: &[f32]) -> VectorResult<()> {
        if vector.len() != self.heap.dimension() {
            return Err(VectorError::DimensionMismatch {
                expected: self.heap.dimension(),
                got: vector.len(),
            });
        }

        let id = self.heap.allocate_id();
        self.heap.upsert(id, vector)?;
        if let Some(old) = self.keys.insert(key, id) {
            self.graph.mark_deleted(old);
        }
        self.graph.insert(id, vector, &self.heap);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.keys.remove(key) {
            Some(id) => self.graph.mark_deleted(id),
            None => false,
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        if k == 0 || self.keys.is_empty() || query.len() != self.heap.dimension() {
            return Vec::new();
        }

        let ef = self.graph.config.ef_search.max(k);
        let mut results: Vec<(String, f32)> = self
            .graph
            .search(query, ef, &self.heap)
            .into_iter()
            .filter_map(|s| self.keys.key(s.id).map(|key| (key.to_string(), s.distance)))
            .collect();

        results.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        results.truncate(k);
        results
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn contains(&self, key: &str) -> bool {
        self.keys.id(key).is_some()
    }

    fn dimension(&self) -> usize {
        self.heap.dimension()
    }

    fn metric(&self) -> DistanceMetric {
        self.graph.metric
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Approximate
    }

    fn tombstones(&self) -> usize {
        self.graph.deleted_count
    }
}
