//! Similarity indexes
//!
//! Two swappable backends behind [`SimilarityIndex`]:
//! - [`BruteForceIndex`]: exact linear scan with a bounded top-k heap.
//!   100% recall, O(n·d) per query. The correctness reference.
//! - [`HnswIndex`]: HNSW graph, O(log n) expected per query. Recall is
//!   below 1.0 and tunable with `ef_search`; a query can return fewer than
//!   k results when tombstones crowd the beam.
//!
//! Indexes are derived state: a collection can always rebuild its index
//! from the record store, so nothing here is persisted.

pub mod brute_force;
pub mod distance;
pub mod heap;
pub mod hnsw;

pub use brute_force::BruteForceIndex;
pub use distance::compute_distance;
pub use hnsw::{HnswConfig, HnswIndex};

use vecdb_core::{DistanceMetric, IndexKind, VectorResult};

/// Trait for swappable similarity index implementations
///
/// Keys are the record ids of the owning collection. Distances follow the
/// collection metric and are always "lower = closer".
pub trait SimilarityIndex: Send + Sync {
    /// Insert or overwrite the vector stored under `key`
    ///
    /// Fails with `DimensionMismatch` when the vector length differs from
    /// the index dimension. A failed insert leaves the index unchanged.
    fn insert(&mut self, key: &str, vector: &[f32]) -> VectorResult<()>;

    /// Remove `key`
    ///
    /// Returns true if the key was present.
    fn remove(&mut self, key: &str) -> bool;

    /// Search for the k nearest neighbors of `query`
    ///
    /// Returns (key, distance) pairs sorted by (distance asc, key asc), at
    /// most k of them. Returns nothing for k = 0, an empty index, or a query
    /// of the wrong dimension; callers validate before searching.
    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)>;

    /// Number of live keys
    fn len(&self) -> usize;

    /// Check if empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if `key` is live
    fn contains(&self, key: &str) -> bool;

    /// Vector dimension
    fn dimension(&self) -> usize;

    /// Distance metric
    fn metric(&self) -> DistanceMetric;

    /// Which backend this is
    fn kind(&self) -> IndexKind;

    /// Dead entries still occupying the structure
    ///
    /// The owning collection rebuilds the index from its records once this
    /// passes the tombstone threshold.
    fn tombstones(&self) -> usize {
        0
    }
}

/// Factory for creating index backends
///
/// Lets a collection switch between exact and HNSW search without knowing
/// the concrete type.
#[derive(Debug, Clone, Default)]
pub enum IndexBackendFactory {
    /// Exact linear scan
    #[default]
    Exact,
    /// HNSW graph
    Hnsw(HnswConfig),
}

impl IndexBackendFactory {
    /// Pick the factory for a collection's index kind
    pub fn for_kind(kind: IndexKind, hnsw: &HnswConfig) -> Self {
        match kind {
            IndexKind::Exact => IndexBackendFactory::Exact,
            IndexKind::Approximate => IndexBackendFactory::Hnsw(hnsw.clone()),
        }
    }

    /// Create an empty backend
    pub fn create(&self, dimension: usize, metric: DistanceMetric) -> Box<dyn SimilarityIndex> {
        match self {
            IndexBackendFactory::Exact => Box::new(BruteForceIndex::new(dimension, metric)),
            IndexBackendFactory::Hnsw(config) => {
                Box::new(HnswIndex::new(dimension, metric, config.clone()))
            }
        }
    }

    /// Create a backend and load `entries` into it
    pub fn build<'a, I>(
        &self,
        dimension: usize,
        metric: DistanceMetric,
        entries: I,
    ) -> VectorResult<Box<dyn SimilarityIndex>>
    where
        I: IntoIterator<Item = (&'a str, &'a [f32])>,
    {
        let mut index = self.create(dimension, metric);
        for (key, vector) in entries {
            index.insert(key, vector)?;
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_picks_backend() {
        let hnsw = HnswConfig::default();
        let exact = IndexBackendFactory::for_kind(IndexKind::Exact, &hnsw)
            .create(4, DistanceMetric::Cosine);
        assert_eq!(exact.kind(), IndexKind::Exact);
        assert_eq!(exact.dimension(), 4);
        assert_eq!(exact.metric(), DistanceMetric::Cosine);

        let approx = IndexBackendFactory::for_kind(IndexKind::Approximate, &hnsw)
            .create(4, DistanceMetric::Euclidean);
        assert_eq!(approx.kind(), IndexKind::Approximate);
        assert!(approx.is_empty());
    }

    #[test]
    fn test_build_loads_entries() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let entries = vec![("a", &a[..]), ("b", &b[..])];

        for factory in [
            IndexBackendFactory::Exact,
            IndexBackendFactory::Hnsw(HnswConfig::default()),
        ] {
            let index = factory
                .build(2, DistanceMetric::Euclidean, entries.clone())
                .unwrap();
            assert_eq!(index.len(), 2);
            assert!(index.contains("a"));
            assert_eq!(index.search(&[0.0, 1.0], 1)[0].0, "b");
        }
    }

    #[test]
    fn test_build_rejects_wrong_dimension() {
        let bad = [1.0f32];
        let result = IndexBackendFactory::Exact.build(2, DistanceMetric::Euclidean, vec![("a", &bad[..])]);
        assert!(result.is_err());
    }
}
