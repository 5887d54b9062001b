//! Query engine
//!
//! Validates a top-k request, asks the collection's index for candidates,
//! and joins them back to stored records. All of it happens under one read
//! lock, so a result never mixes two states of the collection.
//!
//! An id the index returns but the store lacks is a consistency warning:
//! it is logged and skipped, never a query failure.

use std::time::Instant;

use tracing::{debug, warn};
use vecdb_core::{NeighborResult, VectorError, VectorResult};

use crate::manager::CollectionManager;

/// Top-k query execution over a collection manager
pub struct QueryEngine<'a> {
    manager: &'a CollectionManager,
}

impl<'a> QueryEngine<'a> {
    /// Create an engine over `manager`
    pub fn new(manager: &'a CollectionManager) -> Self {
        QueryEngine { manager }
    }

    /// Find the k records nearest to `vector`
    ///
    /// Errors, in the order they are checked:
    /// - unknown collection: `CollectionNotFound`
    /// - empty or non-finite vector: `InvalidArgument`
    /// - wrong length: `DimensionMismatch`
    /// - k = 0: `InvalidArgument`
    ///
    /// Any larger k is accepted and clamped to the record count. A collection whose dimension is
    /// not yet known holds no records and yields an empty result.
    pub fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> VectorResult<Vec<NeighborResult>> {
        let start = Instant::now();
        let handle = self.manager.get(collection)?;
        let limits = handle.limits();
        limits.validate_vector(vector)?;

        let inner = handle.read()?;
        if let Some(expected) = inner.config.dimension {
            if vector.len() != expected {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    got: vector.len(),
                });
            }
        }
        limits.validate_k(k)?;

        let Some(index) = inner.index.as_ref() else {
            return Ok(Vec::new());
        };
        let k = k.min(inner.store.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let hits = index.search(vector, k);
        let mut results = Vec::with_capacity(hits.len());
        for (id, distance) in hits {
            match inner.store.get(&id) {
                Ok(record) => results.push(NeighborResult {
                    id,
                    distance,
                    document: record.document.clone(),
                    metadata: record.metadata.clone(),
                }),
                Err(_) => {
                    warn!(
                        target: "vecdb::query",
                        collection,
                        id = %id,
                        "ConsistencyWarning: index returned an id missing from the store"
                    );
                }
            }
        }

        debug!(
            target: "vecdb::query",
            collection,
            k,
            results = results.len(),
            duration_us = start.elapsed().as_micros() as u64,
            "Query completed"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionSettings;
    use vecdb_core::{CollectionConfig, DistanceMetric, ErrorKind, IndexKind, Record};
    use vecdb_durability::{DurabilityMode, WalConfig};

    fn manager(dir: &std::path::Path) -> CollectionManager {
        let settings = CollectionSettings {
            durability: DurabilityMode::Always,
            wal: WalConfig::for_testing(),
            ..CollectionSettings::default()
        };
        CollectionManager::open(dir.to_path_buf(), settings, CollectionConfig::default())
            .unwrap()
            .0
    }

    fn seed(manager: &CollectionManager) {
        let collection = manager.get_or_create("docs").unwrap();
        for (id, v) in [("a", [0.0, 0.0]), ("b", [1.0, 0.0]), ("c", [5.0, 5.0])] {
            collection
                .insert(Record::new(id, v.to_vec(), format!("doc {}", id)))
                .unwrap();
        }
    }

    #[test]
    fn test_query_joins_documents() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        seed(&manager);

        let results = QueryEngine::new(&manager).query("docs", &[0.1, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[0].document, "doc a");
        assert_eq!(results[1].id, "b");
        assert!(results[0].distance <= results[1].distance);
    }

    #[test]
    fn test_k_clamped_to_record_count() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        seed(&manager);

        let results = QueryEngine::new(&manager).query("docs", &[0.0, 0.0], 100).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        seed(&manager);
        let engine = QueryEngine::new(&manager);

        let kind = |r: VectorResult<Vec<NeighborResult>>| r.unwrap_err().kind();
        assert_eq!(kind(engine.query("missing", &[0.0, 0.0], 1)), ErrorKind::NotFound);
        assert_eq!(kind(engine.query("docs", &[0.0], 1)), ErrorKind::DimensionMismatch);
        assert_eq!(kind(engine.query("docs", &[0.0, 0.0], 0)), ErrorKind::InvalidArgument);
        assert_eq!(kind(engine.query("docs", &[f32::NAN, 0.0], 1)), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_huge_k_is_clamped_not_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        seed(&manager);
        let engine = QueryEngine::new(&manager);

        for k in [20_000, 1_000_000, usize::MAX] {
            let results = engine.query("docs", &[0.0, 0.0], k).unwrap();
            assert_eq!(results.len(), 3, "k = {}", k);
        }
    }

    #[test]
    fn test_empty_collection_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.get_or_create("empty").unwrap();
        let results = QueryEngine::new(&manager).query("empty", &[1.0, 2.0], 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_missing_store_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        seed(&manager);

        // Index entry without a stored record
        let collection = manager.get("docs").unwrap();
        collection
            .inner_for_tests()
            .index
            .as_mut()
            .unwrap()
            .insert("ghost", &[0.0, 0.0])
            .unwrap();

        let results = QueryEngine::new(&manager).query("docs", &[0.0, 0.0], 3).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert!(!ids.contains(&"ghost"));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_approximate_collection() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let config = CollectionConfig::new(DistanceMetric::Cosine, IndexKind::Approximate);
        let collection = manager.create("ann", config).unwrap();
        for i in 0..50 {
            let angle = i as f32 * 0.05;
            collection
                .insert(Record::new(format!("p{:02}", i), vec![angle.cos(), angle.sin()], ""))
                .unwrap();
        }

        let results = QueryEngine::new(&manager).query("ann", &[1.0, 0.0], 3).unwrap();
        assert_eq!(results[0].id, "p00");
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    }
}
