//! Exact (brute-force) similarity index
//!
//! Scans every stored vector and keeps the best k in a bounded max-heap, so
//! a query costs O(n log k) time and O(k) extra memory. Results are exact:
//! for the same contents and query, every call returns the same ranking.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use vecdb_core::{DistanceMetric, IndexKind, VectorResult};

use super::distance::compute_distance;
use super::heap::{KeyMap, VectorHeap};
use super::SimilarityIndex;

/// Brute-force similarity index
pub struct BruteForceIndex {
    metric: DistanceMetric,
    heap: VectorHeap,
    keys: KeyMap,
}

/// Heap entry ordered by (distance, key); the heap top is the worst kept
/// candidate.
#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    distance: f32,
    key: &'a str,
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.key.cmp(other.key))
    }
}

impl BruteForceIndex {
    /// Create an empty index
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        BruteForceIndex {
            metric,
            heap: VectorHeap::new(dimension),
            keys: KeyMap::new(),
        }
    }
}

impl SimilarityIndex for BruteForceIndex {
    fn insert(&mut self, key: &str, vector: &[f32]) -> VectorResult<()> {
        match self.keys.id(key) {
            Some(id) => self.heap.upsert(id, vector),
            None => {
                let id = self.heap.allocate_id();
                self.heap.upsert(id, vector)?;
                self.keys.insert(key, id);
                Ok(())
            }
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.keys.remove(key) {
            Some(id) => self.heap.delete(id),
            None => false,
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        if k == 0 || self.heap.is_empty() || query.len() != self.heap.dimension() {
            return Vec::new();
        }

        let mut best: BinaryHeap<Candidate<'_>> = BinaryHeap::with_capacity(k + 1);
        for (key, id) in self.keys.iter() {
            let Some(vector) = self.heap.get(id) else {
                continue;
            };
            let candidate = Candidate {
                distance: compute_distance(query, vector, self.metric),
                key,
            };

            if best.len() < k {
                best.push(candidate);
            } else if let Some(worst) = best.peek() {
                if candidate < *worst {
                    best.pop();
                    best.push(candidate);
                }
            }
        }

        best.into_sorted_vec()
            .into_iter()
            .map(|c| (c.key.to_string(), c.distance))
            .collect()
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
        self.metric
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Exact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(points: &[(&str, [f32; 2])], metric: DistanceMetric) -> BruteForceIndex {
        let mut index = BruteForceIndex::new(2, metric);
        for (key, vector) in points {
            index.insert(key, vector).unwrap();
        }
        index
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = index_with(
            &[("far", [10.0, 0.0]), ("near", [1.0, 0.0]), ("mid", [5.0, 0.0])],
            DistanceMetric::Euclidean,
        );

        let results = index.search(&[0.0, 0.0], 3);
        let keys: Vec<&str> = results.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["near", "mid", "far"]);
        assert_eq!(results[0].1, 1.0);
    }

    #[test]
    fn test_tie_breaks_by_lower_key() {
        let index = index_with(
            &[("c", [1.0, 0.0]), ("a", [1.0, 0.0]), ("b", [1.0, 0.0])],
            DistanceMetric::Euclidean,
        );

        let results = index.search(&[0.0, 0.0], 2);
        let keys: Vec<&str> = results.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_bounded_heap_keeps_best_k() {
        let mut index = BruteForceIndex::new(1, DistanceMetric::Euclidean);
        for i in 0..100 {
            index.insert(&format!("id-{:03}", i), &[i as f32]).unwrap();
        }

        let results = index.search(&[42.2], 3);
        let keys: Vec<&str> = results.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["id-042", "id-043", "id-041"]);
    }

    #[test]
    fn test_k_larger_than_len() {
        let index = index_with(&[("a", [1.0, 1.0])], DistanceMetric::Cosine);
        assert_eq!(index.search(&[1.0, 1.0], 10).len(), 1);
    }

    #[test]
    fn test_overwrite_and_remove() {
        let mut index = index_with(
            &[("a", [1.0, 0.0]), ("b", [0.0, 1.0])],
            DistanceMetric::Euclidean,
        );

        index.insert("a", &[0.0, 5.0]).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.search(&[0.0, 5.0], 1)[0].0, "a");

        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert!(!index.contains("a"));
        let results = index.search(&[0.0, 5.0], 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "b");
    }

    #[test]
    fn test_dot_product_ranks_larger_inner_product_first() {
        let index = index_with(
            &[("small", [1.0, 0.0]), ("large", [3.0, 0.0])],
            DistanceMetric::DotProduct,
        );
        let results = index.search(&[1.0, 0.0], 2);
        assert_eq!(results[0].0, "large");
        assert_eq!(results[0].1, -3.0);
    }

    #[test]
    fn test_empty_and_mismatched_queries() {
        let index = BruteForceIndex::new(2, DistanceMetric::Euclidean);
        assert!(index.search(&[0.0, 0.0], 5).is_empty());

        let index = index_with(&[("a", [1.0, 0.0])], DistanceMetric::Euclidean);
        assert!(index.search(&[1.0], 5).is_empty());
        assert!(index.search(&[1.0, 0.0], 0).is_empty());
    }
}
