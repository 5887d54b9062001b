//! Collection configuration types
//!
//! These types describe how a collection measures distance and which index
//! backend serves it. Distance computation itself lives in the engine.

use serde::{Deserialize, Serialize};

use crate::error::{VectorError, VectorResult};
use crate::limits::Limits;

/// Distance metric for nearest-neighbor ranking
///
/// All metrics are normalized to "lower = closer". This normalization is part
/// of the index contract: results are always ordered by ascending distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean (L2) distance
    /// Range: [0, inf)
    #[default]
    #[serde(rename = "l2", alias = "euclidean")]
    Euclidean,

    /// Cosine distance: 1 - cos(a, b)
    /// Range: [0, 2]. A zero vector is at distance 1 from everything.
    #[serde(rename = "cosine")]
    Cosine,

    /// Negated inner product: -dot(a, b)
    /// Range: unbounded. Meaningful for pre-normalized embeddings.
    #[serde(rename = "dot", alias = "dot_product", alias = "inner_product")]
    DotProduct,
}

impl DistanceMetric {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "l2",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::DotProduct => "dot",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "l2" | "euclidean" => Some(DistanceMetric::Euclidean),
            "cosine" => Some(DistanceMetric::Cosine),
            "dot" | "dot_product" | "inner_product" | "ip" => Some(DistanceMetric::DotProduct),
            _ => None,
        }
    }

    /// Serialization value for snapshot headers
    pub fn to_byte(&self) -> u8 {
        match self {
            DistanceMetric::Euclidean => 0,
            DistanceMetric::Cosine => 1,
            DistanceMetric::DotProduct => 2,
        }
    }

    /// Deserialization from snapshot headers
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(DistanceMetric::Euclidean),
            1 => Some(DistanceMetric::Cosine),
            2 => Some(DistanceMetric::DotProduct),
            _ => None,
        }
    }
}

/// Which index backend serves a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexKind {
    /// Exact linear scan, 100% recall, O(N·D) per query
    #[default]
    #[serde(rename = "exact", alias = "brute_force")]
    Exact,

    /// HNSW graph, approximate recall, roughly O(log N) per query
    #[serde(rename = "approximate", alias = "hnsw")]
    Approximate,
}

impl IndexKind {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Exact => "exact",
            IndexKind::Approximate => "approximate",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" | "brute_force" => Some(IndexKind::Exact),
            "approximate" | "hnsw" | "ann" => Some(IndexKind::Approximate),
            _ => None,
        }
    }
}

/// Collection configuration
///
/// `metric` and `index` are immutable after creation. `dimension` is either
/// given explicitly or inferred from the first insert, then fixed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Fixed vector dimension; `None` until the first insert when not explicit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,

    /// Distance metric for ranking
    #[serde(default)]
    pub metric: DistanceMetric,

    /// Index backend
    #[serde(default)]
    pub index: IndexKind,
}

impl CollectionConfig {
    /// Create a config with the dimension left to the first insert
    pub fn new(metric: DistanceMetric, index: IndexKind) -> Self {
        CollectionConfig {
            dimension: None,
            metric,
            index,
        }
    }

    /// Fix the dimension explicitly (builder pattern)
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Validate the explicit dimension, if any
    pub fn validate(&self, limits: &Limits) -> VectorResult<()> {
        if let Some(dimension) = self.dimension {
            if dimension == 0 || dimension > limits.max_vector_dim {
                return Err(VectorError::invalid_argument(format!(
                    "Invalid dimension: {} (must be in 1..={})",
                    dimension, limits.max_vector_dim
                )));
            }
        }
        Ok(())
    }
}

/// Internal vector identifier (stable within an index instance)
///
/// VectorIds are never reused by an index. Storage slots may be reused, but
/// the ID value is monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VectorId(pub u64);

impl VectorId {
    /// Create a new VectorId
    pub fn new(id: u64) -> Self {
        VectorId(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for VectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VectorId({})", self.0)
    }
}
