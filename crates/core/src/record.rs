//! Record and query-result types
//!
//! Metadata is schema-less but typed: each field is a small tagged union so
//! serialization stays predictable across the WAL and snapshot formats.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    /// UTF-8 string
    String(String),
    /// Finite floating point number (integers are widened)
    Number(f64),
    /// Boolean flag
    Bool(bool),
}

impl MetadataValue {
    /// Returns the string payload, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric payload, if this is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Number(n)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Number(n as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

/// Metadata attached to a record
///
/// BTreeMap keeps field order deterministic on disk.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A stored record: the unit of the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// User-provided id, unique within a collection
    pub id: String,
    /// Embedding
    pub vector: Vec<f32>,
    /// Associated document text
    pub document: String,
    /// Optional metadata (empty when absent)
    #[serde(default)]
    pub metadata: Metadata,
}

impl Record {
    /// Create a record with empty metadata
    pub fn new(id: impl Into<String>, vector: Vec<f32>, document: impl Into<String>) -> Self {
        Record {
            id: id.into(),
            vector,
            document: document.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach metadata (builder pattern)
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Vector dimension of this record
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// One ranked query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborResult {
    /// Record id
    pub id: String,
    /// Distance to the query (lower = closer)
    pub distance: f32,
    /// Stored document
    pub document: String,
    /// Stored metadata
    pub metadata: Metadata,
}
