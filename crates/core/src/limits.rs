//! Size limits and input validation
//!
//! Every write and query is validated here before anything touches the log,
//! so a validation failure never leaves a partial write behind.

use crate::error::{VectorError, VectorResult};
use crate::record::{Metadata, MetadataValue};

/// Size limits for names, ids, documents and vectors
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum collection name length in bytes (default: 256)
    pub max_collection_name_bytes: usize,

    /// Maximum record id length in bytes (default: 1024)
    pub max_key_bytes: usize,

    /// Maximum vector dimension (default: 65536)
    pub max_vector_dim: usize,

    /// Maximum document length in bytes (default: 16MB)
    pub max_document_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_collection_name_bytes: 256,
            max_key_bytes: 1024,
            max_vector_dim: 65536,
            max_document_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Limits with small values for tests that exercise enforcement
    pub fn with_small_limits() -> Self {
        Limits {
            max_collection_name_bytes: 16,
            max_key_bytes: 16,
            max_vector_dim: 8,
            max_document_bytes: 64,
        }
    }

    /// Validate a collection name
    ///
    /// # Validation Rules
    /// - Cannot be empty
    /// - Cannot exceed `max_collection_name_bytes`
    /// - Cannot contain '/', '\\', "..", or null bytes (names become directories)
    /// - Cannot start with '_' (reserved for system use)
    pub fn validate_collection_name(&self, name: &str) -> VectorResult<()> {
        let invalid = |reason: String| VectorError::InvalidCollectionName {
            name: name.to_string(),
            reason,
        };

        if name.is_empty() {
            return Err(invalid("Collection name cannot be empty".to_string()));
        }
        if name.len() > self.max_collection_name_bytes {
            return Err(invalid(format!(
                "Collection name cannot exceed {} bytes",
                self.max_collection_name_bytes
            )));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(invalid(
                "Collection name cannot contain path separators".to_string(),
            ));
        }
        if name.contains("..") {
            return Err(invalid("Collection name cannot contain '..'".to_string()));
        }
        if name.contains('\0') {
            return Err(invalid(
                "Collection name cannot contain null bytes".to_string(),
            ));
        }
        if name.starts_with('_') {
            return Err(invalid(
                "Collection names starting with '_' are reserved".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate a record id
    ///
    /// # Validation Rules
    /// - Cannot be empty
    /// - Cannot exceed `max_key_bytes`
    /// - Cannot contain null bytes
    pub fn validate_key(&self, key: &str) -> VectorResult<()> {
        let invalid = |reason: String| VectorError::InvalidKey {
            key: key.to_string(),
            reason,
        };

        if key.is_empty() {
            return Err(invalid("Record id cannot be empty".to_string()));
        }
        if key.len() > self.max_key_bytes {
            return Err(invalid(format!(
                "Record id cannot exceed {} bytes",
                self.max_key_bytes
            )));
        }
        if key.contains('\0') {
            return Err(invalid("Record id cannot contain null bytes".to_string()));
        }
        Ok(())
    }

    /// Validate vector shape and contents (not its dimension against a collection)
    pub fn validate_vector(&self, vector: &[f32]) -> VectorResult<()> {
        if vector.is_empty() {
            return Err(VectorError::invalid_argument("Vector cannot be empty"));
        }
        if vector.len() > self.max_vector_dim {
            return Err(VectorError::invalid_argument(format!(
                "Vector dimension {} exceeds maximum {}",
                vector.len(),
                self.max_vector_dim
            )));
        }
        if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
            return Err(VectorError::invalid_argument(format!(
                "Vector component {} is not finite",
                pos
            )));
        }
        Ok(())
    }

    /// Validate document size
    pub fn validate_document(&self, document: &str) -> VectorResult<()> {
        if document.len() > self.max_document_bytes {
            return Err(VectorError::invalid_argument(format!(
                "Document of {} bytes exceeds maximum {}",
                document.len(),
                self.max_document_bytes
            )));
        }
        Ok(())
    }

    /// Validate metadata fields
    pub fn validate_metadata(&self, metadata: &Metadata) -> VectorResult<()> {
        for (field, value) in metadata {
            if field.is_empty() {
                return Err(VectorError::invalid_argument(
                    "Metadata field names cannot be empty",
                ));
            }
            if let MetadataValue::Number(n) = value {
                if !n.is_finite() {
                    return Err(VectorError::invalid_argument(format!(
                        "Metadata field '{}' is not a finite number",
                        field
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate a requested k
    ///
    /// Only k = 0 is rejected; a k above the record count is clamped by the
    /// caller.
    pub fn validate_k(&self, k: usize) -> VectorResult<()> {
        if k == 0 {
            return Err(VectorError::invalid_argument("k must be greater than 0"));
        }
        Ok(())
    }
}
