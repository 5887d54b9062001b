//! Error types for vecdb
//!
//! Every error surfaced by the core maps to one stable [`ErrorKind`], so a
//! request layer can pick a status code without inspecting message text.
//! Index/store divergence is never an error: it is logged and skipped.

use thiserror::Error;

/// Result type alias for vecdb operations
pub type VectorResult<T> = Result<T, VectorError>;

/// Stable classification of every [`VectorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown collection or record id
    NotFound,
    /// Vector length differs from the collection dimension
    DimensionMismatch,
    /// Malformed input (k = 0, bad names, non-finite components, ...)
    InvalidArgument,
    /// I/O, serialization or corruption on the log/snapshot path
    StorageError,
}

impl ErrorKind {
    /// Short machine-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::DimensionMismatch => "dimension_mismatch",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::StorageError => "storage_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the vector store
#[derive(Debug, Error)]
pub enum VectorError {
    /// Collection with given name was not found
    #[error("Collection not found: {name}")]
    CollectionNotFound {
        /// Collection name
        name: String,
    },

    /// Record with given id was not found
    #[error("Record not found: {id} in collection {collection}")]
    RecordNotFound {
        /// Collection name
        collection: String,
        /// Record id
        id: String,
    },

    /// Vector dimension doesn't match collection configuration
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension fixed for the collection
        expected: usize,
        /// Length of the provided vector
        got: usize,
    },

    /// Generic invalid input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Collection name is invalid
    #[error("Invalid collection name: {name} ({reason})")]
    InvalidCollectionName {
        /// The invalid name
        name: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// Record id is invalid
    #[error("Invalid key: {key} ({reason})")]
    InvalidKey {
        /// The invalid key
        key: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// Collection configuration cannot be changed after creation
    #[error("Collection '{collection}' config mismatch: {field} cannot be changed")]
    ConfigMismatch {
        /// Collection name
        collection: String,
        /// The field that differs
        field: String,
    },

    /// I/O failure on the log or snapshot path
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// On-disk data failed validation
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// The database was closed
    #[error("Database is closed")]
    Closed,
}

impl VectorError {
    /// Build an `InvalidArgument` from anything printable
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        VectorError::InvalidArgument(message.into())
    }

    /// Build a `Storage` error from anything printable
    pub fn storage(message: impl std::fmt::Display) -> Self {
        VectorError::Storage(message.to_string())
    }

    /// Stable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            VectorError::CollectionNotFound { .. } | VectorError::RecordNotFound { .. } => {
                ErrorKind::NotFound
            }
            VectorError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            VectorError::InvalidArgument(_)
            | VectorError::InvalidCollectionName { .. }
            | VectorError::InvalidKey { .. }
            | VectorError::ConfigMismatch { .. } => ErrorKind::InvalidArgument,
            VectorError::Storage(_)
            | VectorError::Serialization(_)
            | VectorError::Corruption(_)
            | VectorError::Closed => ErrorKind::StorageError,
        }
    }

    /// Check if this error indicates the record/collection was not found
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this error was raised by input validation
    ///
    /// Validation errors are always returned before any mutation happens.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::DimensionMismatch | ErrorKind::InvalidArgument
        )
    }
}

impl From<std::io::Error> for VectorError {
    fn from(e: std::io::Error) -> Self {
        VectorError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinct_per_family() {
        let not_found = VectorError::CollectionNotFound {
            name: "c".to_string(),
        };
        let record_missing = VectorError::RecordNotFound {
            collection: "c".to_string(),
            id: "a".to_string(),
        };
        let dim = VectorError::DimensionMismatch {
            expected: 3,
            got: 2,
        };
        let bad = VectorError::invalid_argument("k must be > 0");
        let io = VectorError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));

        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert_eq!(record_missing.kind(), ErrorKind::NotFound);
        assert_eq!(dim.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(bad.kind(), ErrorKind::InvalidArgument);
        assert_eq!(io.kind(), ErrorKind::StorageError);
    }

    #[test]
    fn test_validation_classification() {
        assert!(VectorError::DimensionMismatch {
            expected: 1,
            got: 2
        }
        .is_validation_error());
        assert!(VectorError::InvalidKey {
            key: String::new(),
            reason: "empty".to_string()
        }
        .is_validation_error());
        assert!(!VectorError::Storage("x".to_string()).is_validation_error());
        assert!(!VectorError::Closed.is_validation_error());
    }

    #[test]
    fn test_display_messages() {
        let err = VectorError::DimensionMismatch {
            expected: 384,
            got: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("384"));
        assert!(msg.contains("3"));

        assert_eq!(ErrorKind::StorageError.to_string(), "storage_error");
    }
}
