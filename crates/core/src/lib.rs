//! Core types for vecdb
//!
//! This crate defines the foundational types shared by the durability and
//! engine crates:
//! - DistanceMetric / IndexKind / CollectionConfig: per-collection configuration
//! - VectorId: internal slot identifier used by index backends
//! - Record / MetadataValue / NeighborResult: the data model
//! - VectorError / ErrorKind: the error taxonomy surfaced to callers
//! - Limits: size limits and input validation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod record;
pub mod types;

pub use error::{ErrorKind, VectorError, VectorResult};
pub use limits::Limits;
pub use record::{Metadata, MetadataValue, NeighborResult, Record};
pub use types::{CollectionConfig, DistanceMetric, IndexKind, VectorId};

/// Name of the collection used when the caller does not pick one.
pub const DEFAULT_COLLECTION: &str = "default";
