//! Embedding store engine for vecdb
//!
//! This crate puts the durable pieces together:
//! - RecordStore: WAL-backed id → record map with snapshot compaction
//! - Similarity indexes: exact scan and HNSW behind one trait
//! - Collection / CollectionManager: named collections, created on demand
//! - QueryEngine: validated top-k search joined back to stored records
//! - VectorDb: the facade, with its config file, lock file and
//!   background sync/compaction worker
//!
//! The engine is the only component that knows how records are encoded in
//! the WAL and laid out in snapshot columns.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod collection;
pub mod database;
pub mod index;
pub mod manager;
pub mod query;
pub mod store;

pub use background::{CompactionPolicy, CompactionWorker, CompactorStats};
pub use collection::{
    Collection, CollectionInfo, CollectionManifest, CollectionSettings, CompactionOutcome,
    RecordScan,
};
pub use database::{DbConfig, VectorDb, CONFIG_FILE_NAME};
pub use index::{
    BruteForceIndex, HnswConfig, HnswIndex, IndexBackendFactory, SimilarityIndex,
};
pub use manager::CollectionManager;
pub use query::QueryEngine;
pub use store::{RecordStore, RecoveryStats};

pub use vecdb_core::{
    CollectionConfig, DistanceMetric, ErrorKind, IndexKind, Limits, Metadata, MetadataValue,
    NeighborResult, Record, VectorError, VectorResult,
};
