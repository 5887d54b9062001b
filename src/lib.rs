//! vecdb - Embedded, durable embedding store
//!
//! vecdb keeps named collections of records (id, vector, document,
//! metadata) on local disk and answers top-k similarity queries over them,
//! with either an exact scan or an HNSW graph per collection.
//!
//! # Quick Start
//!
//! ```ignore
//! use vecdb::{Metadata, VectorDb};
//!
//! let db = VectorDb::open("./data")?;
//!
//! // The collection is created on first use
//! db.insert("docs", "a", vec![0.1, 0.9], "hello", Metadata::new())?;
//!
//! let hits = db.query("docs", &[0.1, 0.8], 5)?;
//! ```
//!
//! # Architecture
//!
//! Every mutation is appended to a per-collection write-ahead log before it
//! becomes visible; compaction folds the log into a columnar snapshot.
//! The [`VectorDb`] facade is the only entry point most callers need.

pub use vecdb_engine::*;

/// Durability primitives, for callers that inspect files on disk
pub use vecdb_durability as durability;
