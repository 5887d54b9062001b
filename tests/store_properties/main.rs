//! Embedding Store Property Suite
//!
//! End-to-end properties of the public `vecdb` API.
//!
//! ## Modules
//!
//! - `round_trip`: insert/get/delete/upsert and reopen
//! - `search`: exact results match a full scan, ordering, k clamping
//! - `validation`: dimension enforcement and input limits
//! - `concurrency`: parallel writers through one handle
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test store_properties
//! cargo test --test store_properties search::
//! ```

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use vecdb::{DbConfig, VectorDb};

mod concurrency;
mod round_trip;
mod search;
mod validation;

/// Open a test database (always durability, no background worker)
fn open(path: &Path) -> Arc<VectorDb> {
    VectorDb::open_with(path, DbConfig::for_testing()).unwrap()
}

/// Fresh temp dir plus an open database inside it
fn fresh() -> (TempDir, Arc<VectorDb>) {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path());
    (dir, db)
}
