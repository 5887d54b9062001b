//! Database facade
//!
//! `VectorDb` is the one object a request layer holds (behind an `Arc`):
//! open it on a directory, route inserts and queries through it, close it
//! on shutdown. There is no process-wide registry; an exclusive lock file
//! keeps a second opener, in this process or another, out of the directory.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   .lock
//!   vecdb.toml
//!   collections/<name>/...
//! ```

pub mod config;

pub use config::{DbConfig, CONFIG_FILE_NAME};

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as ParkingMutex;
use tracing::{info, warn};
use vecdb_core::{
    CollectionConfig, Metadata, NeighborResult, Record, VectorError, VectorResult,
};
use vecdb_durability::DurabilityMode;

use crate::background::{CompactionPolicy, CompactionWorker};
use crate::collection::{Collection, CollectionInfo, CompactionOutcome, RecordScan};
use crate::manager::CollectionManager;
use crate::query::QueryEngine;
use crate::store::RecoveryStats;

/// Directory holding every collection, relative to the database root
pub const COLLECTIONS_DIR: &str = "collections";

/// Lock file guarding the database root
const LOCK_FILE: &str = ".lock";

/// An open embedding store
pub struct VectorDb {
    data_dir: PathBuf,
    config: DbConfig,
    manager: Arc<CollectionManager>,
    worker: ParkingMutex<Option<CompactionWorker>>,
    recovery: Vec<(String, RecoveryStats)>,
    closed: AtomicBool,
    /// Held for the lifetime of the database; the OS releases the lock
    /// when the file closes
    _lock_file: File,
}

impl VectorDb {
    /// Open (or create) a database at `path`
    ///
    /// Writes a default `vecdb.toml` if none exists, then loads it.
    pub fn open<P: AsRef<Path>>(path: P) -> VectorResult<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        DbConfig::write_default_if_missing(&config_path)?;
        let config = DbConfig::from_file(&config_path)?;

        Self::open_inner(data_dir, config)
    }

    /// Open a database with an explicit configuration
    ///
    /// The config is written to `vecdb.toml` so later `open` calls pick up
    /// the same settings.
    pub fn open_with<P: AsRef<Path>>(path: P, config: DbConfig) -> VectorResult<Arc<Self>> {
        config.validate()?;
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        config.write_to_file(&data_dir.join(CONFIG_FILE_NAME))?;

        Self::open_inner(data_dir, config)
    }

    fn open_inner(data_dir: PathBuf, config: DbConfig) -> VectorResult<Arc<Self>> {
        let lock_path = data_dir.join(LOCK_FILE);
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| VectorError::storage(format!("failed to open lock file: {}", e)))?;
        fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|_| {
            VectorError::storage(format!(
                "database at '{}' is already in use",
                data_dir.display()
            ))
        })?;

        let settings = config.collection_settings()?;
        let (manager, recovery) = CollectionManager::open(
            data_dir.join(COLLECTIONS_DIR),
            settings.clone(),
            config.default_collection_config(),
        )?;
        let manager = Arc::new(manager);

        let policy = CompactionPolicy {
            compaction_interval: match config.compaction_interval_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            sync_interval: match settings.durability {
                DurabilityMode::Standard { interval_ms, .. } => {
                    Some(Duration::from_millis(interval_ms.max(1)))
                }
                DurabilityMode::Always => None,
            },
            wal_bytes_threshold: config.compaction_wal_bytes,
        };
        let worker = CompactionWorker::start(Arc::clone(&manager), policy)?;

        info!(
            target: "vecdb::db",
            path = %data_dir.display(),
            collections = manager.len(),
            durability = settings.durability.description(),
            "Database opened"
        );

        Ok(Arc::new(VectorDb {
            data_dir,
            config,
            manager,
            worker: ParkingMutex::new(worker),
            recovery,
            closed: AtomicBool::new(false),
            _lock_file: lock_file,
        }))
    }

    /// Database root directory
    pub fn path(&self) -> &Path {
        &self.data_dir
    }

    /// Active configuration
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Recovery statistics per collection from the last open
    pub fn recovery_stats(&self) -> &[(String, RecoveryStats)] {
        &self.recovery
    }

    /// Check if the database is still open
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> VectorResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VectorError::Closed);
        }
        Ok(())
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Insert or overwrite a record, creating the collection on first use
    pub fn insert(
        &self,
        collection: &str,
        id: &str,
        vector: Vec<f32>,
        document: &str,
        metadata: Metadata,
    ) -> VectorResult<()> {
        self.insert_record(collection, Record::new(id, vector, document).with_metadata(metadata))
    }

    /// Insert or overwrite a prepared record
    pub fn insert_record(&self, collection: &str, record: Record) -> VectorResult<()> {
        self.ensure_open()?;
        self.manager.get_or_create(collection)?.insert(record)
    }

    /// Insert several records into one collection
    ///
    /// All records are validated before any is written.
    pub fn insert_batch(&self, collection: &str, records: Vec<Record>) -> VectorResult<usize> {
        self.ensure_open()?;
        self.manager.get_or_create(collection)?.insert_batch(records)
    }

    /// Get a record by id
    pub fn get(&self, collection: &str, id: &str) -> VectorResult<Record> {
        self.ensure_open()?;
        self.manager.get(collection)?.get(id)
    }

    /// Delete a record by id
    pub fn delete(&self, collection: &str, id: &str) -> VectorResult<()> {
        self.ensure_open()?;
        self.manager.get(collection)?.delete(id)
    }

    /// Number of records in a collection
    pub fn count(&self, collection: &str) -> VectorResult<usize> {
        self.ensure_open()?;
        self.manager.get(collection)?.count()
    }

    /// Lazy scan over a collection in id order
    pub fn scan(&self, collection: &str) -> VectorResult<RecordScan> {
        self.ensure_open()?;
        Ok(self.manager.get(collection)?.scan())
    }

    /// Find the k records nearest to `vector`
    ///
    /// With `create_on_query` (the default), an unknown collection is
    /// created and the result is empty; otherwise it is NotFound.
    pub fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> VectorResult<Vec<NeighborResult>> {
        self.ensure_open()?;
        if self.config.create_on_query {
            self.manager.get_or_create(collection)?;
        }
        QueryEngine::new(&self.manager).query(collection, vector, k)
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Create a collection with an explicit configuration
    pub fn create_collection(
        &self,
        name: &str,
        config: CollectionConfig,
    ) -> VectorResult<Arc<Collection>> {
        self.ensure_open()?;
        self.manager.create(name, config)
    }

    /// Get a collection handle
    pub fn collection(&self, name: &str) -> VectorResult<Arc<Collection>> {
        self.ensure_open()?;
        self.manager.get(name)
    }

    /// Statistics for one collection
    pub fn collection_info(&self, name: &str) -> VectorResult<CollectionInfo> {
        self.ensure_open()?;
        self.manager.get(name)?.info()
    }

    /// Statistics for every collection, sorted by name
    pub fn list_collections(&self) -> VectorResult<Vec<CollectionInfo>> {
        self.ensure_open()?;
        self.manager.list()
    }

    /// Drop a collection and delete its files
    pub fn drop_collection(&self, name: &str) -> VectorResult<()> {
        self.ensure_open()?;
        self.manager.drop_collection(name)
    }

    /// Compact a collection now
    pub fn compact(&self, name: &str) -> VectorResult<CompactionOutcome> {
        self.ensure_open()?;
        self.manager.get(name)?.compact(&AtomicBool::new(false))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Fsync every collection's WAL
    pub fn flush(&self) -> VectorResult<()> {
        self.ensure_open()?;
        self.manager.flush_all()
    }

    /// Stop the background worker and flush everything
    ///
    /// Idempotent; every later call except `close` returns `Closed`.
    pub fn close(&self) -> VectorResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(worker) = self.worker.lock().take() {
            worker.shutdown();
        }
        self.manager.flush_all()?;
        info!(target: "vecdb::db", path = %self.data_dir.display(), "Database closed");
        Ok(())
    }
}

impl Drop for VectorDb {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(target: "vecdb::db", error = %e, "Flush on drop failed");
        }
    }
}
