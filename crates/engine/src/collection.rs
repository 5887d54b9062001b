//! Collections
//!
//! A collection pairs a durable [`RecordStore`] with a derived
//! [`SimilarityIndex`] behind one readers-writer lock. Writes append to the
//! WAL first and only then touch the index; the index is rebuilt from the
//! store on open, so the log stays authoritative.
//!
//! On disk a collection is a directory:
//!
//! ```text
//! <name>/
//!   collection.toml   manifest (uuid, config)
//!   wal/              wal-NNNNNN.seg
//!   snapshots/        snap-NNNNNN.chk
//! ```

use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vecdb_core::{CollectionConfig, Limits, Record, VectorError, VectorResult};
use vecdb_durability::{now_micros, DurabilityMode, WalConfig, WalCounters};

use crate::index::{HnswConfig, IndexBackendFactory, SimilarityIndex};
use crate::store::{RecordStore, RecoveryStats};

/// Manifest file name inside a collection directory
pub const MANIFEST_FILE: &str = "collection.toml";

/// Records fetched per lock acquisition while scanning
const SCAN_PAGE_SIZE: usize = 64;

/// Settings shared by every collection of a database
#[derive(Debug, Clone)]
pub struct CollectionSettings {
    /// WAL fsync policy
    pub durability: DurabilityMode,
    /// WAL segment sizing
    pub wal: WalConfig,
    /// Parameters for approximate indexes
    pub hnsw: HnswConfig,
    /// Input limits
    pub limits: Limits,
    /// Rebuild an index once tombstones exceed this share of its entries
    pub tombstone_ratio: f64,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        CollectionSettings {
            durability: DurabilityMode::default(),
            wal: WalConfig::default(),
            hnsw: HnswConfig::default(),
            limits: Limits::default(),
            tombstone_ratio: 0.25,
        }
    }
}

/// Persisted collection identity and configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionManifest {
    /// Stamped into every WAL segment header
    pub uuid: Uuid,
    /// Creation time (microseconds since epoch)
    pub created_at: u64,
    /// Collection configuration
    pub config: CollectionConfig,
}

impl CollectionManifest {
    fn new(config: CollectionConfig) -> Self {
        CollectionManifest {
            uuid: Uuid::new_v4(),
            created_at: now_micros(),
            config,
        }
    }

    /// Load `collection.toml` from a collection directory
    pub fn load(dir: &Path) -> VectorResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)?;
        toml::from_str(&text)
            .map_err(|e| VectorError::Corruption(format!("{}: {}", path.display(), e)))
    }

    /// Write `collection.toml` atomically (tmp + fsync + rename)
    pub fn store(&self, dir: &Path) -> VectorResult<()> {
        let text =
            toml::to_string(self).map_err(|e| VectorError::Serialization(e.to_string()))?;
        let tmp = dir.join(format!(".{}.tmp", MANIFEST_FILE));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, dir.join(MANIFEST_FILE))?;
        File::open(dir)?.sync_all()?;
        Ok(())
    }
}

/// Collection statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    /// Collection name
    pub name: String,
    /// Current configuration (dimension once known)
    pub config: CollectionConfig,
    /// Live records
    pub count: usize,
    /// Dead index entries awaiting compaction
    pub tombstones: usize,
    /// Bytes held by WAL segments
    pub wal_bytes: u64,
    /// Newest snapshot id (0 if none)
    pub snapshot_id: u64,
    /// WAL activity since the collection was opened
    pub wal: WalCounters,
}

/// What a compaction call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Another compaction of this collection was already running
    Skipped,
    /// A snapshot was written
    Compacted {
        /// New snapshot id
        snapshot_id: u64,
        /// Records in the snapshot
        records: usize,
        /// Whether the index was rebuilt without tombstones
        index_rebuilt: bool,
    },
}

pub(crate) struct CollectionInner {
    pub(crate) config: CollectionConfig,
    pub(crate) store: RecordStore,
    /// `None` until the dimension is known
    pub(crate) index: Option<Box<dyn SimilarityIndex>>,
}

impl CollectionInner {
    fn factory(&self, hnsw: &HnswConfig) -> IndexBackendFactory {
        IndexBackendFactory::for_kind(self.config.index, hnsw)
    }
}

/// A named collection
pub struct Collection {
    name: String,
    dir: PathBuf,
    uuid: Uuid,
    created_at: u64,
    settings: CollectionSettings,
    inner: RwLock<CollectionInner>,
    /// Serializes compactions of this collection
    compaction: Mutex<()>,
    dropped: AtomicBool,
}

impl Collection {
    /// Create a new collection directory under `dir`
    pub fn create(
        name: &str,
        dir: PathBuf,
        config: CollectionConfig,
        settings: CollectionSettings,
    ) -> VectorResult<Self> {
        config.validate(&settings.limits)?;
        std::fs::create_dir_all(&dir)?;
        let manifest = CollectionManifest::new(config);
        manifest.store(&dir)?;

        let (collection, _) = Self::open_with_manifest(name, dir, manifest, settings)?;
        info!(
            target: "vecdb::collection",
            collection = name,
            metric = collection.config().metric.name(),
            index = collection.config().index.name(),
            dimension = ?collection.config().dimension,
            "Collection created"
        );
        Ok(collection)
    }

    /// Open an existing collection directory and recover it
    pub fn open(
        name: &str,
        dir: PathBuf,
        settings: CollectionSettings,
    ) -> VectorResult<(Self, RecoveryStats)> {
        let manifest = CollectionManifest::load(&dir)?;
        Self::open_with_manifest(name, dir, manifest, settings)
    }

    fn open_with_manifest(
        name: &str,
        dir: PathBuf,
        mut manifest: CollectionManifest,
        settings: CollectionSettings,
    ) -> VectorResult<(Self, RecoveryStats)> {
        let (store, stats) = RecordStore::open(
            name,
            &dir,
            manifest.uuid.into_bytes(),
            settings.durability,
            settings.wal.clone(),
        )?;

        // First insert was logged but the manifest rewrite did not land
        if manifest.config.dimension.is_none() {
            if let Some(first) = store.iter().next() {
                manifest.config.dimension = Some(first.dimension());
                manifest.store(&dir)?;
            }
        }

        let mut inner = CollectionInner {
            config: manifest.config.clone(),
            store,
            index: None,
        };
        if let Some(dimension) = inner.config.dimension {
            let factory = inner.factory(&settings.hnsw);
            let entries = inner
                .store
                .iter()
                .map(|r| (r.id.as_str(), r.vector.as_slice()));
            let index = factory.build(dimension, inner.config.metric, entries)?;
            inner.index = Some(index);
        }

        Ok((
            Collection {
                name: name.to_string(),
                dir,
                uuid: manifest.uuid,
                created_at: manifest.created_at,
                settings,
                inner: RwLock::new(inner),
                compaction: Mutex::new(()),
                dropped: AtomicBool::new(false),
            },
            stats,
        ))
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Identity stamped into WAL segment headers
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Current configuration
    pub fn config(&self) -> CollectionConfig {
        self.inner.read().config.clone()
    }

    pub(crate) fn limits(&self) -> &Limits {
        &self.settings.limits
    }

    pub(crate) fn read(&self) -> VectorResult<RwLockReadGuard<'_, CollectionInner>> {
        let guard = self.inner.read();
        self.ensure_live()?;
        Ok(guard)
    }

    fn write(&self) -> VectorResult<RwLockWriteGuard<'_, CollectionInner>> {
        let guard = self.inner.write();
        self.ensure_live()?;
        Ok(guard)
    }

    #[cfg(test)]
    pub(crate) fn inner_for_tests(&self) -> RwLockWriteGuard<'_, CollectionInner> {
        self.inner.write()
    }

    fn ensure_live(&self) -> VectorResult<()> {
        if self.dropped.load(Ordering::Acquire) {
            return Err(VectorError::CollectionNotFound {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Fence off a dropped collection; every later call reports NotFound
    pub(crate) fn mark_dropped(&self) {
        let _guard = self.inner.write();
        self.dropped.store(true, Ordering::Release);
    }

    fn validate_record(&self, record: &Record) -> VectorResult<()> {
        let limits = &self.settings.limits;
        limits.validate_key(&record.id)?;
        limits.validate_vector(&record.vector)?;
        limits.validate_document(&record.document)?;
        limits.validate_metadata(&record.metadata)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert or overwrite a record
    ///
    /// Validation happens before anything is logged. The first insert into a
    /// collection without an explicit dimension fixes it.
    pub fn insert(&self, record: Record) -> VectorResult<()> {
        self.validate_record(&record)?;
        let mut inner = self.write()?;
        check_dimension(&inner.config, record.dimension())?;
        self.apply_put(&mut inner, record)
    }

    /// Insert several records
    ///
    /// Every record is validated before the first one is logged, so a bad
    /// record anywhere in the batch leaves the collection unchanged.
    pub fn insert_batch(&self, records: Vec<Record>) -> VectorResult<usize> {
        for record in &records {
            self.validate_record(record)?;
        }
        let mut inner = self.write()?;
        let expected = inner
            .config
            .dimension
            .or_else(|| records.first().map(Record::dimension));
        if let Some(expected) = expected {
            for record in &records {
                if record.dimension() != expected {
                    return Err(VectorError::DimensionMismatch {
                        expected,
                        got: record.dimension(),
                    });
                }
            }
        }

        let count = records.len();
        for record in records {
            self.apply_put(&mut inner, record)?;
        }
        debug!(target: "vecdb::collection", collection = %self.name, count, "Batch insert completed");
        Ok(count)
    }

    fn apply_put(&self, inner: &mut CollectionInner, record: Record) -> VectorResult<()> {
        let id = record.id.clone();
        let dimension = record.dimension();
        inner.store.put(record)?;

        if inner.config.dimension.is_none() {
            self.fix_dimension(inner, dimension);
        }

        let CollectionInner { store, index, .. } = inner;
        if let (Some(index), Ok(stored)) = (index.as_mut(), store.get(&id)) {
            if let Err(e) = index.insert(&stored.id, &stored.vector) {
                // The WAL has the record; the next open rebuilds the index
                error!(target: "vecdb::collection", collection = %self.name, id = %id, error = %e, "Index update failed after WAL append");
            }
        }

        debug!(target: "vecdb::collection", collection = %self.name, id = %id, "Record upserted");
        Ok(())
    }

    fn fix_dimension(&self, inner: &mut CollectionInner, dimension: usize) {
        inner.config.dimension = Some(dimension);
        inner.index = Some(
            inner
                .factory(&self.settings.hnsw)
                .create(dimension, inner.config.metric),
        );

        let manifest = CollectionManifest {
            uuid: self.uuid,
            created_at: self.created_at,
            config: inner.config.clone(),
        };
        if let Err(e) = manifest.store(&self.dir) {
            // Recovery infers the dimension from the first record
            warn!(target: "vecdb::collection", collection = %self.name, error = %e, "Failed to persist inferred dimension");
        }
        info!(target: "vecdb::collection", collection = %self.name, dimension, "Dimension fixed by first insert");
    }

    /// Delete a record
    pub fn delete(&self, id: &str) -> VectorResult<()> {
        let mut inner = self.write()?;
        inner.store.delete(id)?;

        let removed = inner.index.as_mut().map(|index| index.remove(id)).unwrap_or(false);
        if !removed {
            warn!(target: "vecdb::collection", collection = %self.name, id, "Deleted record was missing from the index");
        }
        debug!(target: "vecdb::collection", collection = %self.name, id, "Record deleted");
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Get a record by id
    pub fn get(&self, id: &str) -> VectorResult<Record> {
        self.read()?.store.get(id).cloned()
    }

    /// Number of records
    pub fn count(&self) -> VectorResult<usize> {
        Ok(self.read()?.store.len())
    }

    /// Lazy scan over every record in id order
    pub fn scan(self: &Arc<Self>) -> RecordScan {
        RecordScan::new(Arc::clone(self))
    }

    /// Statistics for this collection
    pub fn info(&self) -> VectorResult<CollectionInfo> {
        let inner = self.read()?;
        Ok(CollectionInfo {
            name: self.name.clone(),
            config: inner.config.clone(),
            count: inner.store.len(),
            tombstones: inner.index.as_ref().map(|i| i.tombstones()).unwrap_or(0),
            wal_bytes: inner.store.wal_bytes()?,
            snapshot_id: inner.store.snapshot_id(),
            wal: inner.store.wal_counters(),
        })
    }

    /// Bytes held by WAL segments
    pub fn wal_bytes(&self) -> VectorResult<u64> {
        self.read()?.store.wal_bytes()
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Fsync the WAL
    pub fn flush(&self) -> VectorResult<()> {
        self.write()?.store.flush()
    }

    /// Fsync the WAL if the Standard interval elapsed
    pub fn sync_if_overdue(&self) -> VectorResult<bool> {
        self.write()?.store.sync_if_overdue()
    }

    /// Fold the WAL into a snapshot, then rebuild the index if tombstones
    /// crossed the threshold
    ///
    /// The collection lock is held only to capture state and to swap in
    /// results; snapshot writing and index rebuilding run without it.
    pub fn compact(&self, cancel: &AtomicBool) -> VectorResult<CompactionOutcome> {
        let Some(_running) = self.compaction.try_lock() else {
            return Ok(CompactionOutcome::Skipped);
        };
        let start = Instant::now();

        let job = {
            let mut inner = self.write()?;
            let dimension = inner.config.dimension.unwrap_or(0);
            inner.store.begin_compaction(dimension)?
        };

        job.write(cancel)?;
        self.write()?.store.finish_compaction(&job)?;

        let index_rebuilt = self.rebuild_index_if_needed()?;

        info!(
            target: "vecdb::compaction",
            collection = %self.name,
            snapshot_id = job.snapshot_id(),
            records = job.record_count(),
            index_rebuilt,
            duration_us = start.elapsed().as_micros() as u64,
            "Compaction completed"
        );
        Ok(CompactionOutcome::Compacted {
            snapshot_id: job.snapshot_id(),
            records: job.record_count(),
            index_rebuilt,
        })
    }

    /// Rebuild the index from the store when too many entries are tombstones
    ///
    /// Builds off-lock from shared record handles and swaps only if no write
    /// happened in between; otherwise the next cycle retries.
    fn rebuild_index_if_needed(&self) -> VectorResult<bool> {
        let (captured_lsn, dimension, metric, factory, entries) = {
            let inner = self.read()?;
            let Some(index) = inner.index.as_ref() else {
                return Ok(false);
            };
            let tombstones = index.tombstones();
            let total = tombstones + index.len();
            if tombstones == 0 || (tombstones as f64) <= self.settings.tombstone_ratio * total as f64 {
                return Ok(false);
            }
            (
                inner.store.last_lsn(),
                index.dimension(),
                index.metric(),
                inner.factory(&self.settings.hnsw),
                inner.store.shared_records(),
            )
        };

        let rebuilt = factory.build(
            dimension,
            metric,
            entries.iter().map(|r| (r.id.as_str(), r.vector.as_slice())),
        )?;

        let mut inner = self.write()?;
        if inner.store.last_lsn() != captured_lsn {
            debug!(target: "vecdb::compaction", collection = %self.name, "Writes raced the index rebuild, retrying next cycle");
            return Ok(false);
        }
        inner.index = Some(rebuilt);
        Ok(true)
    }
}

fn check_dimension(config: &CollectionConfig, got: usize) -> VectorResult<()> {
    match config.dimension {
        Some(expected) if expected != got => Err(VectorError::DimensionMismatch { expected, got }),
        _ => Ok(()),
    }
}

/// Lazy, restartable scan over a collection's records in id order
///
/// Takes the read lock once per page, so a long scan never blocks writers
/// for long. Each page resumes after the last id returned; records written
/// behind the cursor are not seen, records written ahead of it are.
pub struct RecordScan {
    collection: Arc<Collection>,
    last_id: Option<String>,
    buffer: VecDeque<Record>,
    exhausted: bool,
    error: Option<VectorError>,
}

impl RecordScan {
    fn new(collection: Arc<Collection>) -> Self {
        RecordScan {
            collection,
            last_id: None,
            buffer: VecDeque::new(),
            exhausted: false,
            error: None,
        }
    }

    /// Start over from the first id
    pub fn restart(&mut self) {
        self.last_id = None;
        self.buffer.clear();
        self.exhausted = false;
        self.error = None;
    }

    /// Error that ended the scan early, if any
    pub fn take_error(&mut self) -> Option<VectorError> {
        self.error.take()
    }

    fn fill(&mut self) {
        let page = match self.collection.read() {
            Ok(inner) => inner
                .store
                .scan_page(self.last_id.as_deref(), SCAN_PAGE_SIZE),
            Err(e) => {
                self.error = Some(e);
                Vec::new()
            }
        };
        if page.len() < SCAN_PAGE_SIZE {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.last_id = Some(last.id.clone());
        }
        self.buffer.extend(page);
    }
}

impl Iterator for RecordScan {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill();
        }
        self.buffer.pop_front()
    }
}
