//! Durable record store
//!
//! Authoritative id → record mapping for one collection. Every mutation is
//! appended to the WAL before the in-memory map changes; if the append
//! fails, nothing changes. Compaction folds the log into a columnar
//! snapshot so recovery time stays bounded.
//!
//! ## Compaction protocol
//!
//! 1. `begin_compaction` (caller holds the write lock): rotate the WAL and
//!    capture the records. Records are shared `Arc`s, so the capture copies
//!    pointers, not vectors. Everything captured lives in segments below the
//!    new one.
//! 2. `CompactionJob::write` (no lock): encode and write the snapshot.
//! 3. `finish_compaction` (write lock): drop covered segments and older
//!    snapshots.
//!
//! A crash at any point leaves either the old snapshot plus all segments or
//! the new snapshot plus a superset of the segments it needs.

pub mod columns;
pub mod entry;
pub mod recovery;

pub use entry::WalEntry;
pub use recovery::RecoveryStats;

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::debug;
use vecdb_core::{Record, VectorError, VectorResult};
use vecdb_durability::{
    now_micros, DurabilityMode, SnapshotInfo, SnapshotWriter, WalConfig, WalCounters, WalRecord,
    WalWriter,
};

/// WAL directory inside a collection directory
pub const WAL_DIR: &str = "wal";
/// Snapshot directory inside a collection directory
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// Durable record store for one collection
pub struct RecordStore {
    collection: String,
    snapshots_dir: PathBuf,
    records: BTreeMap<String, Arc<Record>>,
    wal: WalWriter,
    next_lsn: u64,
    snapshot_id: u64,
}

impl RecordStore {
    /// Open (or create) the store under `dir`, recovering its contents
    pub fn open(
        collection: &str,
        dir: &Path,
        collection_uuid: [u8; 16],
        durability: DurabilityMode,
        wal_config: WalConfig,
    ) -> VectorResult<(Self, RecoveryStats)> {
        let wal_dir = dir.join(WAL_DIR);
        let snapshots_dir = dir.join(SNAPSHOTS_DIR);

        let state = recovery::recover(collection, &wal_dir, &snapshots_dir)?;
        let wal = WalWriter::open(wal_dir, collection_uuid, durability, wal_config)?;

        let store = RecordStore {
            collection: collection.to_string(),
            snapshots_dir,
            records: state.records,
            wal,
            next_lsn: state.last_lsn + 1,
            snapshot_id: state.snapshot_id,
        };
        Ok((store, state.stats))
    }

    /// Insert or overwrite a record, returning the previous version
    pub fn put(&mut self, record: Record) -> VectorResult<Option<Arc<Record>>> {
        let payload = WalEntry::encode_put(&record)?;
        self.append(payload)?;
        Ok(self.records.insert(record.id.clone(), Arc::new(record)))
    }

    /// Get a record by id
    pub fn get(&self, id: &str) -> VectorResult<&Record> {
        self.records
            .get(id)
            .map(Arc::as_ref)
            .ok_or_else(|| VectorError::RecordNotFound {
                collection: self.collection.clone(),
                id: id.to_string(),
            })
    }

    /// Check if a record exists
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Delete a record, returning it
    ///
    /// Nothing is logged for an unknown id.
    pub fn delete(&mut self, id: &str) -> VectorResult<Arc<Record>> {
        if !self.records.contains_key(id) {
            return Err(VectorError::RecordNotFound {
                collection: self.collection.clone(),
                id: id.to_string(),
            });
        }
        let payload = WalEntry::encode_delete(id)?;
        self.append(payload)?;
        self.records
            .remove(id)
            .ok_or_else(|| VectorError::storage("record vanished during delete"))
    }

    /// Up to `limit` records with ids strictly after `after`, in id order
    ///
    /// Backs the restartable scan cursor: each page resumes from the last id
    /// of the previous one.
    pub fn scan_page(&self, after: Option<&str>, limit: usize) -> Vec<Record> {
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        self.records
            .range::<str, _>((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, r)| Record::clone(r))
            .collect()
    }

    /// Iterate all records in id order
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values().map(Arc::as_ref)
    }

    /// Handles to every record in id order
    ///
    /// Cheap enough to call under the write lock: each entry is a reference
    /// count bump.
    pub fn shared_records(&self) -> Vec<Arc<Record>> {
        self.records.values().map(Arc::clone).collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// LSN of the last acknowledged mutation
    pub fn last_lsn(&self) -> u64 {
        self.next_lsn - 1
    }

    /// Id of the newest snapshot (0 if none)
    pub fn snapshot_id(&self) -> u64 {
        self.snapshot_id
    }

    /// Bytes held by WAL segments
    pub fn wal_bytes(&self) -> VectorResult<u64> {
        Ok(self.wal.total_size()?)
    }

    /// Cumulative WAL appends, fsyncs and rotations
    pub fn wal_counters(&self) -> WalCounters {
        self.wal.counters()
    }

    /// Fsync the WAL
    pub fn flush(&mut self) -> VectorResult<()> {
        Ok(self.wal.flush()?)
    }

    /// Fsync the WAL if the Standard interval elapsed
    pub fn sync_if_overdue(&mut self) -> VectorResult<bool> {
        Ok(self.wal.sync_if_overdue()?)
    }

    fn append(&mut self, payload: Vec<u8>) -> VectorResult<()> {
        let record = WalRecord::new(self.next_lsn, now_micros(), payload);
        self.wal.append(&record)?;
        self.next_lsn += 1;
        Ok(())
    }

    // ========================================================================
    // Compaction
    // ========================================================================

    /// Rotate the WAL and capture the current records
    pub fn begin_compaction(&mut self, dimension: usize) -> VectorResult<CompactionJob> {
        let first_kept_segment = self.wal.rotate_segment()?;
        Ok(CompactionJob {
            collection: self.collection.clone(),
            snapshots_dir: self.snapshots_dir.clone(),
            snapshot_id: self.snapshot_id + 1,
            watermark_lsn: self.last_lsn(),
            first_kept_segment,
            dimension,
            records: self.shared_records(),
        })
    }

    /// Drop the WAL segments and snapshots a finished job made redundant
    pub fn finish_compaction(&mut self, job: &CompactionJob) -> VectorResult<()> {
        if job.snapshot_id <= self.snapshot_id {
            return Ok(());
        }
        self.snapshot_id = job.snapshot_id;

        let segments = self.wal.remove_segments_before(job.first_kept_segment)?;
        let snapshots =
            SnapshotWriter::new(self.snapshots_dir.clone())?.remove_snapshots_before(job.snapshot_id)?;

        debug!(
            target: "vecdb::compaction",
            collection = %self.collection,
            snapshot_id = job.snapshot_id,
            segments_removed = segments,
            snapshots_removed = snapshots,
            "Compaction finalized"
        );
        Ok(())
    }
}

/// Snapshot work captured under the write lock, written without it
#[derive(Debug)]
pub struct CompactionJob {
    collection: String,
    snapshots_dir: PathBuf,
    snapshot_id: u64,
    watermark_lsn: u64,
    first_kept_segment: u64,
    dimension: usize,
    records: Vec<Arc<Record>>,
}

impl CompactionJob {
    /// Id the snapshot will get
    pub fn snapshot_id(&self) -> u64 {
        self.snapshot_id
    }

    /// Every mutation up to this LSN is in the snapshot
    pub fn watermark_lsn(&self) -> u64 {
        self.watermark_lsn
    }

    /// Number of captured records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Encode and write the snapshot
    ///
    /// Checks `cancel` between sections; a cancelled write leaves no file
    /// behind and returns a storage error.
    pub fn write(&self, cancel: &AtomicBool) -> VectorResult<SnapshotInfo> {
        let sections = columns::encode_records(&self.records, self.dimension)?;
        let writer = SnapshotWriter::new(self.snapshots_dir.clone())?;
        let info = writer.create_snapshot(
            self.snapshot_id,
            self.watermark_lsn,
            self.dimension as u32,
            self.records.len() as u64,
            &sections,
            cancel,
        )?;

        debug!(
            target: "vecdb::compaction",
            collection = %self.collection,
            snapshot_id = info.snapshot_id,
            watermark_lsn = info.watermark_lsn,
            records = info.record_count,
            "Snapshot written"
        );
        Ok(info)
    }
}
