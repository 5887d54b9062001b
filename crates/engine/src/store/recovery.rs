//! Record store recovery
//!
//! 1. Remove snapshot temp files left by a crash mid-compaction
//! 2. Load the latest snapshot, if any
//! 3. Read every WAL segment; cut a torn tail off the last one
//! 4. Replay entries with `lsn > watermark` in log order, last write wins
//!
//! A torn tail is expected after a crash and never fails recovery. A damaged
//! snapshot does, because the segments it covered are already gone.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use vecdb_core::{Record, VectorError, VectorResult};
use vecdb_durability::{find_latest_snapshot, repair_tail, SnapshotReader, SnapshotWriter, WalReader};

use super::columns::decode_records;
use super::entry::WalEntry;

/// Statistics from recovering one collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Snapshot the state was loaded from
    pub snapshot_id: Option<u64>,
    /// Records loaded from the snapshot
    pub snapshot_records: usize,
    /// WAL entries replayed on top of the snapshot
    pub wal_records: usize,
    /// Bytes cut from a torn WAL tail
    pub truncated_bytes: u64,
    /// WAL records skipped because they failed validation
    pub skipped_corrupted: usize,
    /// Snapshot temp files removed
    pub temp_files_removed: usize,
}

/// State rebuilt from disk
#[derive(Debug, Default)]
pub(crate) struct RecoveredState {
    pub records: BTreeMap<String, Arc<Record>>,
    /// Highest LSN seen in the snapshot watermark or the WAL
    pub last_lsn: u64,
    pub snapshot_id: u64,
    pub stats: RecoveryStats,
}

pub(crate) fn recover(
    collection: &str,
    wal_dir: &Path,
    snapshots_dir: &Path,
) -> VectorResult<RecoveredState> {
    let mut state = RecoveredState::default();

    let snapshots = SnapshotWriter::new(snapshots_dir.to_path_buf())?;
    state.stats.temp_files_removed = snapshots.cleanup_temp_files()?;

    let mut watermark = 0;
    if let Some((snapshot_id, path)) = find_latest_snapshot(snapshots_dir)? {
        let snapshot = SnapshotReader::new().load(&path).map_err(|e| {
            VectorError::Corruption(format!("snapshot {}: {}", path.display(), e))
        })?;
        watermark = snapshot.watermark_lsn();

        let records = decode_records(snapshot)?;
        state.stats.snapshot_id = Some(snapshot_id);
        state.stats.snapshot_records = records.len();
        state.snapshot_id = snapshot_id;
        state
            .records
            .extend(records.into_iter().map(|r| (r.id.clone(), Arc::new(r))));
    }
    state.last_lsn = watermark;

    let result = WalReader::new()
        .read_all(wal_dir)
        .map_err(|e| VectorError::Corruption(e.to_string()))?;

    if let Some(info) = &result.truncate_info {
        warn!(
            target: "vecdb::recovery",
            collection,
            segment = info.segment_number,
            valid_end = info.valid_end,
            bytes = info.bytes_to_truncate(),
            reason = ?result.stop_reason,
            "Discarding torn WAL tail"
        );
        repair_tail(wal_dir, info)?;
        state.stats.truncated_bytes = info.bytes_to_truncate();
    }
    state.stats.skipped_corrupted = result.skipped_corrupted;

    for record in result.records {
        if record.lsn <= watermark {
            continue;
        }
        state.last_lsn = state.last_lsn.max(record.lsn);

        match WalEntry::from_bytes(&record.payload) {
            Ok(WalEntry::Put(r)) => {
                state.records.insert(r.id.clone(), Arc::new(r));
            }
            Ok(WalEntry::Delete { id }) => {
                state.records.remove(&id);
            }
            Err(e) => {
                warn!(
                    target: "vecdb::recovery",
                    collection,
                    lsn = record.lsn,
                    error = %e,
                    "Skipping undecodable WAL entry"
                );
                state.stats.skipped_corrupted += 1;
                continue;
            }
        }
        state.stats.wal_records += 1;
    }

    info!(
        target: "vecdb::recovery",
        collection,
        records = state.records.len(),
        snapshot_records = state.stats.snapshot_records,
        wal_records = state.stats.wal_records,
        truncated_bytes = state.stats.truncated_bytes,
        skipped = state.stats.skipped_corrupted,
        "Collection recovered"
    );

    Ok(state)
}
