//! WAL writer with durability mode support.
//!
//! The writer appends records to the active segment, rotates segments when
//! they fill up, and fsyncs according to the configured mode.
//!
//! An append either lands whole or leaves no bytes behind: a failed write or
//! fsync cuts the segment back to where the record started. If that cut
//! itself fails the writer is poisoned and refuses every later append, since
//! the segment may now hold a record that was never acknowledged.

use super::DurabilityMode;
use crate::format::{list_segments, WalRecord, WalSegment, SEGMENT_HEADER_SIZE};
use crate::wal::config::WalConfig;
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Cumulative WAL operation counters.
///
/// Accumulated over the lifetime of the writer and never reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalCounters {
    /// Total WAL record appends
    pub wal_appends: u64,
    /// Total fsync calls
    pub sync_calls: u64,
    /// Total bytes written to WAL segments
    pub bytes_written: u64,
    /// Total nanoseconds spent in fsync
    pub sync_nanos: u64,
    /// Total segment rotations
    pub rotations: u64,
}

/// WAL writer for a single collection.
///
/// # Durability Modes
///
/// - `Always`: fsync after every record
/// - `Standard`: fsync when the batch, interval or byte threshold is reached
///
/// # Segment Rotation
///
/// When the active segment would exceed the configured size limit, the
/// writer closes it and continues in a new segment. Closed segments are
/// immutable and are deleted once a snapshot covers them.
pub struct WalWriter {
    /// Active segment
    segment: WalSegment,

    durability: DurabilityMode,

    wal_dir: PathBuf,

    /// Collection UUID stamped into every segment header
    collection_uuid: [u8; 16],

    config: WalConfig,

    /// Bytes written since last fsync (for Standard mode)
    bytes_since_sync: u64,

    /// Writes since last fsync (for Standard mode)
    writes_since_sync: usize,

    /// Last fsync time (for Standard mode)
    last_sync_time: Instant,

    /// Whether there is data written but not yet fsynced
    has_unsynced_data: bool,

    counters: WalCounters,

    /// Set when a rollback failed; the segment tail is then unknown
    poisoned: Option<String>,

    #[cfg(test)]
    faults: Faults,
}

/// Failures the tests can inject into the next append.
#[cfg(test)]
#[derive(Debug, Default)]
struct Faults {
    tear_next_write: bool,
    fail_next_sync: bool,
    fail_rollback: bool,
}

#[cfg(test)]
fn injected(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {} failure", what))
}

impl WalWriter {
    /// Open a WAL writer.
    ///
    /// Appends to the highest-numbered existing segment, or creates segment 1
    /// in an empty directory. Recovery must have repaired any torn tail
    /// before this is called.
    pub fn open(
        wal_dir: PathBuf,
        collection_uuid: [u8; 16],
        durability: DurabilityMode,
        config: WalConfig,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(&wal_dir)?;

        let segment = match list_segments(&wal_dir)?.last().copied() {
            Some(num) => match WalSegment::reopen_tail(&wal_dir, num, collection_uuid) {
                Ok(seg) => seg,
                Err(e) => {
                    warn!(
                        target: "vecdb::wal",
                        segment = num,
                        error = %e,
                        "Cannot append to last WAL segment, starting a new one"
                    );
                    WalSegment::create(&wal_dir, num + 1, collection_uuid)?
                }
            },
            None => WalSegment::create(&wal_dir, 1, collection_uuid)?,
        };

        debug!(
            target: "vecdb::wal",
            dir = %wal_dir.display(),
            segment = segment.segment_number(),
            mode = durability.description(),
            "WAL writer opened"
        );

        Ok(WalWriter {
            segment,
            durability,
            wal_dir,
            collection_uuid,
            config,
            bytes_since_sync: 0,
            writes_since_sync: 0,
            last_sync_time: Instant::now(),
            has_unsynced_data: false,
            counters: WalCounters::default(),
            poisoned: None,
            #[cfg(test)]
            faults: Faults::default(),
        })
    }

    /// Append a record to the WAL.
    ///
    /// The record is written to the segment before this returns. With
    /// `Always` it is also fsynced; with `Standard` the fsync happens once a
    /// threshold is reached. On error the segment holds no part of the record.
    pub fn append(&mut self, record: &WalRecord) -> io::Result<()> {
        if let Some(cause) = &self.poisoned {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("WAL writer disabled after a failed rollback: {}", cause),
            ));
        }

        let record_bytes = record.to_bytes();
        let has_records = self.segment.size() > SEGMENT_HEADER_SIZE as u64;
        if has_records
            && self
                .config
                .must_rotate(self.segment.size(), record_bytes.len() as u64)
        {
            self.rotate_segment()?;
        }

        let start = self.segment.size();
        let pending = (self.bytes_since_sync, self.writes_since_sync);
        if let Err(e) = self.write_and_sync(&record_bytes) {
            self.roll_back(start, pending, &e);
            return Err(e);
        }

        self.counters.wal_appends += 1;
        self.counters.bytes_written += record_bytes.len() as u64;
        Ok(())
    }

    fn write_and_sync(&mut self, record_bytes: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        {
            if std::mem::take(&mut self.faults.tear_next_write) {
                self.segment.append(&record_bytes[..record_bytes.len() / 2])?;
                return Err(injected("write"));
            }
        }

        self.segment.append(record_bytes)?;
        self.bytes_since_sync += record_bytes.len() as u64;
        self.writes_since_sync += 1;
        self.has_unsynced_data = true;

        self.maybe_sync()
    }

    /// Cut the segment back to `start` after a failed append.
    fn roll_back(&mut self, start: u64, pending: (u64, usize), cause: &io::Error) {
        match self.truncate_segment(start) {
            Ok(()) => {
                (self.bytes_since_sync, self.writes_since_sync) = pending;
                warn!(
                    target: "vecdb::wal",
                    segment = self.segment.segment_number(),
                    offset = start,
                    error = %cause,
                    "WAL append failed, segment rolled back"
                );
            }
            Err(e) => {
                error!(
                    target: "vecdb::wal",
                    segment = self.segment.segment_number(),
                    offset = start,
                    error = %e,
                    "WAL rollback failed, writer disabled"
                );
                self.poisoned = Some(e.to_string());
            }
        }
    }

    fn truncate_segment(&mut self, len: u64) -> io::Result<()> {
        #[cfg(test)]
        {
            if self.faults.fail_rollback {
                return Err(injected("rollback"));
            }
        }
        self.segment.truncate_to(len)
    }

    /// Handle fsync based on durability mode.
    fn maybe_sync(&mut self) -> io::Result<()> {
        let due = match self.durability {
            DurabilityMode::Always => true,
            DurabilityMode::Standard {
                interval_ms,
                batch_size,
            } => {
                self.writes_since_sync >= batch_size
                    || self.config.sync_due(self.bytes_since_sync)
                    || self.last_sync_time.elapsed().as_millis() as u64 >= interval_ms
            }
        };

        if due {
            self.sync_segment()?;
        }
        Ok(())
    }

    fn sync_segment(&mut self) -> io::Result<()> {
        #[cfg(test)]
        {
            if std::mem::take(&mut self.faults.fail_next_sync) {
                return Err(injected("fsync"));
            }
        }

        let start = Instant::now();
        self.segment.sync()?;
        self.counters.sync_calls += 1;
        self.counters.sync_nanos += start.elapsed().as_nanos() as u64;
        self.reset_sync_counters();
        Ok(())
    }

    fn reset_sync_counters(&mut self) {
        self.bytes_since_sync = 0;
        self.writes_since_sync = 0;
        self.last_sync_time = Instant::now();
        self.has_unsynced_data = false;
    }

    /// Rotate to a new segment.
    ///
    /// Closes (and fsyncs) the active segment and creates the next one.
    /// Returns the new segment number; every record appended before this call
    /// lives in a lower-numbered segment.
    pub fn rotate_segment(&mut self) -> io::Result<u64> {
        self.segment.seal()?;

        let next = self.segment.segment_number() + 1;
        self.segment = WalSegment::create(&self.wal_dir, next, self.collection_uuid)?;
        self.counters.rotations += 1;
        self.reset_sync_counters();

        debug!(target: "vecdb::wal", segment = next, "Rotated WAL segment");
        Ok(next)
    }

    /// Force any written data to disk regardless of mode.
    pub fn flush(&mut self) -> io::Result<()> {
        self.sync_segment()
    }

    /// Sync if the Standard interval has elapsed and there is unsynced data.
    ///
    /// Returns `true` if a sync was performed.
    pub fn sync_if_overdue(&mut self) -> io::Result<bool> {
        if !self.has_unsynced_data {
            return Ok(false);
        }

        if let DurabilityMode::Standard { interval_ms, .. } = self.durability {
            if self.last_sync_time.elapsed().as_millis() as u64 >= interval_ms {
                self.sync_segment()?;
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Delete every segment numbered below `segment_number`.
    ///
    /// Called after a snapshot makes those segments redundant. The active
    /// segment is never deleted. Returns how many files were removed.
    pub fn remove_segments_before(&self, segment_number: u64) -> io::Result<usize> {
        let limit = segment_number.min(self.segment.segment_number());
        let mut removed = 0;
        for num in list_segments(&self.wal_dir)? {
            if num >= limit {
                break;
            }
            std::fs::remove_file(WalSegment::segment_path(&self.wal_dir, num))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Total size in bytes of every segment file in the WAL directory.
    pub fn total_size(&self) -> io::Result<u64> {
        let mut total = 0;
        for num in list_segments(&self.wal_dir)? {
            if num == self.segment.segment_number() {
                total += self.segment.size();
            } else {
                total += std::fs::metadata(WalSegment::segment_path(&self.wal_dir, num))?.len();
            }
        }
        Ok(total)
    }

    /// Get the active segment number.
    pub fn current_segment(&self) -> u64 {
        self.segment.segment_number()
    }

    /// Get the active segment size in bytes.
    pub fn current_segment_size(&self) -> u64 {
        self.segment.size()
    }

    /// Get a snapshot of cumulative WAL counters.
    pub fn counters(&self) -> WalCounters {
        self.counters.clone()
    }

    /// Close the writer, ensuring all data is flushed.
    pub fn close(mut self) -> io::Result<()> {
        self.flush()?;
        self.segment.seal()
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if self.has_unsynced_data && self.poisoned.is_none() {
            let _ = self.segment.sync();
        }
    }
}
