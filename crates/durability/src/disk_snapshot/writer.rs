//! Crash-safe snapshot writer
//!
//! Uses write-fsync-rename pattern for atomic snapshot creation.
//!
//! # Crash Safety
//!
//! 1. Write to temporary file (.snap-NNNNNN.tmp)
//! 2. fsync the temporary file
//! 3. Atomic rename to final path (snap-NNNNNN.chk)
//! 4. fsync the parent directory
//!
//! Either the complete snapshot is visible or none of it is.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::format::snapshot::{list_snapshots, snapshot_path, SectionHeader, SnapshotHeader};
use crate::wal::now_micros;

/// Snapshot writer with crash-safe semantics
pub struct SnapshotWriter {
    snapshots_dir: PathBuf,
}

impl SnapshotWriter {
    /// Create a new snapshot writer
    ///
    /// Creates the snapshots directory if it doesn't exist.
    pub fn new(snapshots_dir: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&snapshots_dir)?;
        Ok(SnapshotWriter { snapshots_dir })
    }

    /// Get the snapshots directory
    pub fn snapshots_dir(&self) -> &Path {
        &self.snapshots_dir
    }

    fn temp_path(&self, snapshot_id: u64) -> PathBuf {
        self.snapshots_dir
            .join(format!(".snap-{:06}.tmp", snapshot_id))
    }

    /// Create a snapshot using the crash-safe write pattern
    ///
    /// `cancel` is polled between sections. When it is set the temporary
    /// file is removed and an `Interrupted` error is returned; no snapshot
    /// becomes visible.
    pub fn create_snapshot(
        &self,
        snapshot_id: u64,
        watermark_lsn: u64,
        dimension: u32,
        record_count: u64,
        sections: &[SnapshotSection],
        cancel: &AtomicBool,
    ) -> io::Result<SnapshotInfo> {
        let temp_path = self.temp_path(snapshot_id);
        match self.write_temp(
            &temp_path,
            snapshot_id,
            watermark_lsn,
            dimension,
            record_count,
            sections,
            cancel,
        ) {
            Ok((created_at, crc)) => {
                let final_path = snapshot_path(&self.snapshots_dir, snapshot_id);
                std::fs::rename(&temp_path, &final_path)?;
                File::open(&self.snapshots_dir)?.sync_all()?;

                Ok(SnapshotInfo {
                    snapshot_id,
                    watermark_lsn,
                    record_count,
                    timestamp: created_at,
                    path: final_path,
                    crc,
                })
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_temp(
        &self,
        temp_path: &Path,
        snapshot_id: u64,
        watermark_lsn: u64,
        dimension: u32,
        record_count: u64,
        sections: &[SnapshotSection],
        cancel: &AtomicBool,
    ) -> io::Result<(u64, u32)> {
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(temp_path)?;
        let mut out = BufWriter::new(file);
        let mut hasher = crc32fast::Hasher::new();

        let created_at = now_micros();
        let header = SnapshotHeader::new(
            snapshot_id,
            watermark_lsn,
            created_at,
            record_count,
            dimension,
        );
        let header_bytes = header.to_bytes();
        out.write_all(&header_bytes)?;
        hasher.update(&header_bytes);

        for section in sections {
            if cancel.load(Ordering::Acquire) {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "snapshot cancelled",
                ));
            }
            let section_header = SectionHeader::new(section.tag, section.data.len() as u64);
            let section_header_bytes = section_header.to_bytes();
            out.write_all(&section_header_bytes)?;
            out.write_all(&section.data)?;
            hasher.update(&section_header_bytes);
            hasher.update(&section.data);
        }

        let crc = hasher.finalize();
        out.write_all(&crc.to_le_bytes())?;

        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok((created_at, crc))
    }

    /// Delete every snapshot with an id below `snapshot_id`.
    ///
    /// Returns how many files were removed.
    pub fn remove_snapshots_before(&self, snapshot_id: u64) -> io::Result<usize> {
        let mut removed = 0;
        for id in list_snapshots(&self.snapshots_dir)? {
            if id >= snapshot_id {
                break;
            }
            std::fs::remove_file(snapshot_path(&self.snapshots_dir, id))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Clean up incomplete temporary files
    ///
    /// Called during recovery to remove temporary snapshot files left
    /// behind by crashes.
    pub fn cleanup_temp_files(&self) -> io::Result<usize> {
        let mut count = 0;

        if !self.snapshots_dir.exists() {
            return Ok(0);
        }

        for entry in std::fs::read_dir(&self.snapshots_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(".snap-") && name.ends_with(".tmp") {
                std::fs::remove_file(entry.path())?;
                count += 1;
            }
        }

        Ok(count)
    }
}

/// One column of a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotSection {
    /// Column tag (from `column_tags`)
    pub tag: u8,
    /// Encoded column data
    pub data: Vec<u8>,
}

impl SnapshotSection {
    /// Create a new snapshot section
    pub fn new(tag: u8, data: Vec<u8>) -> Self {
        SnapshotSection { tag, data }
    }
}

/// Information about a created snapshot
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    /// Snapshot identifier
    pub snapshot_id: u64,
    /// Watermark LSN (every record with lsn <= this is included)
    pub watermark_lsn: u64,
    /// Number of records written
    pub record_count: u64,
    /// Creation timestamp (microseconds since epoch)
    pub timestamp: u64,
    /// Path to the snapshot file
    pub path: PathBuf,
    /// CRC32 checksum of the snapshot contents
    pub crc: u32,
}
