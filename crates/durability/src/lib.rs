//! Durability layer for vecdb
//!
//! This crate handles everything that touches disk for a single collection:
//!
//! - WAL: Segmented write-ahead log, one self-delimiting record per mutation
//! - Durability modes: Always, Standard (default)
//! - Snapshot creation and loading (crash-safe, CRC-protected, columnar)
//! - Torn-tail detection and repair for crash recovery
//!
//! The crate is payload-agnostic: WAL payloads and snapshot columns are opaque
//! bytes encoded by the engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod disk_snapshot;
pub mod format;
pub mod wal;

pub use disk_snapshot::{
    LoadedSection, LoadedSnapshot, SnapshotInfo, SnapshotReadError, SnapshotReader,
    SnapshotSection, SnapshotWriter,
};
pub use format::{
    column_tags, decode_f32_column, encode_f32_column, find_latest_snapshot, list_segments,
    list_snapshots, parse_segment_number, parse_snapshot_id, snapshot_path, SectionHeader,
    SegmentHeader, SnapshotHeader, SnapshotHeaderError, WalRecord, WalRecordError, WalSegment,
    SEGMENT_FORMAT_VERSION, SEGMENT_HEADER_SIZE, SEGMENT_MAGIC, SNAPSHOT_FORMAT_VERSION,
    SNAPSHOT_HEADER_SIZE, SNAPSHOT_MAGIC, WAL_RECORD_FORMAT_VERSION,
};
pub use wal::{
    now_micros, repair_tail, DurabilityMode, ReadStopReason, TruncateInfo, WalConfig,
    WalConfigError, WalCounters, WalReadResult, WalReader, WalReaderError, WalWriter,
};
