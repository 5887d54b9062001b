//! Binary on-disk formats
//!
//! - `wal_record`: WAL segment header, segment file handle, record framing
//! - `snapshot`: snapshot header, column sections, file naming

pub mod snapshot;
pub mod wal_record;

pub use snapshot::{
    column_tags, decode_f32_column, encode_f32_column, find_latest_snapshot, list_snapshots,
    parse_snapshot_id, snapshot_path, SectionHeader, SnapshotHeader, SnapshotHeaderError,
    SNAPSHOT_FORMAT_VERSION, SNAPSHOT_HEADER_SIZE, SNAPSHOT_MAGIC,
};
pub use wal_record::{
    list_segments, parse_segment_number, SegmentHeader, WalRecord, WalRecordError, WalSegment,
    SEGMENT_FORMAT_VERSION, SEGMENT_HEADER_SIZE, SEGMENT_MAGIC, WAL_RECORD_FORMAT_VERSION,
};
