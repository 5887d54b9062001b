//! Crash-safe snapshot files
//!
//! A snapshot is the columnar image of a collection at a WAL watermark.
//! The writer publishes it atomically; the reader verifies the footer CRC
//! before handing back any section.

pub mod reader;
pub mod writer;

pub use reader::{LoadedSection, LoadedSnapshot, SnapshotReadError, SnapshotReader};
pub use writer::{SnapshotInfo, SnapshotSection, SnapshotWriter};
