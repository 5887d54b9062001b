//! Snapshot file format
//!
//! Snapshots are named `snap-NNNNNN.chk` where NNNNNN is zero-padded.
//! Each snapshot has a 64-byte header followed by column sections.
//!
//! # File Structure
//!
//! ```text
//! +------------------+ 0
//! | SnapshotHeader   | 64 bytes
//! +------------------+ 64
//! | Section 1        | SectionHeader + data
//! +------------------+
//! | Section 2        | SectionHeader + data
//! +------------------+
//! | ...              |
//! +------------------+
//! | Footer CRC32     | 4 bytes
//! +------------------+
//! ```
//!
//! The footer covers every byte before it, header included.

use byteorder::{ByteOrder, LittleEndian};
use std::path::{Path, PathBuf};

/// Magic bytes: "VSNP"
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"VSNP";

/// Snapshot format version for forward compatibility
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Snapshot header size in bytes
pub const SNAPSHOT_HEADER_SIZE: usize = 64;

/// Snapshot header (64 bytes)
///
/// The header carries what recovery needs before touching the sections:
/// the WAL watermark and the shape of the columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Magic bytes: "VSNP"
    pub magic: [u8; 4],
    /// Format version for forward compatibility
    pub format_version: u32,
    /// Snapshot identifier (monotonically increasing)
    pub snapshot_id: u64,
    /// Watermark LSN (every record with lsn <= this is included)
    pub watermark_lsn: u64,
    /// Creation timestamp (microseconds since epoch)
    pub created_at: u64,
    /// Number of records in the snapshot
    pub record_count: u64,
    /// Vector dimension (0 when the collection has no records yet)
    pub dimension: u32,
    /// Reserved for future use
    pub reserved: [u8; 20],
}

impl SnapshotHeader {
    /// Create a new snapshot header
    pub fn new(
        snapshot_id: u64,
        watermark_lsn: u64,
        created_at: u64,
        record_count: u64,
        dimension: u32,
    ) -> Self {
        SnapshotHeader {
            magic: SNAPSHOT_MAGIC,
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot_id,
            watermark_lsn,
            created_at,
            record_count,
            dimension,
            reserved: [0u8; 20],
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; SNAPSHOT_HEADER_SIZE] {
        let mut bytes = [0u8; SNAPSHOT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        LittleEndian::write_u32(&mut bytes[4..8], self.format_version);
        LittleEndian::write_u64(&mut bytes[8..16], self.snapshot_id);
        LittleEndian::write_u64(&mut bytes[16..24], self.watermark_lsn);
        LittleEndian::write_u64(&mut bytes[24..32], self.created_at);
        LittleEndian::write_u64(&mut bytes[32..40], self.record_count);
        LittleEndian::write_u32(&mut bytes[40..44], self.dimension);
        bytes[44..64].copy_from_slice(&self.reserved);
        bytes
    }

    /// Parse header from bytes
    pub fn from_bytes(bytes: &[u8; SNAPSHOT_HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut reserved = [0u8; 20];
        reserved.copy_from_slice(&bytes[44..64]);
        SnapshotHeader {
            magic,
            format_version: LittleEndian::read_u32(&bytes[4..8]),
            snapshot_id: LittleEndian::read_u64(&bytes[8..16]),
            watermark_lsn: LittleEndian::read_u64(&bytes[16..24]),
            created_at: LittleEndian::read_u64(&bytes[24..32]),
            record_count: LittleEndian::read_u64(&bytes[32..40]),
            dimension: LittleEndian::read_u32(&bytes[40..44]),
            reserved,
        }
    }

    /// Validate the header
    pub fn validate(&self) -> Result<(), SnapshotHeaderError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotHeaderError::InvalidMagic {
                expected: SNAPSHOT_MAGIC,
                actual: self.magic,
            });
        }
        if self.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotHeaderError::UnsupportedVersion {
                version: self.format_version,
                max_supported: SNAPSHOT_FORMAT_VERSION,
            });
        }
        Ok(())
    }
}

/// Errors that can occur when validating a snapshot header
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotHeaderError {
    /// Invalid magic bytes
    #[error("Invalid magic bytes: expected {expected:?}, got {actual:?}")]
    InvalidMagic {
        /// Expected magic bytes
        expected: [u8; 4],
        /// Actual magic bytes found
        actual: [u8; 4],
    },
    /// Unsupported format version
    #[error("Unsupported snapshot version {version}, max supported is {max_supported}")]
    UnsupportedVersion {
        /// Version found in the file
        version: u32,
        /// Maximum supported version
        max_supported: u32,
    },
}

/// Section header, one per column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Column tag (see `column_tags` module)
    pub tag: u8,
    /// Section data length in bytes
    pub data_len: u64,
}

impl SectionHeader {
    /// Section header size in bytes
    pub const SIZE: usize = 9;

    /// Create a new section header
    pub fn new(tag: u8, data_len: u64) -> Self {
        SectionHeader { tag, data_len }
    }

    /// Serialize section header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.tag;
        LittleEndian::write_u64(&mut bytes[1..9], self.data_len);
        bytes
    }

    /// Parse section header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        SectionHeader {
            tag: bytes[0],
            data_len: LittleEndian::read_u64(&bytes[1..9]),
        }
    }
}

/// Column tags for snapshot sections
pub mod column_tags {
    /// Record ids
    pub const IDS: u8 = 0x01;
    /// Vectors, packed little-endian f32
    pub const VECTORS: u8 = 0x02;
    /// Optional documents
    pub const DOCUMENTS: u8 = 0x03;
    /// Metadata maps
    pub const METADATA: u8 = 0x04;

    /// Get the name of a column tag
    pub fn name(tag: u8) -> &'static str {
        match tag {
            IDS => "ids",
            VECTORS => "vectors",
            DOCUMENTS => "documents",
            METADATA => "metadata",
            _ => "unknown",
        }
    }

    /// All known column tags, in file order
    pub const ALL: [u8; 4] = [IDS, VECTORS, DOCUMENTS, METADATA];
}

/// Pack a slice of f32 into little-endian bytes
pub fn encode_f32_column(values: &[f32]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len() * 4];
    LittleEndian::write_f32_into(values, &mut bytes);
    bytes
}

/// Unpack little-endian bytes into f32 values
///
/// Returns `None` if the byte length is not a multiple of 4.
pub fn decode_f32_column(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    let mut values = vec![0f32; bytes.len() / 4];
    LittleEndian::read_f32_into(bytes, &mut values);
    Some(values)
}

/// Generate snapshot file path
pub fn snapshot_path(dir: &Path, snapshot_id: u64) -> PathBuf {
    dir.join(format!("snap-{:06}.chk", snapshot_id))
}

/// Parse snapshot ID from a file name like `snap-000003.chk`
pub fn parse_snapshot_id(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("snap-")?
        .strip_suffix(".chk")?
        .parse()
        .ok()
}

/// List snapshot IDs in a directory, sorted ascending
pub fn list_snapshots(dir: &Path) -> std::io::Result<Vec<u64>> {
    let mut ids = Vec::new();
    if !dir.exists() {
        return Ok(ids);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(id) = parse_snapshot_id(&entry.file_name().to_string_lossy()) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Find the latest snapshot in a directory
pub fn find_latest_snapshot(dir: &Path) -> std::io::Result<Option<(u64, PathBuf)>> {
    Ok(list_snapshots(dir)?
        .last()
        .map(|&id| (id, snapshot_path(dir, id))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_header_roundtrip() {
        let header = SnapshotHeader::new(7, 1234, 99, 10, 384);
        let parsed = SnapshotHeader::from_bytes(&header.to_bytes());
        assert_eq!(parsed, header);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_header_invalid_magic() {
        let mut bytes = SnapshotHeader::new(1, 0, 0, 0, 0).to_bytes();
        bytes[0..4].copy_from_slice(b"SNAP");
        let header = SnapshotHeader::from_bytes(&bytes);
        assert!(matches!(
            header.validate(),
            Err(SnapshotHeaderError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn test_header_future_version() {
        let mut header = SnapshotHeader::new(1, 0, 0, 0, 0);
        header.format_version = SNAPSHOT_FORMAT_VERSION + 1;
        assert!(matches!(
            header.validate(),
            Err(SnapshotHeaderError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_section_header() {
        let section = SectionHeader::new(column_tags::VECTORS, 4096);
        let parsed = SectionHeader::from_bytes(&section.to_bytes());
        assert_eq!(parsed, section);
        assert_eq!(column_tags::name(parsed.tag), "vectors");
    }

    #[test]
    fn test_f32_column() {
        let values = vec![1.0f32, -2.5, 0.0, f32::MIN_POSITIVE];
        let bytes = encode_f32_column(&values);
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode_f32_column(&bytes), Some(values));
        assert_eq!(decode_f32_column(&bytes[..5]), None);
    }

    #[test]
    fn test_snapshot_listing() {
        let dir = tempdir().unwrap();
        assert!(find_latest_snapshot(dir.path()).unwrap().is_none());

        for id in [3, 1, 12] {
            std::fs::write(snapshot_path(dir.path(), id), b"x").unwrap();
        }
        std::fs::write(dir.path().join(".snap-000013.tmp"), b"x").unwrap();

        assert_eq!(list_snapshots(dir.path()).unwrap(), vec![1, 3, 12]);
        let (id, path) = find_latest_snapshot(dir.path()).unwrap().unwrap();
        assert_eq!(id, 12);
        assert!(path.ends_with("snap-000012.chk"));
    }
}
