//! WAL segment files and record framing.
//!
//! WAL segments are named `wal-NNNNNN.seg` where `NNNNNN` is a zero-padded segment number.
//!
//! # Segment Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Segment Header (32 bytes)          │
//! ├────────────────────────────────────┤
//! │ Record 1                           │
//! ├────────────────────────────────────┤
//! │ Record 2                           │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1)   │ Payload (variable)      │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────────────────┴──────────┘
//!
//! Payload:
//! ┌──────────────┬──────────────┬──────────────────────────────┐
//! │ LSN (8)      │ Timestamp (8)│ Entry bytes (variable)       │
//! └──────────────┴──────────────┴──────────────────────────────┘
//! ```
//!
//! The length prefix plus CRC makes every record self-delimiting, which is how
//! a torn trailing write is told apart from a complete record.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes identifying a WAL segment file: "VWAL"
pub const SEGMENT_MAGIC: [u8; 4] = *b"VWAL";

/// Current segment format version
pub const SEGMENT_FORMAT_VERSION: u32 = 1;

/// Size of segment header in bytes
pub const SEGMENT_HEADER_SIZE: usize = 32;

/// Current WAL record format version
pub const WAL_RECORD_FORMAT_VERSION: u8 = 1;

/// Fixed payload prefix: version (1) + lsn (8) + timestamp (8)
const RECORD_PREFIX_SIZE: usize = 17;

/// Upper bound on a single record, used to reject garbage length prefixes
pub(crate) const MAX_RECORD_SIZE: usize = 256 * 1024 * 1024;

/// Header stamped at the start of every segment (32 bytes).
///
/// ```text
/// magic "VWAL" (4) | format version u32 (4) | segment number u64 (8) | collection uuid (16)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Position of the segment in its collection's log
    pub segment_number: u64,

    /// Identity of the collection that owns the log
    pub collection_uuid: [u8; 16],
}

impl SegmentHeader {
    /// Header for segment `segment_number` of the given collection.
    pub fn new(segment_number: u64, collection_uuid: [u8; 16]) -> Self {
        SegmentHeader {
            segment_number,
            collection_uuid,
        }
    }

    /// Encode with the current magic and format version.
    pub fn encode(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; SEGMENT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&SEGMENT_MAGIC);
        LittleEndian::write_u32(&mut bytes[4..8], SEGMENT_FORMAT_VERSION);
        LittleEndian::write_u64(&mut bytes[8..16], self.segment_number);
        bytes[16..32].copy_from_slice(&self.collection_uuid);
        bytes
    }

    /// Decode a header, or `None` if the bytes are short, carry the wrong
    /// magic, or come from a newer format.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SEGMENT_HEADER_SIZE || bytes[0..4] != SEGMENT_MAGIC {
            return None;
        }
        if LittleEndian::read_u32(&bytes[4..8]) > SEGMENT_FORMAT_VERSION {
            return None;
        }
        let mut collection_uuid = [0u8; 16];
        collection_uuid.copy_from_slice(&bytes[16..32]);
        Some(SegmentHeader {
            segment_number: LittleEndian::read_u64(&bytes[8..16]),
            collection_uuid,
        })
    }
}

fn invalid_data(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

/// Read and check the header of segment `segment_number`.
fn read_header(file: &mut File, segment_number: u64) -> std::io::Result<SegmentHeader> {
    let mut bytes = [0u8; SEGMENT_HEADER_SIZE];
    file.read_exact(&mut bytes)?;
    let header = SegmentHeader::decode(&bytes)
        .ok_or_else(|| invalid_data(format!("WAL segment {} has no valid header", segment_number)))?;
    if header.segment_number != segment_number {
        return Err(invalid_data(format!(
            "WAL segment file {} claims to be segment {}",
            segment_number, header.segment_number
        )));
    }
    Ok(header)
}

/// The tail segment of a collection's WAL, open for appends.
///
/// Only the tail accepts writes. Once [`seal`](Self::seal)ed the handle
/// refuses further appends and the file is never modified again except by
/// deletion after a snapshot covers it.
pub struct WalSegment {
    file: File,
    segment_number: u64,
    /// Bytes of the file that hold acknowledged data, header included
    len: u64,
    sealed: bool,
}

impl WalSegment {
    /// Start segment `segment_number` for a collection and fsync its header.
    pub fn create(
        dir: &Path,
        segment_number: u64,
        collection_uuid: [u8; 16],
    ) -> std::io::Result<Self> {
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(Self::segment_path(dir, segment_number))?;
        file.write_all(&SegmentHeader::new(segment_number, collection_uuid).encode())?;
        file.sync_all()?;

        Ok(WalSegment {
            file,
            segment_number,
            len: SEGMENT_HEADER_SIZE as u64,
            sealed: false,
        })
    }

    /// Reopen the tail segment after recovery has repaired it.
    ///
    /// Fails if the file belongs to another collection's log.
    pub fn reopen_tail(
        dir: &Path,
        segment_number: u64,
        collection_uuid: [u8; 16],
    ) -> std::io::Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(Self::segment_path(dir, segment_number))?;
        let header = read_header(&mut file, segment_number)?;
        if header.collection_uuid != collection_uuid {
            return Err(invalid_data(format!(
                "WAL segment {} belongs to another collection",
                segment_number
            )));
        }
        let len = file.seek(SeekFrom::End(0))?;

        Ok(WalSegment {
            file,
            segment_number,
            len,
            sealed: false,
        })
    }

    /// Header and record bytes of segment `segment_number`.
    pub fn read_body(dir: &Path, segment_number: u64) -> std::io::Result<(SegmentHeader, Vec<u8>)> {
        let mut file = File::open(Self::segment_path(dir, segment_number))?;
        let header = read_header(&mut file, segment_number)?;
        let mut body = Vec::new();
        file.read_to_end(&mut body)?;
        Ok((header, body))
    }

    /// Cut segment `segment_number` back to `len` bytes and fsync.
    ///
    /// Recovery uses this to drop a torn tail before the writer reopens.
    pub fn truncate_file(dir: &Path, segment_number: u64, len: u64) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(Self::segment_path(dir, segment_number))?;
        file.set_len(len)?;
        file.sync_all()
    }

    /// `wal-NNNNNN.seg` inside `dir`.
    pub fn segment_path(dir: &Path, segment_number: u64) -> PathBuf {
        dir.join(format!("wal-{:06}.seg", segment_number))
    }

    /// Position of this segment in the log.
    pub fn segment_number(&self) -> u64 {
        self.segment_number
    }

    /// Bytes of acknowledged data, header included.
    pub fn size(&self) -> u64 {
        self.len
    }

    /// Append framed record bytes.
    ///
    /// The acknowledged length only moves once every byte is written, so a
    /// failure leaves [`size`](Self::size) at the last good boundary and the
    /// caller can [`truncate_to`](Self::truncate_to) it.
    pub fn append(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        if self.sealed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("WAL segment {} is sealed", self.segment_number),
            ));
        }
        self.file.write_all(bytes)?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    /// Drop everything past `len` and position the next append there.
    pub fn truncate_to(&mut self, len: u64) -> std::io::Result<()> {
        self.file.set_len(len)?;
        self.file.seek(SeekFrom::Start(len))?;
        self.file.sync_data()?;
        self.len = len;
        Ok(())
    }

    /// Fsync appended records.
    pub fn sync(&mut self) -> std::io::Result<()> {
        self.file.sync_data()
    }

    /// Fsync and refuse further appends.
    pub fn seal(&mut self) -> std::io::Result<()> {
        if !self.sealed {
            self.file.sync_all()?;
            self.sealed = true;
        }
        Ok(())
    }
}

/// Parse segment number from a file name like `wal-000042.seg`.
pub fn parse_segment_number(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("wal-")?
        .strip_suffix(".seg")?
        .parse()
        .ok()
}

/// List all segment numbers in a WAL directory, sorted ascending.
pub fn list_segments(wal_dir: &Path) -> std::io::Result<Vec<u64>> {
    let mut segments = Vec::new();
    if !wal_dir.exists() {
        return Ok(segments);
    }
    for entry in std::fs::read_dir(wal_dir)? {
        let entry = entry?;
        if let Some(num) = parse_segment_number(&entry.file_name().to_string_lossy()) {
            segments.push(num);
        }
    }
    segments.sort_unstable();
    Ok(segments)
}

/// One WAL record: a single acknowledged mutation.
///
/// Each record is self-delimiting with a length prefix and CRC32 checksum.
/// Records are immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Log sequence number (assigned by the record store, strictly increasing)
    pub lsn: u64,

    /// Append timestamp (microseconds since epoch)
    pub timestamp: u64,

    /// Serialized entry (opaque to this crate)
    pub payload: Vec<u8>,
}

impl WalRecord {
    /// Create a new WAL record.
    pub fn new(lsn: u64, timestamp: u64, payload: Vec<u8>) -> Self {
        WalRecord {
            lsn,
            timestamp,
            payload,
        }
    }

    /// Serialize record to bytes.
    ///
    /// Format: length (4) + format_version (1) + lsn (8) + timestamp (8) + payload + crc32 (4)
    ///
    /// The length field contains the size of everything after it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(RECORD_PREFIX_SIZE + self.payload.len());
        body.push(WAL_RECORD_FORMAT_VERSION);
        body.extend_from_slice(&self.lsn.to_le_bytes());
        body.extend_from_slice(&self.timestamp.to_le_bytes());
        body.extend_from_slice(&self.payload);

        let crc = compute_crc(&body);

        let total_len = body.len() + 4;
        let mut record = Vec::with_capacity(4 + total_len);
        record.extend_from_slice(&(total_len as u32).to_le_bytes());
        record.extend_from_slice(&body);
        record.extend_from_slice(&crc.to_le_bytes());
        record
    }

    /// Deserialize record from bytes.
    ///
    /// Returns (record, bytes_consumed) on success.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), WalRecordError> {
        if bytes.len() < 4 {
            return Err(WalRecordError::InsufficientData);
        }

        let length = LittleEndian::read_u32(&bytes[0..4]) as usize;
        if length < RECORD_PREFIX_SIZE + 4 || length > MAX_RECORD_SIZE {
            return Err(WalRecordError::InvalidFormat);
        }
        if bytes.len() < 4 + length {
            return Err(WalRecordError::InsufficientData);
        }

        let body = &bytes[4..4 + length - 4];
        let stored_crc = LittleEndian::read_u32(&bytes[4 + length - 4..4 + length]);
        let computed_crc = compute_crc(body);
        if computed_crc != stored_crc {
            return Err(WalRecordError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        let format_version = body[0];
        if format_version != WAL_RECORD_FORMAT_VERSION {
            return Err(WalRecordError::UnsupportedVersion(format_version));
        }

        let record = WalRecord {
            lsn: LittleEndian::read_u64(&body[1..9]),
            timestamp: LittleEndian::read_u64(&body[9..17]),
            payload: body[RECORD_PREFIX_SIZE..].to_vec(),
        };

        Ok((record, 4 + length))
    }
}

/// Compute CRC32 checksum of data.
fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// WAL record parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalRecordError {
    /// Not enough data to parse record (torn write)
    #[error("Insufficient data to parse record")]
    InsufficientData,

    /// Record format is invalid
    #[error("Invalid record format")]
    InvalidFormat,

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Expected checksum from record
        expected: u32,
        /// Computed checksum
        computed: u32,
    },

    /// Unsupported format version
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),
}
