//! Snapshot reader for recovery
//!
//! Loads a snapshot file and verifies its header and footer CRC before any
//! section is returned.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::format::snapshot::{
    column_tags, SectionHeader, SnapshotHeader, SnapshotHeaderError, SNAPSHOT_HEADER_SIZE,
};

/// Snapshot reader for recovery
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotReader;

impl SnapshotReader {
    /// Create a new snapshot reader
    pub fn new() -> Self {
        SnapshotReader
    }

    /// Load a snapshot from file
    ///
    /// Validates magic bytes, format version and the footer CRC, then
    /// splits the body into sections.
    pub fn load(&self, path: &Path) -> Result<LoadedSnapshot, SnapshotReadError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len() as usize;

        if file_size < SNAPSHOT_HEADER_SIZE + 4 {
            return Err(SnapshotReadError::FileTooSmall { size: file_size });
        }

        let mut reader = BufReader::new(file);

        let mut header_bytes = [0u8; SNAPSHOT_HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;
        let header = SnapshotHeader::from_bytes(&header_bytes);
        header.validate()?;

        let mut remaining = Vec::with_capacity(file_size - SNAPSHOT_HEADER_SIZE);
        reader.read_to_end(&mut remaining)?;
        if remaining.len() < 4 {
            return Err(SnapshotReadError::FileTooSmall { size: file_size });
        }

        let body_len = remaining.len() - 4;
        let stored_crc = LittleEndian::read_u32(&remaining[body_len..]);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_bytes);
        hasher.update(&remaining[..body_len]);
        let computed_crc = hasher.finalize();

        if stored_crc != computed_crc {
            return Err(SnapshotReadError::CrcMismatch {
                stored: stored_crc,
                computed: computed_crc,
            });
        }

        remaining.truncate(body_len);
        let sections = parse_sections(&remaining)?;

        Ok(LoadedSnapshot {
            header,
            sections,
            crc: stored_crc,
        })
    }
}

/// Split the CRC-verified body into sections
fn parse_sections(data: &[u8]) -> Result<Vec<LoadedSection>, SnapshotReadError> {
    let mut sections = Vec::new();
    let mut cursor = 0;

    while cursor < data.len() {
        if cursor + SectionHeader::SIZE > data.len() {
            return Err(SnapshotReadError::SectionDataTruncated {
                tag: 0,
                expected: SectionHeader::SIZE,
                available: data.len() - cursor,
            });
        }

        let mut section_header_bytes = [0u8; SectionHeader::SIZE];
        section_header_bytes.copy_from_slice(&data[cursor..cursor + SectionHeader::SIZE]);
        let section_header = SectionHeader::from_bytes(&section_header_bytes);
        cursor += SectionHeader::SIZE;

        if !column_tags::ALL.contains(&section_header.tag) {
            return Err(SnapshotReadError::UnknownSection {
                tag: section_header.tag,
            });
        }

        let data_len = section_header.data_len as usize;
        if data_len > data.len() - cursor {
            return Err(SnapshotReadError::SectionDataTruncated {
                tag: section_header.tag,
                expected: data_len,
                available: data.len() - cursor,
            });
        }

        sections.push(LoadedSection {
            tag: section_header.tag,
            data: data[cursor..cursor + data_len].to_vec(),
        });
        cursor += data_len;
    }

    Ok(sections)
}

/// Loaded snapshot data
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    /// Snapshot header
    pub header: SnapshotHeader,
    /// Loaded sections, in file order
    pub sections: Vec<LoadedSection>,
    /// CRC32 checksum
    pub crc: u32,
}

impl LoadedSnapshot {
    /// Get the snapshot ID
    pub fn snapshot_id(&self) -> u64 {
        self.header.snapshot_id
    }

    /// Get the watermark LSN
    pub fn watermark_lsn(&self) -> u64 {
        self.header.watermark_lsn
    }

    /// Get the number of records
    pub fn record_count(&self) -> u64 {
        self.header.record_count
    }

    /// Get the vector dimension (0 for an empty collection)
    pub fn dimension(&self) -> u32 {
        self.header.dimension
    }

    /// Find a section by column tag
    pub fn find_section(&self, tag: u8) -> Option<&LoadedSection> {
        self.sections.iter().find(|s| s.tag == tag)
    }

    /// Take a section's data out of the snapshot
    pub fn take_section(&mut self, tag: u8) -> Option<Vec<u8>> {
        let idx = self.sections.iter().position(|s| s.tag == tag)?;
        Some(self.sections.swap_remove(idx).data)
    }
}

/// Loaded section from snapshot
#[derive(Debug, Clone)]
pub struct LoadedSection {
    /// Column tag
    pub tag: u8,
    /// Section data
    pub data: Vec<u8>,
}

impl LoadedSection {
    /// Get the column name
    pub fn column_name(&self) -> &'static str {
        column_tags::name(self.tag)
    }
}

/// Errors that can occur when reading a snapshot
#[derive(Debug, thiserror::Error)]
pub enum SnapshotReadError {
    /// File is too small to be a valid snapshot
    #[error("Snapshot file too small: {size} bytes")]
    FileTooSmall {
        /// Actual file size
        size: usize,
    },
    /// Header failed validation
    #[error("Invalid snapshot header: {0}")]
    Header(#[from] SnapshotHeaderError),
    /// Footer CRC does not match the contents
    #[error("CRC mismatch: stored {stored:08x}, computed {computed:08x}")]
    CrcMismatch {
        /// CRC stored in the footer
        stored: u32,
        /// CRC computed over the file
        computed: u32,
    },
    /// Section tag is not a known column
    #[error("Unknown snapshot section tag: {tag}")]
    UnknownSection {
        /// Tag found in the file
        tag: u8,
    },
    /// Section data extends past the end of the file
    #[error("Section {tag} truncated: expected {expected} bytes, {available} available")]
    SectionDataTruncated {
        /// Column tag
        tag: u8,
        /// Declared length
        expected: usize,
        /// Bytes left in the file
        available: usize,
    },
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
