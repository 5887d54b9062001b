//! WAL reader for recovery and replay.
//!
//! The reader walks segments in order and stops at the first record that
//! cannot be framed. A damaged record in the middle of a segment is skipped
//! when its length prefix is plausible; a damaged record at the end of the
//! last segment is a torn write and is reported for truncation.

use crate::format::{
    list_segments, WalRecord, WalRecordError, WalSegment, SEGMENT_HEADER_SIZE,
};
use crate::format::wal_record::MAX_RECORD_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use std::path::Path;
use tracing::warn;

/// WAL reader for iterating over records in segments.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalReader;

/// Records read from one segment plus where the readable data ends.
struct SegmentRead {
    records: Vec<WalRecord>,
    valid_end: u64,
    stop_reason: ReadStopReason,
    skipped_corrupted: usize,
}

impl WalReader {
    /// Create a new WAL reader.
    pub fn new() -> Self {
        WalReader
    }

    /// Read all records from a single segment.
    ///
    /// Returns the records and the byte offset where valid data ends.
    pub fn read_segment(
        &self,
        wal_dir: &Path,
        segment_number: u64,
    ) -> Result<(Vec<WalRecord>, u64), WalReaderError> {
        let read = self.read_segment_inner(wal_dir, segment_number)?;
        Ok((read.records, read.valid_end))
    }

    fn read_segment_inner(
        &self,
        wal_dir: &Path,
        segment_number: u64,
    ) -> Result<SegmentRead, WalReaderError> {
        let (_, body) = WalSegment::read_body(wal_dir, segment_number)
            .map_err(|e| WalReaderError::IoError(e.to_string()))?;

        Ok(parse_records(&body))
    }

    /// Read all records from all segments in a WAL directory.
    ///
    /// Segments are read in order. Only the last segment can carry a torn
    /// tail; if it does, `truncate_info` says where to cut it. A last
    /// segment shorter than its header is reported with `valid_end == 0`.
    pub fn read_all(&self, wal_dir: &Path) -> Result<WalReadResult, WalReaderError> {
        let segments =
            list_segments(wal_dir).map_err(|e| WalReaderError::IoError(e.to_string()))?;

        let mut result = WalReadResult {
            records: Vec::new(),
            truncate_info: None,
            stop_reason: ReadStopReason::EndOfData,
            skipped_corrupted: 0,
        };

        for (idx, &segment_num) in segments.iter().enumerate() {
            let is_last = idx + 1 == segments.len();
            let path = WalSegment::segment_path(wal_dir, segment_num);
            let file_size = std::fs::metadata(&path)
                .map_err(|e| WalReaderError::IoError(e.to_string()))?
                .len();

            if file_size < SEGMENT_HEADER_SIZE as u64 {
                if is_last {
                    // Crashed while creating the segment
                    result.truncate_info = Some(TruncateInfo {
                        segment_number: segment_num,
                        valid_end: 0,
                        original_size: file_size,
                    });
                    result.stop_reason = ReadStopReason::PartialRecord;
                    break;
                }
                return Err(WalReaderError::CorruptSegment(segment_num));
            }

            let read = self.read_segment_inner(wal_dir, segment_num)?;
            result.records.extend(read.records);
            result.skipped_corrupted += read.skipped_corrupted;

            let valid_end = SEGMENT_HEADER_SIZE as u64 + read.valid_end;
            if valid_end < file_size {
                if !is_last {
                    warn!(
                        target: "vecdb::wal",
                        segment = segment_num,
                        valid_end,
                        file_size,
                        "Unreadable bytes inside a closed WAL segment"
                    );
                } else {
                    result.truncate_info = Some(TruncateInfo {
                        segment_number: segment_num,
                        valid_end,
                        original_size: file_size,
                    });
                }
            }
            result.stop_reason = read.stop_reason;
        }

        Ok(result)
    }
}

/// Parse consecutive records out of a segment body.
///
/// `valid_end` is relative to the start of the body.
fn parse_records(buffer: &[u8]) -> SegmentRead {
    let mut records = Vec::new();
    let mut offset = 0usize;
    let mut valid_end = 0u64;
    let mut stop_reason = ReadStopReason::EndOfData;
    let mut skipped_corrupted = 0usize;

    while offset < buffer.len() {
        let remaining = &buffer[offset..];

        match WalRecord::from_bytes(remaining) {
            Ok((record, consumed)) => {
                records.push(record);
                offset += consumed;
                valid_end = offset as u64;
            }
            Err(WalRecordError::InsufficientData) => {
                stop_reason = ReadStopReason::PartialRecord;
                break;
            }
            Err(WalRecordError::InvalidFormat) => {
                stop_reason = ReadStopReason::PartialRecord;
                break;
            }
            Err(WalRecordError::ChecksumMismatch { .. }) => {
                let record_len = LittleEndian::read_u32(&remaining[0..4]) as usize;
                let next = offset + 4 + record_len;
                // A damaged final record is a torn write; only skip when
                // readable data follows it.
                if record_len <= MAX_RECORD_SIZE && next < buffer.len() {
                    warn!(
                        target: "vecdb::wal",
                        offset,
                        "Skipping corrupted WAL record (checksum mismatch)"
                    );
                    offset = next;
                    valid_end = offset as u64;
                    skipped_corrupted += 1;
                    continue;
                }
                stop_reason = ReadStopReason::ChecksumMismatch { offset };
                break;
            }
            Err(e) => {
                // CRC was valid, so this is a format incompatibility rather
                // than corruption.
                stop_reason = ReadStopReason::ParseError {
                    offset,
                    detail: e.to_string(),
                };
                break;
            }
        }
    }

    SegmentRead {
        records,
        valid_end,
        stop_reason,
        skipped_corrupted,
    }
}

/// Cut a torn tail off the WAL.
///
/// A segment whose header itself is incomplete is deleted.
pub fn repair_tail(wal_dir: &Path, info: &TruncateInfo) -> std::io::Result<()> {
    let path = WalSegment::segment_path(wal_dir, info.segment_number);
    if info.valid_end < SEGMENT_HEADER_SIZE as u64 {
        warn!(
            target: "vecdb::wal",
            segment = info.segment_number,
            size = info.original_size,
            "Removing WAL segment with incomplete header"
        );
        return std::fs::remove_file(path);
    }

    warn!(
        target: "vecdb::wal",
        segment = info.segment_number,
        valid_end = info.valid_end,
        truncated_bytes = info.bytes_to_truncate(),
        "Truncating torn WAL tail"
    );
    WalSegment::truncate_file(wal_dir, info.segment_number, info.valid_end)
}

/// Reason why record reading stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStopReason {
    /// Successfully read all records to end of data
    EndOfData,
    /// Partial or unframeable record at end of segment (expected after crash)
    PartialRecord,
    /// CRC checksum mismatch with no readable data after it
    ChecksumMismatch {
        /// Byte offset within the segment body
        offset: usize,
    },
    /// CRC was valid but the record could not be parsed
    ParseError {
        /// Byte offset within the segment body
        offset: usize,
        /// Human-readable error description
        detail: String,
    },
}

/// Result of reading all WAL segments.
#[derive(Debug)]
pub struct WalReadResult {
    /// All valid records in order
    pub records: Vec<WalRecord>,

    /// Truncation needed on the last segment (if any)
    pub truncate_info: Option<TruncateInfo>,

    /// Why reading of the last segment stopped
    pub stop_reason: ReadStopReason,

    /// Number of corrupted records that were skipped
    pub skipped_corrupted: usize,
}

/// Information about a segment that needs truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateInfo {
    /// Segment number
    pub segment_number: u64,

    /// Position where valid data ends (file offset)
    pub valid_end: u64,

    /// Original file size
    pub original_size: u64,
}

impl TruncateInfo {
    /// Get the number of bytes that need to be truncated.
    pub fn bytes_to_truncate(&self) -> u64 {
        self.original_size.saturating_sub(self.valid_end)
    }
}

/// WAL reader errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalReaderError {
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),

    /// A closed segment is too short to hold its header
    #[error("WAL segment {0} is corrupt")]
    CorruptSegment(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::config::WalConfig;
    use crate::wal::writer::WalWriter;
    use crate::wal::DurabilityMode;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_records(wal_dir: &Path, records: &[WalRecord]) {
        let mut writer = WalWriter::open(
            wal_dir.to_path_buf(),
            [1u8; 16],
            DurabilityMode::Always,
            WalConfig::for_testing(),
        )
        .unwrap();

        for record in records {
            writer.append(record).unwrap();
        }
        writer.flush().unwrap();
    }

    fn append_raw(wal_dir: &Path, segment: u64, bytes: &[u8]) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(WalSegment::segment_path(wal_dir, segment))
            .unwrap();
        file.write_all(bytes).unwrap();
    }

    #[test]
    fn test_read_empty_segment() {
        let dir = tempdir().unwrap();
        WalSegment::create(dir.path(), 1, [1u8; 16]).unwrap();

        let (records, valid_end) = WalReader::new().read_segment(dir.path(), 1).unwrap();
        assert!(records.is_empty());
        assert_eq!(valid_end, 0);
    }

    #[test]
    fn test_read_missing_directory() {
        let dir = tempdir().unwrap();
        let result = WalReader::new().read_all(&dir.path().join("nope")).unwrap();
        assert!(result.records.is_empty());
        assert!(result.truncate_info.is_none());
    }

    #[test]
    fn test_read_multiple_records_in_order() {
        let dir = tempdir().unwrap();
        let records: Vec<_> = (1..=5)
            .map(|i| WalRecord::new(i, i * 1000, vec![i as u8; 10]))
            .collect();
        write_records(dir.path(), &records);

        let result = WalReader::new().read_all(dir.path()).unwrap();
        assert_eq!(result.records, records);
        assert_eq!(result.stop_reason, ReadStopReason::EndOfData);
        assert!(result.truncate_info.is_none());
    }

    #[test]
    fn test_garbage_tail_detected_and_repaired() {
        let dir = tempdir().unwrap();
        let records: Vec<_> = (1..=3).map(|i| WalRecord::new(i, 0, vec![i as u8])).collect();
        write_records(dir.path(), &records);
        append_raw(dir.path(), 1, &[0xFF; 10]);

        let reader = WalReader::new();
        let result = reader.read_all(dir.path()).unwrap();
        assert_eq!(result.records.len(), 3);
        let truncate = result.truncate_info.unwrap();
        assert_eq!(truncate.bytes_to_truncate(), 10);

        repair_tail(dir.path(), &truncate).unwrap();
        let result = reader.read_all(dir.path()).unwrap();
        assert_eq!(result.records.len(), 3);
        assert!(result.truncate_info.is_none());
    }

    #[test]
    fn test_half_written_record_is_torn() {
        let dir = tempdir().unwrap();
        write_records(dir.path(), &[WalRecord::new(1, 0, vec![1, 2, 3])]);
        let torn = WalRecord::new(2, 0, vec![9; 64]).to_bytes();
        append_raw(dir.path(), 1, &torn[..torn.len() / 2]);

        let result = WalReader::new().read_all(dir.path()).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.stop_reason, ReadStopReason::PartialRecord);
        assert_eq!(
            result.truncate_info.unwrap().bytes_to_truncate(),
            (torn.len() / 2) as u64
        );
    }

    #[test]
    fn test_corrupt_final_record_is_truncated() {
        let dir = tempdir().unwrap();
        write_records(dir.path(), &[WalRecord::new(1, 0, vec![1])]);
        let mut bad = WalRecord::new(2, 0, vec![2; 8]).to_bytes();
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        append_raw(dir.path(), 1, &bad);

        let result = WalReader::new().read_all(dir.path()).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.skipped_corrupted, 0);
        assert!(matches!(
            result.stop_reason,
            ReadStopReason::ChecksumMismatch { .. }
        ));
        assert_eq!(
            result.truncate_info.unwrap().bytes_to_truncate(),
            bad.len() as u64
        );
    }

    #[test]
    fn test_corrupt_middle_record_is_skipped() {
        let dir = tempdir().unwrap();
        write_records(dir.path(), &[WalRecord::new(1, 0, vec![1])]);
        let mut bad = WalRecord::new(2, 0, vec![2; 8]).to_bytes();
        bad[8] ^= 0xFF;
        append_raw(dir.path(), 1, &bad);
        append_raw(dir.path(), 1, &WalRecord::new(3, 0, vec![3]).to_bytes());

        let result = WalReader::new().read_all(dir.path()).unwrap();
        let lsns: Vec<u64> = result.records.iter().map(|r| r.lsn).collect();
        assert_eq!(lsns, vec![1, 3]);
        assert_eq!(result.skipped_corrupted, 1);
        assert!(result.truncate_info.is_none());
    }

    #[test]
    fn test_incomplete_segment_header_removed() {
        let dir = tempdir().unwrap();
        write_records(dir.path(), &[WalRecord::new(1, 0, vec![1])]);
        std::fs::write(WalSegment::segment_path(dir.path(), 2), b"VWA").unwrap();

        let reader = WalReader::new();
        let result = reader.read_all(dir.path()).unwrap();
        assert_eq!(result.records.len(), 1);
        let truncate = result.truncate_info.unwrap();
        assert_eq!(truncate.segment_number, 2);
        assert_eq!(truncate.valid_end, 0);

        repair_tail(dir.path(), &truncate).unwrap();
        assert_eq!(list_segments(dir.path()).unwrap(), vec![1]);
    }

    #[test]
    fn test_records_span_segments() {
        let dir = tempdir().unwrap();
        let config = WalConfig::with_segment_bytes(1024).unwrap();
        let mut writer = WalWriter::open(
            dir.path().to_path_buf(),
            [1u8; 16],
            DurabilityMode::Always,
            config,
        )
        .unwrap();
        for i in 1..=30 {
            writer.append(&WalRecord::new(i, 0, vec![0; 100])).unwrap();
        }
        drop(writer);

        let result = WalReader::new().read_all(dir.path()).unwrap();
        assert!(list_segments(dir.path()).unwrap().len() > 1);
        let lsns: Vec<u64> = result.records.iter().map(|r| r.lsn).collect();
        assert_eq!(lsns, (1..=30).collect::<Vec<_>>());
    }
}
