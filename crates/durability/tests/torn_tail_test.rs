//! Torn-tail simulation tests
//!
//! A crash can leave the WAL cut at any byte. These tests cut a segment at
//! every offset inside its final record and check that:
//! - every record before the cut is recovered
//! - the torn bytes are reported and repaired
//! - the writer can append after the repair and the log stays readable

use std::path::Path;
use tempfile::TempDir;
use vecdb_durability::{
    list_segments, repair_tail, DurabilityMode, WalConfig, WalReader, WalRecord, WalSegment,
    WalWriter,
};

fn open_writer(dir: &Path) -> WalWriter {
    WalWriter::open(
        dir.to_path_buf(),
        [9u8; 16],
        DurabilityMode::Always,
        WalConfig::for_testing(),
    )
    .unwrap()
}

fn write_records(dir: &Path, count: u64) -> Vec<WalRecord> {
    let mut writer = open_writer(dir);
    let records: Vec<_> = (1..=count)
        .map(|lsn| WalRecord::new(lsn, lsn * 10, format!("entry-{}", lsn).into_bytes()))
        .collect();
    for record in &records {
        writer.append(record).unwrap();
    }
    writer.close().unwrap();
    records
}

#[test]
fn test_cut_at_every_offset_of_last_record() {
    let template = TempDir::new().unwrap();
    let records = write_records(template.path(), 4);
    let segment_path = WalSegment::segment_path(template.path(), 1);
    let full = std::fs::read(&segment_path).unwrap();
    let last_len = records[3].to_bytes().len();
    let last_start = full.len() - last_len;

    for cut in last_start..full.len() {
        let dir = TempDir::new().unwrap();
        std::fs::write(WalSegment::segment_path(dir.path(), 1), &full[..cut]).unwrap();

        let reader = WalReader::new();
        let result = reader.read_all(dir.path()).unwrap();
        assert_eq!(result.records, records[..3], "cut at {}", cut);

        if cut > last_start {
            let info = result.truncate_info.expect("torn bytes reported");
            assert_eq!(info.bytes_to_truncate(), (cut - last_start) as u64);
            repair_tail(dir.path(), &info).unwrap();
        } else {
            assert!(result.truncate_info.is_none());
        }

        let mut writer = open_writer(dir.path());
        writer.append(&WalRecord::new(4, 0, b"again".to_vec())).unwrap();
        writer.close().unwrap();

        let result = reader.read_all(dir.path()).unwrap();
        let lsns: Vec<u64> = result.records.iter().map(|r| r.lsn).collect();
        assert_eq!(lsns, vec![1, 2, 3, 4], "cut at {}", cut);
        assert!(result.truncate_info.is_none());
    }
}

#[test]
fn test_crash_during_segment_creation() {
    let dir = TempDir::new().unwrap();
    write_records(dir.path(), 2);

    // Rotation crashed after creating the file but before the header landed
    std::fs::write(WalSegment::segment_path(dir.path(), 2), [0u8; 5]).unwrap();

    let reader = WalReader::new();
    let result = reader.read_all(dir.path()).unwrap();
    assert_eq!(result.records.len(), 2);
    repair_tail(dir.path(), &result.truncate_info.unwrap()).unwrap();
    assert_eq!(list_segments(dir.path()).unwrap(), vec![1]);

    let mut writer = open_writer(dir.path());
    writer.append(&WalRecord::new(3, 0, vec![])).unwrap();
    writer.close().unwrap();

    let lsns: Vec<u64> = reader
        .read_all(dir.path())
        .unwrap()
        .records
        .iter()
        .map(|r| r.lsn)
        .collect();
    assert_eq!(lsns, vec![1, 2, 3]);
}

#[test]
fn test_closed_segments_survive_tail_damage() {
    let dir = TempDir::new().unwrap();
    {
        let mut writer = open_writer(dir.path());
        writer.append(&WalRecord::new(1, 0, vec![1])).unwrap();
        writer.rotate_segment().unwrap();
        writer.append(&WalRecord::new(2, 0, vec![2])).unwrap();
        writer.close().unwrap();
    }

    // Damage the tail of the active segment only
    let path = WalSegment::segment_path(dir.path(), 2);
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    let result = WalReader::new().read_all(dir.path()).unwrap();
    let lsns: Vec<u64> = result.records.iter().map(|r| r.lsn).collect();
    assert_eq!(lsns, vec![1]);
    assert_eq!(result.truncate_info.unwrap().segment_number, 2);
}
