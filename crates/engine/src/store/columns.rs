//! Columnar snapshot encoding
//!
//! Records are split into four sections, all in id order:
//! - ids: `u32` length + UTF-8 bytes per record
//! - vectors: every component as little-endian f32, `dimension` per record
//! - documents: same framing as ids
//! - metadata: one MessagePack array of maps

use std::borrow::Borrow;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use vecdb_core::{Metadata, Record, VectorError, VectorResult};
use vecdb_durability::{
    column_tags, decode_f32_column, encode_f32_column, LoadedSnapshot, SnapshotSection,
};

/// Split records into snapshot sections
pub fn encode_records<R: Borrow<Record>>(
    records: &[R],
    dimension: usize,
) -> VectorResult<Vec<SnapshotSection>> {
    let mut ids = Vec::new();
    let mut documents = Vec::new();
    let mut vectors = Vec::with_capacity(records.len() * dimension);
    let mut metadata: Vec<&Metadata> = Vec::with_capacity(records.len());

    for record in records {
        let record = record.borrow();
        if record.vector.len() != dimension {
            return Err(VectorError::DimensionMismatch {
                expected: dimension,
                got: record.vector.len(),
            });
        }
        write_string(&mut ids, &record.id);
        write_string(&mut documents, &record.document);
        vectors.extend_from_slice(&record.vector);
        metadata.push(&record.metadata);
    }

    let metadata =
        rmp_serde::to_vec_named(&metadata).map_err(|e| VectorError::Serialization(e.to_string()))?;

    Ok(vec![
        SnapshotSection::new(column_tags::IDS, ids),
        SnapshotSection::new(column_tags::VECTORS, encode_f32_column(&vectors)),
        SnapshotSection::new(column_tags::DOCUMENTS, documents),
        SnapshotSection::new(column_tags::METADATA, metadata),
    ])
}

/// Reassemble records from a loaded snapshot
pub fn decode_records(mut snapshot: LoadedSnapshot) -> VectorResult<Vec<Record>> {
    let count = snapshot.record_count() as usize;
    let dimension = snapshot.dimension() as usize;

    let ids = read_strings(&take(&mut snapshot, column_tags::IDS)?, count)?;
    let documents = read_strings(&take(&mut snapshot, column_tags::DOCUMENTS)?, count)?;
    let vectors = decode_f32_column(&take(&mut snapshot, column_tags::VECTORS)?)
        .ok_or_else(|| corruption("vector column length is not a multiple of 4"))?;
    let metadata: Vec<Metadata> =
        rmp_serde::from_slice(&take(&mut snapshot, column_tags::METADATA)?)
            .map_err(|e| VectorError::Serialization(e.to_string()))?;

    if vectors.len() != count * dimension || metadata.len() != count {
        return Err(corruption(format!(
            "column sizes disagree with header ({} records of dimension {})",
            count, dimension
        )));
    }

    let records = ids
        .into_iter()
        .zip(documents)
        .zip(metadata)
        .enumerate()
        .map(|(i, ((id, document), metadata))| Record {
            id,
            vector: vectors[i * dimension..(i + 1) * dimension].to_vec(),
            document,
            metadata,
        })
        .collect();
    Ok(records)
}

fn take(snapshot: &mut LoadedSnapshot, tag: u8) -> VectorResult<Vec<u8>> {
    snapshot
        .take_section(tag)
        .ok_or_else(|| corruption(format!("missing {} section", column_tags::name(tag))))
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    // Writing into a Vec cannot fail
    let _ = out.write_u32::<LittleEndian>(value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

fn read_strings(data: &[u8], count: usize) -> VectorResult<Vec<String>> {
    let mut cursor = Cursor::new(data);
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| corruption("string column truncated"))? as usize;
        if len > data.len() {
            return Err(corruption("string length exceeds column"));
        }
        let mut bytes = vec![0u8; len];
        cursor
            .read_exact(&mut bytes)
            .map_err(|_| corruption("string column truncated"))?;
        values.push(String::from_utf8(bytes).map_err(|e| corruption(e.to_string()))?);
    }
    if cursor.position() as usize != data.len() {
        return Err(corruption("trailing bytes in string column"));
    }
    Ok(values)
}

fn corruption(message: impl Into<String>) -> VectorError {
    VectorError::Corruption(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use vecdb_durability::{SnapshotReader, SnapshotWriter};

    fn sample() -> Vec<Record> {
        let mut metadata = Metadata::new();
        metadata.insert("n".to_string(), 3i64.into());
        vec![
            Record::new("a", vec![1.0, 2.0], "alpha").with_metadata(metadata),
            Record::new("b", vec![-1.0, 0.5], ""),
            Record::new("ü", vec![0.0, 0.0], "unicode id"),
        ]
    }

    fn roundtrip(records: &[Record], dimension: usize) -> Vec<Record> {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path().to_path_buf()).unwrap();
        let sections = encode_records(records, dimension).unwrap();
        let info = writer
            .create_snapshot(
                1,
                10,
                dimension as u32,
                records.len() as u64,
                &sections,
                &AtomicBool::new(false),
            )
            .unwrap();
        decode_records(SnapshotReader::new().load(&info.path).unwrap()).unwrap()
    }

    #[test]
    fn test_records_survive_snapshot() {
        let records = sample();
        assert_eq!(roundtrip(&records, 2), records);
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(roundtrip(&[], 0).is_empty());
    }

    #[test]
    fn test_mixed_dimensions_rejected() {
        let records = vec![
            Record::new("a", vec![1.0, 2.0], ""),
            Record::new("b", vec![1.0], ""),
        ];
        assert!(matches!(
            encode_records(&records, 2),
            Err(VectorError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_string_column() {
        let mut data = Vec::new();
        write_string(&mut data, "hello");
        data.truncate(6);
        assert!(matches!(
            read_strings(&data, 1),
            Err(VectorError::Corruption(_))
        ));
    }
}
