//! WAL payloads
//!
//! Each acknowledged mutation is one `WalEntry`, MessagePack-encoded into
//! the payload of a single WAL record.

use serde::{Deserialize, Serialize};
use vecdb_core::{Record, VectorError, VectorResult};

/// One logged mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    /// Insert or overwrite a record
    Put(Record),
    /// Remove a record by id
    Delete {
        /// Record id
        id: String,
    },
}

/// Borrowing twin of `WalEntry`; encodes to identical bytes
#[derive(Serialize)]
#[serde(rename = "WalEntry")]
enum WalEntryRef<'a> {
    Put(&'a Record),
    Delete { id: &'a str },
}

impl WalEntry {
    /// Record id this entry touches
    pub fn id(&self) -> &str {
        match self {
            WalEntry::Put(record) => &record.id,
            WalEntry::Delete { id } => id,
        }
    }

    /// Encode a put without cloning the record
    pub fn encode_put(record: &Record) -> VectorResult<Vec<u8>> {
        encode(&WalEntryRef::Put(record))
    }

    /// Encode a delete
    pub fn encode_delete(id: &str) -> VectorResult<Vec<u8>> {
        encode(&WalEntryRef::Delete { id })
    }

    /// Decode a WAL payload
    pub fn from_bytes(bytes: &[u8]) -> VectorResult<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| VectorError::Serialization(e.to_string()))
    }
}

fn encode(entry: &WalEntryRef<'_>) -> VectorResult<Vec<u8>> {
    rmp_serde::to_vec_named(entry).map_err(|e| VectorError::Serialization(e.to_string()))
}
