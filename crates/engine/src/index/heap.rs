//! Vector Heap - Contiguous embedding storage
//!
//! VectorHeap stores embeddings in a contiguous `Vec<f32>` for cache-friendly
//! distance computation. BTreeMap keeps iteration order deterministic.
//!
//! `KeyMap` translates the caller's string ids to the heap's numeric
//! `VectorId`s.
//!
//! # Invariants
//!
//! - VectorIds are never reused, only storage slots are reused
//! - `id_to_offset` is the sole source of truth for stored vectors

use std::collections::{BTreeMap, HashMap};

use vecdb_core::{VectorError, VectorId, VectorResult};

/// Contiguous embedding storage for one index
pub struct VectorHeap {
    dimension: usize,

    /// Layout: [v0_dim0, v0_dim1, ..., v0_dimN, v1_dim0, ...]
    data: Vec<f32>,

    /// VectorId -> offset in data (in floats, not bytes)
    id_to_offset: BTreeMap<VectorId, usize>,

    /// Freed slot offsets, reused by later inserts
    free_slots: Vec<usize>,

    /// Next VectorId to allocate; never decremented
    next_id: u64,
}

impl VectorHeap {
    /// Create an empty heap for vectors of `dimension` components
    pub fn new(dimension: usize) -> Self {
        VectorHeap {
            dimension,
            data: Vec::new(),
            id_to_offset: BTreeMap::new(),
            free_slots: Vec::new(),
            next_id: 1,
        }
    }

    /// Get the dimension of vectors in this heap
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Get the number of stored vectors
    pub fn len(&self) -> usize {
        self.id_to_offset.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.id_to_offset.is_empty()
    }

    /// Allocate a new VectorId (monotonically increasing)
    pub fn allocate_id(&mut self) -> VectorId {
        let id = VectorId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert or update a vector
    ///
    /// New vectors reuse a freed slot when one is available.
    pub fn upsert(&mut self, id: VectorId, embedding: &[f32]) -> VectorResult<()> {
        if embedding.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                got: embedding.len(),
            });
        }

        if let Some(&offset) = self.id_to_offset.get(&id) {
            self.data[offset..offset + self.dimension].copy_from_slice(embedding);
        } else {
            let offset = match self.free_slots.pop() {
                Some(slot) => {
                    self.data[slot..slot + self.dimension].copy_from_slice(embedding);
                    slot
                }
                None => {
                    let offset = self.data.len();
                    self.data.extend_from_slice(embedding);
                    offset
                }
            };
            self.id_to_offset.insert(id, offset);
            if id.as_u64() >= self.next_id {
                self.next_id = id.as_u64() + 1;
            }
        }
        Ok(())
    }

    /// Delete a vector by ID
    ///
    /// Returns true if the vector existed. Its slot is zeroed and queued
    /// for reuse; the VectorId is never handed out again.
    pub fn delete(&mut self, id: VectorId) -> bool {
        match self.id_to_offset.remove(&id) {
            Some(offset) => {
                self.data[offset..offset + self.dimension].fill(0.0);
                self.free_slots.push(offset);
                true
            }
            None => false,
        }
    }

    /// Get embedding by VectorId
    pub fn get(&self, id: VectorId) -> Option<&[f32]> {
        let offset = *self.id_to_offset.get(&id)?;
        Some(&self.data[offset..offset + self.dimension])
    }

    /// Check if a vector exists
    pub fn contains(&self, id: VectorId) -> bool {
        self.id_to_offset.contains_key(&id)
    }
}

/// Bidirectional mapping between record ids and VectorIds
#[derive(Debug, Default)]
pub struct KeyMap {
    keys: BTreeMap<String, VectorId>,
    labels: HashMap<VectorId, String>,
}

impl KeyMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `id`, returning the id it was bound to before
    pub fn insert(&mut self, key: &str, id: VectorId) -> Option<VectorId> {
        let previous = self.keys.insert(key.to_string(), id);
        if let Some(old) = previous {
            self.labels.remove(&old);
        }
        self.labels.insert(id, key.to_string());
        previous
    }

    /// Unbind `key`, returning its VectorId
    pub fn remove(&mut self, key: &str) -> Option<VectorId> {
        let id = self.keys.remove(key)?;
        self.labels.remove(&id);
        Some(id)
    }

    /// VectorId bound to `key`
    pub fn id(&self, key: &str) -> Option<VectorId> {
        self.keys.get(key).copied()
    }

    /// Key bound to `id`
    pub fn key(&self, id: VectorId) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    /// Number of bound keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate (key, id) pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, VectorId)> {
        self.keys.iter().map(|(k, &id)| (k.as_str(), id))
    }
}
