//! Collection registry
//!
//! Owns every open collection of a database. Collections are created on
//! first reference and live until dropped. Concurrent `get_or_create` calls
//! for the same unseen name construct exactly one collection: creators of a
//! name serialize on a per-name gate, and the slow part (directory,
//! manifest, WAL) runs outside every DashMap shard lock, so lookups of other
//! names sharing the shard never wait on disk I/O.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, warn};
use vecdb_core::{CollectionConfig, VectorError, VectorResult};

use crate::collection::{Collection, CollectionInfo, CollectionSettings, MANIFEST_FILE};
use crate::store::RecoveryStats;

/// Registry of named collections
pub struct CollectionManager {
    root: PathBuf,
    settings: CollectionSettings,
    default_config: CollectionConfig,
    collections: DashMap<String, Arc<Collection>>,
    /// Per-name gates held while a collection is being built
    creating: DashMap<String, Arc<Mutex<()>>>,
}

impl CollectionManager {
    /// Open every collection found under `root`
    ///
    /// Directories without a manifest or with an invalid name are skipped
    /// with a warning. Returns recovery statistics per collection.
    pub fn open(
        root: PathBuf,
        settings: CollectionSettings,
        default_config: CollectionConfig,
    ) -> VectorResult<(Self, Vec<(String, RecoveryStats)>)> {
        std::fs::create_dir_all(&root)?;
        let manager = CollectionManager {
            root,
            settings,
            default_config,
            collections: DashMap::new(),
            creating: DashMap::new(),
        };

        let mut recovered = Vec::new();
        for entry in std::fs::read_dir(&manager.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if manager.settings.limits.validate_collection_name(&name).is_err()
                || !entry.path().join(MANIFEST_FILE).exists()
            {
                warn!(target: "vecdb::manager", dir = %entry.path().display(), "Skipping directory that is not a collection");
                continue;
            }

            let (collection, stats) =
                Collection::open(&name, entry.path(), manager.settings.clone())?;
            manager.collections.insert(name.clone(), Arc::new(collection));
            recovered.push((name, stats));
        }
        recovered.sort_by(|a, b| a.0.cmp(&b.0));

        Ok((manager, recovered))
    }

    /// Directory holding every collection
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration used for collections created on first reference
    pub fn default_config(&self) -> &CollectionConfig {
        &self.default_config
    }

    /// Get a collection, creating it with the default configuration if absent
    pub fn get_or_create(&self, name: &str) -> VectorResult<Arc<Collection>> {
        if let Some(existing) = self.collections.get(name) {
            return Ok(Arc::clone(existing.value()));
        }
        self.settings.limits.validate_collection_name(name)?;
        self.create_once(name, || self.default_config.clone())
            .map(|(collection, _)| collection)
    }

    /// Create a collection with an explicit configuration
    ///
    /// Succeeds without change if the collection exists with a compatible
    /// configuration: same metric and index kind, and the same dimension
    /// when both sides fix one.
    pub fn create(&self, name: &str, config: CollectionConfig) -> VectorResult<Arc<Collection>> {
        self.settings.limits.validate_collection_name(name)?;
        config.validate(&self.settings.limits)?;

        let (collection, created) = self.create_once(name, || config.clone())?;
        if created {
            return Ok(collection);
        }

        let existing = collection.config();
        let mismatch = if existing.metric != config.metric {
            Some("metric")
        } else if existing.index != config.index {
            Some("index")
        } else {
            match (existing.dimension, config.dimension) {
                (Some(a), Some(b)) if a != b => Some("dimension"),
                (None, Some(_)) => Some("dimension"),
                _ => None,
            }
        };
        match mismatch {
            Some(field) => Err(VectorError::ConfigMismatch {
                collection: name.to_string(),
                field: field.to_string(),
            }),
            None => Ok(collection),
        }
    }

    /// Return the registered collection, or build and register it
    ///
    /// The flag is true when this call built it. Only the per-name gate is
    /// held while building; the registry map is touched just to look up and
    /// to insert.
    fn create_once(
        &self,
        name: &str,
        config: impl FnOnce() -> CollectionConfig,
    ) -> VectorResult<(Arc<Collection>, bool)> {
        let gate = Arc::clone(self.creating.entry(name.to_string()).or_default().value());
        let _creating = gate.lock();

        let result = match self.collections.get(name) {
            Some(existing) => Ok((Arc::clone(existing.value()), false)),
            None => Collection::create(name, self.root.join(name), config(), self.settings.clone())
                .map(|collection| {
                    let collection = Arc::new(collection);
                    self.collections
                        .insert(name.to_string(), Arc::clone(&collection));
                    (collection, true)
                }),
        };

        self.creating
            .remove_if(name, |_, current| Arc::ptr_eq(current, &gate));
        result
    }

    /// Get an existing collection
    pub fn get(&self, name: &str) -> VectorResult<Arc<Collection>> {
        self.collections
            .get(name)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| VectorError::CollectionNotFound {
                name: name.to_string(),
            })
    }

    /// Check if a collection exists
    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Drop a collection and delete its files
    ///
    /// Handles still held elsewhere report NotFound from then on.
    pub fn drop_collection(&self, name: &str) -> VectorResult<()> {
        match self.collections.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let collection = Arc::clone(entry.get());
                collection.mark_dropped();
                let removed = std::fs::remove_dir_all(collection.dir());
                entry.remove();
                removed?;
                info!(target: "vecdb::manager", collection = name, "Collection dropped");
                Ok(())
            }
            Entry::Vacant(_) => Err(VectorError::CollectionNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Collection names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Every open collection, sorted by name
    pub fn collections(&self) -> Vec<Arc<Collection>> {
        let mut all: Vec<Arc<Collection>> = self
            .collections
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Statistics for every collection, sorted by name
    pub fn list(&self) -> VectorResult<Vec<CollectionInfo>> {
        self.collections().iter().map(|c| c.info()).collect()
    }

    /// Number of open collections
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Check if there are no collections
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Fsync every collection's WAL
    pub fn flush_all(&self) -> VectorResult<()> {
        for collection in self.collections() {
            collection.flush()?;
        }
        Ok(())
    }
}
