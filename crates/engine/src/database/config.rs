//! Database configuration via `vecdb.toml`
//!
//! On first open, a default `vecdb.toml` is written to the data directory.
//! To change settings, edit the file and reopen the database.

use serde::{Deserialize, Serialize};
use std::path::Path;
use vecdb_core::{CollectionConfig, DistanceMetric, IndexKind, Limits, VectorError, VectorResult};
use vecdb_durability::{DurabilityMode, WalConfig};

use crate::collection::CollectionSettings;
use crate::index::HnswConfig;

/// Config file name placed in the database data directory.
pub const CONFIG_FILE_NAME: &str = "vecdb.toml";

/// Database configuration loaded from `vecdb.toml`.
///
/// # Example
///
/// ```toml
/// durability = "standard"
/// create_on_query = true
/// default_metric = "cosine"
///
/// [hnsw]
/// ef_search = 100
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Durability mode: `"standard"` or `"always"`.
    pub durability: String,
    /// Queries against an unknown collection create it instead of
    /// returning NotFound.
    pub create_on_query: bool,
    /// Metric for collections created on first reference.
    pub default_metric: DistanceMetric,
    /// Index kind for collections created on first reference.
    pub default_index: IndexKind,
    /// Background compaction check interval in milliseconds; 0 disables
    /// the background worker.
    pub compaction_interval_ms: u64,
    /// Compact a collection once its WAL holds this many bytes.
    pub compaction_wal_bytes: u64,
    /// Rebuild an approximate index once this share of its entries are
    /// tombstones.
    pub tombstone_ratio: f64,
    /// WAL segment size in bytes.
    pub wal_segment_size: u64,
    /// HNSW parameters for approximate collections.
    pub hnsw: HnswConfig,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            durability: "standard".to_string(),
            create_on_query: true,
            default_metric: DistanceMetric::default(),
            default_index: IndexKind::default(),
            compaction_interval_ms: 30_000,
            compaction_wal_bytes: 8 * 1024 * 1024,
            tombstone_ratio: 0.25,
            wal_segment_size: WalConfig::default().segment_bytes(),
            hnsw: HnswConfig::default(),
        }
    }
}

impl DbConfig {
    /// Config for tests: fsync every write, small segments, no background
    /// worker.
    pub fn for_testing() -> Self {
        Self {
            durability: "always".to_string(),
            compaction_interval_ms: 0,
            wal_segment_size: WalConfig::for_testing().segment_bytes(),
            ..Self::default()
        }
    }

    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"standard"` or `"always"`.
    pub fn durability_mode(&self) -> VectorResult<DurabilityMode> {
        DurabilityMode::parse(&self.durability).ok_or_else(|| {
            VectorError::invalid_argument(format!(
                "Invalid durability mode '{}' in vecdb.toml. Expected \"standard\" or \"always\".",
                self.durability
            ))
        })
    }

    /// WAL configuration derived from this config.
    ///
    /// A segment shorter than the default sync threshold lowers that
    /// threshold to the segment length.
    pub fn wal_config(&self) -> VectorResult<WalConfig> {
        WalConfig::with_segment_bytes(self.wal_segment_size)
            .map_err(|e| VectorError::invalid_argument(format!("vecdb.toml: {}", e)))
    }

    /// Check every field, so a bad file fails at open rather than later.
    pub fn validate(&self) -> VectorResult<()> {
        self.durability_mode()?;
        self.wal_config()?;
        self.hnsw.validate()?;
        if !(0.0..=1.0).contains(&self.tombstone_ratio) {
            return Err(VectorError::invalid_argument(
                "tombstone_ratio must be between 0 and 1",
            ));
        }
        Ok(())
    }

    /// Settings handed to every collection.
    pub fn collection_settings(&self) -> VectorResult<CollectionSettings> {
        Ok(CollectionSettings {
            durability: self.durability_mode()?,
            wal: self.wal_config()?,
            hnsw: self.hnsw.clone(),
            limits: Limits::default(),
            tombstone_ratio: self.tombstone_ratio,
        })
    }

    /// Configuration for collections created on first reference.
    pub fn default_collection_config(&self) -> CollectionConfig {
        CollectionConfig::new(self.default_metric, self.default_index)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# vecdb configuration
#
# Durability mode: "standard" (default) or "always"
#   "standard" = fsync every 100ms or 1000 writes, may lose the last interval on crash
#   "always"   = fsync every write, zero data loss
durability = "standard"

# Queries against an unknown collection create it (default: true).
# Set to false to get a not-found error instead.
create_on_query = true

# Metric and index for collections created on first reference.
#   metric: "l2", "cosine" or "dot"
#   index:  "exact" or "approximate"
default_metric = "l2"
default_index = "exact"

# Background compaction: check every interval, compact collections whose
# WAL exceeds the byte threshold. 0 disables the background worker.
compaction_interval_ms = 30000
compaction_wal_bytes = 8388608

# Rebuild an approximate index once this share of entries are tombstones.
tombstone_ratio = 0.25

# WAL segment size in bytes (64 MiB).
wal_segment_size = 67108864

# HNSW parameters for approximate collections.
[hnsw]
m = 16
ef_construction = 200
ef_search = 50
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> VectorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VectorError::storage(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: DbConfig = toml::from_str(&content).map_err(|e| {
            VectorError::invalid_argument(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> VectorResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                VectorError::storage(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> VectorResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VectorError::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            VectorError::storage(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
