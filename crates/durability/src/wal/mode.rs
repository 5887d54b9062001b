//! Durability mode configuration
//!
//! Controls WAL sync behavior (Always, Standard).

/// Durability mode for WAL operations
///
/// Every mode writes the record to the segment file before `append` returns.
/// The mode only decides when that write is fsynced.
///
/// # Modes
///
/// | Mode | fsync | Data Loss Window |
/// |------|-------|-----------------|
/// | Always | Every append | Zero |
/// | Standard | Periodic | Up to interval/batch |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// fsync after every append (slow, maximum durability)
    ///
    /// Use when data loss is unacceptable, even for a single write.
    Always,

    /// fsync every N appends OR every T milliseconds (the default)
    ///
    /// May lose up to `batch_size` writes or `interval_ms` of data on an
    /// OS crash. A process crash loses nothing, since the bytes already
    /// reached the page cache.
    Standard {
        /// Maximum time between fsyncs in milliseconds
        interval_ms: u64,
        /// Maximum appends between fsyncs
        batch_size: usize,
    },
}

impl DurabilityMode {
    /// Human-readable description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::Always => "Always sync (safest, slowest)",
            DurabilityMode::Standard { .. } => "Standard (balanced speed/safety)",
        }
    }

    /// Create a standard mode with recommended defaults
    ///
    /// Returns `Standard { interval_ms: 100, batch_size: 1000 }`. Whichever
    /// threshold is reached first triggers the fsync.
    pub fn standard_default() -> Self {
        DurabilityMode::Standard {
            interval_ms: 100,
            batch_size: 1000,
        }
    }

    /// Parse a mode name as written in `vecdb.toml`
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(Self::standard_default()),
            "always" => Some(DurabilityMode::Always),
            _ => None,
        }
    }
}

impl Default for DurabilityMode {
    fn default() -> Self {
        Self::standard_default()
    }
}
