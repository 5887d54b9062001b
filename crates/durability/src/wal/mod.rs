//! Segmented write-ahead log
//!
//! - `config`: WAL configuration (WalConfig, WalConfigError)
//! - `mode`: durability modes (Always, Standard)
//! - `writer`: segment-rotating appender (WalWriter)
//! - `reader`: recovery reader with torn-tail detection (WalReader)

pub mod config;
pub mod mode;
pub mod reader;
pub mod writer;

pub use config::{WalConfig, WalConfigError};
pub use mode::DurabilityMode;
pub use reader::{
    repair_tail, ReadStopReason, TruncateInfo, WalReadResult, WalReader, WalReaderError,
};
pub use writer::{WalCounters, WalWriter};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in microseconds since the Unix epoch.
///
/// Returns 0 if the system clock is before the epoch.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
