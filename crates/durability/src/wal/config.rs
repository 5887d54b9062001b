//! Segment sizing for a collection's WAL.
//!
//! A collection's log is a chain of segments. The writer rolls to the next
//! segment before a record would overflow the current one, and in Standard
//! mode also fsyncs once enough unsynced bytes pile up. Both thresholds live
//! here so the writer only asks yes/no questions.

/// Default segment length: 64 MiB.
pub const DEFAULT_SEGMENT_BYTES: u64 = 64 * 1024 * 1024;

/// Default unsynced-bytes threshold in Standard mode: 4 MiB.
pub const DEFAULT_SYNC_AFTER_BYTES: u64 = 4 * 1024 * 1024;

/// Shortest segment accepted. A segment must fit its header and a few records.
pub const MIN_SEGMENT_BYTES: u64 = 1024;

/// Segment sizing for one collection's WAL.
///
/// Built through [`WalConfig::with_segment_bytes`], which derives a sync
/// threshold that never exceeds the segment, so every value is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalConfig {
    segment_bytes: u64,
    sync_after_bytes: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        WalConfig {
            segment_bytes: DEFAULT_SEGMENT_BYTES,
            sync_after_bytes: DEFAULT_SYNC_AFTER_BYTES,
        }
    }
}

impl WalConfig {
    /// Sizing for segments of `segment_bytes`.
    ///
    /// The Standard-mode sync threshold is the default, clamped to the
    /// segment length.
    pub fn with_segment_bytes(segment_bytes: u64) -> Result<Self, WalConfigError> {
        if segment_bytes < MIN_SEGMENT_BYTES {
            return Err(WalConfigError::SegmentTooSmall {
                bytes: segment_bytes,
            });
        }
        Ok(WalConfig {
            segment_bytes,
            sync_after_bytes: DEFAULT_SYNC_AFTER_BYTES.min(segment_bytes),
        })
    }

    /// Override the Standard-mode sync threshold.
    ///
    /// Must be non-zero and no larger than the segment.
    pub fn sync_after(self, bytes: u64) -> Result<Self, WalConfigError> {
        if bytes == 0 || bytes > self.segment_bytes {
            return Err(WalConfigError::SyncThresholdOutOfRange {
                bytes,
                segment_bytes: self.segment_bytes,
            });
        }
        Ok(WalConfig {
            sync_after_bytes: bytes,
            ..self
        })
    }

    /// 64 KiB segments with a 16 KiB sync threshold, so tests rotate.
    pub fn for_testing() -> Self {
        WalConfig {
            segment_bytes: 64 * 1024,
            sync_after_bytes: 16 * 1024,
        }
    }

    /// Segment length in bytes.
    pub fn segment_bytes(&self) -> u64 {
        self.segment_bytes
    }

    /// Unsynced bytes that force an fsync in Standard mode.
    pub fn sync_after_bytes(&self) -> u64 {
        self.sync_after_bytes
    }

    /// Whether appending `incoming` bytes to a segment of `current` bytes
    /// must first roll to a new segment.
    ///
    /// A record larger than a whole segment still goes into a fresh one; the
    /// segment then simply overshoots.
    pub fn must_rotate(&self, current: u64, incoming: u64) -> bool {
        current + incoming > self.segment_bytes
    }

    /// Whether `pending` unsynced bytes reach the sync threshold.
    pub fn sync_due(&self, pending: u64) -> bool {
        pending >= self.sync_after_bytes
    }
}

/// Rejected WAL sizing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalConfigError {
    /// Segment length below [`MIN_SEGMENT_BYTES`].
    #[error("WAL segment of {bytes} bytes is below the {MIN_SEGMENT_BYTES} byte minimum")]
    SegmentTooSmall {
        /// Requested length
        bytes: u64,
    },

    /// Sync threshold is zero or longer than the segment.
    #[error("WAL sync threshold {bytes} must be between 1 and the segment length {segment_bytes}")]
    SyncThresholdOutOfRange {
        /// Requested threshold
        bytes: u64,
        /// Segment length it was checked against
        segment_bytes: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sizing() {
        let config = WalConfig::default();
        assert_eq!(config.segment_bytes(), DEFAULT_SEGMENT_BYTES);
        assert_eq!(config.sync_after_bytes(), DEFAULT_SYNC_AFTER_BYTES);
    }

    #[test]
    fn test_small_segment_clamps_sync_threshold() {
        let config = WalConfig::with_segment_bytes(4096).unwrap();
        assert_eq!(config.segment_bytes(), 4096);
        assert_eq!(config.sync_after_bytes(), 4096);

        let large = WalConfig::with_segment_bytes(128 * 1024 * 1024).unwrap();
        assert_eq!(large.sync_after_bytes(), DEFAULT_SYNC_AFTER_BYTES);
    }

    #[test]
    fn test_segment_below_minimum_rejected() {
        assert_eq!(
            WalConfig::with_segment_bytes(512),
            Err(WalConfigError::SegmentTooSmall { bytes: 512 })
        );
        assert!(WalConfig::with_segment_bytes(MIN_SEGMENT_BYTES).is_ok());
    }

    #[test]
    fn test_sync_threshold_bounds() {
        let config = WalConfig::with_segment_bytes(2048).unwrap();
        assert_eq!(config.sync_after(512).unwrap().sync_after_bytes(), 512);
        assert!(matches!(
            config.sync_after(0),
            Err(WalConfigError::SyncThresholdOutOfRange { .. })
        ));
        assert_eq!(
            config.sync_after(4096),
            Err(WalConfigError::SyncThresholdOutOfRange {
                bytes: 4096,
                segment_bytes: 2048
            })
        );
    }

    #[test]
    fn test_rotation_and_sync_questions() {
        let config = WalConfig::with_segment_bytes(1024)
            .unwrap()
            .sync_after(256)
            .unwrap();
        assert!(!config.must_rotate(1000, 24));
        assert!(config.must_rotate(1000, 25));
        assert!(!config.sync_due(255));
        assert!(config.sync_due(256));
    }

    #[test]
    fn test_testing_sizing_rotates_sooner() {
        let config = WalConfig::for_testing();
        assert!(config.segment_bytes() < WalConfig::default().segment_bytes());
        assert!(config.sync_after_bytes() <= config.segment_bytes());
    }
}
