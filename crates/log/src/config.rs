//! Log configuration.

use segment::SegmentConfig;

/// Configuration for a [`Log`](crate::Log) and the segments it creates.
///
/// Built with chained `with_*` calls; for the byte limits a zero means "use
/// the default".
///
/// ```rust
/// use log::Config;
///
/// let config = Config::default()
///     .with_max_store_bytes(128)
///     .with_initial_offset(16);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    pub segment: SegmentConfig,
}

impl Config {
    /// Store size (bytes) at which a segment rolls. Zero selects the 1 MiB
    /// default.
    pub fn with_max_store_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_store_bytes = if bytes == 0 {
            SegmentConfig::default().max_store_bytes
        } else {
            bytes
        };
        self
    }

    /// Index size (bytes) at which a segment rolls; also the pre-allocated
    /// index file length. Zero selects the 1 MiB default.
    pub fn with_max_index_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_index_bytes = if bytes == 0 {
            SegmentConfig::default().max_index_bytes
        } else {
            bytes
        };
        self
    }

    /// Base offset of the first segment when the log directory is empty.
    pub fn with_initial_offset(mut self, offset: u64) -> Self {
        self.segment.initial_offset = offset;
        self
    }
}
