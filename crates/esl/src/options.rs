use datafile::{FileSystem, OsFs};
use std::sync::Arc;
use std::time::Duration;

/// Rotate the active file at or above this size.
pub const DEFAULT_MAX_FILE_BYTES: u32 = 100 * 1024 * 1024;
/// Largest accepted key.
pub const DEFAULT_MAX_KEY_BYTES: u16 = 1 << 9;
/// Largest accepted value.
pub const DEFAULT_MAX_VALUE_BYTES: u16 = 1 << 15;
/// Immutable-file count that triggers an automatic merge.
pub const DEFAULT_COMPACT_THRESHOLD: u32 = 10;
/// How often the compactor checks the threshold.
pub const DEFAULT_COMPACT_INTERVAL: Duration = Duration::from_secs(60);

/// Store configuration.
///
/// `Options::default()` matches production defaults; the `with_*` methods
/// adjust individual knobs:
///
/// ```rust
/// use esl::Options;
/// use std::time::Duration;
///
/// let opts = Options::default()
///     .with_max_file_bytes(16 * 1024 * 1024)
///     .with_compact_interval(Duration::from_secs(300));
/// ```
#[derive(Clone)]
pub struct Options {
    /// Threshold at or above which the active file rotates; also the split
    /// size for compaction outputs.
    pub max_file_bytes: u32,
    /// Reject `put` when the key is longer than this.
    pub max_key_bytes: u16,
    /// Reject `put` when the value is longer than this.
    pub max_value_bytes: u16,
    /// Minimum count of immutable data files before the ticker queues an
    /// automatic merge.
    pub compact_threshold: u32,
    /// Period of the compactor's ticker.
    pub compact_interval: Duration,
    /// File system the store runs against. The native one by default; an
    /// in-memory implementation works just as well.
    pub fs: Arc<dyn FileSystem>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_key_bytes: DEFAULT_MAX_KEY_BYTES,
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            compact_interval: DEFAULT_COMPACT_INTERVAL,
            fs: Arc::new(OsFs),
        }
    }
}

impl Options {
    pub fn with_max_file_bytes(mut self, max_file_bytes: u32) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn with_max_key_bytes(mut self, max_key_bytes: u16) -> Self {
        self.max_key_bytes = max_key_bytes;
        self
    }

    pub fn with_max_value_bytes(mut self, max_value_bytes: u16) -> Self {
        self.max_value_bytes = max_value_bytes;
        self
    }

    pub fn with_compact_threshold(mut self, compact_threshold: u32) -> Self {
        self.compact_threshold = compact_threshold;
        self
    }

    pub fn with_compact_interval(mut self, compact_interval: Duration) -> Self {
        self.compact_interval = compact_interval;
        self
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("max_file_bytes", &self.max_file_bytes)
            .field("max_key_bytes", &self.max_key_bytes)
            .field("max_value_bytes", &self.max_value_bytes)
            .field("compact_threshold", &self.compact_threshold)
            .field("compact_interval", &self.compact_interval)
            .finish_non_exhaustive()
    }
}
