//! Storage data structures.

use serde::Serialize;
use std::fmt;

/// Rough per-record footprint used for memory estimates.
pub const ESTIMATED_RECORD_BYTES: u64 = 500;

/// Statistics about the result store.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StoreStats {
    /// Number of cells in the cache
    pub cache_entries: usize,
    /// Number of records in the history
    pub history_entries: usize,
    pub persistence_enabled: bool,
    pub history_enabled: bool,
    /// History retention in milliseconds
    pub retention_ms: u64,
    /// (cache + history) * ESTIMATED_RECORD_BYTES
    pub estimated_memory_bytes: u64,
    /// Last successful persist (ms since epoch), if any
    pub last_persist_at: Option<u64>,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cache: {} | History: {} | Retention: {}h | Memory: ~{}KB",
            self.cache_entries,
            self.history_entries,
            self.retention_ms / (60 * 60 * 1000),
            self.estimated_memory_bytes / 1024
        )
    }
}

/// Outcome of a successful persist or restore.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotCounts {
    pub cache_entries: usize,
    pub history_entries: usize,
}
