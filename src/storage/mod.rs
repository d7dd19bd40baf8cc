//! Result storage.
//!
//! Two layers:
//! - **Live**: concurrent in-memory cache of the latest result per cell, plus
//!   a time-ordered history pruned by retention
//! - **Durable**: snapshot files checkpointed periodically and on shutdown
//!
//! The snapshot is best-effort; it is not a write-ahead log.

pub mod export;
pub mod result_store;
pub mod snapshot;
pub mod types;

pub use export::ExportFormat;
pub use result_store::ResultStore;
pub use snapshot::{SnapshotFile, SnapshotHeader};
pub use types::{SnapshotCounts, StoreStats};
