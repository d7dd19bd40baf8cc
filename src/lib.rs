//! Lag tracer - scores spatial cells by how much load they put on the host.
//!
//! Cells are measured through an injected [`WorldDataProvider`], scored by a
//! fixed weighted model, cached with a freshness window and kept in a
//! retention-bounded history that is checkpointed to disk.
//!
//! # Architecture
//! - **score**: pure scoring model and severity tiers
//! - **storage**: concurrent cache + history, snapshot files, export
//! - **analysis**: single-flight, cache-first measurement engine
//! - **scheduler**: periodic, adaptive and server-wide scans, maintenance
//! - **tracer**: facade wiring everything together

pub mod analysis;
pub mod config;
pub mod error;
pub mod provider;
pub mod result;
pub mod scheduler;
pub mod score;
pub mod storage;
pub mod tracer;
pub mod types;

pub use analysis::{AnalysisEngine, EngineStats};
pub use config::TracerConfig;
pub use error::{ProviderError, Result, TracerError};
pub use provider::{
    NoopPresentation, PerformanceSignalProvider, PointOfInterest, PresentationSink,
    WorldDataProvider,
};
pub use result::AnalysisResult;
pub use scheduler::{ScanScheduler, ScanStatistics, ServerScanOutcome};
pub use score::{RawCounts, Score, SeverityTier};
pub use storage::{ExportFormat, ResultStore, StoreStats};
pub use tracer::Tracer;
pub use types::{now_ms, CellKey, RegionId};
