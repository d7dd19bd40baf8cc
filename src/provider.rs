//! Collaborator interfaces the tracer consumes.
//!
//! The host process implements these; the tracer never reaches into host
//! internals directly.

use crate::error::ProviderError;
use crate::result::AnalysisResult;
use crate::score::{sanitize_signal, NOMINAL_SIGNAL};
use crate::types::{CellKey, RegionId};
use log::warn;
use std::sync::Arc;

/// Something whose surroundings are scanned periodically (e.g. a connected observer).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PointOfInterest {
    /// Stable identifier, used for logging and presentation
    pub id: String,
    /// Cell the point of interest currently occupies
    pub cell: CellKey,
}

impl PointOfInterest {
    pub fn new(id: impl Into<String>, cell: CellKey) -> Self {
        Self {
            id: id.into(),
            cell,
        }
    }
}

/// Raw per-cell counts and world topology.
///
/// Count methods may be slow and are called from the blocking pool when
/// asynchronous analysis is enabled.
pub trait WorldDataProvider: Send + Sync {
    fn count_entities(&self, cell: &CellKey) -> Result<u32, ProviderError>;

    fn count_structures(&self, cell: &CellKey) -> Result<u32, ProviderError>;

    fn count_mechanisms(&self, cell: &CellKey) -> Result<u32, ProviderError>;

    fn is_cell_loaded(&self, cell: &CellKey) -> bool;

    /// Every region known to the host.
    fn regions(&self) -> Vec<RegionId>;

    fn loaded_cells_in_region(&self, region: &str) -> Vec<CellKey>;

    fn points_of_interest(&self) -> Vec<PointOfInterest>;

    fn point_of_interest_region(&self, poi: &PointOfInterest) -> RegionId {
        poi.cell.region.clone()
    }
}

/// Live host health on a 0-20 scale (20 = nominal).
pub trait PerformanceSignalProvider: Send + Sync {
    fn current_signal(&self) -> Result<f64, ProviderError>;
}

/// Reads the signal, falling back to nominal on failure and clamping to 0-20.
pub fn read_signal(provider: &dyn PerformanceSignalProvider) -> f64 {
    match provider.current_signal() {
        Ok(signal) => sanitize_signal(signal).min(NOMINAL_SIGNAL),
        Err(e) => {
            warn!("Performance signal unavailable, assuming nominal: {}", e);
            NOMINAL_SIGNAL
        }
    }
}

/// Receives batches of results for an observer. Fire-and-forget.
pub trait PresentationSink: Send + Sync {
    fn present(&self, observer: &PointOfInterest, results: &[Arc<AnalysisResult>]);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresentation;

impl PresentationSink for NoopPresentation {
    fn present(&self, _observer: &PointOfInterest, _results: &[Arc<AnalysisResult>]) {}
}

/// Signal provider that always reports a fixed value.
#[derive(Debug, Clone, Copy)]
pub struct FixedSignal(pub f64);

impl PerformanceSignalProvider for FixedSignal {
    fn current_signal(&self) -> Result<f64, ProviderError> {
        Ok(self.0)
    }
}
