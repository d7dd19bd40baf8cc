//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracer::config::{StorageConfig, TracerConfig};
use tracer::{
    AnalysisResult, CellKey, PerformanceSignalProvider, PointOfInterest, PresentationSink,
    ProviderError, RawCounts, RegionId, WorldDataProvider,
};

/// A square world per region, `-extent..=extent` on both axes.
pub struct FakeWorld {
    pub regions: Vec<RegionId>,
    pub extent: i32,
    pub counts: Mutex<HashMap<CellKey, RawCounts>>,
    pub failing: Mutex<HashSet<CellKey>>,
    pub observers: Mutex<Vec<PointOfInterest>>,
    pub delay: Duration,
    /// Calls to `count_entities`, one per measurement
    pub measurements: AtomicUsize,
    /// Every call into the provider
    pub calls: AtomicUsize,
    pub per_cell: Mutex<HashMap<CellKey, usize>>,
}

impl FakeWorld {
    pub fn new(regions: &[&str], extent: i32) -> Self {
        Self {
            regions: regions.iter().map(|r| r.to_string()).collect(),
            extent,
            counts: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            observers: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            measurements: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            per_cell: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_counts(&self, key: CellKey, counts: RawCounts) {
        self.counts.lock().insert(key, counts);
    }

    pub fn fail(&self, key: CellKey) {
        self.failing.lock().insert(key);
    }

    pub fn heal(&self, key: &CellKey) {
        self.failing.lock().remove(key);
    }

    pub fn add_observer(&self, id: &str, cell: CellKey) {
        self.observers.lock().push(PointOfInterest::new(id, cell));
    }

    pub fn measurements(&self) -> usize {
        self.measurements.load(Ordering::SeqCst)
    }

    pub fn measurements_of(&self, key: &CellKey) -> usize {
        self.per_cell.lock().get(key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn counts_for(&self, key: &CellKey) -> RawCounts {
        self.counts.lock().get(key).copied().unwrap_or_default()
    }
}

impl WorldDataProvider for FakeWorld {
    fn count_entities(&self, cell: &CellKey) -> Result<u32, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.measurements.fetch_add(1, Ordering::SeqCst);
        *self.per_cell.lock().entry(cell.clone()).or_insert(0) += 1;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.failing.lock().contains(cell) {
            return Err(ProviderError::new(format!("cell {} unavailable", cell)));
        }
        Ok(self.counts_for(cell).entities)
    }

    fn count_structures(&self, cell: &CellKey) -> Result<u32, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.counts_for(cell).structures)
    }

    fn count_mechanisms(&self, cell: &CellKey) -> Result<u32, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.counts_for(cell).mechanisms)
    }

    fn is_cell_loaded(&self, cell: &CellKey) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.regions.contains(&cell.region)
            && cell.x.unsigned_abs() <= self.extent.unsigned_abs()
            && cell.z.unsigned_abs() <= self.extent.unsigned_abs()
    }

    fn regions(&self) -> Vec<RegionId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.regions.clone()
    }

    fn loaded_cells_in_region(&self, region: &str) -> Vec<CellKey> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.regions.iter().any(|r| r == region) {
            return Vec::new();
        }
        CellKey::new(region, 0, 0).square_around(self.extent.unsigned_abs())
    }

    fn points_of_interest(&self) -> Vec<PointOfInterest> {
        self.observers.lock().clone()
    }
}

/// Signal that can be changed mid-test or made to fail.
pub struct FakeSignal {
    value: Mutex<Result<f64, String>>,
}

impl FakeSignal {
    pub fn new(value: f64) -> Self {
        Self {
            value: Mutex::new(Ok(value)),
        }
    }

    pub fn set(&self, value: f64) {
        *self.value.lock() = Ok(value);
    }

    pub fn break_it(&self) {
        *self.value.lock() = Err("signal counter missing".to_string());
    }
}

impl PerformanceSignalProvider for FakeSignal {
    fn current_signal(&self) -> Result<f64, ProviderError> {
        self.value.lock().clone().map_err(ProviderError::new)
    }
}

/// Records every batch handed to the presentation layer.
#[derive(Default)]
pub struct RecordingPresentation {
    pub batches: Mutex<Vec<(String, usize)>>,
}

impl RecordingPresentation {
    pub fn presented(&self) -> Vec<(String, usize)> {
        self.batches.lock().clone()
    }
}

impl PresentationSink for RecordingPresentation {
    fn present(&self, observer: &PointOfInterest, results: &[Arc<AnalysisResult>]) {
        self.batches.lock().push((observer.id.clone(), results.len()));
    }
}

/// Default config rooted in `dir`, with manual scanning only.
pub fn test_config(dir: &Path) -> TracerConfig {
    let mut config = TracerConfig::default();
    config.scanning.automatic = false;
    config.storage = StorageConfig {
        data_dir: dir.to_path_buf(),
        ..StorageConfig::default()
    };
    config
}
