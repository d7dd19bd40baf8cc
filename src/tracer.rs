//! Tracer - root object wiring the store, engine and schedulers together.
//!
//! Every collaborator is injected at construction; nothing is looked up
//! globally. The facade exposes the operations consumed by command and
//! presentation layers.
//!
//! # Lifecycle
//! - `new`: validates config, opens the store (restore + prune)
//! - `start`: arms scanning (if automatic), server-wide scans (if enabled)
//!   and maintenance
//! - `shutdown`: disarms every timer, writes a final snapshot and resets
//!   scan statistics

use log::info;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::{AnalysisEngine, EngineStats};
use crate::config::TracerConfig;
use crate::error::Result;
use crate::provider::{PerformanceSignalProvider, PointOfInterest, PresentationSink, WorldDataProvider};
use crate::result::AnalysisResult;
use crate::scheduler::{Maintenance, MaintenanceReport, ScanScheduler, ScanStatistics, ServerScanOutcome};
use crate::storage::{ExportFormat, ResultStore, StoreStats};
use crate::types::{CellKey, RegionId};

const HOUR_MS: u64 = 60 * 60 * 1000;

#[derive(Debug)]
pub struct Tracer {
    config: TracerConfig,
    store: Arc<ResultStore>,
    engine: Arc<AnalysisEngine>,
    scheduler: Arc<ScanScheduler>,
    maintenance: Arc<Maintenance>,
}

impl Tracer {
    pub fn new(
        config: TracerConfig,
        world: Arc<dyn WorldDataProvider>,
        signal: Arc<dyn PerformanceSignalProvider>,
        presentation: Arc<dyn PresentationSink>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(ResultStore::open(config.storage.clone()));
        let engine = Arc::new(AnalysisEngine::new(
            config.analysis.clone(),
            Arc::clone(&store),
            world,
            Arc::clone(&signal),
        ));
        let scheduler = ScanScheduler::new(
            config.scanning.clone(),
            config.adaptive.clone(),
            config.server_wide.clone(),
            Arc::clone(&engine),
            signal,
            presentation,
        );
        let maintenance = Maintenance::new(Arc::clone(&store));

        info!(
            "Tracer initialized ({} cached results, data dir {})",
            store.len(),
            config.storage.data_dir.display()
        );

        Ok(Self {
            config,
            store,
            engine,
            scheduler,
            maintenance,
        })
    }

    // ============================================================================================
    // LIFECYCLE
    // ============================================================================================

    /// Arms the background tasks. Must run inside a tokio runtime.
    pub fn start(&self) {
        if self.config.scanning.automatic {
            self.scheduler.start();
        }
        self.scheduler.start_server_wide();
        self.maintenance.start();
    }

    /// Stops automatic scanning. Server-wide scans and maintenance keep running.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    pub fn restart(&self) {
        self.scheduler.restart();
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Disarms all timers and writes the final snapshot.
    pub async fn shutdown(&self) -> MaintenanceReport {
        self.scheduler.stop();
        self.scheduler.stop_server_wide();
        let report = self.maintenance.shutdown().await;
        self.scheduler.reset();
        info!(
            "Tracer shut down (snapshot written: {}, {} history records pruned)",
            report.persisted, report.pruned
        );
        report
    }

    // ============================================================================================
    // ACCESSORS
    // ============================================================================================

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<AnalysisEngine> {
        &self.engine
    }

    pub fn scheduler(&self) -> &Arc<ScanScheduler> {
        &self.scheduler
    }

    // ============================================================================================
    // SCANS
    // ============================================================================================

    pub async fn analyze(&self, key: CellKey) -> Result<Arc<AnalysisResult>> {
        self.engine.analyze(key).await
    }

    pub async fn analyze_radius(
        &self,
        origin: &CellKey,
        radius: u32,
    ) -> Result<Vec<Arc<AnalysisResult>>> {
        self.scheduler.analyze_radius(origin, radius).await
    }

    pub async fn manual_scan(
        &self,
        observer: &PointOfInterest,
        radius: Option<u32>,
    ) -> Result<Vec<Arc<AnalysisResult>>> {
        self.scheduler.manual_scan(observer, radius).await
    }

    pub async fn analyze_server_wide(&self) -> ServerScanOutcome {
        self.scheduler.analyze_server_wide().await
    }

    // ============================================================================================
    // QUERIES
    // ============================================================================================

    pub fn get_score(&self, key: &CellKey) -> Option<Arc<AnalysisResult>> {
        self.store.get(key)
    }

    pub fn get_all_cached(&self) -> HashMap<CellKey, Arc<AnalysisResult>> {
        self.store.snapshot()
    }

    /// History records from the last `hours` hours.
    pub fn get_history(&self, hours: u64) -> Vec<Arc<AnalysisResult>> {
        self.store.history_since(hours.saturating_mul(HOUR_MS))
    }

    pub fn get_statistics(&self) -> String {
        self.scheduler.statistics_text()
    }

    pub fn scan_statistics(&self) -> ScanStatistics {
        self.scheduler.statistics()
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.engine.stats()
    }

    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn current_interval(&self) -> Duration {
        self.scheduler.current_interval()
    }

    pub fn region_averages(&self) -> HashMap<RegionId, f64> {
        self.scheduler.region_averages()
    }

    /// Cached cells with the highest scores first.
    pub fn worst_cells(&self, limit: usize) -> Vec<Arc<AnalysisResult>> {
        self.store.worst(limit)
    }

    // ============================================================================================
    // DATA MANAGEMENT
    // ============================================================================================

    pub fn clear_cache(&self) {
        self.store.clear_cache();
    }

    pub fn clear_history(&self) {
        self.store.clear_history();
    }

    pub fn clear_all(&self) {
        self.store.clear_all();
    }

    pub fn export(&self, format: ExportFormat, hours: u64) -> Result<PathBuf> {
        self.store.export(format, hours)
    }
}
