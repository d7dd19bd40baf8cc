//! Scan scheduler - drives periodic, adaptive, manual and server-wide scans.
//!
//! The scheduler is `Stopped` or `Running`. While running it owns two
//! periodic tasks:
//!
//! 1. **Scan tick** (`current_interval`): scans the radius around every point
//!    of interest that is not excluded or cooling down, and waits for the
//!    per-observer batches up to `scan_timeout`. Batches that miss the deadline
//!    are abandoned, not cancelled; their results still reach the store.
//! 2. **Adaptive loop** (`adaptive.period`): re-derives the tick interval from
//!    the host signal and re-arms the scan tick when the change exceeds the
//!    hysteresis band.
//!
//! The optional server-wide task runs on its own timer and is started and
//! stopped independently.
//!
//! Cooldowns, region averages and statistics belong to the scheduler alone and
//! sit behind one mutex; the result store is only touched through the engine.

use futures::future::join_all;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use super::adaptive::{compute_next_interval, exceeds_hysteresis};
use super::cooldown::CooldownTable;
use super::periodic::PeriodicTask;
use super::stats::ScanStatistics;
use crate::analysis::AnalysisEngine;
use crate::config::{AdaptiveConfig, ScanningConfig, ServerWideConfig};
use crate::error::{Result, TracerError};
use crate::provider::{read_signal, PerformanceSignalProvider, PointOfInterest, PresentationSink};
use crate::result::AnalysisResult;
use crate::types::{now_ms, CellKey, RegionId};

/// Largest batch handed to the engine by a server-wide scan.
pub const MAX_SERVER_BATCH: usize = 50;

/// Batch size for a region with `total` loaded cells: a tenth, within 1..=50.
pub fn server_batch_size(total: usize) -> usize {
    (total / 10).clamp(1, MAX_SERVER_BATCH)
}

/// Outcome of a server-wide scan.
#[derive(Debug, Clone)]
pub enum ServerScanOutcome {
    /// Host signal was below the floor; nothing was analysed.
    Skipped { signal: f64 },
    Completed {
        results: Vec<Arc<AnalysisResult>>,
        /// Regions that had loaded cells
        regions: usize,
    },
}

impl ServerScanOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, ServerScanOutcome::Skipped { .. })
    }

    pub fn results(&self) -> &[Arc<AnalysisResult>] {
        match self {
            ServerScanOutcome::Skipped { .. } => &[],
            ServerScanOutcome::Completed { results, .. } => results,
        }
    }

    /// Number of HIGH or CRITICAL cells found.
    pub fn significant_count(&self) -> usize {
        self.results()
            .iter()
            .filter(|r| r.tier().requires_attention())
            .count()
    }
}

#[derive(Default)]
struct Tasks {
    scan: Option<PeriodicTask>,
    adaptive: Option<PeriodicTask>,
    server_wide: Option<PeriodicTask>,
}

struct ScanState {
    cell_cooldowns: CooldownTable<CellKey>,
    region_cooldowns: CooldownTable<RegionId>,
    region_averages: HashMap<RegionId, f64>,
    stats: ScanStatistics,
    current_interval: Duration,
    last_server_scan: Option<u64>,
}

pub struct ScanScheduler {
    scanning: ScanningConfig,
    adaptive: AdaptiveConfig,
    server_wide: ServerWideConfig,
    engine: Arc<AnalysisEngine>,
    signal: Arc<dyn PerformanceSignalProvider>,
    presentation: Arc<dyn PresentationSink>,
    tasks: Mutex<Tasks>,
    state: Mutex<ScanState>,
    me: Weak<ScanScheduler>,
}

impl std::fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanScheduler")
            .field("running", &self.is_running())
            .field("current_interval", &self.current_interval())
            .field("stats", &self.statistics())
            .finish()
    }
}

impl ScanScheduler {
    pub fn new(
        scanning: ScanningConfig,
        adaptive: AdaptiveConfig,
        server_wide: ServerWideConfig,
        engine: Arc<AnalysisEngine>,
        signal: Arc<dyn PerformanceSignalProvider>,
        presentation: Arc<dyn PresentationSink>,
    ) -> Arc<Self> {
        let current_interval = scanning.scan_interval;
        Arc::new_cyclic(|me| Self {
            scanning,
            adaptive,
            server_wide,
            engine,
            signal,
            presentation,
            tasks: Mutex::new(Tasks::default()),
            state: Mutex::new(ScanState {
                cell_cooldowns: CooldownTable::new(),
                region_cooldowns: CooldownTable::new(),
                region_averages: HashMap::new(),
                stats: ScanStatistics::default(),
                current_interval,
                last_server_scan: None,
            }),
            me: me.clone(),
        })
    }

    pub fn engine(&self) -> &Arc<AnalysisEngine> {
        &self.engine
    }

    // ---- lifecycle ----------------------------------------------------

    /// `Stopped -> Running`. No-op when already running.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.scan.is_some() {
            return;
        }

        let interval = {
            let mut state = self.state.lock();
            state.current_interval = self.scanning.scan_interval;
            state.current_interval
        };

        tasks.scan = Some(self.arm_scan_task(interval));
        if self.adaptive.enabled {
            tasks.adaptive = Some(self.arm_adaptive_task());
        }

        info!(
            "Automatic scanning started with interval: {} seconds",
            interval.as_secs()
        );
    }

    /// `Running -> Stopped`. In-flight analyses are left to finish.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock();
        let scan = tasks.scan.take();
        let adaptive = tasks.adaptive.take();
        if scan.is_none() && adaptive.is_none() {
            return;
        }
        drop(scan);
        drop(adaptive);
        info!("Automatic scanning stopped");
    }

    pub fn restart(&self) {
        self.stop();
        self.start();
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().scan.is_some()
    }

    /// Arms the server-wide timer when enabled in config and not yet armed.
    pub fn start_server_wide(&self) {
        if !self.server_wide.enabled {
            return;
        }
        let mut tasks = self.tasks.lock();
        if tasks.server_wide.is_some() {
            return;
        }

        let me = self.me.clone();
        let interval = self.server_wide.interval;
        tasks.server_wide = Some(PeriodicTask::spawn(
            "server-wide-scan",
            interval,
            interval,
            move || {
                let me = me.clone();
                async move {
                    if let Some(scheduler) = me.upgrade() {
                        scheduler.server_wide_tick().await;
                    }
                }
            },
        ));
        info!(
            "Server-wide scanning started with interval: {} seconds",
            interval.as_secs()
        );
    }

    pub fn stop_server_wide(&self) {
        if self.tasks.lock().server_wide.take().is_some() {
            info!("Server-wide scanning stopped");
        }
    }

    pub fn is_server_wide_active(&self) -> bool {
        self.tasks.lock().server_wide.is_some()
    }

    fn arm_scan_task(&self, interval: Duration) -> PeriodicTask {
        let me = self.me.clone();
        PeriodicTask::spawn("scan", self.scanning.initial_delay, interval, move || {
            let me = me.clone();
            async move {
                if let Some(scheduler) = me.upgrade() {
                    scheduler.scan_tick().await;
                }
            }
        })
    }

    fn arm_adaptive_task(&self) -> PeriodicTask {
        let me = self.me.clone();
        let period = self.adaptive.period;
        PeriodicTask::spawn("adaptive", period, period, move || {
            let me = me.clone();
            async move {
                if let Some(scheduler) = me.upgrade() {
                    scheduler.adapt_interval();
                }
            }
        })
    }

    // ---- periodic scan ------------------------------------------------

    /// One automatic scan tick.
    pub async fn scan_tick(&self) {
        let started = Instant::now();
        let world = self.engine.world();

        let observers = world.points_of_interest();
        if observers.is_empty() {
            debug!("No points of interest, skipping automatic scan");
            return;
        }

        let now = now_ms();
        let selected: Vec<(PointOfInterest, RegionId)> = {
            let mut state = self.state.lock();
            observers
                .into_iter()
                .filter_map(|poi| {
                    let region = world.point_of_interest_region(&poi);
                    if self.is_excluded(&region) || state.region_cooldowns.is_cooling(&region, now) {
                        None
                    } else {
                        Some((poi, region))
                    }
                })
                .collect()
        };

        let deadline = tokio::time::Instant::now() + self.scanning.scan_timeout;
        let scans = selected.into_iter().map(|(poi, region)| async move {
            match tokio::time::timeout_at(deadline, self.scan_observer(&poi, &region)).await {
                Ok(count) => Some(count),
                Err(_) => {
                    warn!(
                        "Scan around {} abandoned after {:?}",
                        poi.id, self.scanning.scan_timeout
                    );
                    None
                }
            }
        });
        let outcomes = join_all(scans).await;

        let timed_out = outcomes.iter().filter(|o| o.is_none()).count();
        let cells: usize = outcomes.into_iter().flatten().sum();
        let elapsed = started.elapsed();
        self.state.lock().stats.record_scan(elapsed, cells);

        if timed_out > 0 {
            warn!(
                "Automatic scan finished with {} observer(s) past the deadline",
                timed_out
            );
        } else {
            debug!(
                "Automatic scan completed in {:.2} seconds ({} cells)",
                elapsed.as_secs_f64(),
                cells
            );
        }
    }

    async fn scan_observer(&self, observer: &PointOfInterest, region: &RegionId) -> usize {
        let cells = {
            let now = now_ms();
            let world = self.engine.world();
            let mut state = self.state.lock();
            observer
                .cell
                .square_around(self.scanning.default_radius)
                .into_iter()
                .filter(|key| world.is_cell_loaded(key))
                .filter(|key| !state.cell_cooldowns.is_cooling(key, now))
                .collect::<Vec<_>>()
        };

        let results = self.engine.analyze_batch(cells).await;
        if results.is_empty() {
            return 0;
        }

        self.presentation.present(observer, &results);
        self.record_region_scan(region, &results, true);
        results.len()
    }

    fn record_region_scan(
        &self,
        region: &RegionId,
        results: &[Arc<AnalysisResult>],
        cooldowns: bool,
    ) {
        if results.is_empty() {
            return;
        }

        let now = now_ms();
        let average = results.iter().map(|r| r.overall_score()).sum::<f64>() / results.len() as f64;

        let mut state = self.state.lock();
        if cooldowns {
            let cell_ms = self.scanning.cell_cooldown.as_millis() as u64;
            for result in results {
                state.cell_cooldowns.mark(result.key().clone(), now, cell_ms);
            }
            let region_ms = self.scanning.region_cooldown.as_millis() as u64;
            state.region_cooldowns.mark(region.clone(), now, region_ms);
        }
        state.region_averages.insert(region.clone(), average);
    }

    fn is_excluded(&self, region: &str) -> bool {
        self.scanning.excluded_regions.iter().any(|r| r == region)
    }

    // ---- adaptive loop ------------------------------------------------

    /// Recomputes the tick interval and re-arms the scan task if it moved
    /// past the hysteresis band. Returns the interval now in effect.
    pub fn adapt_interval(&self) -> Duration {
        let signal = read_signal(self.signal.as_ref());

        let (current, next) = {
            let state = self.state.lock();
            let next = compute_next_interval(
                self.scanning.scan_interval,
                signal,
                state.stats.average_scan(),
                &self.adaptive,
            );
            (state.current_interval, next)
        };

        if !exceeds_hysteresis(current, next, self.adaptive.hysteresis) {
            return current;
        }

        let mut tasks = self.tasks.lock();
        self.state.lock().current_interval = next;
        if tasks.scan.is_some() {
            tasks.scan = Some(self.arm_scan_task(next));
        }
        debug!(
            "Adaptive scanning: adjusted interval to {} seconds (signal: {:.2})",
            next.as_secs(),
            signal
        );
        next
    }

    pub fn current_interval(&self) -> Duration {
        self.state.lock().current_interval
    }

    // ---- on-demand scans ----------------------------------------------

    /// Analyses every loaded cell within `radius` of `origin`.
    pub async fn analyze_radius(
        &self,
        origin: &CellKey,
        radius: u32,
    ) -> Result<Vec<Arc<AnalysisResult>>> {
        if radius < 1 || radius > self.scanning.max_radius {
            return Err(TracerError::InvalidRadius {
                radius,
                max: self.scanning.max_radius,
            });
        }

        let started = Instant::now();
        let world = self.engine.world();
        let cells: Vec<CellKey> = origin
            .square_around(radius)
            .into_iter()
            .filter(|key| world.is_cell_loaded(key))
            .collect();

        let results = self.engine.analyze_batch(cells).await;
        self.state.lock().stats.record_scan(started.elapsed(), results.len());
        Ok(results)
    }

    /// Scans around an observer and hands the results to the presentation sink.
    pub async fn manual_scan(
        &self,
        observer: &PointOfInterest,
        radius: Option<u32>,
    ) -> Result<Vec<Arc<AnalysisResult>>> {
        let radius = radius.unwrap_or(self.scanning.default_radius);
        let results = self.analyze_radius(&observer.cell, radius).await?;

        if !results.is_empty() {
            let region = self.engine.world().point_of_interest_region(observer);
            self.presentation.present(observer, &results);
            self.record_region_scan(&region, &results, false);
        }
        Ok(results)
    }

    /// Analyses every loaded cell in every non-excluded region, unless the
    /// host signal is under `signal_floor`.
    pub async fn analyze_server_wide(&self) -> ServerScanOutcome {
        let signal = read_signal(self.signal.as_ref());
        if signal < self.server_wide.signal_floor {
            warn!("Skipping server-wide scan due to low signal: {:.2}", signal);
            return ServerScanOutcome::Skipped { signal };
        }

        let started = Instant::now();
        let world = self.engine.world();

        let mut regions = Vec::new();
        for region in world.regions() {
            if self.is_excluded(&region) {
                continue;
            }
            let cells = world.loaded_cells_in_region(&region);
            if !cells.is_empty() {
                regions.push((region, cells));
            }
        }

        let region_scans = regions.iter().map(|(region, cells)| async move {
            let batch_size = server_batch_size(cells.len());
            let batches = cells
                .chunks(batch_size)
                .map(|batch| self.engine.analyze_batch(batch.to_vec()));
            let results: Vec<Arc<AnalysisResult>> =
                join_all(batches).await.into_iter().flatten().collect();
            self.record_region_scan(region, &results, false);
            results
        });
        let results: Vec<Arc<AnalysisResult>> =
            join_all(region_scans).await.into_iter().flatten().collect();

        self.state
            .lock()
            .stats
            .record_scan(started.elapsed(), results.len());

        debug!(
            "Server-wide scan completed. Analyzed {} cells across {} regions",
            results.len(),
            regions.len()
        );

        ServerScanOutcome::Completed {
            results,
            regions: regions.len(),
        }
    }

    async fn server_wide_tick(&self) {
        let outcome = self.analyze_server_wide().await;
        if outcome.is_skipped() {
            return;
        }

        self.state.lock().last_server_scan = Some(now_ms());
        let significant = outcome.significant_count();
        if significant > 0 {
            info!(
                "Server-wide scan completed. Found {} cells with high load out of {} total cells",
                significant,
                outcome.results().len()
            );
        }
    }

    /// Millisecond timestamp of the last periodic server-wide scan.
    pub fn last_server_scan(&self) -> Option<u64> {
        self.state.lock().last_server_scan
    }

    // ---- statistics ---------------------------------------------------

    pub fn statistics(&self) -> ScanStatistics {
        self.state.lock().stats
    }

    pub fn statistics_text(&self) -> String {
        let cache_entries = self.engine.store().len();
        let state = self.state.lock();
        state.stats.render(state.current_interval, cache_entries)
    }

    /// Mean overall score of the latest scan per region.
    pub fn region_averages(&self) -> HashMap<RegionId, f64> {
        self.state.lock().region_averages.clone()
    }

    /// Clears cooldowns, region metrics and statistics.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.cell_cooldowns.clear();
        state.region_cooldowns.clear();
        state.region_averages.clear();
        state.stats.reset();
        debug!("Scan scheduler data cleared");
    }
}
