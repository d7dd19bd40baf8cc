//! Analysis engine - resolves cells to scores through the cache.
//!
//! Per cell the lifecycle is `Idle -> InFlight -> Resolved`:
//!
//! 1. A cell already in flight is joined, not measured again; the joiner gets
//!    whatever the store holds once the measuring task finishes.
//! 2. A cached result younger than the freshness window is returned as is.
//! 3. Otherwise the cell is marked in flight, measured, scored, written to the
//!    store, released, and only then returned.
//! 4. A failed measurement writes nothing and surfaces as an error for that
//!    one cell.
//!
//! With `async_analysis` enabled the measurement runs on the blocking pool
//! inside its own task, so a caller that stops waiting does not cancel it and
//! the result still lands in the store.

use futures::future::join_all;
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};

use super::in_flight::{Claim, InFlightGuard, InFlightTable};
use crate::config::AnalysisConfig;
use crate::error::{ProviderError, Result, TracerError};
use crate::provider::{read_signal, PerformanceSignalProvider, WorldDataProvider};
use crate::result::AnalysisResult;
use crate::score::RawCounts;
use crate::storage::ResultStore;
use crate::types::{now_ms, CellKey};

/// Counters describing how requests were resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Measurements started against the world
    pub measurements: u64,
    /// Requests served from a fresh cached result
    pub cache_hits: u64,
    /// Requests that joined an in-flight measurement
    pub joined: u64,
    /// Measurements that failed
    pub failures: u64,
}

#[derive(Default)]
struct EngineCounters {
    measurements: AtomicU64,
    cache_hits: AtomicU64,
    joined: AtomicU64,
    failures: AtomicU64,
}

impl EngineCounters {
    fn snapshot(&self) -> EngineStats {
        EngineStats {
            measurements: self.measurements.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Single-flight, cache-first cell analyser.
pub struct AnalysisEngine {
    config: AnalysisConfig,
    store: Arc<ResultStore>,
    world: Arc<dyn WorldDataProvider>,
    signal: Arc<dyn PerformanceSignalProvider>,
    in_flight: Arc<InFlightTable>,
    permits: Arc<Semaphore>,
    counters: Arc<EngineCounters>,
}

impl std::fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisEngine")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.len())
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

impl AnalysisEngine {
    pub fn new(
        config: AnalysisConfig,
        store: Arc<ResultStore>,
        world: Arc<dyn WorldDataProvider>,
        signal: Arc<dyn PerformanceSignalProvider>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_measurements.max(1)));
        Self {
            config,
            store,
            world,
            signal,
            in_flight: InFlightTable::new(),
            permits,
            counters: Arc::new(EngineCounters::default()),
        }
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub fn world(&self) -> &Arc<dyn WorldDataProvider> {
        &self.world
    }

    pub fn stats(&self) -> EngineStats {
        self.counters.snapshot()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, key: &CellKey) -> bool {
        self.in_flight.contains(key)
    }

    fn freshness_ms(&self) -> u64 {
        self.config.freshness_window.as_millis() as u64
    }

    fn fresh_cached(&self, key: &CellKey) -> Option<Arc<AnalysisResult>> {
        self.store
            .get(key)
            .filter(|cached| cached.is_fresh_at(self.freshness_ms(), now_ms()))
    }

    /// Resolves one cell: joined, cached, or freshly measured.
    pub async fn analyze(&self, key: CellKey) -> Result<Arc<AnalysisResult>> {
        if !self.world.is_cell_loaded(&key) {
            return Err(TracerError::CellNotLoaded(key));
        }

        if let Some(rx) = self.in_flight.follow(&key) {
            return self.join_in_flight(key, rx).await;
        }

        if let Some(cached) = self.fresh_cached(&key) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit for cell {}", key);
            return Ok(cached);
        }

        let guard = match self.in_flight.claim(&key) {
            Claim::Follower(rx) => return self.join_in_flight(key, rx).await,
            Claim::Leader(guard) => guard,
        };

        // Another leader may have finished between the cache check and the claim.
        if let Some(cached) = self.fresh_cached(&key) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }

        self.counters.measurements.fetch_add(1, Ordering::Relaxed);

        if !self.config.async_analysis {
            let outcome = measure(self.world.as_ref(), self.signal.as_ref(), &key);
            return complete(&self.store, &self.counters, guard, key, outcome);
        }

        let store = Arc::clone(&self.store);
        let world = Arc::clone(&self.world);
        let signal = Arc::clone(&self.signal);
        let permits = Arc::clone(&self.permits);
        let counters = Arc::clone(&self.counters);
        let task_key = key.clone();

        let task = tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            let measure_key = task_key.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                measure(world.as_ref(), signal.as_ref(), &measure_key)
            })
            .await
            .unwrap_or_else(|e| Err(ProviderError::new(format!("measurement task failed: {}", e))));
            complete(&store, &counters, guard, task_key, outcome)
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Analysis task for cell {} did not finish: {}", key, e);
                Err(TracerError::AnalysisAborted(key))
            }
        }
    }

    /// Analyses every key; failed cells are logged and left out of the result.
    pub async fn analyze_batch(&self, keys: Vec<CellKey>) -> Vec<Arc<AnalysisResult>> {
        if keys.is_empty() {
            return Vec::new();
        }

        let outcomes = join_all(keys.into_iter().map(|key| self.analyze(key))).await;
        outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                Ok(result) => Some(result),
                Err(TracerError::CellNotLoaded(key)) => {
                    debug!("Skipping unloaded cell {}", key);
                    None
                }
                Err(e) => {
                    warn!("Error getting analysis result: {}", e);
                    None
                }
            })
            .collect()
    }

    async fn join_in_flight(
        &self,
        key: CellKey,
        mut rx: watch::Receiver<bool>,
    ) -> Result<Arc<AnalysisResult>> {
        self.counters.joined.fetch_add(1, Ordering::Relaxed);
        // A dropped sender also means the leader is gone.
        let _ = rx.wait_for(|done| *done).await;
        self.store
            .get(&key)
            .ok_or(TracerError::AnalysisAborted(key))
    }
}

/// Collects raw counts and scores them.
fn measure(
    world: &dyn WorldDataProvider,
    signal: &dyn PerformanceSignalProvider,
    key: &CellKey,
) -> std::result::Result<AnalysisResult, ProviderError> {
    let counts = RawCounts::new(
        world.count_entities(key)?,
        world.count_structures(key)?,
        world.count_mechanisms(key)?,
    );
    let performance = read_signal(signal);
    Ok(AnalysisResult::new(key.clone(), counts, performance))
}

/// Writes a successful measurement, then releases the cell.
fn complete(
    store: &ResultStore,
    counters: &EngineCounters,
    guard: InFlightGuard,
    key: CellKey,
    outcome: std::result::Result<AnalysisResult, ProviderError>,
) -> Result<Arc<AnalysisResult>> {
    match outcome {
        Ok(result) => {
            let stored = store.put(result);
            drop(guard);
            debug!("Analyzed cell {}: {}", key, stored.summary());
            Ok(stored)
        }
        Err(source) => {
            drop(guard);
            counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!("Error analyzing cell {}: {}", key, source);
            Err(TracerError::Measurement { key, source })
        }
    }
}
