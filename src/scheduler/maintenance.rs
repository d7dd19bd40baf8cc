//! Store maintenance - periodic autosave and history pruning.
//!
//! Runs beside the scan scheduler on its own timers. Snapshot writes happen
//! on the blocking pool so the timers never stall on disk I/O. Shutdown
//! disarms both timers and performs one final save.

use log::{debug, error, info};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use super::periodic::PeriodicTask;
use crate::storage::ResultStore;
use crate::types::now_ms;

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Whether a snapshot was written
    pub persisted: bool,
    /// History records removed by retention
    pub pruned: usize,
    /// Duration of the pass in milliseconds
    pub duration_ms: u64,
    /// Timestamp of the pass
    pub timestamp: u64,
}

pub struct Maintenance {
    store: Arc<ResultStore>,
    tasks: Mutex<Vec<PeriodicTask>>,
    last_autosave_at: RwLock<Option<u64>>,
    last_prune_at: RwLock<Option<u64>>,
}

impl std::fmt::Debug for Maintenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Maintenance")
            .field("running", &self.is_running())
            .field("last_autosave", &self.last_autosave())
            .finish()
    }
}

impl Maintenance {
    pub fn new(store: Arc<ResultStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            tasks: Mutex::new(Vec::new()),
            last_autosave_at: RwLock::new(None),
            last_prune_at: RwLock::new(None),
        })
    }

    /// Arms the autosave and prune timers. No-op if already armed.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let config = self.store.config();

        if config.persistence_enabled {
            let me = Arc::downgrade(self);
            let every = config.autosave_interval;
            tasks.push(PeriodicTask::spawn("autosave", every, every, move || {
                let me = me.clone();
                async move {
                    if let Some(maintenance) = me.upgrade() {
                        maintenance.run_autosave().await;
                    }
                }
            }));
            info!("Started auto-save with {}-second interval", every.as_secs());
        }

        if config.history_enabled {
            let me = Arc::downgrade(self);
            let every = config.prune_interval;
            tasks.push(PeriodicTask::spawn("prune", every, every, move || {
                let me = me.clone();
                async move {
                    if let Some(maintenance) = me.upgrade() {
                        maintenance.run_prune();
                    }
                }
            }));
            debug!("Started history pruning with {}-second interval", every.as_secs());
        }
    }

    pub fn stop(&self) {
        self.tasks.lock().clear();
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    /// Disarms the timers, prunes once and writes a final snapshot.
    pub async fn shutdown(&self) -> MaintenanceReport {
        self.stop();
        let start = now_ms();
        let pruned = self.run_prune();
        let persisted = self.run_autosave().await;
        MaintenanceReport {
            persisted,
            pruned,
            duration_ms: now_ms().saturating_sub(start),
            timestamp: now_ms(),
        }
    }

    /// Writes a snapshot on the blocking pool.
    pub async fn run_autosave(&self) -> bool {
        if !self.store.config().persistence_enabled {
            return false;
        }

        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.persist()).await {
            Ok(true) => {
                *self.last_autosave_at.write() = Some(now_ms());
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!("Auto-save task failed: {}", e);
                false
            }
        }
    }

    /// Drops history older than the configured retention.
    pub fn run_prune(&self) -> usize {
        let removed = self.store.prune_expired_history(self.store.retention_ms());
        *self.last_prune_at.write() = Some(now_ms());
        if removed > 0 {
            info!("Pruned {} expired history records", removed);
        }
        removed
    }

    pub fn last_autosave(&self) -> Option<u64> {
        *self.last_autosave_at.read()
    }

    pub fn last_prune(&self) -> Option<u64> {
        *self.last_prune_at.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::result::AnalysisResult;
    use crate::score::RawCounts;
    use crate::types::CellKey;
    use std::time::Duration;

    fn store_in(dir: &std::path::Path) -> Arc<ResultStore> {
        Arc::new(ResultStore::new(StorageConfig {
            data_dir: dir.to_path_buf(),
            retention: Duration::from_secs(60),
            ..StorageConfig::default()
        }))
    }

    #[tokio::test]
    async fn test_shutdown_persists_and_prunes() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = store_in(tmp_dir.path());
        let now = now_ms();
        store.put(AnalysisResult::at(CellKey::new("w", 0, 0), RawCounts::default(), 20.0, now));
        store.put(AnalysisResult::at(
            CellKey::new("w", 1, 0),
            RawCounts::default(),
            20.0,
            now - 120_000,
        ));

        let maintenance = Maintenance::new(Arc::clone(&store));
        maintenance.start();
        assert!(maintenance.is_running());

        let report = maintenance.shutdown().await;
        assert!(!maintenance.is_running());
        assert!(report.persisted);
        assert_eq!(report.pruned, 1);
        assert_eq!(store.history_len(), 1);
        assert!(maintenance.last_autosave().is_some());
        assert!(store.config().cache_snapshot_path().exists());
    }

    #[tokio::test]
    async fn test_autosave_disabled() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ResultStore::new(StorageConfig {
            data_dir: tmp_dir.path().to_path_buf(),
            persistence_enabled: false,
            ..StorageConfig::default()
        }));

        let maintenance = Maintenance::new(store);
        assert!(!maintenance.run_autosave().await);
        assert!(maintenance.last_autosave().is_none());
    }
}
