//! Result store - latest score per cell plus a time-ordered history.
//!
//! The cache is a concurrent map; single-key reads and writes need no
//! cross-key atomicity. The history `RwLock` is the store's one coordination
//! lock: `put` and the clear operations take its write side so the cache and
//! history always change together, `persist` captures both under the write
//! side, and readers take the read side so they never block each other.

use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::export::{self, ExportFormat};
use super::snapshot::SnapshotFile;
use super::types::{SnapshotCounts, StoreStats, ESTIMATED_RECORD_BYTES};
use crate::config::StorageConfig;
use crate::error::{Result, TracerError};
use crate::result::{AnalysisResult, ResultRecord};
use crate::types::{now_ms, CellKey};

type CacheRecords = HashMap<String, ResultRecord>;
type HistoryRecords = Vec<ResultRecord>;

/// Thread-safe store of analysis results.
pub struct ResultStore {
    config: StorageConfig,
    cache: DashMap<CellKey, Arc<AnalysisResult>>,
    history: RwLock<Vec<Arc<AnalysisResult>>>,
    cache_file: SnapshotFile,
    history_file: SnapshotFile,
    /// Serializes file writes between overlapping persists
    persist_io: Mutex<()>,
    last_persist_at: AtomicU64,
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStore")
            .field("data_dir", &self.config.data_dir)
            .field("cache_entries", &self.cache.len())
            .field("history_entries", &self.history.read().len())
            .finish()
    }
}

impl ResultStore {
    pub fn new(config: StorageConfig) -> Self {
        let cache_file = SnapshotFile::new(config.cache_snapshot_path(), "cache");
        let history_file = SnapshotFile::new(config.history_snapshot_path(), "history");
        Self {
            config,
            cache: DashMap::new(),
            history: RwLock::new(Vec::new()),
            cache_file,
            history_file,
            persist_io: Mutex::new(()),
            last_persist_at: AtomicU64::new(0),
        }
    }

    /// Creates the store, restores the last snapshot and prunes expired history.
    pub fn open(config: StorageConfig) -> Self {
        let store = Self::new(config);
        store.restore();
        let removed = store.prune_expired_history(store.retention_ms());
        if removed > 0 {
            info!("Pruned {} expired history records on startup", removed);
        }
        store
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn retention_ms(&self) -> u64 {
        self.config.retention.as_millis() as u64
    }

    /// Inserts or overwrites the cached result for its cell and, when history
    /// is enabled, appends it to the history.
    pub fn put(&self, result: AnalysisResult) -> Arc<AnalysisResult> {
        let result = Arc::new(result);
        let mut history = self.history.write();
        self.cache.insert(result.key().clone(), Arc::clone(&result));
        if self.config.history_enabled {
            history.push(Arc::clone(&result));
        }
        drop(history);

        debug!("Stored result for cell {}", result.key());
        result
    }

    pub fn get(&self, key: &CellKey) -> Option<Arc<AnalysisResult>> {
        let _history = self.history.read();
        self.cache.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Copy of every cached result.
    pub fn snapshot(&self) -> HashMap<CellKey, Arc<AnalysisResult>> {
        let _history = self.history.read();
        self.cache
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// History records no older than `max_age_ms`.
    pub fn history_since(&self, max_age_ms: u64) -> Vec<Arc<AnalysisResult>> {
        self.history_since_at(max_age_ms, now_ms())
    }

    pub fn history_since_at(&self, max_age_ms: u64, now: u64) -> Vec<Arc<AnalysisResult>> {
        let cutoff = now.saturating_sub(max_age_ms);
        self.history
            .read()
            .iter()
            .filter(|result| result.timestamp() >= cutoff)
            .cloned()
            .collect()
    }

    /// Cached results ordered by descending score.
    pub fn worst(&self, limit: usize) -> Vec<Arc<AnalysisResult>> {
        let mut results: Vec<Arc<AnalysisResult>> = self.snapshot().into_values().collect();
        results.sort_by(|a, b| b.overall_score().total_cmp(&a.overall_score()));
        results.truncate(limit);
        results
    }

    pub fn clear_cache(&self) {
        let _history = self.history.write();
        let size = self.cache.len();
        self.cache.clear();
        info!("Cleared analysis cache ({} entries)", size);
    }

    pub fn clear_history(&self) {
        let mut history = self.history.write();
        let size = history.len();
        history.clear();
        info!("Cleared analysis history ({} entries)", size);
    }

    pub fn clear_all(&self) {
        self.clear_cache();
        self.clear_history();
    }

    /// Drops history records older than `retention_ms`. Returns how many were removed.
    pub fn prune_expired_history(&self, retention_ms: u64) -> usize {
        self.prune_expired_history_at(retention_ms, now_ms())
    }

    pub fn prune_expired_history_at(&self, retention_ms: u64, now: u64) -> usize {
        let cutoff = now.saturating_sub(retention_ms);
        let mut history = self.history.write();
        let before = history.len();
        history.retain(|result| result.timestamp() >= cutoff);
        let removed = before - history.len();
        if removed > 0 {
            debug!("Pruned {} history records older than {}", removed, cutoff);
        }
        removed
    }

    /// Best-effort checkpoint. Failures are logged and swallowed.
    pub fn persist(&self) -> bool {
        match self.try_persist() {
            Ok(counts) => {
                debug!(
                    "Persisted {} cached and {} historical results",
                    counts.cache_entries, counts.history_entries
                );
                true
            }
            Err(e) => {
                warn!("Failed to persist analysis data: {}", e);
                false
            }
        }
    }

    /// Writes the cache and history snapshots.
    pub fn try_persist(&self) -> Result<SnapshotCounts> {
        if !self.config.persistence_enabled {
            return Ok(SnapshotCounts::default());
        }

        let _io = self.persist_io.lock();
        let (cache, history) = {
            let history = self.history.write();
            let cache: CacheRecords = self
                .cache
                .iter()
                .map(|entry| (entry.key().to_string(), ResultRecord::from(entry.value().as_ref())))
                .collect();
            let history: HistoryRecords = history
                .iter()
                .map(|result| ResultRecord::from(result.as_ref()))
                .collect();
            (cache, history)
        };

        self.cache_file.write(&cache, cache.len())?;
        self.history_file.write(&history, history.len())?;
        self.last_persist_at.store(now_ms(), Ordering::Relaxed);

        Ok(SnapshotCounts {
            cache_entries: cache.len(),
            history_entries: history.len(),
        })
    }

    /// Loads the last checkpoint. On failure the store is left empty.
    pub fn restore(&self) -> bool {
        match self.try_restore() {
            Ok(counts) => {
                if counts.cache_entries > 0 || counts.history_entries > 0 {
                    info!(
                        "Loaded {} cached and {} historical analysis results",
                        counts.cache_entries, counts.history_entries
                    );
                }
                true
            }
            Err(e) => {
                warn!("Failed to restore analysis data, starting empty: {}", e);
                false
            }
        }
    }

    /// Replaces the store contents with the persisted snapshots.
    pub fn try_restore(&self) -> Result<SnapshotCounts> {
        if !self.config.persistence_enabled {
            return Ok(SnapshotCounts::default());
        }

        let cache: CacheRecords = self.cache_file.read()?.unwrap_or_default();
        let history: HistoryRecords = self.history_file.read()?.unwrap_or_default();

        let mut restored = Vec::with_capacity(cache.len());
        for (key, record) in cache {
            let result = AnalysisResult::from(record);
            if result.key().to_string() != key {
                return Err(TracerError::Snapshot(format!(
                    "Cache key '{}' does not match record for {}",
                    key,
                    result.key()
                )));
            }
            restored.push(Arc::new(result));
        }

        let mut guard = self.history.write();
        self.cache.clear();
        for result in restored {
            self.cache.insert(result.key().clone(), result);
        }
        *guard = history
            .into_iter()
            .map(|record| Arc::new(AnalysisResult::from(record)))
            .collect();

        Ok(SnapshotCounts {
            cache_entries: self.cache.len(),
            history_entries: guard.len(),
        })
    }

    /// Writes the last `hours` of history into the export directory.
    pub fn export(&self, format: ExportFormat, hours: u64) -> Result<PathBuf> {
        let data = self.history_since(hours.saturating_mul(60 * 60 * 1000));
        if data.is_empty() {
            return Err(TracerError::NoData(
                "no history available for export".to_string(),
            ));
        }

        let dir = self.config.export_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("tracer_export_{}.{}", now_ms(), format.extension()));
        let file = File::create(&path)?;
        export::write(format, &data, BufWriter::new(file))?;

        info!("Exported {} records to: {}", data.len(), path.display());
        Ok(path)
    }

    pub fn stats(&self) -> StoreStats {
        let history = self.history.read();
        let cache_entries = self.cache.len();
        let history_entries = history.len();
        let last = self.last_persist_at.load(Ordering::Relaxed);
        StoreStats {
            cache_entries,
            history_entries,
            persistence_enabled: self.config.persistence_enabled,
            history_enabled: self.config.history_enabled,
            retention_ms: self.retention_ms(),
            estimated_memory_bytes: (cache_entries + history_entries) as u64 * ESTIMATED_RECORD_BYTES,
            last_persist_at: (last > 0).then_some(last),
        }
    }
}
