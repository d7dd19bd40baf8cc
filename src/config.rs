//! Tracer configuration.
//!
//! Every section has production defaults; a JSON file only needs the keys it
//! overrides. Durations are written as whole seconds.

use crate::error::{Result, TracerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

/// Settings for [`crate::analysis::AnalysisEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Maximum age of a cached result served without recomputation
    #[serde(with = "duration_secs")]
    pub freshness_window: Duration,
    /// Run measurements on the blocking pool instead of the caller's task
    pub async_analysis: bool,
    /// Upper bound on measurements running at once
    pub max_concurrent_measurements: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(300),
            async_analysis: true,
            max_concurrent_measurements: 4,
        }
    }
}

/// Settings for the periodic observer scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Arm the periodic scan when the tracer starts
    pub automatic: bool,
    /// Base period between scan ticks
    #[serde(with = "duration_secs")]
    pub scan_interval: Duration,
    /// Delay before the first tick after (re)arming
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    /// Radius used around each observer
    pub default_radius: u32,
    /// Largest radius accepted from on-demand requests
    pub max_radius: u32,
    /// How long an analysed cell is skipped by later ticks
    #[serde(with = "duration_secs")]
    pub cell_cooldown: Duration,
    /// How long a region is skipped after a completed observer scan
    #[serde(with = "duration_secs")]
    pub region_cooldown: Duration,
    /// Upper bound on waiting for a tick's batches
    #[serde(with = "duration_secs")]
    pub scan_timeout: Duration,
    /// Regions never scanned
    pub excluded_regions: Vec<String>,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            automatic: true,
            scan_interval: Duration::from_secs(30),
            initial_delay: Duration::from_secs(1),
            default_radius: 5,
            max_radius: 10,
            cell_cooldown: Duration::from_secs(60),
            region_cooldown: Duration::from_secs(30),
            scan_timeout: Duration::from_secs(30),
            excluded_regions: Vec::new(),
        }
    }
}

/// Settings for the feedback loop that tunes the scan interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub enabled: bool,
    /// How often the loop re-evaluates the interval
    #[serde(with = "duration_secs")]
    pub period: Duration,
    /// Below this signal the interval is stretched
    pub target_signal: f64,
    /// Above this signal (and with fast scans) the interval shrinks
    pub comfortable_signal: f64,
    /// Average scan duration under which scans count as fast
    #[serde(with = "duration_secs")]
    pub fast_scan_threshold: Duration,
    /// Multiplier applied to the base interval when speeding up
    pub speedup_factor: f64,
    #[serde(with = "duration_secs")]
    pub min_interval: Duration,
    #[serde(with = "duration_secs")]
    pub max_interval: Duration,
    /// Changes at or below this size do not re-arm the scan task
    #[serde(with = "duration_secs")]
    pub hysteresis: Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period: Duration::from_secs(60),
            target_signal: 19.0,
            comfortable_signal: 19.5,
            fast_scan_threshold: Duration::from_secs(1),
            speedup_factor: 0.8,
            min_interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(300),
            hysteresis: Duration::from_secs(1),
        }
    }
}

/// Settings for scans over every loaded cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerWideConfig {
    /// Run the server-wide scan on its own timer
    pub enabled: bool,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    /// Below this signal a server-wide scan is skipped entirely
    pub signal_floor: f64,
}

impl Default for ServerWideConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(3600),
            signal_floor: 15.0,
        }
    }
}

/// Settings for [`crate::storage::ResultStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the snapshot files and exports
    pub data_dir: PathBuf,
    /// Load snapshots at startup and write them periodically
    pub persistence_enabled: bool,
    /// Keep superseded results in the history list
    pub history_enabled: bool,
    /// Maximum age of a history record
    #[serde(with = "duration_secs")]
    pub retention: Duration,
    #[serde(with = "duration_secs")]
    pub autosave_interval: Duration,
    #[serde(with = "duration_secs")]
    pub prune_interval: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./var/tracer"),
            persistence_enabled: true,
            history_enabled: true,
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            autosave_interval: Duration::from_secs(300),
            prune_interval: Duration::from_secs(3600),
        }
    }
}

impl StorageConfig {
    pub fn cache_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("analysis_cache.bin")
    }

    pub fn history_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("analysis_history.bin")
    }

    pub fn export_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }
}

/// Complete tracer configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    pub analysis: AnalysisConfig,
    pub scanning: ScanningConfig,
    pub adaptive: AdaptiveConfig,
    pub server_wide: ServerWideConfig,
    pub storage: StorageConfig,
}

impl TracerConfig {
    /// Loads and validates a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: TracerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would make the scheduler or engine misbehave.
    pub fn validate(&self) -> Result<()> {
        fn non_zero(name: &str, value: Duration) -> Result<()> {
            if value.is_zero() {
                return Err(TracerError::InvalidConfig(format!("{} must be non-zero", name)));
            }
            Ok(())
        }
        fn finite(name: &str, value: f64) -> Result<()> {
            if !value.is_finite() {
                return Err(TracerError::InvalidConfig(format!("{} must be finite", name)));
            }
            Ok(())
        }

        if self.analysis.max_concurrent_measurements == 0 {
            return Err(TracerError::InvalidConfig(
                "analysis.max_concurrent_measurements must be at least 1".to_string(),
            ));
        }

        non_zero("scanning.scan_interval", self.scanning.scan_interval)?;
        non_zero("scanning.scan_timeout", self.scanning.scan_timeout)?;
        if self.scanning.default_radius == 0 || self.scanning.max_radius == 0 {
            return Err(TracerError::InvalidConfig(
                "scanning radii must be at least 1".to_string(),
            ));
        }
        if self.scanning.default_radius > self.scanning.max_radius {
            return Err(TracerError::InvalidConfig(format!(
                "scanning.default_radius {} exceeds max_radius {}",
                self.scanning.default_radius, self.scanning.max_radius
            )));
        }

        non_zero("adaptive.period", self.adaptive.period)?;
        non_zero("adaptive.min_interval", self.adaptive.min_interval)?;
        if self.adaptive.min_interval > self.adaptive.max_interval {
            return Err(TracerError::InvalidConfig(format!(
                "adaptive.min_interval {}s exceeds max_interval {}s",
                self.adaptive.min_interval.as_secs(),
                self.adaptive.max_interval.as_secs()
            )));
        }
        finite("adaptive.target_signal", self.adaptive.target_signal)?;
        finite("adaptive.comfortable_signal", self.adaptive.comfortable_signal)?;
        finite("adaptive.speedup_factor", self.adaptive.speedup_factor)?;
        if self.adaptive.speedup_factor <= 0.0 {
            return Err(TracerError::InvalidConfig(
                "adaptive.speedup_factor must be positive".to_string(),
            ));
        }

        non_zero("server_wide.interval", self.server_wide.interval)?;
        finite("server_wide.signal_floor", self.server_wide.signal_floor)?;

        non_zero("storage.autosave_interval", self.storage.autosave_interval)?;
        non_zero("storage.prune_interval", self.storage.prune_interval)?;

        Ok(())
    }
}
