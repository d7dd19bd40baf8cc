use std::fmt;
use std::time::Duration;

/// Scan counters owned by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScanStatistics {
    pub total_scans: u64,
    pub cells_analyzed: u64,
    /// Running mean of scan wall time, in seconds
    pub average_scan_secs: f64,
}

impl ScanStatistics {
    /// Records one finished scan: `avg' = (avg * (n - 1) + d) / n`.
    pub fn record_scan(&mut self, duration: Duration, cells: usize) {
        self.total_scans += 1;
        self.cells_analyzed += cells as u64;
        let n = self.total_scans as f64;
        self.average_scan_secs =
            (self.average_scan_secs * (n - 1.0) + duration.as_secs_f64()) / n;
    }

    pub fn average_scan(&self) -> Duration {
        Duration::from_secs_f64(self.average_scan_secs.max(0.0))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// One-line summary, e.g. `Scans: 3 | Cells: 120 | Avg Time: 0.42s | Interval: 30s | Cache: 97`.
    pub fn render(&self, interval: Duration, cache_entries: usize) -> String {
        format!(
            "Scans: {} | Cells: {} | Avg Time: {:.2}s | Interval: {}s | Cache: {}",
            self.total_scans,
            self.cells_analyzed,
            self.average_scan_secs,
            interval.as_secs(),
            cache_entries
        )
    }
}

impl fmt::Display for ScanStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scans: {} | Cells: {} | Avg Time: {:.2}s",
            self.total_scans, self.cells_analyzed, self.average_scan_secs
        )
    }
}
