//! Adaptive scan interval policy.
//!
//! Pure functions so the control loop can be tested without a runtime.

use std::time::Duration;

use crate::config::AdaptiveConfig;
use crate::score::NOMINAL_SIGNAL;

/// Next scan interval for the given host signal and average scan time.
///
/// - signal below `target_signal`: stretch the base interval by how far the
///   signal is below nominal (`base * (2 - signal / 20)`)
/// - signal above `comfortable_signal` with fast scans: shrink it by
///   `speedup_factor`
/// - otherwise: the base interval
///
/// The result always lies in `[min_interval, max_interval]`.
pub fn compute_next_interval(
    base: Duration,
    signal: f64,
    average_scan: Duration,
    config: &AdaptiveConfig,
) -> Duration {
    let signal = if signal.is_finite() {
        signal.clamp(0.0, NOMINAL_SIGNAL)
    } else {
        NOMINAL_SIGNAL
    };
    let performance_factor = signal / NOMINAL_SIGNAL;
    let base_secs = base.as_secs_f64();

    let next_secs = if signal < config.target_signal {
        base_secs * (1.0 + (1.0 - performance_factor))
    } else if signal > config.comfortable_signal && average_scan < config.fast_scan_threshold {
        base_secs * config.speedup_factor
    } else {
        base_secs
    };

    let min = config.min_interval.as_secs_f64();
    let max = config.max_interval.as_secs_f64().max(min);
    Duration::from_secs_f64(next_secs.clamp(min, max))
}

/// True when `next` differs from `current` by more than `hysteresis`.
pub fn exceeds_hysteresis(current: Duration, next: Duration, hysteresis: Duration) -> bool {
    let delta = if next > current {
        next - current
    } else {
        current - next
    };
    delta > hysteresis
}
