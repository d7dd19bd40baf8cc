//! Background scheduling: scan ticks, adaptive interval tuning, server-wide
//! scans and store maintenance.
//!
//! 1. **ScanScheduler**: periodic and on-demand scans through the engine
//! 2. **Maintenance**: autosave and retention pruning on their own timers

pub mod adaptive;
pub mod cooldown;
pub mod maintenance;
pub mod periodic;
pub mod scan_scheduler;
pub mod stats;

pub use maintenance::{Maintenance, MaintenanceReport};
pub use periodic::PeriodicTask;
pub use scan_scheduler::{ScanScheduler, ServerScanOutcome};
pub use stats::ScanStatistics;
