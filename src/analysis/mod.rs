//! Cell analysis: single-flight measurement, scoring and caching.

pub mod engine;
mod in_flight;

pub use engine::{AnalysisEngine, EngineStats};
