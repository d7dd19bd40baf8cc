//! Severity scoring for a single cell.
//!
//! The score is a weighted linear sum of the raw counts plus a penalty for a
//! degraded host performance signal. The weights and thresholds are policy:
//!
//! | input             | weight | factor threshold |
//! |-------------------|--------|------------------|
//! | entities          | 1.0    | > 50             |
//! | structures        | 2.0    | > 20             |
//! | mechanisms        | 3.0    | > 10             |
//! | 20 - signal (≥ 0) | 5.0    | signal < 18.0    |
//!
//! Tiers are inclusive lower bounds on the score: CRITICAL ≥ 80, HIGH ≥ 60,
//! MEDIUM ≥ 30, otherwise LOW. The signal term alone can reach CRITICAL for
//! an empty cell on a struggling host.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ENTITY_WEIGHT: f64 = 1.0;
pub const STRUCTURE_WEIGHT: f64 = 2.0;
pub const MECHANISM_WEIGHT: f64 = 3.0;
pub const SIGNAL_WEIGHT: f64 = 5.0;

/// Signal value meaning "host running at full speed".
pub const NOMINAL_SIGNAL: f64 = 20.0;

pub const ENTITY_FACTOR_THRESHOLD: u32 = 50;
pub const STRUCTURE_FACTOR_THRESHOLD: u32 = 20;
pub const MECHANISM_FACTOR_THRESHOLD: u32 = 10;
pub const SIGNAL_FACTOR_THRESHOLD: f64 = 18.0;

pub const CRITICAL_THRESHOLD: f64 = 80.0;
pub const HIGH_THRESHOLD: f64 = 60.0;
pub const MEDIUM_THRESHOLD: f64 = 30.0;

pub const NO_SIGNIFICANT_FACTORS: &str = "no significant factors";

/// Discrete severity classification, ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeverityTier {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityTier {
    pub const ALL: [SeverityTier; 4] = [
        SeverityTier::Low,
        SeverityTier::Medium,
        SeverityTier::High,
        SeverityTier::Critical,
    ];

    pub fn from_score(score: f64) -> Self {
        if score >= CRITICAL_THRESHOLD {
            SeverityTier::Critical
        } else if score >= HIGH_THRESHOLD {
            SeverityTier::High
        } else if score >= MEDIUM_THRESHOLD {
            SeverityTier::Medium
        } else {
            SeverityTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityTier::Low => "LOW",
            SeverityTier::Medium => "MEDIUM",
            SeverityTier::High => "HIGH",
            SeverityTier::Critical => "CRITICAL",
        }
    }

    /// HIGH and CRITICAL cells warrant operator attention.
    pub fn requires_attention(&self) -> bool {
        matches!(self, SeverityTier::High | SeverityTier::Critical)
    }

    pub fn is_critical(&self) -> bool {
        *self == SeverityTier::Critical
    }

    pub fn recommended_action(&self) -> &'static str {
        match self {
            SeverityTier::Low => "Continue monitoring",
            SeverityTier::Medium => "Consider optimization",
            SeverityTier::High => "Optimization recommended",
            SeverityTier::Critical => "Immediate action required",
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeverityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(SeverityTier::Low),
            "MEDIUM" => Ok(SeverityTier::Medium),
            "HIGH" => Ok(SeverityTier::High),
            "CRITICAL" => Ok(SeverityTier::Critical),
            other => Err(format!("Unknown severity tier '{}'", other)),
        }
    }
}

/// Raw per-cell counts reported by the world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCounts {
    pub entities: u32,
    pub structures: u32,
    pub mechanisms: u32,
}

impl RawCounts {
    pub fn new(entities: u32, structures: u32, mechanisms: u32) -> Self {
        Self {
            entities,
            structures,
            mechanisms,
        }
    }
}

/// Output of [`score`].
#[derive(Clone, Debug, PartialEq)]
pub struct Score {
    pub overall: f64,
    pub tier: SeverityTier,
    pub factors: Vec<String>,
}

/// Non-finite signals are treated as nominal; negatives clamp to zero.
#[inline]
pub fn sanitize_signal(signal: f64) -> f64 {
    if signal.is_finite() {
        signal.max(0.0)
    } else {
        NOMINAL_SIGNAL
    }
}

/// Weighted score of a cell. Pure and deterministic.
pub fn overall_score(counts: RawCounts, performance_signal: f64) -> f64 {
    let signal = sanitize_signal(performance_signal);
    let mut score = counts.entities as f64 * ENTITY_WEIGHT;
    score += counts.structures as f64 * STRUCTURE_WEIGHT;
    score += counts.mechanisms as f64 * MECHANISM_WEIGHT;
    score += (NOMINAL_SIGNAL - signal).max(0.0) * SIGNAL_WEIGHT;
    score
}

/// Human-readable list of the inputs that breached their alerting threshold.
pub fn contributing_factors(counts: RawCounts, performance_signal: f64) -> Vec<String> {
    let signal = sanitize_signal(performance_signal);
    let mut factors = Vec::new();

    if counts.entities > ENTITY_FACTOR_THRESHOLD {
        factors.push(format!("High entity count: {}", counts.entities));
    }
    if counts.structures > STRUCTURE_FACTOR_THRESHOLD {
        factors.push(format!("High structure count: {}", counts.structures));
    }
    if counts.mechanisms > MECHANISM_FACTOR_THRESHOLD {
        factors.push(format!("High mechanism count: {}", counts.mechanisms));
    }
    if signal < SIGNAL_FACTOR_THRESHOLD {
        factors.push(format!("Low performance signal: {:.1}", signal));
    }

    if factors.is_empty() {
        factors.push(NO_SIGNIFICANT_FACTORS.to_string());
    }
    factors
}

/// Scores a cell from its raw counts and the host performance signal.
pub fn score(counts: RawCounts, performance_signal: f64) -> Score {
    let overall = overall_score(counts, performance_signal);
    Score {
        overall,
        tier: SeverityTier::from_score(overall),
        factors: contributing_factors(counts, performance_signal),
    }
}
