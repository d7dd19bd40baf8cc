//! Immutable score record for one cell measurement.

use crate::score::{self, RawCounts, SeverityTier};
use crate::types::{now_ms, CellKey};
use serde::{Deserialize, Serialize};

/// Result of analysing one cell at one point in time.
///
/// Derived fields are computed once in the constructor and never change; a
/// newer measurement supersedes the record instead of editing it. Only the raw
/// inputs and the timestamp are serialized, the rest is recomputed on load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "ResultRecord", from = "ResultRecord")]
pub struct AnalysisResult {
    key: CellKey,
    timestamp: u64,
    counts: RawCounts,
    performance_signal: f64,
    overall_score: f64,
    tier: SeverityTier,
    factors: Vec<String>,
}

impl AnalysisResult {
    /// Builds a record stamped with the current time.
    pub fn new(key: CellKey, counts: RawCounts, performance_signal: f64) -> Self {
        Self::at(key, counts, performance_signal, now_ms())
    }

    /// Builds a record with an explicit timestamp (restores, tests).
    pub fn at(key: CellKey, counts: RawCounts, performance_signal: f64, timestamp: u64) -> Self {
        let scored = score::score(counts, performance_signal);
        Self {
            key,
            timestamp,
            counts,
            performance_signal,
            overall_score: scored.overall,
            tier: scored.tier,
            factors: scored.factors,
        }
    }

    pub fn key(&self) -> &CellKey {
        &self.key
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn counts(&self) -> RawCounts {
        self.counts
    }

    pub fn entity_count(&self) -> u32 {
        self.counts.entities
    }

    pub fn structure_count(&self) -> u32 {
        self.counts.structures
    }

    pub fn mechanism_count(&self) -> u32 {
        self.counts.mechanisms
    }

    pub fn performance_signal(&self) -> f64 {
        self.performance_signal
    }

    pub fn overall_score(&self) -> f64 {
        self.overall_score
    }

    pub fn tier(&self) -> SeverityTier {
        self.tier
    }

    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }

    /// Whether the record is at most `max_age_ms` old at `now`.
    pub fn is_fresh_at(&self, max_age_ms: u64, now: u64) -> bool {
        self.age_ms(now) <= max_age_ms
    }

    pub fn is_fresh(&self, max_age_ms: u64) -> bool {
        self.is_fresh_at(max_age_ms, now_ms())
    }

    pub fn has_significant_load(&self) -> bool {
        self.tier.requires_attention()
    }

    /// Remediation hints for every breached count threshold.
    pub fn recommendations(&self) -> Vec<String> {
        let mut hints = Vec::new();
        if self.counts.entities > score::ENTITY_FACTOR_THRESHOLD {
            hints.push(format!(
                "Consider reducing entity count (current: {})",
                self.counts.entities
            ));
        }
        if self.counts.structures > score::STRUCTURE_FACTOR_THRESHOLD {
            hints.push(format!(
                "Optimize or reduce structures (current: {})",
                self.counts.structures
            ));
        }
        if self.counts.mechanisms > score::MECHANISM_FACTOR_THRESHOLD {
            hints.push(format!(
                "Simplify mechanisms (current: {})",
                self.counts.mechanisms
            ));
        }
        if hints.is_empty() {
            hints.push("No specific optimizations needed".to_string());
        }
        hints
    }

    /// One-line summary, e.g. for logs.
    pub fn summary(&self) -> String {
        format!(
            "Cell [{}, {}] in {} - Score: {:.1} ({}) - Entities: {}, Structures: {}, Mechanisms: {}",
            self.key.x,
            self.key.z,
            self.key.region,
            self.overall_score,
            self.tier,
            self.counts.entities,
            self.counts.structures,
            self.counts.mechanisms
        )
    }
}

/// Persisted form of an [`AnalysisResult`]: raw inputs only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub region: String,
    pub x: i32,
    pub z: i32,
    pub timestamp: u64,
    pub entity_count: u32,
    pub structure_count: u32,
    pub mechanism_count: u32,
    pub performance_signal: f64,
}

impl From<AnalysisResult> for ResultRecord {
    fn from(result: AnalysisResult) -> Self {
        ResultRecord {
            region: result.key.region,
            x: result.key.x,
            z: result.key.z,
            timestamp: result.timestamp,
            entity_count: result.counts.entities,
            structure_count: result.counts.structures,
            mechanism_count: result.counts.mechanisms,
            performance_signal: result.performance_signal,
        }
    }
}

impl From<&AnalysisResult> for ResultRecord {
    fn from(result: &AnalysisResult) -> Self {
        ResultRecord::from(result.clone())
    }
}

impl From<ResultRecord> for AnalysisResult {
    fn from(record: ResultRecord) -> Self {
        AnalysisResult::at(
            CellKey::new(record.region, record.x, record.z),
            RawCounts::new(
                record.entity_count,
                record.structure_count,
                record.mechanism_count,
            ),
            record.performance_signal,
            record.timestamp,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_fields_computed_on_construction() {
        let result = AnalysisResult::at(
            CellKey::new("w", 1, 2),
            RawCounts::new(60, 25, 12),
            10.0,
            1_000,
        );
        assert_eq!(result.overall_score(), 196.0);
        assert_eq!(result.tier(), SeverityTier::Critical);
        assert_eq!(result.factors().len(), 4);
        assert!(result.has_significant_load());
    }

    #[test]
    fn test_record_recomputes_derived_fields() {
        let original = AnalysisResult::at(
            CellKey::new("w", -5, 9),
            RawCounts::new(12, 4, 2),
            17.25,
            42,
        );
        let record = ResultRecord::from(&original);
        let restored = AnalysisResult::from(record);
        assert_eq!(restored, original);
        assert_eq!(
            restored.overall_score().to_bits(),
            original.overall_score().to_bits()
        );
    }

    #[test]
    fn test_json_omits_derived_fields() {
        let result = AnalysisResult::at(CellKey::new("w", 0, 0), RawCounts::default(), 20.0, 7);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"entity_count\":0"));
        assert!(!json.contains("overall_score"));
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_freshness() {
        let result = AnalysisResult::at(CellKey::new("w", 0, 0), RawCounts::default(), 20.0, 1_000);
        assert!(result.is_fresh_at(500, 1_500));
        assert!(!result.is_fresh_at(500, 1_501));
        // Clock skew never makes a record stale
        assert!(result.is_fresh_at(0, 900));
    }

    #[test]
    fn test_recommendations() {
        let quiet = AnalysisResult::at(CellKey::new("w", 0, 0), RawCounts::default(), 20.0, 0);
        assert_eq!(quiet.recommendations(), vec!["No specific optimizations needed"]);

        let busy = AnalysisResult::at(CellKey::new("w", 0, 0), RawCounts::new(51, 0, 11), 20.0, 0);
        assert_eq!(busy.recommendations().len(), 2);
    }
}
