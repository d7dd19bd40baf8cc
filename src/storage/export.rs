//! JSON / CSV export of analysis history.

use crate::error::{Result, TracerError};
use crate::result::AnalysisResult;
use serde::Serialize;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = TracerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(TracerError::UnsupportedExportFormat(other.to_string())),
        }
    }
}

/// Flattened row including the derived fields.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    timestamp: u64,
    region: &'a str,
    x: i32,
    z: i32,
    entities: u32,
    structures: u32,
    mechanisms: u32,
    score: f64,
    tier: &'static str,
    performance_signal: f64,
    factors: &'a [String],
}

impl<'a> From<&'a AnalysisResult> for ExportRow<'a> {
    fn from(result: &'a AnalysisResult) -> Self {
        ExportRow {
            timestamp: result.timestamp(),
            region: &result.key().region,
            x: result.key().x,
            z: result.key().z,
            entities: result.entity_count(),
            structures: result.structure_count(),
            mechanisms: result.mechanism_count(),
            score: result.overall_score(),
            tier: result.tier().as_str(),
            performance_signal: result.performance_signal(),
            factors: result.factors(),
        }
    }
}

pub const CSV_HEADER: &str =
    "timestamp,region,cell_x,cell_z,entities,structures,mechanisms,score,tier,performance_signal";

pub fn write_json<W: Write>(results: &[Arc<AnalysisResult>], out: W) -> Result<()> {
    let rows: Vec<ExportRow<'_>> = results.iter().map(|r| ExportRow::from(r.as_ref())).collect();
    serde_json::to_writer_pretty(out, &rows)?;
    Ok(())
}

pub fn write_csv<W: Write>(results: &[Arc<AnalysisResult>], mut out: W) -> Result<()> {
    writeln!(out, "{}", CSV_HEADER)?;
    for result in results {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{:.2},{},{:.2}",
            result.timestamp(),
            csv_field(&result.key().region),
            result.key().x,
            result.key().z,
            result.entity_count(),
            result.structure_count(),
            result.mechanism_count(),
            result.overall_score(),
            result.tier(),
            result.performance_signal()
        )?;
    }
    out.flush()?;
    Ok(())
}

pub fn write<W: Write>(format: ExportFormat, results: &[Arc<AnalysisResult>], out: W) -> Result<()> {
    match format {
        ExportFormat::Json => write_json(results, out),
        ExportFormat::Csv => write_csv(results, out),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
