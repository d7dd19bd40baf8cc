use crate::types::CellKey;
use thiserror::Error;

/// Failure reported by an external collaborator (world data or performance signal).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct ProviderError(pub String);

impl ProviderError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Error, Debug)]
pub enum TracerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Invalid radius {radius}: must be between 1 and {max}")]
    InvalidRadius { radius: u32, max: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cell {0} is not loaded")]
    CellNotLoaded(CellKey),

    #[error("Measurement of cell {key} failed: {source}")]
    Measurement {
        key: CellKey,
        #[source]
        source: ProviderError,
    },

    #[error("Analysis of cell {0} ended without a result")]
    AnalysisAborted(CellKey),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Unsupported export format: {0}")]
    UnsupportedExportFormat(String),
}

pub type Result<T> = std::result::Result<T, TracerError>;
