//! Error types for Glucose Flux

use thiserror::Error;

/// Errors that can occur during analysis
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No data: {0}")]
    NoData(String),

    #[error("Invalid bucket width: {0} minutes (must be > 0 and divide 1440)")]
    InvalidBucketWidth(u32),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse readings: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Reading source error: {0}")]
    SourceError(String),

    #[error("Statistics engine is closed")]
    EngineClosed,
}

impl AnalysisError {
    /// True for the "insufficient data" outcome, which callers render
    /// differently from a failure.
    pub fn is_no_data(&self) -> bool {
        matches!(self, AnalysisError::NoData(_))
    }
}
