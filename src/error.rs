//! Error types for the forecasting engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that can occur in the forecasting engine.
#[derive(Error, Debug)]
pub enum ForecastError {
    /// Asset identifier was never registered
    #[error("unknown asset '{0}'")]
    UnknownAsset(String),

    /// Too few price rows for windowing
    #[error("insufficient history for '{asset}': {rows} rows, need at least {needed}")]
    InsufficientHistory {
        asset: String,
        rows: usize,
        needed: usize,
    },

    /// Model and registry disagree and cannot be served together
    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),

    /// Dataset build produced zero training examples
    #[error("no usable assets: dataset build produced zero training examples")]
    NoUsableAssets,

    /// Loss became non-finite during training
    #[error("training diverged: non-finite loss at epoch {epoch}")]
    TrainingDiverged { epoch: usize },

    /// A history file could not be interpreted
    #[error("malformed history for '{asset}': {reason}")]
    MalformedHistory { asset: String, reason: String },

    /// Model configuration cannot be trained
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Artifact serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
