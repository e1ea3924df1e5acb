//! Error types for dbsim

use thiserror::Error;

/// Main error type for simulation, filtering, testing and evaluation
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error("Degenerate input: {reason}")]
    DegenerateInput { reason: String },

    #[error("Differential test failed: {reason}")]
    TestFailed { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Numerical instability in {operation}: {details}")]
    NumericalInstability { operation: String, details: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV writing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SimError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        SimError::InvalidParameter { reason: reason.into() }
    }

    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        SimError::DegenerateInput { reason: reason.into() }
    }
}

/// Result type alias for dbsim operations
pub type Result<T> = std::result::Result<T, SimError>;
