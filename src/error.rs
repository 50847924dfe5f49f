//! Error type shared by every fallible operation in the crate.

use thiserror::Error;

use crate::model::output::OutputSelect;

#[derive(Error, Debug)]
pub enum FgsmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Plot rendering error: {0}")]
    Plot(String),

    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    #[error("Epsilon must lie in [0, 1], got {0}")]
    InvalidEpsilon(f64),

    #[error("Gradient contains non-finite values")]
    NonFiniteGradient,

    #[error("Model has no {0} output head")]
    MissingHead(OutputSelect),

    #[error("Invalid architecture: {0}")]
    InvalidSpec(String),

    #[error("Invalid IDX data: {0}")]
    Idx(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FgsmError>;

impl FgsmError {
    pub(crate) fn shape(expected: impl ToString, got: impl ToString) -> Self {
        FgsmError::ShapeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}
