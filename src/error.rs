//! Error types for subspace construction.

use thiserror::Error;

/// Unified error type for every fallible operation in the crate.
#[derive(Error, Debug)]
pub enum LtmdError {
    /// Invalid parameters or inputs, detected before any computation proceeds
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Matrix or vector shapes that do not line up
    #[error("Dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: String,
        expected: String,
        found: String,
    },

    /// The force provider could not produce a result
    #[error("Force evaluation failed: {0}")]
    Evaluation(String),

    /// The eigensolver did not converge or was handed an invalid matrix
    #[error("Eigensolver failed: {0}")]
    Eigensolver(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yml::Error),
}

impl LtmdError {
    pub fn config(message: impl Into<String>) -> Self {
        LtmdError::Configuration(message.into())
    }

    pub fn dimension(
        context: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        LtmdError::DimensionMismatch {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        LtmdError::Evaluation(message.into())
    }

    pub fn eigensolver(message: impl Into<String>) -> Self {
        LtmdError::Eigensolver(message.into())
    }
}

pub type Result<T> = std::result::Result<T, LtmdError>;
