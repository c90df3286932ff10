//! Error types for ML pipelines

use std::io;
use thiserror::Error;

/// Result type for ML pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ML pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A field of a delimited text row could not be coerced to its column type
    #[error("Parse error at row {row}, column '{column}': cannot read '{value}'")]
    Parse {
        /// 1-based line number in the source
        row: usize,
        /// Name of the declared column
        column: String,
        /// Offending raw field
        value: String,
    },

    /// Referenced column is missing or has an incompatible type
    #[error("Schema error: {0}")]
    Schema(String),

    /// Training data cannot produce a model (e.g. a single label class)
    #[error("Invalid training data: {0}")]
    InvalidTrainingData(String),

    /// Index out of bounds
    #[error("Index out of bounds")]
    IndexOutOfBounds,

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a missing column at some pipeline stage
    pub fn missing_column(stage: &str, column: &str) -> Self {
        Error::Schema(format!("{stage}: column '{column}' not found"))
    }

    /// Shorthand for a column whose type does not fit the stage
    pub fn column_type(stage: &str, column: &str, expected: &str, actual: &impl std::fmt::Display) -> Self {
        Error::Schema(format!(
            "{stage}: column '{column}' has type {actual}, expected {expected}"
        ))
    }
}
