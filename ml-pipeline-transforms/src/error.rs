//! Error types for transforms

use thiserror::Error;

/// Error type for loading transform resources such as embedding tables
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] ml_pipeline_core::Error),

    /// I/O error while reading a resource file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A line of an embedding table is malformed
    #[error("Embedding table line {line}: {message}")]
    Format {
        /// 1-based line number
        line: usize,
        /// What is wrong with the line
        message: String,
    },

    /// Table dimension differs from what the model kind declares
    #[error("Embedding dimension mismatch: expected {expected}, found {actual}")]
    DimensionMismatch {
        /// Declared dimension
        expected: usize,
        /// Dimension found in the table
        actual: usize,
    },
}

/// Result type for transform resources
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for ml_pipeline_core::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Core(inner) => inner,
            Error::Io(inner) => ml_pipeline_core::Error::Io(inner),
            other @ (Error::Format { .. } | Error::DimensionMismatch { .. }) => {
                ml_pipeline_core::Error::InvalidArgument(other.to_string())
            }
        }
    }
}
