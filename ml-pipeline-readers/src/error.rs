//! Error types for data readers

use thiserror::Error;

/// Error type for data readers
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error, including row-level parse errors
    #[error("Core error: {0}")]
    Core(#[from] ml_pipeline_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited text tokenization error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Column declarations are inconsistent
    #[error("Schema error: {0}")]
    Schema(String),
}

/// Result type for data readers
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for ml_pipeline_core::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Core(inner) => inner,
            Error::Io(inner) => ml_pipeline_core::Error::Io(inner),
            Error::Csv(inner) => {
                let row = inner.position().map_or(0, |p| p.line() as usize);
                match inner.into_kind() {
                    csv::ErrorKind::Io(io) => ml_pipeline_core::Error::Io(io),
                    kind => ml_pipeline_core::Error::Parse {
                        row,
                        column: String::new(),
                        value: format!("{kind:?}"),
                    },
                }
            }
            Error::Schema(message) => ml_pipeline_core::Error::Schema(message),
        }
    }
}
