//! Data source implementations for ML pipelines
//!
//! This crate provides the delimited text loader that turns files with declared
//! columns into [`RecordBatch`]es.

#![warn(missing_docs)]

mod error;
pub mod text_loader;

pub use error::{Error, Result};
pub use text_loader::{ColumnKind, SourceRange, TextColumn, TextLoader, TextLoaderOptions};

// Re-export core types
pub use ml_pipeline_core::{DataType, Field, RecordBatch, Schema};
