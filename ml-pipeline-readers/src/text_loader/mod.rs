//! Loader for delimited text files with declared columns
//!
//! Columns are declared by name, kind and source field ranges. A column reading a
//! single field loads as a scalar; a column spanning several fields loads as a
//! fixed-size vector (numeric) or a token sequence (text).

mod loader;
mod parser;

pub use loader::{ColumnKind, SourceRange, TextColumn, TextLoader, TextLoaderOptions};
