//! Delimited text loader

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord, Trim};
use ml_pipeline_core::{RecordBatch, Schema};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parser::{schema_for, TextParser};
use crate::error::{Error, Result};

/// How the fields of a column are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// 32-bit floats; missing values are NaN
    Numeric,
    /// Raw text
    Text,
}

/// Inclusive range of 0-based source field indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    /// First index
    pub min: usize,
    /// Last index, inclusive
    pub max: usize,
}

impl SourceRange {
    /// Range covering a single index
    pub fn single(index: usize) -> Self {
        Self {
            min: index,
            max: index,
        }
    }

    /// Range covering `min..=max`
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

/// Column declaration for the loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextColumn {
    /// Column name in the loaded schema
    pub name: String,

    /// Field interpretation
    pub kind: ColumnKind,

    /// Source field indices, concatenated in order
    pub source: Vec<SourceRange>,
}

impl TextColumn {
    /// Numeric column reading the given ranges
    pub fn numeric(name: &str, source: Vec<SourceRange>) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Numeric,
            source,
        }
    }

    /// Text column reading the given ranges
    pub fn text(name: &str, source: Vec<SourceRange>) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Text,
            source,
        }
    }

    /// All source indices in declaration order
    pub fn source_indices(&self) -> Vec<usize> {
        self.source.iter().flat_map(|range| range.min..=range.max).collect()
    }
}

/// Options for [`TextLoader`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextLoaderOptions {
    /// Declared columns, in schema order
    pub columns: Vec<TextColumn>,

    /// Whether the first line is a header to skip
    pub has_header: bool,

    /// Field separator
    pub separator: char,

    /// Whether `"`-quoted fields are honoured
    pub allow_quoting: bool,

    /// Whether `index:value` fields are recognised
    pub allow_sparse: bool,

    /// Whether surrounding whitespace is trimmed from fields
    pub trim_whitespace: bool,
}

impl Default for TextLoaderOptions {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            has_header: false,
            separator: '\t',
            allow_quoting: true,
            allow_sparse: false,
            trim_whitespace: false,
        }
    }
}

/// Loads delimited text into a [`RecordBatch`] following declared columns
#[derive(Debug, Clone)]
pub struct TextLoader {
    options: TextLoaderOptions,
    schema: Arc<Schema>,
}

impl TextLoader {
    /// Create a loader, validating the column declarations
    pub fn new(options: TextLoaderOptions) -> Result<Self> {
        validate_columns(&options.columns)?;
        if !options.separator.is_ascii() {
            return Err(Error::Schema(format!(
                "separator '{}' must be a single-byte character",
                options.separator
            )));
        }

        let schema = Arc::new(schema_for(&options.columns)?);
        Ok(Self { options, schema })
    }

    /// Schema of the batches this loader produces
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Loader options
    pub fn options(&self) -> &TextLoaderOptions {
        &self.options
    }

    /// Load a file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<RecordBatch> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading delimited text");
        let file = File::open(path)?;
        self.load_from_reader(BufReader::new(file))
    }

    /// Load from an in-memory string
    pub fn load_from_str(&self, text: &str) -> Result<RecordBatch> {
        self.load_from_reader(text.as_bytes())
    }

    /// Load from any reader
    pub fn load_from_reader<R: Read>(&self, reader: R) -> Result<RecordBatch> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.options.separator as u8)
            .has_headers(self.options.has_header)
            .quoting(self.options.allow_quoting)
            .trim(if self.options.trim_whitespace { Trim::All } else { Trim::None })
            .flexible(true)
            .from_reader(reader);

        let parser = TextParser::new(self.schema.clone(), &self.options.columns, self.options.allow_sparse);
        let mut builders = parser.builders(0);
        let mut record = StringRecord::new();

        while reader.read_record(&mut record)? {
            let line = record.position().map_or(0, |p| p.line() as usize);
            if is_blank(&record) {
                continue;
            }
            parser.append_record(&record, line, &mut builders)?;
        }

        let batch = parser.finish(builders)?;
        debug!(rows = batch.row_count(), columns = batch.column_count(), "loaded delimited text");
        Ok(batch)
    }
}

/// A line holding only whitespace is treated like an empty line
fn is_blank(record: &StringRecord) -> bool {
    record.len() <= 1 && record.iter().all(|field| field.trim().is_empty())
}

fn validate_columns(columns: &[TextColumn]) -> Result<()> {
    let mut names = HashSet::with_capacity(columns.len());
    for column in columns {
        if column.name.is_empty() {
            return Err(Error::Schema("column name must not be empty".to_string()));
        }
        if !names.insert(column.name.as_str()) {
            return Err(Error::Schema(format!("duplicate column '{}'", column.name)));
        }
        if column.source.is_empty() {
            return Err(Error::Schema(format!("column '{}' has no source range", column.name)));
        }
        if let Some(range) = column.source.iter().find(|range| range.min > range.max) {
            return Err(Error::Schema(format!(
                "column '{}' has an inverted range {}..={}",
                column.name, range.min, range.max
            )));
        }
    }
    Ok(())
}
