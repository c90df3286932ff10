//! Conversion of delimited text records into typed columns

use std::collections::HashMap;
use std::sync::Arc;

use csv::StringRecord;
use ml_pipeline_core::{Column, ColumnData, DataType, Error as CoreError, RecordBatch, Schema, Value};

use super::loader::{ColumnKind, TextColumn};
use crate::error::Result;

/// Fields of one record, addressed by source index
enum RowFields<'a> {
    /// Field `i` is the record's `i`-th field
    Dense(&'a StringRecord),
    /// Dense prefix followed by `index:value` pairs
    Sparse(HashMap<usize, &'a str>),
}

impl<'a> RowFields<'a> {
    fn dense(record: &'a StringRecord) -> Self {
        RowFields::Dense(record)
    }

    fn sparse(record: &'a StringRecord) -> Self {
        let mut fields = HashMap::with_capacity(record.len());
        let mut dense_index = 0;
        let mut in_sparse_part = false;

        for field in record {
            match parse_sparse_pair(field) {
                Some((index, value)) => {
                    in_sparse_part = true;
                    fields.insert(index, value);
                }
                None if !in_sparse_part => {
                    fields.insert(dense_index, field);
                    dense_index += 1;
                }
                None => {}
            }
        }

        RowFields::Sparse(fields)
    }

    fn get(&self, index: usize) -> Option<&'a str> {
        match self {
            RowFields::Dense(record) => record.get(index),
            RowFields::Sparse(fields) => fields.get(&index).copied(),
        }
    }

    fn is_sparse(&self) -> bool {
        matches!(self, RowFields::Sparse(_))
    }
}

fn parse_sparse_pair(field: &str) -> Option<(usize, &str)> {
    let (index, value) = field.split_once(':')?;
    let index = index.trim().parse().ok()?;
    Some((index, value))
}

/// Parser that turns records into a [`RecordBatch`] following the declared columns
pub struct TextParser {
    /// Schema for the loaded data
    schema: Arc<Schema>,

    /// Declared columns with their resolved source indices
    columns: Vec<(TextColumn, Vec<usize>)>,

    /// Whether `index:value` fields are recognised
    allow_sparse: bool,
}

impl TextParser {
    /// Create a new parser
    pub fn new(schema: Arc<Schema>, columns: &[TextColumn], allow_sparse: bool) -> Self {
        let columns = columns
            .iter()
            .map(|column| (column.clone(), column.source_indices()))
            .collect();

        Self {
            schema,
            columns,
            allow_sparse,
        }
    }

    /// Create empty column builders
    pub fn builders(&self, capacity: usize) -> Vec<ColumnData> {
        self.schema
            .fields()
            .iter()
            .map(|field| ColumnData::with_capacity(*field.data_type(), capacity))
            .collect()
    }

    /// Append one record to the builders; `line` is the 1-based source line
    pub fn append_record(&self, record: &StringRecord, line: usize, builders: &mut [ColumnData]) -> Result<()> {
        let fields = if self.allow_sparse {
            RowFields::sparse(record)
        } else {
            RowFields::dense(record)
        };

        for ((column, indices), builder) in self.columns.iter().zip(builders.iter_mut()) {
            let value = match column.kind {
                ColumnKind::Numeric => {
                    let values = indices
                        .iter()
                        .map(|&index| parse_numeric(fields.get(index), fields.is_sparse(), line, &column.name))
                        .collect::<Result<Vec<_>>>()?;
                    if values.len() == 1 {
                        Value::Float32(values[0])
                    } else {
                        Value::Vector(values)
                    }
                }
                ColumnKind::Text => {
                    let mut values: Vec<String> = indices
                        .iter()
                        .map(|&index| fields.get(index).unwrap_or_default().to_string())
                        .collect();
                    if values.len() == 1 {
                        Value::Text(values.remove(0))
                    } else {
                        Value::TextVector(values)
                    }
                }
            };

            builder.push(value)?;
        }

        Ok(())
    }

    /// Finish the builders into a batch
    pub fn finish(&self, builders: Vec<ColumnData>) -> Result<RecordBatch> {
        let columns = self
            .schema
            .fields()
            .iter()
            .zip(builders)
            .map(|(field, data)| Arc::new(Column::new(field.name(), data)))
            .collect();

        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }
}

/// Schema produced by a list of column declarations
pub fn schema_for(columns: &[TextColumn]) -> Result<Schema> {
    let fields = columns
        .iter()
        .map(|column| {
            let width = column.source_indices().len();
            let data_type = match (column.kind, width) {
                (ColumnKind::Numeric, 1) => DataType::Float32,
                (ColumnKind::Numeric, n) => DataType::Vector(n),
                (ColumnKind::Text, 1) => DataType::Text,
                (ColumnKind::Text, _) => DataType::TextVector,
            };
            ml_pipeline_core::Field::new(&column.name, data_type)
        })
        .collect();

    Ok(Schema::new(fields)?)
}

/// Missing and empty fields read as NaN; unassigned sparse slots read as zero
fn parse_numeric(field: Option<&str>, sparse: bool, line: usize, column: &str) -> Result<f32> {
    let Some(raw) = field else {
        return Ok(if sparse { 0.0 } else { f32::NAN });
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "?" {
        return Ok(f32::NAN);
    }

    trimmed.parse::<f32>().map_err(|_| {
        CoreError::Parse {
            row: line,
            column: column.to_string(),
            value: raw.to_string(),
        }
        .into()
    })
}
