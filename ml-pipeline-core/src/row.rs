//! Typed rows: conversion between plain structs and record batches
//!
//! Column bindings are declared as data. A type that feeds a pipeline implements
//! [`IntoRow`] by returning its schema and writing its cells in schema order; a type
//! that reads predictions implements [`FromRow`] by picking columns out of an output
//! batch by name.

use std::fmt;
use std::sync::Arc;

use crate::column::{Column, ColumnData};
use crate::error::{Error, Result};
use crate::record_batch::RecordBatch;
use crate::schema::{DataType, Schema};

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Scalar float
    Float32(f32),
    /// Text
    Text(String),
    /// Fixed-size float vector
    Vector(Vec<f32>),
    /// Token sequence
    TextVector(Vec<String>),
}

impl Value {
    /// Data type of this cell
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Float32(_) => DataType::Float32,
            Value::Text(_) => DataType::Text,
            Value::Vector(v) => DataType::Vector(v.len()),
            Value::TextVector(_) => DataType::TextVector,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float32(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
            Value::Vector(v) => write!(f, "{v:?}"),
            Value::TextVector(v) => write!(f, "{v:?}"),
        }
    }
}

/// A type whose instances can be written as one row of a batch
pub trait IntoRow {
    /// Schema of the rows produced by this type
    fn schema() -> Result<Schema>;

    /// Append this instance's cells, in schema order
    fn write_row(&self, row: &mut Vec<Value>);
}

/// A type that can be read from one row of a batch
pub trait FromRow: Sized {
    /// Read row `row` of `batch`
    fn read_row(batch: &RecordBatch, row: usize) -> Result<Self>;
}

/// Reusable cell buffer for turning single examples into one-row batches
#[derive(Debug)]
pub struct RowBuffer {
    schema: Arc<Schema>,
    cells: Vec<Value>,
}

impl RowBuffer {
    /// Create a buffer for rows of the given schema
    pub fn new(schema: Arc<Schema>) -> Self {
        let cells = Vec::with_capacity(schema.len());
        Self { schema, cells }
    }

    /// Schema of the rows this buffer produces
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Write `example` into the buffer and produce a one-row batch
    pub fn to_batch<T: IntoRow>(&mut self, example: &T) -> Result<RecordBatch> {
        self.cells.clear();
        example.write_row(&mut self.cells);
        if self.cells.len() != self.schema.len() {
            return Err(Error::Schema(format!(
                "row has {} cells, schema declares {} columns",
                self.cells.len(),
                self.schema.len()
            )));
        }

        let columns = self
            .schema
            .fields()
            .iter()
            .zip(self.cells.drain(..))
            .map(|(field, cell)| {
                let mut data = ColumnData::with_capacity(field.data_type, 1);
                data.push(cell)?;
                Ok(Arc::new(Column::new(field.name(), data)))
            })
            .collect::<Result<Vec<_>>>()?;

        RecordBatch::try_new(self.schema.clone(), columns)
    }
}

/// Build a batch from a slice of typed rows
pub fn batch_from_rows<T: IntoRow>(rows: &[T]) -> Result<RecordBatch> {
    let schema = Arc::new(T::schema()?);
    let mut data: Vec<ColumnData> = schema
        .fields()
        .iter()
        .map(|field| ColumnData::with_capacity(field.data_type, rows.len()))
        .collect();

    let mut cells = Vec::with_capacity(schema.len());
    for example in rows {
        cells.clear();
        example.write_row(&mut cells);
        if cells.len() != data.len() {
            return Err(Error::Schema(format!(
                "row has {} cells, schema declares {} columns",
                cells.len(),
                data.len()
            )));
        }
        for (column, cell) in data.iter_mut().zip(cells.drain(..)) {
            column.push(cell)?;
        }
    }

    let columns = schema
        .fields()
        .iter()
        .zip(data)
        .map(|(field, data)| Arc::new(Column::new(field.name(), data)))
        .collect();

    RecordBatch::try_new(schema, columns)
}
