//! Record batch implementation for columnar data processing

use std::fmt;
use std::sync::Arc;

use crate::column::{Column, ColumnData};
use crate::error::{Error, Result};
use crate::row::{batch_from_rows, IntoRow};
use crate::schema::{DataType, Field, Schema};

/// A collection of equally long columns representing a batch of records
///
/// Batches are never mutated in place. Stages that add or replace a column return a
/// new batch that shares every untouched column with its input.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    /// Schema describing the data
    schema: Arc<Schema>,

    /// Columns in this batch, in schema order
    columns: Vec<Arc<Column>>,

    /// Number of rows in this batch
    row_count: usize,
}

impl RecordBatch {
    /// Create a new record batch with the given schema and columns
    pub fn try_new(schema: Arc<Schema>, columns: Vec<Arc<Column>>) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(Error::Schema(format!(
                "batch has {} columns, schema declares {}",
                columns.len(),
                schema.len()
            )));
        }

        for (field, column) in schema.fields().iter().zip(&columns) {
            if column.name() != field.name() {
                return Err(Error::Schema(format!(
                    "column name mismatch: expected '{}', got '{}'",
                    field.name(),
                    column.name()
                )));
            }

            if column.data_type() != *field.data_type() {
                return Err(Error::column_type(
                    "record batch",
                    field.name(),
                    &field.data_type().to_string(),
                    &column.data_type(),
                ));
            }
        }

        let row_count = columns.first().map_or(0, |c| c.len());
        if columns.iter().any(|c| c.len() != row_count) {
            return Err(Error::InvalidArgument(
                "All columns must have the same length".into(),
            ));
        }

        Ok(Self {
            schema,
            columns,
            row_count,
        })
    }

    /// Create a record batch whose schema is derived from the columns
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let schema = Schema::new(columns.iter().map(Column::field).collect())?;
        Self::try_new(Arc::new(schema), columns.into_iter().map(Arc::new).collect())
    }

    /// Create a batch from typed rows
    pub fn from_rows<T: IntoRow>(rows: &[T]) -> Result<Self> {
        batch_from_rows(rows)
    }

    /// Create a zero-row batch carrying the given schema
    pub fn empty(schema: Arc<Schema>) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|field| Arc::new(Column::new(field.name(), ColumnData::empty(field.data_type))))
            .collect();

        Self {
            schema,
            columns,
            row_count: 0,
        }
    }

    /// Get the schema of this batch
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Get the number of rows in this batch
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Get the number of columns in this batch
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if this batch is empty
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Get a reference to a column by index
    pub fn column(&self, index: usize) -> Result<&Column> {
        self.columns.get(index).map(AsRef::as_ref).ok_or(Error::IndexOutOfBounds)
    }

    /// Get a reference to a column by name
    pub fn column_by_name(&self, name: &str) -> Result<&Column> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::missing_column("record batch", name))?;
        self.column(index)
    }

    /// Get all columns
    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    /// Return a new batch with `column` appended, or replacing the column of the same name
    pub fn with_column(&self, field: Field, column: Column) -> Result<Self> {
        if field.name() != column.name() || *field.data_type() != column.data_type() {
            return Err(Error::Schema(format!(
                "field {field} does not describe column {column}"
            )));
        }
        if !self.columns.is_empty() && column.len() != self.row_count {
            return Err(Error::InvalidArgument(format!(
                "column '{}' has {} rows, batch has {}",
                column.name(),
                column.len(),
                self.row_count
            )));
        }

        let schema = self.schema.with_field(field);
        let mut columns = self.columns.clone();
        let column = Arc::new(column);
        match self.schema.index_of(column.name()) {
            Some(index) => columns[index] = column,
            None => columns.push(column),
        }

        let row_count = columns.first().map_or(0, |c| c.len());
        Ok(Self {
            schema: Arc::new(schema),
            columns,
            row_count,
        })
    }

    /// Copy a range of rows into a new batch
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self> {
        if offset + length > self.row_count {
            return Err(Error::IndexOutOfBounds);
        }

        let columns = self
            .columns
            .iter()
            .map(|column| column.slice(offset, length).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema: self.schema.clone(),
            columns,
            row_count: length,
        })
    }

    /// Gather rows by index into a new batch (rows may repeat or be reordered)
    pub fn take(&self, indices: &[usize]) -> Result<Self> {
        let columns = self
            .columns
            .iter()
            .map(|column| column.take(indices).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema: self.schema.clone(),
            columns,
            row_count: indices.len(),
        })
    }

    /// Create a projection of this batch with only the specified column names
    pub fn project_by_names(&self, names: &[&str]) -> Result<Self> {
        let schema = self.schema.project_by_names(names)?;
        let columns = names
            .iter()
            .map(|&name| {
                let index = self.schema.index_of(name).ok_or(Error::IndexOutOfBounds)?;
                Ok(self.columns[index].clone())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema: Arc::new(schema),
            columns,
            row_count: self.row_count,
        })
    }

    /// Bitwise equality of schema and every value
    pub fn same_values(&self, other: &RecordBatch) -> bool {
        self.schema == other.schema
            && self.row_count == other.row_count
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.same_values(b))
    }

    /// Calculate the total memory usage of this batch in bytes
    pub fn memory_usage(&self) -> usize {
        self.columns.iter().map(|column| column.memory_usage()).sum()
    }
}

impl fmt::Display for RecordBatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "RecordBatch: {} rows, {} columns", self.row_count, self.columns.len())?;

        // Limit number of rows to display
        const MAX_ROWS: usize = 10;
        const MAX_COLS: usize = 5;

        let display_cols = self.columns.len().min(MAX_COLS);

        for i in 0..display_cols {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{:15}", self.schema.field(i).name())?;
        }

        if display_cols < self.columns.len() {
            write!(f, " | ... ({} more columns)", self.columns.len() - display_cols)?;
        }

        writeln!(f)?;

        for i in 0..display_cols {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{:-<15}", "")?;
        }
        writeln!(f)?;

        let display_rows = self.row_count.min(MAX_ROWS);

        for row in 0..display_rows {
            for col in 0..display_cols {
                if col > 0 {
                    write!(f, " | ")?;
                }

                let column = &self.columns[col];
                match column.data_type() {
                    DataType::Float32 | DataType::Text => match column.value(row) {
                        Ok(value) => write!(f, "{:15}", value.to_string())?,
                        Err(_) => write!(f, "{:15}", "?")?,
                    },
                    DataType::Vector(size) => write!(f, "{:15}", format!("<{size} floats>"))?,
                    DataType::TextVector => write!(f, "{:15}", "<tokens>")?,
                }
            }
            writeln!(f)?;
        }

        if self.row_count > MAX_ROWS {
            writeln!(f, "... ({} more rows)", self.row_count - MAX_ROWS)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordBatch {
        RecordBatch::from_columns(vec![
            Column::from_f32("Label", vec![0.0, 1.0, 2.0]),
            Column::from_text("Text", vec!["a".into(), "b".into(), "c".into()]),
        ])
        .unwrap()
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let result = RecordBatch::from_columns(vec![
            Column::from_f32("a", vec![1.0]),
            Column::from_f32("b", vec![1.0, 2.0]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_with_column_leaves_input_untouched() {
        let batch = sample();
        let extended = batch
            .with_column(
                Field::new("Score", DataType::Float32),
                Column::from_f32("Score", vec![0.5, 0.5, 0.5]),
            )
            .unwrap();

        assert_eq!(batch.column_count(), 2);
        assert_eq!(extended.column_count(), 3);
        assert!(Arc::ptr_eq(&batch.columns()[0], &extended.columns()[0]));
    }

    #[test]
    fn test_with_column_replaces_same_name() {
        let batch = sample();
        let replaced = batch
            .with_column(
                Field::new("Label", DataType::Vector(1)),
                Column::from_vectors("Label", 1, vec![7.0, 8.0, 9.0]).unwrap(),
            )
            .unwrap();
        assert_eq!(replaced.column_count(), 2);
        assert_eq!(replaced.schema().field(0).data_type(), &DataType::Vector(1));
    }

    #[test]
    fn test_with_column_row_count_checked() {
        let batch = sample();
        let result = batch.with_column(Field::new("x", DataType::Float32), Column::from_f32("x", vec![1.0]));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_batch_is_schema_consistent() {
        let batch = RecordBatch::empty(sample().schema().clone());
        assert_eq!(batch.row_count(), 0);
        assert_eq!(batch.column_count(), 2);
        assert!(batch.column_by_name("Text").unwrap().as_text().unwrap().is_empty());
    }

    #[test]
    fn test_take_and_slice() {
        let batch = sample();
        let taken = batch.take(&[2, 1]).unwrap();
        assert_eq!(taken.column_by_name("Label").unwrap().as_f32().unwrap(), &[2.0, 1.0]);
        let sliced = batch.slice(1, 2).unwrap();
        assert_eq!(sliced.column_by_name("Text").unwrap().as_text().unwrap(), &["b", "c"]);
        assert!(batch.slice(2, 2).is_err());
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        assert!(matches!(sample().column_by_name("Features"), Err(Error::Schema(_))));
    }
}
