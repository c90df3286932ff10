//! Column implementation for storing typed vectors of data

use std::fmt;
use std::mem::size_of;

use crate::error::{Error, Result};
use crate::row::Value;
use crate::schema::{DataType, Field};

/// Typed storage of a column's values
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// One f32 per row
    Float32(Vec<f32>),

    /// One string per row
    Text(Vec<String>),

    /// `size` f32 slots per row, stored row-major
    Vector {
        /// Slots per row
        size: usize,
        /// Row-major values, `len = rows * size`
        values: Vec<f32>,
    },

    /// A token sequence per row
    TextVector(Vec<Vec<String>>),
}

impl ColumnData {
    /// Empty storage for the given type
    pub fn empty(data_type: DataType) -> Self {
        Self::with_capacity(data_type, 0)
    }

    /// Empty storage for the given type with room for `rows` rows
    pub fn with_capacity(data_type: DataType, rows: usize) -> Self {
        match data_type {
            DataType::Float32 => ColumnData::Float32(Vec::with_capacity(rows)),
            DataType::Text => ColumnData::Text(Vec::with_capacity(rows)),
            DataType::Vector(size) => ColumnData::Vector {
                size,
                values: Vec::with_capacity(rows * size),
            },
            DataType::TextVector => ColumnData::TextVector(Vec::with_capacity(rows)),
        }
    }

    /// Data type of the stored values
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Float32(_) => DataType::Float32,
            ColumnData::Text(_) => DataType::Text,
            ColumnData::Vector { size, .. } => DataType::Vector(*size),
            ColumnData::TextVector(_) => DataType::TextVector,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float32(values) => values.len(),
            ColumnData::Text(values) => values.len(),
            ColumnData::Vector { size: 0, .. } => 0,
            ColumnData::Vector { size, values } => values.len() / size,
            ColumnData::TextVector(values) => values.len(),
        }
    }

    /// Whether the storage holds no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one cell, checking it matches the storage type
    pub fn push(&mut self, value: Value) -> Result<()> {
        match (self, value) {
            (ColumnData::Float32(values), Value::Float32(v)) => values.push(v),
            (ColumnData::Text(values), Value::Text(v)) => values.push(v),
            (ColumnData::Vector { size, values }, Value::Vector(v)) => {
                if v.len() != *size {
                    return Err(Error::InvalidArgument(format!(
                        "vector value has {} slots, column expects {size}",
                        v.len()
                    )));
                }
                values.extend_from_slice(&v);
            }
            (ColumnData::Vector { size: 1, values }, Value::Float32(v)) => values.push(v),
            (ColumnData::TextVector(values), Value::TextVector(v)) => values.push(v),
            (data, value) => {
                return Err(Error::InvalidArgument(format!(
                    "cannot store {} value in {} column",
                    value.data_type(),
                    data.data_type()
                )))
            }
        }
        Ok(())
    }
}

/// A named column of data with a specific type
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Name of the column
    name: String,

    /// Values of the column
    data: ColumnData,
}

impl Column {
    /// Create a new column with the given name and values
    pub fn new(name: &str, data: ColumnData) -> Self {
        Self {
            name: name.to_string(),
            data,
        }
    }

    /// Create a scalar float column
    pub fn from_f32(name: &str, values: Vec<f32>) -> Self {
        Self::new(name, ColumnData::Float32(values))
    }

    /// Create a text column
    pub fn from_text(name: &str, values: Vec<String>) -> Self {
        Self::new(name, ColumnData::Text(values))
    }

    /// Create a fixed-size vector column from row-major values
    pub fn from_vectors(name: &str, size: usize, values: Vec<f32>) -> Result<Self> {
        if size == 0 || values.len() % size != 0 {
            return Err(Error::InvalidArgument(format!(
                "{} values do not form rows of {size} slots",
                values.len()
            )));
        }
        Ok(Self::new(name, ColumnData::Vector { size, values }))
    }

    /// Create a token-sequence column
    pub fn from_text_vectors(name: &str, values: Vec<Vec<String>>) -> Self {
        Self::new(name, ColumnData::TextVector(values))
    }

    /// Get the name of this column
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the data type of this column
    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    /// Field describing this column
    pub fn field(&self) -> Field {
        Field::new(&self.name, self.data_type())
    }

    /// Get the typed values
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Get the length of this column (number of values)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if this column is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Scalar float values
    pub fn as_f32(&self) -> Result<&[f32]> {
        match &self.data {
            ColumnData::Float32(values) => Ok(values),
            ColumnData::Vector { size: 1, values } => Ok(values),
            other => Err(self.type_error("Float32", other)),
        }
    }

    /// Text values
    pub fn as_text(&self) -> Result<&[String]> {
        match &self.data {
            ColumnData::Text(values) => Ok(values),
            other => Err(self.type_error("Text", other)),
        }
    }

    /// Token sequences
    pub fn as_text_vectors(&self) -> Result<&[Vec<String>]> {
        match &self.data {
            ColumnData::TextVector(values) => Ok(values),
            other => Err(self.type_error("Vector<Text>", other)),
        }
    }

    /// The f32 slots of one row of a numeric column
    pub fn numeric_row(&self, row: usize) -> Result<&[f32]> {
        if row >= self.len() {
            return Err(Error::IndexOutOfBounds);
        }
        match &self.data {
            ColumnData::Float32(values) => Ok(std::slice::from_ref(&values[row])),
            ColumnData::Vector { size, values } => Ok(&values[row * size..(row + 1) * size]),
            other => Err(self.type_error("Float32 or Vector<Float32>", other)),
        }
    }

    /// Read one cell as an owned value
    pub fn value(&self, row: usize) -> Result<Value> {
        if row >= self.len() {
            return Err(Error::IndexOutOfBounds);
        }
        Ok(match &self.data {
            ColumnData::Float32(values) => Value::Float32(values[row]),
            ColumnData::Text(values) => Value::Text(values[row].clone()),
            ColumnData::Vector { size, values } => {
                Value::Vector(values[row * size..(row + 1) * size].to_vec())
            }
            ColumnData::TextVector(values) => Value::TextVector(values[row].clone()),
        })
    }

    /// Copy a range of rows into a new column
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self> {
        if offset + length > self.len() {
            return Err(Error::IndexOutOfBounds);
        }
        let range = offset..offset + length;
        let data = match &self.data {
            ColumnData::Float32(values) => ColumnData::Float32(values[range].to_vec()),
            ColumnData::Text(values) => ColumnData::Text(values[range].to_vec()),
            ColumnData::Vector { size, values } => ColumnData::Vector {
                size: *size,
                values: values[offset * size..(offset + length) * size].to_vec(),
            },
            ColumnData::TextVector(values) => ColumnData::TextVector(values[range].to_vec()),
        };
        Ok(Self::new(&self.name, data))
    }

    /// Gather rows by index into a new column
    pub fn take(&self, indices: &[usize]) -> Result<Self> {
        if indices.iter().any(|&i| i >= self.len()) {
            return Err(Error::IndexOutOfBounds);
        }
        let data = match &self.data {
            ColumnData::Float32(values) => ColumnData::Float32(indices.iter().map(|&i| values[i]).collect()),
            ColumnData::Text(values) => ColumnData::Text(indices.iter().map(|&i| values[i].clone()).collect()),
            ColumnData::Vector { size, values } => ColumnData::Vector {
                size: *size,
                values: indices
                    .iter()
                    .flat_map(|&i| values[i * size..(i + 1) * size].iter().copied())
                    .collect(),
            },
            ColumnData::TextVector(values) => {
                ColumnData::TextVector(indices.iter().map(|&i| values[i].clone()).collect())
            }
        };
        Ok(Self::new(&self.name, data))
    }

    /// Same column under another name
    #[must_use]
    pub fn renamed(&self, name: &str) -> Self {
        Self::new(name, self.data.clone())
    }

    /// Bitwise equality: NaN equals NaN when the bit patterns match
    pub fn same_values(&self, other: &Column) -> bool {
        fn bits(a: &[f32], b: &[f32]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
        }

        if self.name != other.name {
            return false;
        }
        match (&self.data, &other.data) {
            (ColumnData::Float32(a), ColumnData::Float32(b)) => bits(a, b),
            (ColumnData::Vector { size: sa, values: a }, ColumnData::Vector { size: sb, values: b }) => {
                sa == sb && bits(a, b)
            }
            (a, b) => a == b,
        }
    }

    /// Calculate the memory usage of this column in bytes
    pub fn memory_usage(&self) -> usize {
        let payload = match &self.data {
            ColumnData::Float32(values) | ColumnData::Vector { values, .. } => values.len() * size_of::<f32>(),
            ColumnData::Text(values) => values.iter().map(|s| s.len() + size_of::<String>()).sum(),
            ColumnData::TextVector(values) => values
                .iter()
                .map(|tokens| size_of::<Vec<String>>() + tokens.iter().map(|s| s.len() + size_of::<String>()).sum::<usize>())
                .sum(),
        };
        payload + self.name.len()
    }

    fn type_error(&self, expected: &str, actual: &ColumnData) -> Error {
        Error::column_type("column access", &self.name, expected, &actual.data_type())
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({} rows)", self.name, self.data_type(), self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_column_rows() {
        let column = Column::from_vectors("Features", 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(column.len(), 2);
        assert_eq!(column.numeric_row(1).unwrap(), &[3.0, 4.0]);
        assert!(matches!(column.numeric_row(2), Err(Error::IndexOutOfBounds)));
    }

    #[test]
    fn test_vector_column_rejects_ragged_values() {
        assert!(Column::from_vectors("Features", 3, vec![1.0, 2.0]).is_err());
        assert!(Column::from_vectors("Features", 0, vec![]).is_err());
    }

    #[test]
    fn test_take_gathers_rows() {
        let column = Column::from_vectors("v", 2, vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0]).unwrap();
        let taken = column.take(&[2, 0, 2]).unwrap();
        assert_eq!(
            taken.data(),
            &ColumnData::Vector {
                size: 2,
                values: vec![20.0, 21.0, 0.0, 1.0, 20.0, 21.0]
            }
        );
    }

    #[test]
    fn test_same_values_treats_matching_nan_as_equal() {
        let a = Column::from_f32("x", vec![f32::NAN, 1.0]);
        let b = Column::from_f32("x", vec![f32::NAN, 1.0]);
        assert_ne!(a, b);
        assert!(a.same_values(&b));
    }

    #[test]
    fn test_push_checks_types() {
        let mut data = ColumnData::empty(DataType::Vector(2));
        data.push(Value::Vector(vec![1.0, 2.0])).unwrap();
        assert!(data.push(Value::Vector(vec![1.0])).is_err());
        assert!(data.push(Value::Text("a".into())).is_err());
        assert_eq!(data.len(), 1);
    }
}
