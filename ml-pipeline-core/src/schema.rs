//! Schema definition for pipeline columns

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Well-known field metadata keys
pub mod metadata {
    /// JSON array with the class label of every score slot
    pub const CLASS_LABELS: &str = "class_labels";
}

/// Data type for column values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit floating point scalar, NaN marks a missing value
    Float32,

    /// UTF-8 text
    Text,

    /// Fixed-size vector of 32-bit floats
    Vector(usize),

    /// Variable-length sequence of text tokens
    TextVector,
}

impl DataType {
    /// Number of f32 slots one value of this type occupies, if numeric
    pub fn numeric_width(&self) -> Option<usize> {
        match self {
            DataType::Float32 => Some(1),
            DataType::Vector(size) => Some(*size),
            DataType::Text | DataType::TextVector => None,
        }
    }

    /// Check if this type is a numeric type
    pub fn is_numeric(&self) -> bool {
        self.numeric_width().is_some()
    }

    /// Check if this type is compatible with another type
    pub fn compatible_with(&self, other: &DataType) -> bool {
        if self == other {
            return true;
        }

        matches!(
            (self, other),
            (DataType::Float32, DataType::Vector(1)) | (DataType::Vector(1), DataType::Float32)
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Float32 => write!(f, "Float32"),
            DataType::Text => write!(f, "Text"),
            DataType::Vector(size) => write!(f, "Vector<Float32, {size}>"),
            DataType::TextVector => write!(f, "Vector<Text>"),
        }
    }
}

/// A named, typed column description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Name of the field
    pub name: String,

    /// Data type of the field
    pub data_type: DataType,

    /// Additional metadata
    pub metadata: Option<HashMap<String, String>>,
}

impl Field {
    /// Create a new field
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            metadata: None,
        }
    }

    /// Create a new field with metadata
    pub fn with_metadata(name: &str, data_type: DataType, metadata: HashMap<String, String>) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            metadata: Some(metadata),
        }
    }

    /// Get the name of this field
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the data type of this field
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Get the metadata for this field
    pub fn metadata(&self) -> Option<&HashMap<String, String>> {
        self.metadata.as_ref()
    }

    /// Get a specific metadata value
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.get(key).map(String::as_str))
    }

    /// Set a metadata value
    pub fn set_metadata_value(&mut self, key: &str, value: &str) {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.to_string());
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.data_type)
    }
}

/// An ordered set of uniquely named fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Fields in this schema
    fields: Vec<Field>,

    /// Field indices by name for faster lookup
    field_indices: HashMap<String, usize>,
}

impl Schema {
    /// Create a new schema, rejecting duplicate field names
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut field_indices = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if field_indices.insert(field.name.clone(), i).is_some() {
                return Err(Error::Schema(format!("duplicate column name '{}'", field.name)));
            }
        }

        Ok(Self {
            fields,
            field_indices,
        })
    }

    /// Schema without any field
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            field_indices: HashMap::new(),
        }
    }

    /// Get all fields in this schema
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Get a field by index
    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    /// Get a field by name
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|index| &self.fields[index])
    }

    /// Get the index of a field by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.field_indices.get(name).copied()
    }

    /// Look up a field a pipeline stage depends on
    pub fn require(&self, stage: &str, name: &str) -> Result<&Field> {
        self.field_by_name(name)
            .ok_or_else(|| Error::missing_column(stage, name))
    }

    /// Look up a numeric field and return its slot count
    pub fn require_numeric(&self, stage: &str, name: &str) -> Result<usize> {
        let field = self.require(stage, name)?;
        field
            .data_type()
            .numeric_width()
            .ok_or_else(|| Error::column_type(stage, name, "Float32 or Vector<Float32>", field.data_type()))
    }

    /// Look up a field that must have exactly the given type
    pub fn require_type(&self, stage: &str, name: &str, expected: DataType) -> Result<&Field> {
        let field = self.require(stage, name)?;
        if field.data_type().compatible_with(&expected) {
            Ok(field)
        } else {
            Err(Error::column_type(stage, name, &expected.to_string(), field.data_type()))
        }
    }

    /// Get the number of fields in this schema
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if this schema is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Return a schema with `field` appended, replacing any field of the same name in place
    #[must_use]
    pub fn with_field(&self, field: Field) -> Self {
        let mut schema = self.clone();
        match schema.index_of(&field.name) {
            Some(index) => schema.fields[index] = field,
            None => {
                schema.field_indices.insert(field.name.clone(), schema.fields.len());
                schema.fields.push(field);
            }
        }
        schema
    }

    /// Create a projection of this schema with only the specified field names
    pub fn project_by_names(&self, names: &[&str]) -> Result<Self> {
        let fields = names
            .iter()
            .map(|&name| self.require("projection", name).cloned())
            .collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema: {} fields", self.fields.len())?;
        for field in &self.fields {
            writeln!(f, "  {field}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_rejected() {
        let result = Schema::new(vec![
            Field::new("Label", DataType::Float32),
            Field::new("Label", DataType::Text),
        ]);
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_with_field_shadows_existing_column() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Float32),
            Field::new("b", DataType::Text),
        ])
        .unwrap();

        let schema = schema.with_field(Field::new("a", DataType::Vector(3)));
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.index_of("a"), Some(0));
        assert_eq!(schema.field(0).data_type(), &DataType::Vector(3));

        let schema = schema.with_field(Field::new("c", DataType::TextVector));
        assert_eq!(schema.index_of("c"), Some(2));
    }

    #[test]
    fn test_require_reports_stage_and_column() {
        let schema = Schema::new(vec![Field::new("Text", DataType::Text)]).unwrap();
        let err = schema.require_numeric("concat", "Text").unwrap_err();
        assert!(err.to_string().contains("'Text'"));
        let err = schema.require("concat", "Missing").unwrap_err();
        assert!(err.to_string().contains("concat"));
    }

    #[test]
    fn test_scalar_and_single_slot_vector_are_compatible() {
        assert!(DataType::Float32.compatible_with(&DataType::Vector(1)));
        assert!(!DataType::Float32.compatible_with(&DataType::Vector(2)));
        assert!(!DataType::Text.compatible_with(&DataType::TextVector));
    }
}
