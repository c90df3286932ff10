//! Concatenation of numeric columns into one feature vector

use ml_pipeline_core::{Column, DataType, Error, Estimator, Field, RecordBatch, Result, Schema, Transformer};
use tracing::debug;

const STAGE: &str = "ColumnConcatenating";

/// Estimator that concatenates `Float32` and `Vector` columns into a single `Vector` column
#[derive(Debug, Clone)]
pub struct ColumnConcatenatingEstimator {
    output: String,
    inputs: Vec<String>,
}

impl ColumnConcatenatingEstimator {
    /// Concatenate `inputs`, in order, into `output`
    pub fn new<S: AsRef<str>>(output: &str, inputs: &[S]) -> Self {
        Self {
            output: output.to_string(),
            inputs: inputs.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }
}

impl Estimator for ColumnConcatenatingEstimator {
    type Output = ColumnConcatenatingTransformer;

    fn fit(&self, batch: &RecordBatch) -> Result<Self::Output> {
        let widths = input_widths(batch.schema(), &self.inputs)?;
        debug!(output = %self.output, inputs = self.inputs.len(), "fitted column concatenation");
        Ok(ColumnConcatenatingTransformer {
            output: self.output.clone(),
            inputs: self.inputs.clone(),
            width: widths.iter().sum(),
        })
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        let width = input_widths(input_schema, &self.inputs)?.iter().sum();
        Ok(input_schema.with_field(Field::new(&self.output, DataType::Vector(width))))
    }
}

/// Concatenates a fixed list of numeric columns row by row
#[derive(Debug, Clone)]
pub struct ColumnConcatenatingTransformer {
    output: String,
    inputs: Vec<String>,
    width: usize,
}

impl ColumnConcatenatingTransformer {
    /// Width of the produced vector
    pub fn width(&self) -> usize {
        self.width
    }
}

impl Transformer for ColumnConcatenatingTransformer {
    fn transform(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let widths = input_widths(batch.schema(), &self.inputs)?;
        if widths.iter().sum::<usize>() != self.width {
            return Err(Error::Schema(format!(
                "{STAGE}: inputs now span {} slots, fitted on {}",
                widths.iter().sum::<usize>(),
                self.width
            )));
        }

        let columns = self
            .inputs
            .iter()
            .map(|name| batch.column_by_name(name))
            .collect::<Result<Vec<_>>>()?;

        let mut values = Vec::with_capacity(batch.row_count() * self.width);
        for row in 0..batch.row_count() {
            for column in &columns {
                values.extend_from_slice(column.numeric_row(row)?);
            }
        }

        let column = Column::from_vectors(&self.output, self.width, values)?;
        batch.with_column(Field::new(&self.output, DataType::Vector(self.width)), column)
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        input_widths(input_schema, &self.inputs)?;
        Ok(input_schema.with_field(Field::new(&self.output, DataType::Vector(self.width))))
    }
}

fn input_widths(schema: &Schema, inputs: &[String]) -> Result<Vec<usize>> {
    if inputs.is_empty() {
        return Err(Error::InvalidArgument(format!("{STAGE}: at least one input column is required")));
    }
    inputs.iter().map(|name| schema.require_numeric(STAGE, name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> RecordBatch {
        RecordBatch::from_columns(vec![
            Column::from_f32("a", vec![1.0, 2.0]),
            Column::from_vectors("b", 2, vec![10.0, 11.0, 20.0, 21.0]).unwrap(),
            Column::from_text("t", vec!["x".to_string(), "y".to_string()]),
        ])
        .unwrap()
    }

    #[test]
    fn test_concatenates_in_declared_order() {
        let estimator = ColumnConcatenatingEstimator::new("Features", &["b", "a"]);
        let transformer = estimator.fit(&batch()).unwrap();
        let output = transformer.transform(&batch()).unwrap();

        let features = output.column_by_name("Features").unwrap();
        assert_eq!(features.data_type(), DataType::Vector(3));
        assert_eq!(features.numeric_row(0).unwrap(), &[10.0, 11.0, 1.0]);
        assert_eq!(features.numeric_row(1).unwrap(), &[20.0, 21.0, 2.0]);
        assert_eq!(output.column_count(), 4);
    }

    #[test]
    fn test_rejects_text_input() {
        let estimator = ColumnConcatenatingEstimator::new("Features", &["a", "t"]);
        assert!(matches!(estimator.fit(&batch()), Err(Error::Schema(_))));
    }

    #[test]
    fn test_rejects_missing_input() {
        let estimator = ColumnConcatenatingEstimator::new("Features", &["a", "missing"]);
        let error = estimator.output_schema(batch().schema()).unwrap_err();
        assert!(error.to_string().contains("missing"));
    }

    #[test]
    fn test_empty_batch_yields_empty_vector_column() {
        let estimator = ColumnConcatenatingEstimator::new("Features", &["a", "b"]);
        let transformer = estimator.fit(&batch()).unwrap();
        let empty = RecordBatch::empty(batch().schema().clone());
        let output = transformer.transform(&empty).unwrap();
        assert_eq!(output.row_count(), 0);
        assert_eq!(output.column_by_name("Features").unwrap().data_type(), DataType::Vector(3));
    }
}
