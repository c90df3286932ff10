//! Single-example inference over a fitted transformer

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::row::{FromRow, IntoRow, RowBuffer};
use crate::transform::{Transformer, TransformerChain};

/// Runs one typed example at a time through a fitted transformer
///
/// The input schema is validated against the transformer once, at construction.
/// Each engine owns its row buffer; the transformer itself is shared, so any number
/// of engines may be created from one chain and used from different threads.
pub struct PredictionEngine<In, Out> {
    transformer: Arc<dyn Transformer>,
    buffer: RowBuffer,
    _types: PhantomData<fn(&In) -> Out>,
}

impl<In: IntoRow, Out: FromRow> PredictionEngine<In, Out> {
    /// Create an engine for `transformer`, failing if `In` lacks a required column
    pub fn new(transformer: Arc<dyn Transformer>) -> Result<Self> {
        let input_schema = In::schema()?;
        let output_schema = transformer.output_schema(&input_schema)?;
        debug!(
            inputs = input_schema.len(),
            outputs = output_schema.len(),
            "created prediction engine"
        );

        Ok(Self {
            transformer,
            buffer: RowBuffer::new(Arc::new(input_schema)),
            _types: PhantomData,
        })
    }

    /// Predict a single example
    pub fn predict(&mut self, example: &In) -> Result<Out> {
        let row = self.buffer.to_batch(example)?;
        let scored = self.transformer.transform(&row)?;
        Out::read_row(&scored, 0)
    }
}

impl<In, Out> fmt::Debug for PredictionEngine<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionEngine")
            .field("transformer", &self.transformer)
            .field("input_schema", self.buffer.schema())
            .finish()
    }
}

impl<T: Transformer + 'static> TransformerChain<T> {
    /// Create a prediction engine sharing this chain's fitted stages
    pub fn create_prediction_engine<In: IntoRow, Out: FromRow>(&self) -> Result<PredictionEngine<In, Out>> {
        PredictionEngine::new(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::error::Error;
    use crate::record_batch::RecordBatch;
    use crate::row::Value;
    use crate::schema::{DataType, Field, Schema};

    #[derive(Debug)]
    struct Double;

    impl Transformer for Double {
        fn transform(&self, batch: &RecordBatch) -> Result<RecordBatch> {
            let values = batch.column_by_name("x")?.as_f32()?;
            batch.with_column(
                Field::new("y", DataType::Float32),
                Column::from_f32("y", values.iter().map(|v| v * 2.0).collect()),
            )
        }

        fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
            input_schema.require_type("double", "x", DataType::Float32)?;
            Ok(input_schema.with_field(Field::new("y", DataType::Float32)))
        }
    }

    struct Input(f32);

    impl IntoRow for Input {
        fn schema() -> Result<Schema> {
            Schema::new(vec![Field::new("x", DataType::Float32)])
        }

        fn write_row(&self, row: &mut Vec<Value>) {
            row.push(Value::Float32(self.0));
        }
    }

    struct WrongInput;

    impl IntoRow for WrongInput {
        fn schema() -> Result<Schema> {
            Schema::new(vec![Field::new("z", DataType::Float32)])
        }

        fn write_row(&self, row: &mut Vec<Value>) {
            row.push(Value::Float32(0.0));
        }
    }

    #[derive(Debug, PartialEq)]
    struct Output(f32);

    impl FromRow for Output {
        fn read_row(batch: &RecordBatch, row: usize) -> Result<Self> {
            Ok(Output(batch.column_by_name("y")?.as_f32()?[row]))
        }
    }

    #[test]
    fn test_engine_matches_batch_path() {
        let chain = TransformerChain::new(Vec::new(), Double);
        let mut engine = chain.create_prediction_engine::<Input, Output>().unwrap();

        let batch = RecordBatch::from_rows(&[Input(1.5), Input(-2.0)]).unwrap();
        let scored = chain.transform(&batch).unwrap();

        for (row, input) in [Input(1.5), Input(-2.0)].iter().enumerate() {
            assert_eq!(engine.predict(input).unwrap(), Output::read_row(&scored, row).unwrap());
        }
    }

    #[test]
    fn test_engine_rejects_incompatible_input_schema() {
        let chain = TransformerChain::new(Vec::new(), Double);
        let result = chain.create_prediction_engine::<WrongInput, Output>();
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_engines_share_one_chain_across_threads() {
        let chain = TransformerChain::new(Vec::new(), Double);
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let mut engine = chain.create_prediction_engine::<Input, Output>().unwrap();
                std::thread::spawn(move || engine.predict(&Input(i as f32)).unwrap())
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), Output(2.0 * i as f32));
        }
    }
}
