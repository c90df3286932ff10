//! Estimator and transformer contracts and their chains
//!
//! An [`Estimator`] is immutable configuration. Fitting it on a batch produces a
//! [`Transformer`], an immutable value holding whatever state was learned. Estimators
//! compose into an [`EstimatorChain`] whose fit yields a [`TransformerChain`].

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::record_batch::RecordBatch;
use crate::schema::Schema;

/// An immutable mapping from one record batch to another
///
/// Implementations must be deterministic and free of side effects, must not let rows
/// influence each other, and must accept batches of any row count including zero.
pub trait Transformer: Send + Sync + fmt::Debug {
    /// Transform a record batch into a new batch
    fn transform(&self, batch: &RecordBatch) -> Result<RecordBatch>;

    /// Get the output schema for this transform when applied to the given input schema
    ///
    /// Fails with a schema error when a required input column is missing or mistyped.
    fn output_schema(&self, input_schema: &Schema) -> Result<Schema>;
}

impl<T: Transformer + ?Sized> Transformer for Arc<T> {
    fn transform(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        (**self).transform(batch)
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        (**self).output_schema(input_schema)
    }
}

impl<T: Transformer + ?Sized> Transformer for Box<T> {
    fn transform(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        (**self).transform(batch)
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        (**self).output_schema(input_schema)
    }
}

/// Configuration that learns a [`Transformer`] from data
pub trait Estimator: Send + Sync {
    /// The transformer produced by [`Estimator::fit`]
    type Output: Transformer + 'static;

    /// Learn a transformer from `batch` without modifying it
    fn fit(&self, batch: &RecordBatch) -> Result<Self::Output>;

    /// Schema the fitted transformer will produce for the given input schema
    fn output_schema(&self, input_schema: &Schema) -> Result<Schema>;
}

/// Object-safe view of an estimator, used for the inner stages of a chain
trait ErasedEstimator: Send + Sync {
    fn fit_erased(&self, batch: &RecordBatch) -> Result<Arc<dyn Transformer>>;

    fn erased_output_schema(&self, input_schema: &Schema) -> Result<Schema>;

    fn stage_name(&self) -> &'static str;
}

impl<E: Estimator> ErasedEstimator for E {
    fn fit_erased(&self, batch: &RecordBatch) -> Result<Arc<dyn Transformer>> {
        Ok(Arc::new(self.fit(batch)?))
    }

    fn erased_output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        self.output_schema(input_schema)
    }

    fn stage_name(&self) -> &'static str {
        type_name::<E>()
    }
}

/// Chaining helper available on every estimator
pub trait EstimatorExt: Estimator + Sized + 'static {
    /// Follow this estimator with `next`
    fn append<N: Estimator>(self, next: N) -> EstimatorChain<N> {
        EstimatorChain {
            stages: vec![Box::new(self) as Box<dyn ErasedEstimator>],
            last: next,
        }
    }
}

impl<E: Estimator + 'static> EstimatorExt for E {}

/// An ordered sequence of estimators whose last stage keeps its concrete type
pub struct EstimatorChain<E> {
    /// Stages before the last one
    stages: Vec<Box<dyn ErasedEstimator>>,

    /// Final stage
    last: E,
}

impl<E: Estimator + 'static> EstimatorChain<E> {
    /// A chain consisting of a single estimator
    pub fn new(last: E) -> Self {
        Self {
            stages: Vec::new(),
            last,
        }
    }

    /// Extend the chain with `next`, which becomes the typed final stage
    pub fn append<N: Estimator>(self, next: N) -> EstimatorChain<N> {
        let mut stages = self.stages;
        stages.push(Box::new(self.last));
        EstimatorChain { stages, last: next }
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len() + 1
    }

    /// A chain always has a final stage
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The final stage
    pub fn last_estimator(&self) -> &E {
        &self.last
    }
}

impl<E: Estimator + 'static> Estimator for EstimatorChain<E> {
    type Output = TransformerChain<E::Output>;

    fn fit(&self, batch: &RecordBatch) -> Result<Self::Output> {
        // Validate every column binding before any row is touched
        self.output_schema(batch.schema())?;

        let mut transformers: Vec<Arc<dyn Transformer>> = Vec::with_capacity(self.stages.len());
        let mut current = batch.clone();

        for (index, stage) in self.stages.iter().enumerate() {
            debug!(stage = index, name = stage.stage_name(), rows = current.row_count(), "fitting stage");
            let transformer = stage.fit_erased(&current)?;
            current = transformer.transform(&current)?;
            transformers.push(transformer);
        }

        debug!(
            stage = self.stages.len(),
            name = type_name::<E>(),
            rows = current.row_count(),
            "fitting final stage"
        );
        let last = self.last.fit(&current)?;

        Ok(TransformerChain::new(transformers, last))
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        let mut current = input_schema.clone();
        for stage in &self.stages {
            current = stage.erased_output_schema(&current)?;
        }
        self.last.output_schema(&current)
    }
}

/// Fitted transformers applied in a fixed order
///
/// Cloning is cheap: stages are shared behind `Arc`s and never mutated.
pub struct TransformerChain<T> {
    /// Transformers before the last one
    stages: Vec<Arc<dyn Transformer>>,

    /// Final transformer
    last: Arc<T>,
}

impl<T> Clone for TransformerChain<T> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
            last: self.last.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TransformerChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerChain")
            .field("stages", &self.stages)
            .field("last", &self.last)
            .finish()
    }
}

impl<T: Transformer + 'static> TransformerChain<T> {
    /// Create a chain from leading stages and a typed final stage
    pub fn new(stages: Vec<Arc<dyn Transformer>>, last: T) -> Self {
        Self {
            stages,
            last: Arc::new(last),
        }
    }

    /// Extend the chain with an already fitted transformer
    pub fn append<N: Transformer + 'static>(self, next: N) -> TransformerChain<N> {
        let mut stages = self.stages;
        stages.push(self.last);
        TransformerChain::new(stages, next)
    }

    /// The final transformer, e.g. the trained model
    pub fn last_transformer(&self) -> &T {
        &self.last
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len() + 1
    }

    /// A chain always has a final stage
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Every stage in application order
    pub fn stages(&self) -> impl Iterator<Item = &dyn Transformer> + '_ {
        self.stages
            .iter()
            .map(AsRef::as_ref)
            .chain(std::iter::once(self.last.as_ref() as &dyn Transformer))
    }
}

impl<T: Transformer + 'static> Transformer for TransformerChain<T> {
    fn transform(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let mut current = batch.clone();

        for transformer in &self.stages {
            current = transformer.transform(&current)?;
        }

        self.last.transform(&current)
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        let mut current = input_schema.clone();

        for transformer in &self.stages {
            current = transformer.output_schema(&current)?;
        }

        self.last.output_schema(&current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::error::Error;
    use crate::schema::{DataType, Field};
    use proptest::prelude::*;

    /// Adds a constant learned as the mean of the input column
    #[derive(Debug)]
    struct Shift {
        input: String,
        output: String,
        offset: f32,
    }

    impl Transformer for Shift {
        fn transform(&self, batch: &RecordBatch) -> Result<RecordBatch> {
            self.output_schema(batch.schema())?;
            let values = batch.column_by_name(&self.input)?.as_f32()?;
            let shifted = values.iter().map(|v| v - self.offset).collect();
            batch.with_column(
                Field::new(&self.output, DataType::Float32),
                Column::from_f32(&self.output, shifted),
            )
        }

        fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
            input_schema.require_type("shift", &self.input, DataType::Float32)?;
            Ok(input_schema.with_field(Field::new(&self.output, DataType::Float32)))
        }
    }

    struct Centering {
        input: &'static str,
        output: &'static str,
    }

    impl Estimator for Centering {
        type Output = Shift;

        fn fit(&self, batch: &RecordBatch) -> Result<Shift> {
            let values = batch.column_by_name(self.input)?.as_f32()?;
            let offset = if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f32>() / values.len() as f32
            };
            Ok(Shift {
                input: self.input.into(),
                output: self.output.into(),
                offset,
            })
        }

        fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
            input_schema.require_type("centering", self.input, DataType::Float32)?;
            Ok(input_schema.with_field(Field::new(self.output, DataType::Float32)))
        }
    }

    fn batch(values: Vec<f32>) -> RecordBatch {
        RecordBatch::from_columns(vec![Column::from_f32("x", values)]).unwrap()
    }

    #[test]
    fn test_chain_fits_each_stage_on_previous_output() {
        let chain = Centering { input: "x", output: "y" }.append(Centering { input: "y", output: "z" });
        let fitted = chain.fit(&batch(vec![1.0, 2.0, 3.0])).unwrap();

        assert_eq!(fitted.len(), 2);
        // y is already centred, so the second offset is zero
        assert_eq!(fitted.last_transformer().offset, 0.0);

        let out = fitted.transform(&batch(vec![2.0])).unwrap();
        assert_eq!(out.column_by_name("z").unwrap().as_f32().unwrap(), &[0.0]);
    }

    #[test]
    fn test_missing_column_fails_before_fitting() {
        let chain = Centering { input: "x", output: "y" }.append(Centering { input: "missing", output: "z" });
        let err = chain.fit(&batch(vec![1.0])).unwrap_err();
        assert!(matches!(err, Error::Schema(ref msg) if msg.contains("missing")));
    }

    #[test]
    fn test_empty_batch_passes_through() {
        let chain = Centering { input: "x", output: "y" }.append(Centering { input: "y", output: "z" });
        let fitted = chain.fit(&batch(vec![1.0, 3.0])).unwrap();
        let out = fitted.transform(&batch(vec![])).unwrap();
        assert_eq!(out.row_count(), 0);
        assert_eq!(out.schema().len(), 3);
    }

    #[test]
    fn test_appending_transformers_matches_stagewise_application() {
        let first = Shift { input: "x".into(), output: "y".into(), offset: 1.0 };
        let second = Shift { input: "y".into(), output: "z".into(), offset: 2.0 };
        let input = batch(vec![5.0, -1.0]);
        let stepwise = second.transform(&first.transform(&input).unwrap()).unwrap();

        let chain = TransformerChain::new(Vec::new(), first).append(second);
        assert!(chain.transform(&input).unwrap().same_values(&stepwise));
    }

    proptest! {
        #[test]
        fn prop_chain_of_chains_equals_flat_chain(values in prop::collection::vec(-100.0f32..100.0, 0..20)) {
            let inner = TransformerChain::new(
                vec![Arc::new(Shift { input: "x".into(), output: "y".into(), offset: 1.5 }) as Arc<dyn Transformer>],
                Shift { input: "y".into(), output: "z".into(), offset: -3.0 },
            );
            let nested = TransformerChain::new(
                vec![Arc::new(inner) as Arc<dyn Transformer>],
                Shift { input: "z".into(), output: "w".into(), offset: 0.25 },
            );
            let flat = TransformerChain::new(
                vec![
                    Arc::new(Shift { input: "x".into(), output: "y".into(), offset: 1.5 }) as Arc<dyn Transformer>,
                    Arc::new(Shift { input: "y".into(), output: "z".into(), offset: -3.0 }),
                ],
                Shift { input: "z".into(), output: "w".into(), offset: 0.25 },
            );

            let input = batch(values);
            prop_assert!(nested.transform(&input).unwrap().same_values(&flat.transform(&input).unwrap()));
        }
    }
}
