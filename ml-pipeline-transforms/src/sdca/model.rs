//! Trained multiclass model and the transformer that applies it

use std::collections::HashMap;
use std::fmt;

use ml_pipeline_core::schema::metadata;
use ml_pipeline_core::{columns, Column, DataType, Field, RecordBatch, Result, Schema, Transformer};
use ndarray::{Array1, Array2, ArrayView1};
use serde::Serialize;
use tracing::debug;

const STAGE: &str = "MulticlassPrediction";

/// A trained model producing one probability per class
pub trait MulticlassModel: fmt::Debug + Send + Sync {
    /// Class label per score slot
    fn classes(&self) -> &[f32];

    /// Expected feature vector width
    fn feature_count(&self) -> usize;

    /// Write class probabilities for `features` into `scores`
    fn score_into(&self, features: &[f32], scores: &mut [f32]);
}

/// Linear softmax model: `p = softmax(W x + b)`
#[derive(Debug, Clone, PartialEq)]
pub struct MaximumEntropyModelParameters {
    classes: Vec<f32>,
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl MaximumEntropyModelParameters {
    /// Build a model from a `classes x features` weight matrix and per-class bias
    pub fn new(classes: Vec<f32>, weights: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        if classes.len() < 2 || weights.nrows() != classes.len() || bias.len() != classes.len() {
            return Err(ml_pipeline_core::Error::InvalidArgument(format!(
                "model needs matching class counts: {} labels, {} weight rows, {} biases",
                classes.len(),
                weights.nrows(),
                bias.len()
            )));
        }
        Ok(Self { classes, weights, bias })
    }

    /// Weight matrix, one row per class
    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    /// Per-class bias
    pub fn bias(&self) -> &Array1<f32> {
        &self.bias
    }

    /// Number of classes
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

impl MulticlassModel for MaximumEntropyModelParameters {
    fn classes(&self) -> &[f32] {
        &self.classes
    }

    fn feature_count(&self) -> usize {
        self.weights.ncols()
    }

    fn score_into(&self, features: &[f32], scores: &mut [f32]) {
        let logits = self.weights.dot(&ArrayView1::from(features)) + &self.bias;
        for (score, logit) in scores.iter_mut().zip(logits.iter()) {
            *score = *logit;
        }
        softmax_in_place(scores);
    }
}

/// Numerically stable softmax
pub(crate) fn softmax_in_place(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for value in values.iter_mut() {
        *value = (*value - max).exp();
        sum += *value;
    }
    for value in values.iter_mut() {
        *value /= sum;
    }
}

/// Index of the highest score; ties go to the lowest index
fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    for (index, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = index;
        }
    }
    best
}

/// Outcome of a training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    /// Passes over the data
    pub epochs: usize,

    /// Relative duality gap after the last epoch
    pub duality_gap: f64,

    /// Whether the gap reached the tolerance before the iteration cap
    pub converged: bool,

    /// Rows used for training
    pub examples: usize,

    /// Rows skipped for a missing label or non-finite feature
    pub skipped_rows: usize,
}

/// Appends `Score` and `PredictedLabel` columns computed by a [`MulticlassModel`]
#[derive(Debug, Clone)]
pub struct MulticlassPredictionTransformer<M> {
    model: M,
    feature_column: String,
    summary: TrainingSummary,
}

impl<M: MulticlassModel> MulticlassPredictionTransformer<M> {
    /// Wrap a trained model reading `feature_column`
    pub fn new(model: M, feature_column: &str, summary: TrainingSummary) -> Self {
        Self {
            model,
            feature_column: feature_column.to_string(),
            summary,
        }
    }

    /// The trained model
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Training run statistics
    pub fn training_summary(&self) -> &TrainingSummary {
        &self.summary
    }

    fn score_field(&self) -> Result<Field> {
        let labels = serde_json::to_string(self.model.classes())?;
        Ok(Field::with_metadata(
            columns::SCORE,
            DataType::Vector(self.model.classes().len()),
            HashMap::from([(metadata::CLASS_LABELS.to_string(), labels)]),
        ))
    }

    fn check_features(&self, schema: &Schema) -> Result<()> {
        let width = schema.require_numeric(STAGE, &self.feature_column)?;
        if width != self.model.feature_count() {
            return Err(ml_pipeline_core::Error::column_type(
                STAGE,
                &self.feature_column,
                &DataType::Vector(self.model.feature_count()).to_string(),
                &DataType::Vector(width),
            ));
        }
        Ok(())
    }
}

impl<M: MulticlassModel> Transformer for MulticlassPredictionTransformer<M> {
    fn transform(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        self.check_features(batch.schema())?;
        let features = batch.column_by_name(&self.feature_column)?;
        let classes = self.model.classes();
        let class_count = classes.len();

        let mut scores = vec![0.0; batch.row_count() * class_count];
        let mut predicted = Vec::with_capacity(batch.row_count());
        for (row, out) in scores.chunks_exact_mut(class_count).enumerate() {
            self.model.score_into(features.numeric_row(row)?, out);
            predicted.push(classes[argmax(out)]);
        }
        debug!(rows = batch.row_count(), classes = class_count, "scored batch");

        let scored = batch.with_column(
            self.score_field()?,
            Column::from_vectors(columns::SCORE, class_count, scores)?,
        )?;
        scored.with_column(
            Field::new(columns::PREDICTED_LABEL, DataType::Float32),
            Column::from_f32(columns::PREDICTED_LABEL, predicted),
        )
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        self.check_features(input_schema)?;
        Ok(input_schema
            .with_field(self.score_field()?)
            .with_field(Field::new(columns::PREDICTED_LABEL, DataType::Float32)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn model() -> MaximumEntropyModelParameters {
        MaximumEntropyModelParameters::new(
            vec![0.0, 1.0, 2.0],
            array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]],
            array![0.0, 0.0, 0.5],
        )
        .unwrap()
    }

    fn summary() -> TrainingSummary {
        TrainingSummary {
            epochs: 1,
            duality_gap: 0.0,
            converged: true,
            examples: 0,
            skipped_rows: 0,
        }
    }

    #[test]
    fn test_scores_are_probabilities() {
        let mut scores = [0.0; 3];
        model().score_into(&[2.0, 1.0], &mut scores);
        let sum: f32 = scores.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(scores[0] > scores[1] && scores[1] > scores[2]);
    }

    #[test]
    fn test_argmax_ties_pick_lowest_index() {
        assert_eq!(argmax(&[0.25, 0.5, 0.25]), 1);
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), 0);
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
    }

    #[test]
    fn test_transform_appends_score_and_label() {
        let transformer = MulticlassPredictionTransformer::new(model(), "Features", summary());
        let batch = RecordBatch::from_columns(vec![
            Column::from_vectors("Features", 2, vec![3.0, 0.0, 0.0, 3.0, 0.0, 0.0]).unwrap(),
        ])
        .unwrap();
        let output = transformer.transform(&batch).unwrap();

        assert_eq!(output.column_by_name("PredictedLabel").unwrap().as_f32().unwrap(), &[0.0, 1.0, 2.0]);
        let score_field = output.schema().field_by_name("Score").unwrap();
        assert_eq!(score_field.metadata_value(metadata::CLASS_LABELS), Some("[0.0,1.0,2.0]"));
        assert_eq!(output.schema().as_ref(), &transformer.output_schema(batch.schema()).unwrap());
    }

    #[test]
    fn test_rejects_wrong_feature_width() {
        let transformer = MulticlassPredictionTransformer::new(model(), "Features", summary());
        let batch = RecordBatch::from_columns(vec![
            Column::from_vectors("Features", 3, vec![1.0, 2.0, 3.0]).unwrap(),
        ])
        .unwrap();
        assert!(matches!(transformer.transform(&batch), Err(ml_pipeline_core::Error::Schema(_))));
    }

    #[test]
    fn test_model_rejects_mismatched_shapes() {
        let result = MaximumEntropyModelParameters::new(vec![0.0, 1.0], array![[1.0, 0.0]], array![0.0, 0.0]);
        assert!(result.is_err());
    }
}
