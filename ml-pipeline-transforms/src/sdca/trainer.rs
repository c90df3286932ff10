//! Stochastic dual coordinate ascent for multiclass logistic regression
//!
//! Minimizes `(1/n) sum_i CE(softmax(W x_i + b), y_i) + (l2/2) |[W b]|^2`. Each example
//! owns a dual vector `alpha_i` over the classes and the primal weights are kept as
//! `W = (1 / (l2 n)) sum_i alpha_i x_i^T`, with the bias handled as a feature fixed at 1.
//! A coordinate step moves `alpha_i` towards `e_y - p_i` by a step size bounded by the
//! smoothness of the loss, which never decreases the dual objective. Training stops
//! once the relative duality gap falls below the configured tolerance.

use ml_pipeline_core::{columns, Context, DataType, Error, Estimator, Field, RecordBatch, Result, Schema};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use super::model::{MaximumEntropyModelParameters, MulticlassPredictionTransformer, TrainingSummary};
use super::options::SdcaOptions;

const STAGE: &str = "SdcaMaximumEntropy";

/// Inverse smoothness of softmax cross-entropy
const SMOOTHNESS: f64 = 2.0;

/// Estimator training a [`MaximumEntropyModelParameters`] with SDCA
#[derive(Debug, Clone)]
pub struct SdcaMaximumEntropy {
    options: SdcaOptions,
    seed: u64,
}

impl SdcaMaximumEntropy {
    /// Create a trainer; the shuffle seed is derived from `context` unless set in `options`
    pub fn new(context: &Context, options: SdcaOptions) -> Self {
        let seed = options.seed.unwrap_or_else(|| context.derive_seed(STAGE));
        Self { options, seed }
    }

    /// Trainer with default options
    pub fn with_defaults(context: &Context) -> Self {
        Self::new(context, SdcaOptions::default())
    }

    /// Trainer options
    pub fn options(&self) -> &SdcaOptions {
        &self.options
    }

    fn check_schema(&self, schema: &Schema) -> Result<usize> {
        schema.require_type(STAGE, &self.options.label_column, DataType::Float32)?;
        schema.require_numeric(STAGE, &self.options.feature_column)
    }
}

impl Estimator for SdcaMaximumEntropy {
    type Output = MulticlassPredictionTransformer<MaximumEntropyModelParameters>;

    fn fit(&self, batch: &RecordBatch) -> Result<Self::Output> {
        self.options.validate()?;
        self.check_schema(batch.schema())?;

        let data = TrainingData::from_batch(batch, &self.options)?;
        let (model, summary) = Solver::new(&data, &self.options).run(self.seed)?;
        Ok(MulticlassPredictionTransformer::new(model, &self.options.feature_column, summary))
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        self.options.validate()?;
        self.check_schema(input_schema)?;

        // Class count is unknown until fit; width 1 stands in for it
        Ok(input_schema
            .with_field(Field::new(columns::SCORE, DataType::Vector(1)))
            .with_field(Field::new(columns::PREDICTED_LABEL, DataType::Float32)))
    }
}

/// Usable rows, max-abs scaled, with labels mapped to class indices
struct TrainingData {
    classes: Vec<f32>,
    features: Array2<f64>,
    labels: Vec<usize>,
    scale: Vec<f64>,
    skipped_rows: usize,
}

impl TrainingData {
    fn from_batch(batch: &RecordBatch, options: &SdcaOptions) -> Result<Self> {
        let labels = batch.column_by_name(&options.label_column)?.as_f32()?;
        let features = batch.column_by_name(&options.feature_column)?;
        let width = batch.schema().require_numeric(STAGE, &options.feature_column)?;

        let mut rows = Vec::with_capacity(batch.row_count());
        for (row, &label) in labels.iter().enumerate() {
            let values = features.numeric_row(row)?;
            if label.is_finite() && values.iter().all(|v| v.is_finite()) {
                rows.push(row);
            }
        }

        let skipped_rows = batch.row_count() - rows.len();
        if skipped_rows > 0 {
            warn!(skipped = skipped_rows, "skipping rows with a missing label or non-finite feature");
        }
        if rows.is_empty() {
            return Err(Error::InvalidTrainingData(format!(
                "{STAGE}: no usable rows among {}",
                batch.row_count()
            )));
        }

        // -0.0 and 0.0 are one class
        let label_of = |row: usize| labels[row] + 0.0;

        let mut classes: Vec<f32> = rows.iter().map(|&row| label_of(row)).collect();
        classes.sort_by(f32::total_cmp);
        classes.dedup();
        if classes.len() < 2 {
            return Err(Error::InvalidTrainingData(format!(
                "{STAGE}: need at least 2 label classes, found {}",
                classes.len()
            )));
        }

        let mut matrix = Array2::<f64>::zeros((rows.len(), width));
        let mut class_indices = Vec::with_capacity(rows.len());
        for (i, &row) in rows.iter().enumerate() {
            for (slot, &value) in features.numeric_row(row)?.iter().enumerate() {
                matrix[[i, slot]] = f64::from(value);
            }
            let label = label_of(row);
            let class = classes
                .binary_search_by(|c| c.total_cmp(&label))
                .map_err(|_| Error::InvalidTrainingData(format!("{STAGE}: unknown label {label}")))?;
            class_indices.push(class);
        }

        let scale: Vec<f64> = matrix
            .axis_iter(Axis(1))
            .map(|column| {
                let max_abs = column.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
                if max_abs > 0.0 {
                    1.0 / max_abs
                } else {
                    1.0
                }
            })
            .collect();
        for mut row in matrix.axis_iter_mut(Axis(0)) {
            for (value, factor) in row.iter_mut().zip(&scale) {
                *value *= factor;
            }
        }

        Ok(Self {
            classes,
            features: matrix,
            labels: class_indices,
            scale,
            skipped_rows,
        })
    }

    fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Primal and dual state of one training run
struct Solver<'a> {
    data: &'a TrainingData,
    options: &'a SdcaOptions,
    weights: Array2<f64>,
    bias: Array1<f64>,
    duals: Array2<f64>,
    squared_norms: Vec<f64>,
}

impl<'a> Solver<'a> {
    fn new(data: &'a TrainingData, options: &'a SdcaOptions) -> Self {
        let classes = data.classes.len();
        let squared_norms = data
            .features
            .axis_iter(Axis(0))
            .map(|row| row.dot(&row) + 1.0)
            .collect();

        Self {
            data,
            options,
            weights: Array2::zeros((classes, data.features.ncols())),
            bias: Array1::zeros(classes),
            duals: Array2::zeros((data.len(), classes)),
            squared_norms,
        }
    }

    fn run(mut self, seed: u64) -> Result<(MaximumEntropyModelParameters, TrainingSummary)> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..self.data.len()).collect();
        let mut epochs = 0;
        let mut gap = f64::INFINITY;
        let mut converged = false;

        while epochs < self.options.max_iterations {
            if self.options.shuffle {
                order.shuffle(&mut rng);
            }
            for &i in &order {
                self.step(i);
            }
            epochs += 1;

            let (primal, dual) = self.objectives();
            gap = (primal - dual) / primal.abs().max(f64::EPSILON);
            debug!(epoch = epochs, primal, dual, relative_gap = gap, "sdca epoch");
            if gap <= self.options.convergence_tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                epochs,
                relative_gap = gap,
                tolerance = self.options.convergence_tolerance,
                "sdca reached the iteration cap before converging"
            );
        }

        let summary = TrainingSummary {
            epochs,
            duality_gap: gap,
            converged,
            examples: self.data.len(),
            skipped_rows: self.data.skipped_rows,
        };
        info!(
            epochs,
            duality_gap = gap,
            converged,
            examples = summary.examples,
            classes = self.data.classes.len(),
            "trained sdca maximum entropy model"
        );

        Ok((self.into_model()?, summary))
    }

    fn lambda_n(&self) -> f64 {
        self.options.l2_regularization * self.data.len() as f64
    }

    /// Class probabilities for example `i` under the current weights
    fn probabilities(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut logits = self.weights.dot(&x) + &self.bias;
        let max = logits.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        logits.mapv_inplace(|v| (v - max).exp());
        let sum = logits.sum();
        logits / sum
    }

    fn step(&mut self, i: usize) {
        let data = self.data;
        let x = data.features.row(i);
        let y = data.labels[i];
        let lambda_n = self.lambda_n();

        let mut target = -self.probabilities(x);
        target[y] += 1.0;

        let step = lambda_n * SMOOTHNESS / (lambda_n * SMOOTHNESS + self.squared_norms[i]);
        let delta = (&target - &self.duals.row(i)) * step;

        self.duals.row_mut(i).scaled_add(1.0, &delta);
        for (k, &d) in delta.iter().enumerate() {
            self.weights.row_mut(k).scaled_add(d / lambda_n, &x);
            self.bias[k] += d / lambda_n;
        }
    }

    fn objectives(&self) -> (f64, f64) {
        let n = self.data.len() as f64;
        let mut loss = 0.0;
        let mut entropy = 0.0;

        for (i, x) in self.data.features.axis_iter(Axis(0)).enumerate() {
            let y = self.data.labels[i];
            let p = self.probabilities(x);
            loss -= p[y].max(f64::MIN_POSITIVE).ln();

            for (k, &alpha) in self.duals.row(i).iter().enumerate() {
                let q = if k == y { 1.0 - alpha } else { -alpha };
                if q > 0.0 {
                    entropy -= q * q.ln();
                }
            }
        }

        let squared_norm = self.weights.iter().map(|w| w * w).sum::<f64>() + self.bias.dot(&self.bias);
        let regularizer = 0.5 * self.options.l2_regularization * squared_norm;
        (loss / n + regularizer, entropy / n - regularizer)
    }

    /// Fold the feature scaling back into the weights
    fn into_model(self) -> Result<MaximumEntropyModelParameters> {
        let mut weights = self.weights.mapv(|w| w as f32);
        for (mut column, &factor) in weights.axis_iter_mut(Axis(1)).zip(&self.data.scale) {
            column.mapv_inplace(|w| w * factor as f32);
        }
        MaximumEntropyModelParameters::new(self.data.classes.clone(), weights, self.bias.mapv(|b| b as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdca::model::MulticlassModel;
    use ml_pipeline_core::{Column, Transformer};

    /// Three well separated clusters in two dimensions
    fn clusters() -> RecordBatch {
        let centers = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)];
        let mut labels = Vec::new();
        let mut features = Vec::new();
        for (class, (cx, cy)) in centers.iter().enumerate() {
            for j in 0..10 {
                let offset = j as f32 * 0.1;
                labels.push(class as f32);
                features.extend_from_slice(&[cx + offset, cy - offset]);
            }
        }
        RecordBatch::from_columns(vec![
            Column::from_f32("Label", labels),
            Column::from_vectors("Features", 2, features).unwrap(),
        ])
        .unwrap()
    }

    fn trainer() -> SdcaMaximumEntropy {
        SdcaMaximumEntropy::new(&Context::with_seed(1), SdcaOptions::default())
    }

    #[test]
    fn test_separable_clusters_are_learned() {
        let batch = clusters();
        let transformer = trainer().fit(&batch).unwrap();
        let output = transformer.transform(&batch).unwrap();

        let predicted = output.column_by_name("PredictedLabel").unwrap().as_f32().unwrap();
        let labels = batch.column_by_name("Label").unwrap().as_f32().unwrap();
        assert_eq!(predicted, labels);
        assert_eq!(transformer.model().classes(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_fit_is_deterministic_for_a_seed() {
        let batch = clusters();
        let first = trainer().fit(&batch).unwrap();
        let second = trainer().fit(&batch).unwrap();
        assert_eq!(first.model(), second.model());
        assert_eq!(first.training_summary(), second.training_summary());
    }

    #[test]
    fn test_duality_gap_is_reported() {
        let transformer = trainer().fit(&clusters()).unwrap();
        let summary = transformer.training_summary();
        assert!(summary.epochs >= 1);
        assert!(summary.duality_gap.is_finite());
        assert_eq!(summary.converged, summary.duality_gap <= 0.01);
        assert_eq!(summary.examples, 30);
    }

    #[test]
    fn test_iteration_cap_is_a_warning_not_an_error() {
        let options = SdcaOptions {
            max_iterations: 1,
            convergence_tolerance: 1e-12,
            ..SdcaOptions::default()
        };
        let transformer = SdcaMaximumEntropy::new(&Context::with_seed(1), options)
            .fit(&clusters())
            .unwrap();
        assert_eq!(transformer.training_summary().epochs, 1);
        assert!(!transformer.training_summary().converged);
    }

    #[test]
    fn test_single_class_is_rejected() {
        let batch = RecordBatch::from_columns(vec![
            Column::from_f32("Label", vec![1.0, 1.0]),
            Column::from_vectors("Features", 1, vec![0.5, 0.7]).unwrap(),
        ])
        .unwrap();
        assert!(matches!(trainer().fit(&batch), Err(Error::InvalidTrainingData(_))));
    }

    #[test]
    fn test_negative_zero_label_joins_zero_class() {
        let batch = RecordBatch::from_columns(vec![
            Column::from_f32("Label", vec![-0.0, 0.0, 1.0, 1.0]),
            Column::from_vectors("Features", 1, vec![-1.0, -0.8, 1.0, 0.9]).unwrap(),
        ])
        .unwrap();
        let transformer = trainer().fit(&batch).unwrap();

        let classes = transformer.model().classes();
        assert_eq!(classes, &[0.0, 1.0]);
        assert_eq!(classes[0].to_bits(), 0.0_f32.to_bits());
        assert_eq!(transformer.training_summary().examples, 4);
    }

    #[test]
    fn test_rows_with_missing_values_are_skipped() {
        let batch = RecordBatch::from_columns(vec![
            Column::from_f32("Label", vec![0.0, 1.0, f32::NAN, 1.0]),
            Column::from_vectors("Features", 1, vec![-1.0, 1.0, 0.0, f32::NAN]).unwrap(),
        ])
        .unwrap();
        let transformer = trainer().fit(&batch).unwrap();
        assert_eq!(transformer.training_summary().examples, 2);
        assert_eq!(transformer.training_summary().skipped_rows, 2);
    }

    #[test]
    fn test_missing_feature_column_fails_schema_check() {
        let batch = RecordBatch::from_columns(vec![Column::from_f32("Label", vec![0.0, 1.0])]).unwrap();
        let error = trainer().fit(&batch).unwrap_err();
        assert!(matches!(error, Error::Schema(_)));
        assert!(trainer().output_schema(batch.schema()).is_err());
    }

    #[test]
    fn test_scaling_is_folded_into_weights() {
        // Same data with features multiplied by 1000 should predict identically
        let batch = clusters();
        let features = batch.column_by_name("Features").unwrap();
        let scaled: Vec<f32> = (0..batch.row_count())
            .flat_map(|row| features.numeric_row(row).unwrap().iter().map(|v| v * 1000.0).collect::<Vec<_>>())
            .collect();
        let scaled_batch = batch
            .with_column(
                Field::new("Features", DataType::Vector(2)),
                Column::from_vectors("Features", 2, scaled).unwrap(),
            )
            .unwrap();

        let plain = trainer().fit(&batch).unwrap().transform(&batch).unwrap();
        let large = trainer().fit(&scaled_batch).unwrap().transform(&scaled_batch).unwrap();
        assert_eq!(
            plain.column_by_name("PredictedLabel").unwrap().as_f32().unwrap(),
            large.column_by_name("PredictedLabel").unwrap().as_f32().unwrap()
        );
    }
}
