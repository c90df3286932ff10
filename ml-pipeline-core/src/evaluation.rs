//! Multiclass classification metrics over scored batches

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::record_batch::RecordBatch;
use crate::schema::{metadata, DataType};

/// Probabilities below this are clipped before taking the log
const LOG_LOSS_EPSILON: f64 = 1e-15;

/// Options for [`MulticlassClassificationEvaluator`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct MulticlassEvaluatorOptions {
    /// Compute top-k accuracy for this k; 0 disables it
    pub top_k: usize,
}

/// Counts of (true class, predicted class) pairs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    /// Class labels, ascending; row and column order of `counts`
    classes: Vec<f32>,

    /// `counts[truth][predicted]`
    counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    /// Class labels in matrix order
    pub fn classes(&self) -> &[f32] {
        &self.classes
    }

    /// Number of rows with true class `truth` predicted as `predicted`
    pub fn count(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[truth][predicted]
    }

    /// Per-class recall; NaN for classes with no true rows
    pub fn per_class_recall(&self) -> Vec<f64> {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let total: u64 = row.iter().sum();
                if total == 0 {
                    f64::NAN
                } else {
                    row[i] as f64 / total as f64
                }
            })
            .collect()
    }

    /// Per-class precision; NaN for classes never predicted
    pub fn per_class_precision(&self) -> Vec<f64> {
        (0..self.classes.len())
            .map(|j| {
                let predicted: u64 = self.counts.iter().map(|row| row[j]).sum();
                if predicted == 0 {
                    f64::NAN
                } else {
                    self.counts[j][j] as f64 / predicted as f64
                }
            })
            .collect()
    }
}

/// Aggregate quality of a multiclass classifier on one scored batch
///
/// Rates are NaN when the batch holds no labelled row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MulticlassClassificationMetrics {
    /// Fraction of rows predicted correctly
    pub micro_accuracy: f64,

    /// Mean of per-class accuracy over the classes present in the label column
    pub macro_accuracy: f64,

    /// Mean negative log probability assigned to the true class
    pub log_loss: f64,

    /// Relative improvement of `log_loss` over predicting the label prior
    pub log_loss_reduction: f64,

    /// The k used for `top_k_accuracy`
    pub top_k: usize,

    /// Fraction of rows whose true class is among the k highest scores
    pub top_k_accuracy: Option<f64>,

    /// Mean log loss per class, in confusion matrix order
    pub per_class_log_loss: Vec<f64>,

    /// Truth/prediction counts
    pub confusion_matrix: ConfusionMatrix,
}

/// Reduces a scored batch to [`MulticlassClassificationMetrics`]
#[derive(Debug, Clone, Default)]
pub struct MulticlassClassificationEvaluator {
    options: MulticlassEvaluatorOptions,
}

impl MulticlassClassificationEvaluator {
    /// Create an evaluator
    pub fn new(options: MulticlassEvaluatorOptions) -> Self {
        Self { options }
    }

    /// Evaluate `batch` using the named label, score and predicted-label columns
    pub fn evaluate(
        &self,
        batch: &RecordBatch,
        label_column: &str,
        score_column: &str,
        predicted_label_column: &str,
    ) -> Result<MulticlassClassificationMetrics> {
        const STAGE: &str = "multiclass evaluator";

        let schema = batch.schema();
        schema.require_type(STAGE, label_column, DataType::Float32)?;
        schema.require_type(STAGE, predicted_label_column, DataType::Float32)?;
        let slots = schema.require_numeric(STAGE, score_column)?;
        let slot_labels = match schema.require(STAGE, score_column)?.metadata_value(metadata::CLASS_LABELS) {
            Some(json) => serde_json::from_str::<Vec<f32>>(json)?,
            None => (0..slots).map(|i| i as f32).collect(),
        };
        if slot_labels.len() != slots {
            return Err(Error::Schema(format!(
                "{STAGE}: column '{score_column}' has {slots} slots but {} class labels",
                slot_labels.len()
            )));
        }

        let labels = batch.column_by_name(label_column)?.as_f32()?;
        let predicted = batch.column_by_name(predicted_label_column)?.as_f32()?;
        let scores = batch.column_by_name(score_column)?;

        // Class index over every label the batch mentions
        let mut class_index: BTreeMap<LabelKey, usize> = BTreeMap::new();
        for &value in slot_labels.iter().chain(labels).chain(predicted) {
            if !value.is_nan() {
                class_index.insert(LabelKey::new(value), 0);
            }
        }
        for (index, slot) in class_index.values_mut().enumerate() {
            *slot = index;
        }
        let classes: Vec<f32> = class_index.keys().map(|key| key.0).collect();
        let slot_of = |label: f32| slot_labels.iter().position(|&l| l == label);

        let n_classes = classes.len();
        let mut counts = vec![vec![0_u64; n_classes]; n_classes];
        let mut class_loss = vec![0.0_f64; n_classes];
        let mut total_loss = 0.0_f64;
        let mut top_k_hits = 0_usize;
        let mut rows = 0_usize;

        for row in 0..batch.row_count() {
            let label = labels[row];
            if label.is_nan() {
                continue;
            }
            rows += 1;
            let truth = class_index[&LabelKey::new(label)];

            if let Some(&guess) = class_index.get(&LabelKey::new(predicted[row])) {
                counts[truth][guess] += 1;
            }

            let row_scores = scores.numeric_row(row)?;
            let p_true = slot_of(label).map_or(0.0, |slot| f64::from(row_scores[slot]));
            let loss = -p_true.clamp(LOG_LOSS_EPSILON, 1.0).ln();
            total_loss += loss;
            class_loss[truth] += loss;

            if self.options.top_k > 0 {
                if let Some(slot) = slot_of(label) {
                    let rank = row_scores.iter().filter(|&&s| s > row_scores[slot]).count();
                    if rank < self.options.top_k {
                        top_k_hits += 1;
                    }
                }
            }
        }

        let confusion_matrix = ConfusionMatrix { classes, counts };
        // Rows whose prediction is NaN never enter the matrix but still count against accuracy
        let truth_totals = true_class_totals(labels, &class_index, n_classes);

        let metrics = if rows == 0 {
            MulticlassClassificationMetrics {
                micro_accuracy: f64::NAN,
                macro_accuracy: f64::NAN,
                log_loss: f64::NAN,
                log_loss_reduction: f64::NAN,
                top_k: self.options.top_k,
                top_k_accuracy: (self.options.top_k > 0).then_some(f64::NAN),
                per_class_log_loss: vec![f64::NAN; n_classes],
                confusion_matrix,
            }
        } else {
            let n = rows as f64;
            let correct: u64 = (0..n_classes).map(|i| confusion_matrix.counts[i][i]).sum();

            let present: Vec<usize> = (0..n_classes).filter(|&i| truth_totals[i] > 0).collect();
            let macro_accuracy = present
                .iter()
                .map(|&i| confusion_matrix.counts[i][i] as f64 / truth_totals[i] as f64)
                .sum::<f64>()
                / present.len() as f64;

            let log_loss = total_loss / n;
            let prior_log_loss: f64 = present
                .iter()
                .map(|&i| {
                    let p = truth_totals[i] as f64 / n;
                    -p * p.ln()
                })
                .sum();
            let log_loss_reduction = if prior_log_loss > 0.0 {
                (prior_log_loss - log_loss) / prior_log_loss
            } else {
                f64::NAN
            };

            let per_class_log_loss = (0..n_classes)
                .map(|i| {
                    if truth_totals[i] == 0 {
                        f64::NAN
                    } else {
                        class_loss[i] / truth_totals[i] as f64
                    }
                })
                .collect();

            debug!(rows, classes = n_classes, macro_accuracy, "evaluated batch");

            MulticlassClassificationMetrics {
                micro_accuracy: correct as f64 / n,
                macro_accuracy,
                log_loss,
                log_loss_reduction,
                top_k: self.options.top_k,
                top_k_accuracy: (self.options.top_k > 0).then(|| top_k_hits as f64 / n),
                per_class_log_loss,
                confusion_matrix,
            }
        };

        Ok(metrics)
    }
}

fn true_class_totals(labels: &[f32], class_index: &BTreeMap<LabelKey, usize>, n_classes: usize) -> Vec<u64> {
    let mut totals = vec![0_u64; n_classes];
    for label in labels.iter().filter(|l| !l.is_nan()) {
        totals[class_index[&LabelKey::new(*label)]] += 1;
    }
    totals
}

/// Totally ordered wrapper for non-NaN label values
#[derive(Debug, Clone, Copy)]
struct LabelKey(f32);

impl LabelKey {
    /// `-0.0` and `0.0` name the same class
    fn new(label: f32) -> Self {
        Self(label + 0.0)
    }
}

impl PartialEq for LabelKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0).is_eq()
    }
}

impl Eq for LabelKey {}

impl PartialOrd for LabelKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LabelKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}
