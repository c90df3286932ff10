//! Core traits, data structures, and abstractions for ML pipelines
//!
//! This crate provides the foundational components for building supervised learning
//! pipelines: columnar record batches, the two-phase estimator/transformer contract
//! and its chains, single-example prediction, and classification evaluation.

#![warn(missing_docs)]

pub mod column;
pub mod context;
pub mod error;
pub mod evaluation;
pub mod prediction;
pub mod record_batch;
pub mod row;
pub mod schema;
pub mod transform;

// Re-export key types for convenience
pub use column::{Column, ColumnData};
pub use context::Context;
pub use error::{Error, Result};
pub use evaluation::{
    ConfusionMatrix, MulticlassClassificationEvaluator, MulticlassClassificationMetrics,
    MulticlassEvaluatorOptions,
};
pub use prediction::PredictionEngine;
pub use record_batch::RecordBatch;
pub use row::{FromRow, IntoRow, RowBuffer, Value};
pub use schema::{DataType, Field, Schema};
pub use transform::{Estimator, EstimatorChain, EstimatorExt, Transformer, TransformerChain};

/// Well-known column names shared by trainers and evaluators
pub mod columns {
    /// Label column
    pub const LABEL: &str = "Label";

    /// Feature vector column
    pub const FEATURES: &str = "Features";

    /// Per-class score column
    pub const SCORE: &str = "Score";

    /// Predicted label column
    pub const PREDICTED_LABEL: &str = "PredictedLabel";
}
