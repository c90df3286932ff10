//! Estimators and transformers for ML pipelines
//!
//! This crate provides the fit-time stages used to build classification pipelines:
//! column concatenation, text featurization, word embedding extraction, and the
//! SDCA maximum entropy trainer together with its prediction transformer.

#![warn(missing_docs)]

pub mod concat;
pub mod embeddings;
pub mod error;
pub mod sdca;
pub mod text;

pub use concat::{ColumnConcatenatingEstimator, ColumnConcatenatingTransformer};
pub use embeddings::{EmbeddingTable, PretrainedModelKind, WordEmbeddingsExtractingEstimator, WordEmbeddingsTransformer};
pub use sdca::{
    MaximumEntropyModelParameters, MulticlassModel, MulticlassPredictionTransformer, SdcaMaximumEntropy,
    SdcaOptions, TrainingSummary,
};
pub use text::{TextFeaturizerOptions, TextFeaturizingEstimator, TextFeaturizingTransformer, VectorNormalizer};
