//! Multiclass maximum entropy classification trained with SDCA

mod model;
mod options;
mod trainer;

pub use model::{MaximumEntropyModelParameters, MulticlassModel, MulticlassPredictionTransformer, TrainingSummary};
pub use options::SdcaOptions;
pub use trainer::SdcaMaximumEntropy;
