//! Text featurization: tokenization, n-gram extraction and vector normalization

mod featurizer;
mod normalize;
mod tokenize;

pub use featurizer::{
    tokens_column_name, TextFeaturizerOptions, TextFeaturizingEstimator, TextFeaturizingTransformer,
};
pub use normalize::VectorNormalizer;
pub use tokenize::{is_stop_word, Tokenizer};
