//! Bag-of-n-grams featurization of free text

use std::collections::HashMap;

use ml_pipeline_core::{Column, DataType, Error, Estimator, Field, RecordBatch, Result, Schema, Transformer};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::normalize::VectorNormalizer;
use super::tokenize::Tokenizer;

const STAGE: &str = "TextFeaturizing";

/// Marks the start of a document for character n-grams
const TEXT_START: char = '\u{2}';
/// Marks the end of a document for character n-grams
const TEXT_END: char = '\u{3}';

/// Options for [`TextFeaturizingEstimator`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextFeaturizerOptions {
    /// Also emit the normalized tokens as `{output}_TransformedText`
    pub output_tokens: bool,

    /// Keep punctuation tokens
    pub keep_punctuations: bool,

    /// Drop English stop words
    pub use_stop_remover: bool,

    /// Norm applied to each feature vector
    pub vector_normalizer: VectorNormalizer,

    /// Count character n-grams
    pub use_char_extractor: bool,

    /// Character n-gram length
    pub char_ngram_length: usize,

    /// Count word n-grams
    pub use_word_extractor: bool,

    /// Longest word n-gram; all shorter lengths are counted too
    pub word_ngram_length: usize,

    /// Lowercase text before tokenizing
    pub lowercase: bool,
}

impl Default for TextFeaturizerOptions {
    fn default() -> Self {
        Self {
            output_tokens: false,
            keep_punctuations: true,
            use_stop_remover: false,
            vector_normalizer: VectorNormalizer::L2,
            use_char_extractor: true,
            char_ngram_length: 3,
            use_word_extractor: true,
            word_ngram_length: 2,
            lowercase: true,
        }
    }
}

impl TextFeaturizerOptions {
    fn tokenizer(&self) -> Tokenizer {
        Tokenizer {
            lowercase: self.lowercase,
            keep_punctuations: self.keep_punctuations,
            remove_stop_words: self.use_stop_remover,
        }
    }

    fn produces_features(&self) -> bool {
        self.use_char_extractor || self.use_word_extractor
    }

    fn validate(&self) -> Result<()> {
        if !self.produces_features() && !self.output_tokens {
            return Err(Error::InvalidArgument(format!(
                "{STAGE}: options produce no output; enable an extractor or output_tokens"
            )));
        }
        if self.use_char_extractor && self.char_ngram_length == 0 {
            return Err(Error::InvalidArgument(format!("{STAGE}: char_ngram_length must be positive")));
        }
        if self.use_word_extractor && self.word_ngram_length == 0 {
            return Err(Error::InvalidArgument(format!("{STAGE}: word_ngram_length must be positive")));
        }
        Ok(())
    }
}

/// Name of the token column produced alongside `output`
pub fn tokens_column_name(output: &str) -> String {
    format!("{output}_TransformedText")
}

/// Estimator that learns an n-gram vocabulary from one or more text columns
#[derive(Debug, Clone)]
pub struct TextFeaturizingEstimator {
    output: String,
    inputs: Vec<String>,
    options: TextFeaturizerOptions,
}

impl TextFeaturizingEstimator {
    /// Featurize the concatenated text of `inputs` into `output`
    pub fn new<S: AsRef<str>>(output: &str, inputs: &[S], options: TextFeaturizerOptions) -> Self {
        Self {
            output: output.to_string(),
            inputs: inputs.iter().map(|s| s.as_ref().to_string()).collect(),
            options,
        }
    }

    /// Featurize a single text column into a column of the same name
    pub fn for_column(column: &str, options: TextFeaturizerOptions) -> Self {
        Self::new(column, &[column], options)
    }
}

impl Estimator for TextFeaturizingEstimator {
    type Output = TextFeaturizingTransformer;

    fn fit(&self, batch: &RecordBatch) -> Result<Self::Output> {
        self.options.validate()?;
        let documents = documents(batch, &self.inputs)?;
        let tokenizer = self.options.tokenizer();

        let mut word_vocabulary = Vocabulary::default();
        let mut char_vocabulary = Vocabulary::default();
        for document in &documents {
            let tokens = tokenizer.tokenize(document);
            if self.options.use_word_extractor {
                for_each_word_ngram(&tokens, self.options.word_ngram_length, |gram| {
                    word_vocabulary.insert(gram);
                });
            }
            if self.options.use_char_extractor {
                for_each_char_ngram(&tokens, self.options.char_ngram_length, |gram| {
                    char_vocabulary.insert(gram);
                });
            }
        }

        if self.options.produces_features() && word_vocabulary.is_empty() && char_vocabulary.is_empty() {
            return Err(Error::InvalidTrainingData(format!(
                "{STAGE}: no n-grams found in {} training documents",
                documents.len()
            )));
        }

        debug!(
            output = %self.output,
            word_ngrams = word_vocabulary.len(),
            char_ngrams = char_vocabulary.len(),
            "fitted text featurizer"
        );

        Ok(TextFeaturizingTransformer {
            output: self.output.clone(),
            inputs: self.inputs.clone(),
            options: self.options.clone(),
            word_vocabulary,
            char_vocabulary,
        })
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        self.options.validate()?;
        require_text_inputs(input_schema, &self.inputs)?;

        // Vocabulary size is unknown until fit; width 1 stands in for it
        Ok(output_schema(input_schema, &self.output, &self.options, 1))
    }
}

/// N-gram vocabulary indexed in first-seen order
#[derive(Debug, Clone, Default)]
struct Vocabulary {
    indices: HashMap<String, usize>,
}

impl Vocabulary {
    fn insert(&mut self, gram: &str) {
        if !self.indices.contains_key(gram) {
            let index = self.indices.len();
            self.indices.insert(gram.to_string(), index);
        }
    }

    fn get(&self, gram: &str) -> Option<usize> {
        self.indices.get(gram).copied()
    }

    fn len(&self) -> usize {
        self.indices.len()
    }

    fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Maps text to normalized n-gram counts over a learned vocabulary
#[derive(Debug, Clone)]
pub struct TextFeaturizingTransformer {
    output: String,
    inputs: Vec<String>,
    options: TextFeaturizerOptions,
    word_vocabulary: Vocabulary,
    char_vocabulary: Vocabulary,
}

impl TextFeaturizingTransformer {
    /// Width of the produced feature vector
    pub fn feature_count(&self) -> usize {
        self.word_vocabulary.len() + self.char_vocabulary.len()
    }

    /// Slot of a word n-gram (tokens joined by a single space)
    pub fn word_ngram_slot(&self, gram: &str) -> Option<usize> {
        self.word_vocabulary.get(gram)
    }

    fn featurize(&self, tokens: &[String], values: &mut [f32]) {
        let offset = self.word_vocabulary.len();
        if self.options.use_word_extractor {
            for_each_word_ngram(tokens, self.options.word_ngram_length, |gram| {
                if let Some(slot) = self.word_vocabulary.get(gram) {
                    values[slot] += 1.0;
                }
            });
        }
        if self.options.use_char_extractor {
            for_each_char_ngram(tokens, self.options.char_ngram_length, |gram| {
                if let Some(slot) = self.char_vocabulary.get(gram) {
                    values[offset + slot] += 1.0;
                }
            });
        }
        self.options.vector_normalizer.apply(values);
    }
}

impl Transformer for TextFeaturizingTransformer {
    fn transform(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let documents = documents(batch, &self.inputs)?;
        let tokenizer = self.options.tokenizer();
        let width = self.feature_count();

        let mut token_rows = Vec::with_capacity(documents.len());
        let mut features = Vec::with_capacity(documents.len() * width);
        for document in &documents {
            let tokens = tokenizer.tokenize(document);
            if self.options.produces_features() {
                let start = features.len();
                features.resize(start + width, 0.0);
                self.featurize(&tokens, &mut features[start..]);
            }
            if self.options.output_tokens {
                token_rows.push(tokens);
            }
        }

        let mut output = batch.clone();
        if self.options.produces_features() {
            let column = Column::from_vectors(&self.output, width, features)?;
            output = output.with_column(Field::new(&self.output, DataType::Vector(width)), column)?;
        }
        if self.options.output_tokens {
            let name = tokens_column_name(&self.output);
            let column = Column::from_text_vectors(&name, token_rows);
            output = output.with_column(Field::new(&name, DataType::TextVector), column)?;
        }
        Ok(output)
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        require_text_inputs(input_schema, &self.inputs)?;
        Ok(output_schema(input_schema, &self.output, &self.options, self.feature_count()))
    }
}

fn require_text_inputs(schema: &Schema, inputs: &[String]) -> Result<()> {
    if inputs.is_empty() {
        return Err(Error::InvalidArgument(format!("{STAGE}: at least one input column is required")));
    }
    for input in inputs {
        schema.require_type(STAGE, input, DataType::Text)?;
    }
    Ok(())
}

fn output_schema(input_schema: &Schema, output: &str, options: &TextFeaturizerOptions, width: usize) -> Schema {
    let mut schema = input_schema.clone();
    if options.produces_features() {
        schema = schema.with_field(Field::new(output, DataType::Vector(width)));
    }
    if options.output_tokens {
        schema = schema.with_field(Field::new(&tokens_column_name(output), DataType::TextVector));
    }
    schema
}

/// Text of each row, multiple inputs joined by a space
fn documents(batch: &RecordBatch, inputs: &[String]) -> Result<Vec<String>> {
    require_text_inputs(batch.schema(), inputs)?;
    let columns = inputs
        .iter()
        .map(|name| batch.column_by_name(name)?.as_text())
        .collect::<Result<Vec<_>>>()?;

    Ok((0..batch.row_count())
        .map(|row| {
            columns
                .iter()
                .map(|values| values[row].as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect())
}

/// Visit word n-grams of every length up to `max_length`
fn for_each_word_ngram(tokens: &[String], max_length: usize, mut visit: impl FnMut(&str)) {
    let mut gram = String::new();
    for start in 0..tokens.len() {
        gram.clear();
        for (offset, token) in tokens[start..].iter().take(max_length).enumerate() {
            if offset > 0 {
                gram.push(' ');
            }
            gram.push_str(token);
            visit(&gram);
        }
    }
}

/// Visit character n-grams of exactly `length` over the marked, space-joined tokens
fn for_each_char_ngram(tokens: &[String], length: usize, mut visit: impl FnMut(&str)) {
    let mut chars = vec![TEXT_START];
    for (index, token) in tokens.iter().enumerate() {
        if index > 0 {
            chars.push(' ');
        }
        chars.extend(token.chars());
    }
    chars.push(TEXT_END);

    let mut gram = String::new();
    for window in chars.windows(length) {
        gram.clear();
        gram.extend(window);
        visit(&gram);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn reviews() -> RecordBatch {
        RecordBatch::from_columns(vec![
            Column::from_f32("Label", vec![1.0, 0.0, 1.0]),
            Column::from_text(
                "SentimentText",
                vec![
                    "A great movie, truly great!".to_string(),
                    "The plot was awful.".to_string(),
                    String::new(),
                ],
            ),
        ])
        .unwrap()
    }

    fn words_only() -> TextFeaturizerOptions {
        TextFeaturizerOptions {
            use_char_extractor: false,
            vector_normalizer: VectorNormalizer::None,
            ..TextFeaturizerOptions::default()
        }
    }

    #[test]
    fn test_word_ngram_counts() {
        let estimator = TextFeaturizingEstimator::new("Features", &["SentimentText"], words_only());
        let transformer = estimator.fit(&reviews()).unwrap();
        let output = transformer.transform(&reviews()).unwrap();

        let features = output.column_by_name("Features").unwrap();
        let great = transformer.word_ngram_slot("great").unwrap();
        let great_movie = transformer.word_ngram_slot("great movie").unwrap();
        let row = features.numeric_row(0).unwrap();
        assert_eq!(row[great], 2.0);
        assert_eq!(row[great_movie], 1.0);
        assert!(transformer.word_ngram_slot("plot was awful").is_none());

        // An empty document yields a zero vector
        assert!(features.numeric_row(2).unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_vocabulary_is_first_seen_order() {
        let estimator = TextFeaturizingEstimator::new("Features", &["SentimentText"], words_only());
        let transformer = estimator.fit(&reviews()).unwrap();
        assert_eq!(transformer.word_ngram_slot("a"), Some(0));
        assert_eq!(transformer.word_ngram_slot("a great"), Some(1));
        assert_eq!(transformer.word_ngram_slot("great"), Some(2));
    }

    #[test]
    fn test_default_options_produce_l2_normalized_vectors() {
        let estimator = TextFeaturizingEstimator::for_column("SentimentText", TextFeaturizerOptions::default());
        let transformer = estimator.fit(&reviews()).unwrap();
        let output = transformer.transform(&reviews()).unwrap();

        let features = output.column_by_name("SentimentText").unwrap();
        assert_eq!(features.data_type(), DataType::Vector(transformer.feature_count()));
        let norm: f32 = features.numeric_row(0).unwrap().iter().map(|v| v * v).sum();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_tokens_only_output() {
        let options = TextFeaturizerOptions {
            output_tokens: true,
            keep_punctuations: false,
            use_stop_remover: true,
            vector_normalizer: VectorNormalizer::None,
            use_char_extractor: false,
            use_word_extractor: false,
            ..TextFeaturizerOptions::default()
        };
        let estimator = TextFeaturizingEstimator::new("WordEmbeddings", &["SentimentText"], options);
        let transformer = estimator.fit(&reviews()).unwrap();
        let output = transformer.transform(&reviews()).unwrap();

        assert!(output.column_by_name("WordEmbeddings").is_err());
        let tokens = output
            .column_by_name("WordEmbeddings_TransformedText")
            .unwrap()
            .as_text_vectors()
            .unwrap();
        assert_eq!(tokens[0], ["great", "movie", "truly", "great"]);
        assert_eq!(tokens[1], ["plot", "awful"]);
        assert!(tokens[2].is_empty());
    }

    #[test]
    fn test_schema_matches_transform() {
        let options = TextFeaturizerOptions {
            output_tokens: true,
            ..TextFeaturizerOptions::default()
        };
        let transformer = TextFeaturizingEstimator::new("Features", &["SentimentText"], options)
            .fit(&reviews())
            .unwrap();
        let output = transformer.transform(&reviews()).unwrap();
        assert_eq!(output.schema().as_ref(), &transformer.output_schema(reviews().schema()).unwrap());
    }

    #[test_case(false, false, false, 3, 2 ; "no output")]
    #[test_case(false, true, false, 0, 2 ; "zero char length")]
    #[test_case(false, false, true, 3, 0 ; "zero word length")]
    fn test_rejects_invalid_options(
        output_tokens: bool,
        use_char_extractor: bool,
        use_word_extractor: bool,
        char_ngram_length: usize,
        word_ngram_length: usize,
    ) {
        let options = TextFeaturizerOptions {
            output_tokens,
            use_char_extractor,
            use_word_extractor,
            char_ngram_length,
            word_ngram_length,
            ..TextFeaturizerOptions::default()
        };
        let estimator = TextFeaturizingEstimator::new("Features", &["SentimentText"], options);
        assert!(matches!(estimator.fit(&reviews()), Err(Error::InvalidArgument(_))));
        assert!(estimator.output_schema(reviews().schema()).is_err());
    }

    #[test]
    fn test_rejects_numeric_input() {
        let estimator = TextFeaturizingEstimator::new("Features", &["Label"], TextFeaturizerOptions::default());
        assert!(matches!(estimator.fit(&reviews()), Err(Error::Schema(_))));
    }

    #[test]
    fn test_char_ngrams_include_document_markers() {
        let tokens = vec!["ab".to_string(), "c".to_string()];
        let mut grams = Vec::new();
        for_each_char_ngram(&tokens, 3, |gram| grams.push(gram.to_string()));
        assert_eq!(grams, ["\u{2}ab", "ab ", "b c", " c\u{3}"]);
    }

    #[test]
    fn test_unseen_ngrams_are_ignored() {
        let transformer = TextFeaturizingEstimator::new("Features", &["SentimentText"], words_only())
            .fit(&reviews())
            .unwrap();
        let unseen = RecordBatch::from_columns(vec![Column::from_text(
            "SentimentText",
            vec!["completely novel words".to_string()],
        )])
        .unwrap();
        let output = transformer.transform(&unseen).unwrap();
        assert!(output
            .column_by_name("Features")
            .unwrap()
            .numeric_row(0)
            .unwrap()
            .iter()
            .all(|&v| v == 0.0));
    }
}
