//! Word embedding extraction from token sequences
//!
//! A fitted [`WordEmbeddingsTransformer`] maps every row of a token column to a
//! vector of `3 * d` slots: the slot-wise minimum, average and maximum of the
//! embeddings of the row's known tokens. Rows without any known token map to zeros.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ml_pipeline_core::{Column, DataType, Estimator, Field, RecordBatch, Result, Schema, Transformer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Error;

const STAGE: &str = "WordEmbeddingsExtracting";

/// Pretrained embedding tables, looked up by file name in a model directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PretrainedModelKind {
    /// GloVe 6B, 50 dimensions
    GloVe50D,
    /// GloVe 6B, 100 dimensions
    GloVe100D,
    /// GloVe 6B, 200 dimensions
    GloVe200D,
    /// GloVe 6B, 300 dimensions
    GloVe300D,
    /// GloVe Twitter 27B, 25 dimensions
    GloVeTwitter25D,
    /// fastText trained on Wikipedia, 300 dimensions
    FastTextWikipedia300D,
    /// Sentiment-specific word embeddings, 50 dimensions
    Sswe,
}

impl PretrainedModelKind {
    /// File name of the table inside the model directory
    pub fn file_name(self) -> &'static str {
        match self {
            PretrainedModelKind::GloVe50D => "glove.6B.50d.txt",
            PretrainedModelKind::GloVe100D => "glove.6B.100d.txt",
            PretrainedModelKind::GloVe200D => "glove.6B.200d.txt",
            PretrainedModelKind::GloVe300D => "glove.6B.300d.txt",
            PretrainedModelKind::GloVeTwitter25D => "glove.twitter.27B.25d.txt",
            PretrainedModelKind::FastTextWikipedia300D => "wiki.en.vec",
            PretrainedModelKind::Sswe => "sentiment.emd",
        }
    }

    /// Embedding dimension
    pub fn dimension(self) -> usize {
        match self {
            PretrainedModelKind::GloVeTwitter25D => 25,
            PretrainedModelKind::GloVe50D | PretrainedModelKind::Sswe => 50,
            PretrainedModelKind::GloVe100D => 100,
            PretrainedModelKind::GloVe200D => 200,
            PretrainedModelKind::GloVe300D | PretrainedModelKind::FastTextWikipedia300D => 300,
        }
    }
}

/// In-memory word embedding table
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTable {
    dimension: usize,
    words: HashMap<String, usize>,
    values: Vec<f32>,
}

impl EmbeddingTable {
    /// Build a table from `(word, vector)` pairs; the first occurrence of a word wins
    pub fn from_entries<I>(entries: I) -> crate::error::Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        let mut table = Self {
            dimension: 0,
            words: HashMap::new(),
            values: Vec::new(),
        };
        for (line, (word, vector)) in entries.into_iter().enumerate() {
            table.insert(line + 1, word, &vector)?;
        }
        table.ensure_not_empty()?;
        Ok(table)
    }

    /// Load a text table: one `word v1 .. vd` entry per line, with an optional `count dim` header
    pub fn load<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let table = Self::from_reader(BufReader::new(file))?;
        info!(
            path = %path.display(),
            words = table.len(),
            dimension = table.dimension(),
            "loaded embedding table"
        );
        Ok(table)
    }

    /// Read a text table from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> crate::error::Result<Self> {
        let mut table = Self {
            dimension: 0,
            words: HashMap::new(),
            values: Vec::new(),
        };
        let mut vector = Vec::new();
        let mut first_entry = true;
        // A possible `count dim` header, kept until the next entry shows its width
        let mut header: Option<(usize, String, f32)> = None;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let number = index + 1;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };

            vector.clear();
            for part in parts {
                let value = part.parse::<f32>().map_err(|_| Error::Format {
                    line: number,
                    message: format!("cannot read '{part}' as a number"),
                })?;
                vector.push(value);
            }

            if std::mem::take(&mut first_entry) && looks_like_header(word, &vector) {
                header = Some((number, word.to_string(), vector[0]));
                continue;
            }
            if let Some((line, count, dim)) = header.take() {
                if vector.len() as f32 != dim {
                    table.insert(line, count, &[dim])?;
                }
            }
            table.insert(number, word.to_string(), &vector)?;
        }

        // A lone two-number line is a one-dimensional entry
        if let Some((line, word, value)) = header {
            table.insert(line, word, &[value])?;
        }

        table.ensure_not_empty()?;
        Ok(table)
    }

    fn insert(&mut self, line: usize, word: String, vector: &[f32]) -> crate::error::Result<()> {
        if vector.is_empty() {
            return Err(Error::Format {
                line,
                message: format!("word '{word}' has no values"),
            });
        }
        if self.dimension == 0 {
            self.dimension = vector.len();
        } else if vector.len() != self.dimension {
            return Err(Error::Format {
                line,
                message: format!("expected {} values, found {}", self.dimension, vector.len()),
            });
        }

        if !self.words.contains_key(&word) {
            self.words.insert(word, self.words.len());
            self.values.extend_from_slice(vector);
        }
        Ok(())
    }

    fn ensure_not_empty(&self) -> crate::error::Result<()> {
        if self.words.is_empty() {
            return Err(Error::Format {
                line: 0,
                message: "table has no entries".to_string(),
            });
        }
        Ok(())
    }

    /// Embedding dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of words
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the table has no words
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Embedding of `word`, if known
    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.words
            .get(word)
            .map(|&index| &self.values[index * self.dimension..(index + 1) * self.dimension])
    }
}

/// Whether a first line could be a `count dim` header
fn looks_like_header(word: &str, vector: &[f32]) -> bool {
    vector.len() == 1 && word.parse::<usize>().is_ok() && vector[0].fract() == 0.0
}

/// Where the embedding table comes from
#[derive(Debug, Clone)]
enum EmbeddingSource {
    Pretrained { kind: PretrainedModelKind, model_dir: PathBuf },
    Custom(Arc<EmbeddingTable>),
}

/// Estimator that loads an embedding table for a token column
#[derive(Debug, Clone)]
pub struct WordEmbeddingsExtractingEstimator {
    output: String,
    input: String,
    source: EmbeddingSource,
}

impl WordEmbeddingsExtractingEstimator {
    /// Use a pretrained table found in `model_dir`
    pub fn new<P: Into<PathBuf>>(output: &str, input: &str, kind: PretrainedModelKind, model_dir: P) -> Self {
        Self {
            output: output.to_string(),
            input: input.to_string(),
            source: EmbeddingSource::Pretrained {
                kind,
                model_dir: model_dir.into(),
            },
        }
    }

    /// Use an in-memory table
    pub fn with_custom_table(output: &str, input: &str, table: EmbeddingTable) -> Self {
        Self {
            output: output.to_string(),
            input: input.to_string(),
            source: EmbeddingSource::Custom(Arc::new(table)),
        }
    }

    fn dimension(&self) -> usize {
        match &self.source {
            EmbeddingSource::Pretrained { kind, .. } => kind.dimension(),
            EmbeddingSource::Custom(table) => table.dimension(),
        }
    }

    fn load_table(&self) -> crate::error::Result<Arc<EmbeddingTable>> {
        match &self.source {
            EmbeddingSource::Pretrained { kind, model_dir } => {
                let table = EmbeddingTable::load(model_dir.join(kind.file_name()))?;
                if table.dimension() != kind.dimension() {
                    return Err(Error::DimensionMismatch {
                        expected: kind.dimension(),
                        actual: table.dimension(),
                    });
                }
                Ok(Arc::new(table))
            }
            EmbeddingSource::Custom(table) => Ok(table.clone()),
        }
    }
}

impl Estimator for WordEmbeddingsExtractingEstimator {
    type Output = WordEmbeddingsTransformer;

    fn fit(&self, batch: &RecordBatch) -> Result<Self::Output> {
        batch.schema().require_type(STAGE, &self.input, DataType::TextVector)?;
        let table = self.load_table()?;
        debug!(output = %self.output, words = table.len(), "fitted word embeddings");

        Ok(WordEmbeddingsTransformer {
            output: self.output.clone(),
            input: self.input.clone(),
            table,
        })
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        input_schema.require_type(STAGE, &self.input, DataType::TextVector)?;
        Ok(input_schema.with_field(Field::new(&self.output, DataType::Vector(3 * self.dimension()))))
    }
}

/// Maps token sequences to min/average/max pooled embeddings
#[derive(Debug, Clone)]
pub struct WordEmbeddingsTransformer {
    output: String,
    input: String,
    table: Arc<EmbeddingTable>,
}

impl WordEmbeddingsTransformer {
    /// The loaded table
    pub fn table(&self) -> &EmbeddingTable {
        &self.table
    }

    fn pool(&self, tokens: &[String], out: &mut [f32]) {
        let dimension = self.table.dimension();
        let (min, rest) = out.split_at_mut(dimension);
        let (sum, max) = rest.split_at_mut(dimension);
        min.fill(f32::INFINITY);
        max.fill(f32::NEG_INFINITY);

        let mut known = 0usize;
        for vector in tokens.iter().filter_map(|token| self.table.get(token)) {
            known += 1;
            for (slot, &value) in vector.iter().enumerate() {
                min[slot] = min[slot].min(value);
                sum[slot] += value;
                max[slot] = max[slot].max(value);
            }
        }

        if known == 0 {
            out.fill(0.0);
            return;
        }
        for value in sum.iter_mut() {
            *value /= known as f32;
        }
    }
}

impl Transformer for WordEmbeddingsTransformer {
    fn transform(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        batch.schema().require_type(STAGE, &self.input, DataType::TextVector)?;
        let rows = batch.column_by_name(&self.input)?.as_text_vectors()?;
        let width = 3 * self.table.dimension();

        let mut values = vec![0.0; rows.len() * width];
        for (tokens, out) in rows.iter().zip(values.chunks_exact_mut(width)) {
            self.pool(tokens, out);
        }

        let column = Column::from_vectors(&self.output, width, values)?;
        batch.with_column(Field::new(&self.output, DataType::Vector(width)), column)
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Schema> {
        input_schema.require_type(STAGE, &self.input, DataType::TextVector)?;
        Ok(input_schema.with_field(Field::new(
            &self.output,
            DataType::Vector(3 * self.table.dimension()),
        )))
    }
}
