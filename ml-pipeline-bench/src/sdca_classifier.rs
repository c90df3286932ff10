//! SDCA multiclass classifier scenarios: Iris training and prediction, sentiment training

use std::path::{Path, PathBuf};

use ml_pipeline_core::{
    columns, Context, DataType, Error, Estimator, EstimatorExt, Field, FromRow, IntoRow,
    MulticlassClassificationEvaluator, MulticlassClassificationMetrics, PredictionEngine, RecordBatch, Result, Schema,
    Transformer, TransformerChain, Value,
};
use ml_pipeline_readers::{SourceRange, TextColumn, TextLoader, TextLoaderOptions};
use ml_pipeline_transforms::embeddings::PretrainedModelKind;
use ml_pipeline_transforms::text::{tokens_column_name, TextFeaturizerOptions, VectorNormalizer};
use ml_pipeline_transforms::{
    ColumnConcatenatingEstimator, MaximumEntropyModelParameters, MulticlassPredictionTransformer, SdcaMaximumEntropy,
    TextFeaturizingEstimator, WordEmbeddingsExtractingEstimator,
};
use tracing::info;

/// Iris data file name inside the data directory
pub const IRIS_FILE: &str = "iris.txt";

/// Sentiment data file name inside the data directory
pub const SENTIMENT_FILE: &str = "sentiment-sample.tsv";

/// Directory holding pretrained embedding tables, relative to the data directory
pub const MODELS_DIR: &str = "models";

/// Batch sizes prepared by [`SdcaClassifierBench::setup_predict`]
pub const PREDICTION_BATCH_SIZES: [usize; 3] = [1, 2, 5];

/// Seed of the benchmark's context
const SEED: u64 = 1;

/// A trained SDCA pipeline
pub type SdcaModel = TransformerChain<MulticlassPredictionTransformer<MaximumEntropyModelParameters>>;

/// One Iris flower
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrisData {
    /// Species index
    pub label: f32,
    /// Sepal length in cm
    pub sepal_length: f32,
    /// Sepal width in cm
    pub sepal_width: f32,
    /// Petal length in cm
    pub petal_length: f32,
    /// Petal width in cm
    pub petal_width: f32,
}

impl IrisData {
    const FEATURES: [&'static str; 4] = ["SepalLength", "SepalWidth", "PetalLength", "PetalWidth"];

    /// The example scored by the prediction benchmarks
    pub fn example() -> Self {
        Self {
            label: 0.0,
            sepal_length: 3.3,
            sepal_width: 1.6,
            petal_length: 0.2,
            petal_width: 5.1,
        }
    }
}

impl IntoRow for IrisData {
    fn schema() -> Result<Schema> {
        let fields = std::iter::once(columns::LABEL)
            .chain(Self::FEATURES)
            .map(|name| Field::new(name, DataType::Float32))
            .collect();
        Schema::new(fields)
    }

    fn write_row(&self, row: &mut Vec<Value>) {
        row.extend(
            [
                self.label,
                self.sepal_length,
                self.sepal_width,
                self.petal_length,
                self.petal_width,
            ]
            .map(Value::Float32),
        );
    }
}

/// Prediction read back from a scored Iris row
#[derive(Debug, Clone, PartialEq)]
pub struct IrisPrediction {
    /// Probability per class
    pub score: Vec<f32>,
    /// Most likely class label
    pub predicted_label: f32,
}

impl FromRow for IrisPrediction {
    fn read_row(batch: &RecordBatch, row: usize) -> Result<Self> {
        Ok(Self {
            score: batch.column_by_name(columns::SCORE)?.numeric_row(row)?.to_vec(),
            predicted_label: batch.column_by_name(columns::PREDICTED_LABEL)?.as_f32()?[row],
        })
    }
}

/// Loader for the tab separated Iris file: label, then the four measurements
pub fn iris_loader() -> Result<TextLoader> {
    let mut declared = vec![TextColumn::numeric(columns::LABEL, vec![SourceRange::single(0)])];
    declared.extend(
        IrisData::FEATURES
            .iter()
            .enumerate()
            .map(|(i, name)| TextColumn::numeric(name, vec![SourceRange::single(i + 1)])),
    );

    Ok(TextLoader::new(TextLoaderOptions {
        columns: declared,
        has_header: true,
        ..TextLoaderOptions::default()
    })?)
}

/// Loader for the sentiment file: label, then the text
pub fn sentiment_loader() -> Result<TextLoader> {
    Ok(TextLoader::new(TextLoaderOptions {
        columns: vec![
            TextColumn::numeric(columns::LABEL, vec![SourceRange::single(0)]),
            TextColumn::text("SentimentText", vec![SourceRange::single(1)]),
        ],
        has_header: true,
        ..TextLoaderOptions::default()
    })?)
}

/// Benchmark state: data locations and the artifacts prepared for prediction
#[derive(Debug)]
pub struct SdcaClassifierBench {
    data_dir: PathBuf,
    context: Context,
    prepared: Option<Prepared>,
}

#[derive(Debug)]
struct Prepared {
    model: SdcaModel,
    engine: PredictionEngine<IrisData, IrisPrediction>,
    batches: Vec<Vec<IrisData>>,
    metrics: MulticlassClassificationMetrics,
}

impl SdcaClassifierBench {
    /// Benchmark reading its files from `data_dir`
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            context: Context::with_seed(SEED),
            prepared: None,
        }
    }

    /// Data directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Load the Iris data set
    pub fn load_iris(&self) -> Result<RecordBatch> {
        Ok(iris_loader()?.load(self.data_dir.join(IRIS_FILE))?)
    }

    /// Concatenate the measurements into `Features` and train SDCA
    pub fn train_iris(&self) -> Result<SdcaModel> {
        let data = self.load_iris()?;
        self.fit_iris(&data)
    }

    /// Fit the Iris pipeline on already loaded data
    pub fn fit_iris(&self, data: &RecordBatch) -> Result<SdcaModel> {
        let pipeline = ColumnConcatenatingEstimator::new(columns::FEATURES, &IrisData::FEATURES)
            .append(SdcaMaximumEntropy::with_defaults(&self.context));
        pipeline.fit(data)
    }

    /// Tokenize the text, embed it with sentiment embeddings and train SDCA
    pub fn train_sentiment(&self) -> Result<SdcaModel> {
        let data = sentiment_loader()?.load(self.data_dir.join(SENTIMENT_FILE))?;

        let featurizer = TextFeaturizingEstimator::new(
            "WordEmbeddings",
            &["SentimentText"],
            TextFeaturizerOptions {
                output_tokens: true,
                keep_punctuations: false,
                use_stop_remover: true,
                vector_normalizer: VectorNormalizer::None,
                use_char_extractor: false,
                use_word_extractor: false,
                ..TextFeaturizerOptions::default()
            },
        );
        let embeddings = WordEmbeddingsExtractingEstimator::new(
            columns::FEATURES,
            &tokens_column_name("WordEmbeddings"),
            PretrainedModelKind::Sswe,
            self.data_dir.join(MODELS_DIR),
        );

        featurizer
            .append(embeddings)
            .append(SdcaMaximumEntropy::with_defaults(&self.context))
            .fit(&data)
    }

    /// Train on Iris, score it, and prepare the prediction engine and batches
    ///
    /// Returns the macro-accuracy of the model on its training data.
    pub fn setup_predict(&mut self) -> Result<f64> {
        let data = self.load_iris()?;
        let model = self.fit_iris(&data)?;

        let scored = model.transform(&data)?;
        let metrics = MulticlassClassificationEvaluator::default().evaluate(
            &scored,
            columns::LABEL,
            columns::SCORE,
            columns::PREDICTED_LABEL,
        )?;
        info!(macro_accuracy = %format_metric(metrics.macro_accuracy), "evaluated iris model");

        let engine = model.create_prediction_engine::<IrisData, IrisPrediction>()?;
        let batches = PREDICTION_BATCH_SIZES.iter().map(|&size| example_rows(size)).collect();

        let macro_accuracy = metrics.macro_accuracy;
        self.prepared = Some(Prepared {
            model,
            engine,
            batches,
            metrics,
        });
        Ok(macro_accuracy)
    }

    /// Metrics computed by [`setup_predict`](Self::setup_predict)
    pub fn metrics(&self) -> Option<&MulticlassClassificationMetrics> {
        self.prepared.as_ref().map(|p| &p.metrics)
    }

    /// Model trained by [`setup_predict`](Self::setup_predict)
    pub fn model(&self) -> Option<&SdcaModel> {
        self.prepared.as_ref().map(|p| &p.model)
    }

    /// Score the benchmark example with the prediction engine
    pub fn predict_iris(&mut self) -> Result<IrisPrediction> {
        let prepared = self.prepared_mut()?;
        prepared.engine.predict(&IrisData::example())
    }

    /// Build a batch from `size` copies of the benchmark example and score it
    pub fn predict_iris_batch(&self, size: usize) -> Result<RecordBatch> {
        let prepared = self.prepared.as_ref().ok_or_else(not_prepared)?;
        let batch = match prepared.batches.iter().find(|rows| rows.len() == size) {
            Some(rows) => RecordBatch::from_rows(rows)?,
            None => example_batch(size)?,
        };
        prepared.model.transform(&batch)
    }

    fn prepared_mut(&mut self) -> Result<&mut Prepared> {
        self.prepared.as_mut().ok_or_else(not_prepared)
    }
}

fn not_prepared() -> Error {
    Error::InvalidArgument("setup_predict must run before prediction benchmarks".to_string())
}

/// `size` copies of [`IrisData::example`]
pub fn example_rows(size: usize) -> Vec<IrisData> {
    vec![IrisData::example(); size]
}

/// A batch of `size` copies of [`IrisData::example`]
pub fn example_batch(size: usize) -> Result<RecordBatch> {
    RecordBatch::from_rows(&example_rows(size))
}

/// Format a metric with at most two decimals, dropping trailing zeros
pub fn format_metric(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}
