//! Benchmarks for ML pipeline components
//!
//! The runner times repeated invocations of a fallible closure; the scenarios in
//! [`sdca_classifier`] provide the training and prediction entry points it times.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use ml_pipeline_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod sdca_classifier;

pub use sdca_classifier::{
    format_metric, IrisData, IrisPrediction, SdcaClassifierBench, SdcaModel, PREDICTION_BATCH_SIZES,
};

/// Benchmark configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Number of timed iterations
    pub iterations: usize,

    /// Untimed iterations run first
    pub warmup_iterations: usize,

    /// Directory holding the data files and the `models` directory
    pub data_dir: PathBuf,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            warmup_iterations: 3,
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Benchmark result
#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    /// Name of the benchmark
    pub name: String,

    /// Number of timed iterations
    pub iterations: usize,

    /// Total time taken
    pub total_time: Duration,

    /// Average time per iteration
    pub avg_time: Duration,

    /// Min time per iteration
    pub min_time: Duration,

    /// Max time per iteration
    pub max_time: Duration,

    /// Iterations per second
    pub throughput: f64,

    /// Bytes held by the benchmark's output, when it produces a batch
    pub memory_usage: Option<usize>,
}

/// Run a benchmark, stopping at the first failing iteration
pub fn run_benchmark<F>(name: &str, config: &BenchConfig, mut func: F) -> Result<BenchResult>
where
    F: FnMut() -> Result<()>,
{
    if config.iterations == 0 {
        return Err(Error::InvalidArgument(format!("{name}: iterations must be at least 1")));
    }

    // Warmup
    for _ in 0..config.warmup_iterations {
        func()?;
    }

    // Actual benchmark
    let mut times = Vec::with_capacity(config.iterations);
    let start_total = Instant::now();

    for _ in 0..config.iterations {
        let start = Instant::now();
        func()?;
        times.push(start.elapsed());
    }

    let total_time = start_total.elapsed();

    // Calculate statistics
    let measured: Duration = times.iter().sum();
    let avg_time = measured / u32::try_from(times.len()).unwrap_or(u32::MAX);
    let min_time = times.iter().min().copied().unwrap_or_default();
    let max_time = times.iter().max().copied().unwrap_or_default();
    let throughput = config.iterations as f64 / total_time.as_secs_f64().max(f64::MIN_POSITIVE);

    debug!(name, ?avg_time, "benchmark finished");

    Ok(BenchResult {
        name: name.to_string(),
        iterations: config.iterations,
        total_time,
        avg_time,
        min_time,
        max_time,
        throughput,
        memory_usage: None,
    })
}

/// Results of one full run of the SDCA classifier benchmarks
#[derive(Debug, Clone, Serialize)]
pub struct SdcaBenchReport {
    /// Macro-accuracy of the Iris model on its training data, formatted
    pub macro_accuracy: String,

    /// Timing per benchmark
    pub results: Vec<BenchResult>,
}

/// Benchmarks selectable by name
pub const BENCHMARK_NAMES: [&str; 6] = [
    "TrainIris",
    "TrainSentiment",
    "PredictIris",
    "PredictIrisBatchOf1",
    "PredictIrisBatchOf2",
    "PredictIrisBatchOf5",
];

/// Run the selected SDCA classifier benchmarks; an empty selection runs them all
pub fn run_sdca_benchmarks(config: &BenchConfig, selection: &[String]) -> Result<SdcaBenchReport> {
    if let Some(unknown) = selection.iter().find(|name| !BENCHMARK_NAMES.contains(&name.as_str())) {
        return Err(Error::InvalidArgument(format!(
            "unknown benchmark '{unknown}', expected one of {}",
            BENCHMARK_NAMES.join(", ")
        )));
    }
    let selected = |name: &str| selection.is_empty() || selection.iter().any(|s| s == name);

    let mut bench = SdcaClassifierBench::new(&config.data_dir);
    let macro_accuracy = bench.setup_predict()?;
    let mut results = Vec::new();

    if selected("TrainIris") {
        results.push(run_benchmark("TrainIris", config, || bench.train_iris().map(drop))?);
    }
    if selected("TrainSentiment") {
        results.push(run_benchmark("TrainSentiment", config, || bench.train_sentiment().map(drop))?);
    }
    if selected("PredictIris") {
        results.push(run_benchmark("PredictIris", config, || bench.predict_iris().map(drop))?);
    }
    for size in PREDICTION_BATCH_SIZES {
        let name = format!("PredictIrisBatchOf{size}");
        if selected(&name) {
            let mut result = run_benchmark(&name, config, || bench.predict_iris_batch(size).map(drop))?;
            result.memory_usage = Some(bench.predict_iris_batch(size)?.memory_usage());
            results.push(result);
        }
    }

    Ok(SdcaBenchReport {
        macro_accuracy: format_metric(macro_accuracy),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_benchmark_counts_iterations() {
        let config = BenchConfig {
            iterations: 4,
            warmup_iterations: 2,
            ..BenchConfig::default()
        };
        let mut calls = 0;
        let result = run_benchmark("count", &config, || {
            calls += 1;
            Ok(())
        })
        .unwrap();

        assert_eq!(calls, 6);
        assert_eq!(result.iterations, 4);
        assert!(result.min_time <= result.avg_time && result.avg_time <= result.max_time);
        assert!(result.memory_usage.is_none());
    }

    #[test]
    fn test_run_benchmark_propagates_errors() {
        let config = BenchConfig::default();
        let result = run_benchmark("failing", &config, || Err(Error::InvalidArgument("boom".to_string())));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_iterations_is_rejected() {
        let config = BenchConfig {
            iterations: 0,
            ..BenchConfig::default()
        };
        assert!(run_benchmark("none", &config, || Ok(())).is_err());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: BenchConfig = serde_json::from_str(r#"{"iterations": 2}"#).unwrap();
        assert_eq!(config.iterations, 2);
        assert_eq!(config.warmup_iterations, 3);
    }

    #[test]
    fn test_unknown_benchmark_is_rejected() {
        let result = run_sdca_benchmarks(&BenchConfig::default(), &["Nope".to_string()]);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
