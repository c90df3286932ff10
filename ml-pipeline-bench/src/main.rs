//! Benchmark runner for the SDCA multiclass classifier pipelines

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ml_pipeline_bench::{run_sdca_benchmarks, BenchConfig, BENCHMARK_NAMES};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ml-pipeline-bench")]
#[command(about = "Time SDCA classifier training and prediction", long_about = None)]
#[command(version)]
struct Cli {
    /// Benchmarks to run (default: all)
    #[arg(value_name = "BENCHMARK")]
    benchmarks: Vec<String>,

    /// Directory holding iris.txt, sentiment-sample.tsv and models/
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// JSON file with a benchmark configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Timed iterations per benchmark
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Untimed warmup iterations per benchmark
    #[arg(short, long)]
    warmup: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// List benchmark names and exit
    #[arg(short, long)]
    list: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list {
        for name in BENCHMARK_NAMES {
            println!("{name}");
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => BenchConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(iterations) = cli.iterations {
        config.iterations = iterations;
    }
    if let Some(warmup) = cli.warmup {
        config.warmup_iterations = warmup;
    }

    let report = run_sdca_benchmarks(&config, &cli.benchmarks)
        .with_context(|| format!("running benchmarks with data from {}", config.data_dir.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("=== SDCA Classifier Benchmarks ===");
    println!("Macro accuracy: {}", report.macro_accuracy);

    for result in &report.results {
        println!("\nBenchmark: {}", result.name);
        println!("  Iterations:   {}", result.iterations);
        println!("  Total time:   {:?}", result.total_time);
        println!("  Average time: {:?}", result.avg_time);
        println!("  Min time:     {:?}", result.min_time);
        println!("  Max time:     {:?}", result.max_time);
        println!("  Throughput:   {:.2} ops/sec", result.throughput);

        if let Some(memory) = result.memory_usage {
            println!("  Memory usage: {memory} bytes");
        }
    }

    Ok(())
}
