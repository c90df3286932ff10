use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ml_pipeline_bench::{SdcaClassifierBench, PREDICTION_BATCH_SIZES};

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../data")
}

fn benchmark_training(c: &mut Criterion) {
    let bench = SdcaClassifierBench::new(data_dir());
    let mut group = c.benchmark_group("train");
    group.sample_size(10);

    group.bench_function("TrainIris", |b| b.iter(|| black_box(bench.train_iris())));
    group.bench_function("TrainSentiment", |b| b.iter(|| black_box(bench.train_sentiment())));

    group.finish();
}

fn benchmark_prediction(c: &mut Criterion) {
    let mut bench = SdcaClassifierBench::new(data_dir());
    if let Err(err) = bench.setup_predict() {
        eprintln!("skipping prediction benchmarks: {err}");
        return;
    }

    c.bench_function("PredictIris", |b| b.iter(|| black_box(bench.predict_iris())));

    let mut group = c.benchmark_group("PredictIrisBatch");
    for size in PREDICTION_BATCH_SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| black_box(bench.predict_iris_batch(size)));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_training, benchmark_prediction);
criterion_main!(benches);
