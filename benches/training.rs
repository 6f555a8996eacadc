use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_anomaly::anomaly::{
    AnomalyDetector, IsolationForest, IsolationForestParams, OneClassSvm, OneClassSvmParams,
};
use kolosal_anomaly::preprocessing::StandardScaler;
use kolosal_anomaly::synthetic::{sample_arrays, SampleDatasetConfig};
use ndarray::Array2;

fn create_transactions(n_rows: usize, n_features: usize) -> Array2<f64> {
    let config = SampleDatasetConfig::default()
        .with_samples(n_rows)
        .with_features(n_features);
    let (x, _) = sample_arrays(&config).unwrap();
    x
}

fn bench_isolation_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("isolation_forest");
    group.sample_size(10);

    for n_rows in [1000, 5000, 20000].iter() {
        let x = create_transactions(*n_rows, 28);

        group.bench_with_input(BenchmarkId::new("fit", n_rows), &x, |b, x| {
            b.iter(|| {
                let mut forest = IsolationForest::new(IsolationForestParams::default()).unwrap();
                forest.fit(black_box(x)).unwrap();
                forest
            })
        });

        let mut forest = IsolationForest::new(IsolationForestParams::default()).unwrap();
        forest.fit(&x).unwrap();
        group.bench_with_input(BenchmarkId::new("score", n_rows), &x, |b, x| {
            b.iter(|| forest.anomaly_scores(black_box(x)).unwrap())
        });
    }

    group.finish();
}

fn bench_one_class_svm(c: &mut Criterion) {
    let mut group = c.benchmark_group("one_class_svm");
    group.sample_size(10);

    for n_rows in [500, 1000, 2000].iter() {
        let x = create_transactions(*n_rows, 28);

        group.bench_with_input(BenchmarkId::new("fit", n_rows), &x, |b, x| {
            b.iter(|| {
                let mut svm = OneClassSvm::new(OneClassSvmParams::default()).unwrap();
                svm.fit(black_box(x)).unwrap();
                svm
            })
        });
    }

    group.finish();
}

fn bench_scaling(c: &mut Criterion) {
    let x = create_transactions(50000, 28);
    c.bench_function("standard_scaler_fit_transform", |b| {
        b.iter(|| StandardScaler::new().fit_transform(black_box(&x)).unwrap())
    });
}

criterion_group!(benches, bench_isolation_forest, bench_one_class_svm, bench_scaling);
criterion_main!(benches);
