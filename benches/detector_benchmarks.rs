use aerosec::ml::{
    AnomalyDetector, Contamination, FittedDetector, Gamma, IsolationForest, OneClassSvm,
    ScalingStrategy,
};
use aerosec::telemetry::adsb::AdsbProfile;
use aerosec::telemetry::avionics::AvionicsProfile;
use aerosec::telemetry::SyntheticGenerator;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// 検知器ベンチマーク
///
/// 生成・学習・推論のコストをサンプル数ごとに測定します。

fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("generation");

    for size in [500usize, 1000, 5000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("adsb", size), size, |b, &size| {
            let mut generator = SyntheticGenerator::new(AdsbProfile::new().unwrap(), Some(42));
            b.iter(|| black_box(generator.generate(size, 0.1).unwrap()));
        });
    }

    group.finish();
}

fn bench_isolation_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("isolation_forest");
    group.sample_size(20);

    for size in [500usize, 1000, 2000].iter() {
        let mut generator = SyntheticGenerator::new(AdsbProfile::new().unwrap(), Some(42));
        let dataset = generator.generate(*size, 0.1).unwrap();
        let x = dataset.feature_matrix();
        let scaled = ScalingStrategy::Standardize
            .fit(x.view())
            .unwrap()
            .transform(x.view())
            .unwrap();

        let detector = IsolationForest::new()
            .with_contamination(Contamination::Fraction(0.1))
            .with_random_state(42);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("fit", size), &scaled, |b, scaled| {
            b.iter(|| black_box(detector.fit(scaled.view()).unwrap()));
        });

        let model = detector.fit(scaled.view()).unwrap();
        group.bench_with_input(BenchmarkId::new("predict", size), &scaled, |b, scaled| {
            b.iter(|| black_box(model.predict(scaled.view()).unwrap()));
        });
    }

    group.finish();
}

fn bench_one_class_svm(c: &mut Criterion) {
    let mut group = c.benchmark_group("one_class_svm");
    group.sample_size(10);

    for size in [250usize, 500, 1000].iter() {
        let mut generator = SyntheticGenerator::new(AvionicsProfile::new().unwrap(), Some(99));
        let dataset = generator.generate(*size, 0.05).unwrap();
        let x = dataset.feature_matrix();
        let scaled = ScalingStrategy::MinMax
            .fit(x.view())
            .unwrap()
            .transform(x.view())
            .unwrap();

        let detector = OneClassSvm::new().with_nu(0.05).with_gamma(Gamma::Value(0.1));

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("fit", size), &scaled, |b, scaled| {
            b.iter(|| black_box(detector.fit(scaled.view()).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_generation,
    bench_isolation_forest,
    bench_one_class_svm
);
criterion_main!(benches);
