use acmr::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn simulated(n: usize) -> Vec<f64> {
    let spec = SimulationSpec::new(n, n / 6, 1.0);
    let scenario = Scenario::from_id(2).unwrap();
    generate(&spec, scenario, &mut ChaCha8Rng::seed_from_u64(1))
        .unwrap()
        .observed
}

fn bench_isotonic(c: &mut Criterion) {
    let mut group = c.benchmark_group("isotonic");
    for n in [1_000usize, 10_000, 100_000] {
        let y = simulated(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &y, |b, y| {
            b.iter(|| isotonic_regression(black_box(y), None, Direction::Increasing).unwrap())
        });
    }
    group.finish();
}

fn bench_segmentation(c: &mut Criterion) {
    let mut group = c.benchmark_group("segmentation");
    group.sample_size(10);
    for n in [400usize, 1_600] {
        let y = simulated(n);
        let bic = Segmenter::new(SegmentationConfig::default()).unwrap();
        group.bench_with_input(BenchmarkId::new("bic", n), &y, |b, y| {
            b.iter(|| bic.fit(black_box(y)).unwrap())
        });
        let known = Segmenter::new(
            SegmentationConfig::default().with_stopping(Stopping::KnownSegments(n / 20)),
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::new("known_k", n), &y, |b, y| {
            b.iter(|| known.fit(black_box(y)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_isotonic, bench_segmentation);
criterion_main!(benches);
