//! Benchmarks for pupil smoothing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use optical_centering::filters::{create_filter, PupilSmoother};
use optical_centering::geometry::{Point, Pupils};

fn noisy_pupils(count: usize) -> Vec<Pupils> {
    (0..count)
        .map(|i| {
            let t = i as f64 * 0.1;
            let jitter = || 2.0 * rand::random::<f64>() - 1.0;
            Pupils::new(
                Point::new(200.0 + 3.0 * t.sin() + jitter(), 240.0 + jitter()),
                Point::new(440.0 + 3.0 * t.sin() + jitter(), 240.0 + jitter()),
            )
        })
        .collect()
}

fn benchmark_point_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_filters");
    let data = noisy_pupils(100);

    for spec in ["none", "exponential:0.3", "exponential:0.5", "exponential:0.8"] {
        let Ok(mut filter) = create_filter(spec) else {
            continue;
        };

        group.bench_with_input(BenchmarkId::new("single_update", spec), &data[0].left, |b, &point| {
            b.iter(|| black_box(filter.apply(black_box(point))));
        });

        group.bench_with_input(BenchmarkId::new("sequence_100", spec), &data, |b, data| {
            b.iter(|| {
                filter.reset();
                for pupils in data {
                    black_box(filter.apply(black_box(pupils.left)));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_pupil_smoother(c: &mut Criterion) {
    let data = noisy_pupils(1000);
    let mut smoother = PupilSmoother::exponential(0.5).expect("alpha in range");

    c.bench_function("pupil_smoother_1000_frames", |b| {
        b.iter(|| {
            smoother.reset();
            for &pupils in &data {
                black_box(smoother.apply(black_box(pupils)));
            }
        });
    });
}

criterion_group!(benches, benchmark_point_filters, benchmark_pupil_smoother);
criterion_main!(benches);
