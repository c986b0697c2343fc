//! # Trajectory Sampling Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use auto_lib::{
    flip::AllianceFlipper,
    sample::SwerveSample,
    trajectory::{EventMarker, Trajectory},
};

fn sample_benchmark(c: &mut Criterion) {
    // ---- Build a dummy trajectory ----

    // A 15 s arc sampled every 10 ms
    let samples: Vec<SwerveSample> = (0..1500)
        .map(|i| {
            let t = i as f64 * 0.01;
            SwerveSample {
                timestamp_s: t,
                x_m: 2.0 + 3.0 * (0.2 * t).sin(),
                y_m: 4.0 - 3.0 * (0.2 * t).cos(),
                heading_rad: 0.2 * t,
                vx_ms: 0.6 * (0.2 * t).cos(),
                vy_ms: 0.6 * (0.2 * t).sin(),
                omega_rads: 0.2,
                ..Default::default()
            }
        })
        .collect();

    let trajectory = Trajectory::new(
        "arc",
        samples,
        vec![500, 1000],
        vec![EventMarker::new(7.5, "halfway")],
    );
    let flipper = AllianceFlipper::default();

    // Bench sampling, unflipped and flipped
    c.bench_function("Trajectory::sample_at", |b| {
        b.iter(|| trajectory.sample_at(black_box(7.345), None))
    });

    c.bench_function("Trajectory::sample_at::flipped", |b| {
        b.iter(|| trajectory.sample_at(black_box(7.345), Some(&flipper)))
    });

    c.bench_function("Trajectory::get_split", |b| {
        b.iter(|| trajectory.get_split(black_box(1)))
    });

    c.bench_function("Trajectory::flipped", |b| b.iter(|| trajectory.flipped(&flipper)));
}

criterion_group!(benches, sample_benchmark);
criterion_main!(benches);
