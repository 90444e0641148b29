//! Benchmarks for the keypoint metric kernels and accumulators.
//!
//! All inputs are built from fixed sine ramps, so numbers are reproducible
//! between runs.
//!
//! Run with:
//!
//! ```bash
//! cargo bench -p keypoint-metrics
//! ```
//!
//! Criterion HTML reports are written to `target/criterion/`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array2, Array3};
use keypoint_metrics::{
    config::{NmeConfig, PckConfig},
    functional::{keypoint_auc, keypoint_epe, keypoint_nme, keypoint_pck_accuracy},
    metrics::{Metric, Nme, PckAccuracy},
    sample::{DataSample, DatasetMeta, GroundTruth},
};

const NUM_KEYPOINTS: usize = 17;

/// `(pred, gt, mask)` for `n` samples of 17 COCO-style keypoints.
fn stacked_inputs(n: usize) -> (Array3<f32>, Array3<f32>, Array2<bool>) {
    let gt = Array3::from_shape_fn((n, NUM_KEYPOINTS, 2), |(i, k, d)| {
        ((i as f32 * 0.03 + k as f32 * 0.05 + d as f32).sin() * 0.5 + 0.5) * 200.0
    });
    let pred = Array3::from_shape_fn((n, NUM_KEYPOINTS, 2), |(i, k, d)| {
        gt[[i, k, d]] + (i as f32 * 0.7 + k as f32 * 1.3).sin() * 6.0
    });
    let mask = Array2::from_shape_fn((n, NUM_KEYPOINTS), |(i, k)| (i + k) % 7 != 0);
    (pred, gt, mask)
}

// ─────────────────────────────────────────────────────────────────────────────
// Kernel benchmarks
// ─────────────────────────────────────────────────────────────────────────────

/// PCK over growing evaluation sets.
fn bench_pck_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("pck_scaling");

    for n in [100_usize, 1_000, 10_000] {
        let (pred, gt, mask) = stacked_inputs(n);
        let norm = Array2::from_elem((n, 2), 200.0_f32);

        group.bench_with_input(BenchmarkId::new("samples", n), &n, |b, _| {
            b.iter(|| {
                let _ = keypoint_pck_accuracy(
                    black_box(pred.view()),
                    black_box(gt.view()),
                    black_box(mask.view()),
                    black_box(0.05),
                    black_box(norm.view()),
                );
            });
        });
    }

    group.finish();
}

/// AUC with the default 20 steps over 1000 samples.
fn bench_auc_1000_samples(c: &mut Criterion) {
    let (pred, gt, mask) = stacked_inputs(1_000);
    c.bench_function("auc_1000_samples_20thrs", |b| {
        b.iter(|| {
            let _ = keypoint_auc(
                black_box(pred.view()),
                black_box(gt.view()),
                black_box(mask.view()),
                30.0,
                20,
            );
        });
    });
}

/// EPE and NME over 1000 samples.
fn bench_epe_nme_1000_samples(c: &mut Criterion) {
    let (pred, gt, mask) = stacked_inputs(1_000);
    let norm = Array2::from_elem((1_000, 2), 40.0_f32);

    c.bench_function("epe_1000_samples", |b| {
        b.iter(|| {
            let _ = keypoint_epe(black_box(pred.view()), black_box(gt.view()), black_box(mask.view()));
        });
    });
    c.bench_function("nme_1000_samples", |b| {
        b.iter(|| {
            let _ = keypoint_nme(
                black_box(pred.view()),
                black_box(gt.view()),
                black_box(mask.view()),
                black_box(norm.view()),
            );
        });
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Accumulator benchmarks
// ─────────────────────────────────────────────────────────────────────────────

fn samples(n: usize, k: usize) -> Vec<DataSample> {
    (0..n)
        .map(|i| {
            let gt = Array2::from_shape_fn((k, 2), |(j, d)| ((i + j + d) as f32 * 0.11).sin() * 80.0 + 100.0);
            let pred = gt.mapv(|v| v + 1.5);
            DataSample::new(pred, GroundTruth::all_visible(gt).with_bbox([0.0, 0.0, 200.0, 160.0]))
        })
        .collect()
}

/// Full process/evaluate cycle of bbox PCK, batched by 32.
fn bench_pck_accumulator(c: &mut Criterion) {
    let data = samples(1_024, NUM_KEYPOINTS);
    c.bench_function("pck_accumulator_1024_samples", |b| {
        b.iter(|| {
            let mut pck = PckAccuracy::new(PckConfig::default()).expect("default config is valid");
            for batch in data.chunks(32) {
                pck.process(black_box(batch)).expect("well-formed batch");
            }
            let _ = pck.evaluate();
        });
    });
}

/// Full process/evaluate cycle of NME with the WFLW eye-corner pair.
fn bench_nme_accumulator(c: &mut Criterion) {
    let data = samples(1_024, 98);
    c.bench_function("nme_accumulator_1024_wflw", |b| {
        b.iter(|| {
            let mut nme = Nme::new(NmeConfig::keypoint_distance(None))
                .expect("default config is valid")
                .with_dataset_meta(DatasetMeta::new("wflw", 98));
            for batch in data.chunks(32) {
                nme.process(black_box(batch)).expect("well-formed batch");
            }
            let _ = nme.evaluate();
        });
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Criterion registration
// ─────────────────────────────────────────────────────────────────────────────

criterion_group!(
    benches,
    // Kernels
    bench_pck_scaling,
    bench_auc_1000_samples,
    bench_epe_nme_1000_samples,
    // Accumulators
    bench_pck_accumulator,
    bench_nme_accumulator,
);
criterion_main!(benches);
