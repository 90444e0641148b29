//! Keypoint accuracy kernels.
//!
//! Pure functions over stacked arrays:
//!
//! - `pred`, `gt`: `[N, K, D]` coordinates (`D` is typically 2).
//! - `mask`: `[N, K]`, `true` where the keypoint is scored.
//! - `norm_factor`: `[N, D]` per-sample, per-dimension scale.
//!
//! Distances are normalized per dimension before taking the Euclidean norm:
//! `||(pred[n,k] - gt[n,k]) / norm_factor[n]||`. A sample whose scale has a
//! non-positive or non-finite entry is treated as infinitely far away, so
//! it never counts as correct and never divides by zero.

use ndarray::{Array1, Array2, ArrayView2, ArrayView3};
use tracing::warn;

use crate::error::{ConfigError, MetricError, MetricResult};

// ---------------------------------------------------------------------------
// PCK
// ---------------------------------------------------------------------------

/// Output of [`keypoint_pck_accuracy`].
#[derive(Debug, Clone, PartialEq)]
pub struct PckStats {
    /// `[K]` accuracy of each keypoint over the samples where it is visible;
    /// 0 for keypoints never visible.
    pub per_keypoint: Array1<f64>,
    /// Correct visible pairs / visible pairs, over all keypoints.
    pub mean: f64,
    /// Number of keypoints visible in at least one sample.
    pub num_valid_keypoints: usize,
    /// `[N]` number of visible keypoints in each sample.
    pub visible_per_sample: Array1<usize>,
}

/// Percentage of Correct Keypoints.
///
/// A visible pair is correct when its normalized distance is `<= thr`.
///
/// # Errors
///
/// [`MetricError::ShapeMismatch`] if the array shapes disagree.
pub fn keypoint_pck_accuracy(
    pred: ArrayView3<'_, f32>,
    gt: ArrayView3<'_, f32>,
    mask: ArrayView2<'_, bool>,
    thr: f64,
    norm_factor: ArrayView2<'_, f32>,
) -> MetricResult<PckStats> {
    let distances = calc_distances(pred, gt, mask, Some(norm_factor))?;
    Ok(pck_from_distances(&distances, thr))
}

// ---------------------------------------------------------------------------
// AUC
// ---------------------------------------------------------------------------

/// Area under the PCK-vs-threshold curve.
///
/// Thresholds are `i / num_thrs` for `i in 0..num_thrs`, every sample is
/// normalized by `norm_factor` pixels, and the result is the mean of the
/// mean PCK at each step: 1.0 when every step is fully correct, 0.0 when
/// none is.
///
/// # Errors
///
/// [`ConfigError::InvalidValue`] for a non-positive `norm_factor` or zero
/// `num_thrs`; [`MetricError::ShapeMismatch`] if shapes disagree.
pub fn keypoint_auc(
    pred: ArrayView3<'_, f32>,
    gt: ArrayView3<'_, f32>,
    mask: ArrayView2<'_, bool>,
    norm_factor: f64,
    num_thrs: usize,
) -> MetricResult<f64> {
    if !norm_factor.is_finite() || norm_factor <= 0.0 {
        return Err(ConfigError::invalid_value("norm_factor", "must be finite and > 0.0").into());
    }
    if num_thrs == 0 {
        return Err(ConfigError::invalid_value("num_thrs", "must be > 0").into());
    }
    let (n, _, d) = pred.dim();
    let norm = Array2::from_elem((n, d), norm_factor as f32);
    let distances = calc_distances(pred, gt, mask, Some(norm.view()))?;

    let area: f64 = (0..num_thrs)
        .map(|i| {
            let thr = i as f64 / num_thrs as f64;
            pck_from_distances(&distances, thr).mean
        })
        .sum();
    Ok(area / num_thrs as f64)
}

// ---------------------------------------------------------------------------
// EPE
// ---------------------------------------------------------------------------

/// End-point error: mean Euclidean distance over all visible pairs.
///
/// # Errors
///
/// [`MetricError::NoVisibleKeypoints`] when nothing is visible;
/// [`MetricError::ShapeMismatch`] if shapes disagree.
pub fn keypoint_epe(
    pred: ArrayView3<'_, f32>,
    gt: ArrayView3<'_, f32>,
    mask: ArrayView2<'_, bool>,
) -> MetricResult<f64> {
    let distances = calc_distances(pred, gt, mask, None)?;
    let (sum, count) = distances
        .iter()
        .flatten()
        .fold((0.0_f64, 0_usize), |(s, c), d| (s + d, c + 1));
    if count == 0 {
        return Err(MetricError::NoVisibleKeypoints { metric: "EPE" });
    }
    Ok(sum / count as f64)
}

// ---------------------------------------------------------------------------
// NME
// ---------------------------------------------------------------------------

/// Normalized mean error.
///
/// For every sample, the mean normalized distance over its visible
/// keypoints; then the mean over samples. Samples with no visible keypoint
/// are skipped, and so are samples with a non-positive normalization factor
/// (with a warning), since their error is undefined.
///
/// # Errors
///
/// [`MetricError::NoVisibleKeypoints`] when no sample contributes;
/// [`MetricError::ShapeMismatch`] if shapes disagree.
pub fn keypoint_nme(
    pred: ArrayView3<'_, f32>,
    gt: ArrayView3<'_, f32>,
    mask: ArrayView2<'_, bool>,
    norm_factor: ArrayView2<'_, f32>,
) -> MetricResult<f64> {
    let distances = calc_distances(pred, gt, mask, Some(norm_factor))?;

    let mut total = 0.0_f64;
    let mut contributing = 0_usize;
    let mut degenerate = 0_usize;
    for (row, scale) in distances.outer_iter().zip(norm_factor.outer_iter()) {
        let (sum, count) = row
            .iter()
            .flatten()
            .fold((0.0_f64, 0_usize), |(s, c), d| (s + d, c + 1));
        if count == 0 {
            continue;
        }
        if !scale.iter().all(|&v| valid_scale(v)) {
            degenerate += 1;
            continue;
        }
        total += sum / count as f64;
        contributing += 1;
    }

    if degenerate > 0 {
        warn!(
            skipped = degenerate,
            "NME skipped samples with a non-positive normalization factor"
        );
    }
    if contributing == 0 {
        return Err(MetricError::NoVisibleKeypoints { metric: "NME" });
    }
    Ok(total / contributing as f64)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn valid_scale(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

/// `[N, K]` normalized distances; `None` where the keypoint is masked out.
///
/// With `norm_factor = None` the raw Euclidean distance is returned.
fn calc_distances(
    pred: ArrayView3<'_, f32>,
    gt: ArrayView3<'_, f32>,
    mask: ArrayView2<'_, bool>,
    norm_factor: Option<ArrayView2<'_, f32>>,
) -> MetricResult<Array2<Option<f64>>> {
    let (n, k, d) = gt.dim();
    if pred.dim() != (n, k, d) {
        return Err(MetricError::shape_mismatch("pred", vec![n, k, d], pred.shape().to_vec()));
    }
    if mask.dim() != (n, k) {
        return Err(MetricError::shape_mismatch("mask", vec![n, k], mask.shape().to_vec()));
    }
    if let Some(norm) = norm_factor {
        if norm.dim() != (n, d) {
            return Err(MetricError::shape_mismatch("norm_factor", vec![n, d], norm.shape().to_vec()));
        }
    }

    Ok(Array2::from_shape_fn((n, k), |(i, j)| {
        if !mask[[i, j]] {
            return None;
        }
        let mut sq = 0.0_f64;
        for c in 0..d {
            let diff = pred[[i, j, c]] as f64 - gt[[i, j, c]] as f64;
            let scaled = match norm_factor {
                Some(norm) => {
                    let s = norm[[i, c]];
                    if !valid_scale(s) {
                        return Some(f64::INFINITY);
                    }
                    diff / s as f64
                }
                None => diff,
            };
            sq += scaled * scaled;
        }
        Some(sq.sqrt())
    }))
}

fn pck_from_distances(distances: &Array2<Option<f64>>, thr: f64) -> PckStats {
    let (n, k) = distances.dim();
    let mut correct = vec![0_usize; k];
    let mut visible = vec![0_usize; k];
    let mut visible_per_sample = Array1::<usize>::zeros(n);

    for ((i, j), dist) in distances.indexed_iter() {
        if let Some(dist) = dist {
            visible[j] += 1;
            visible_per_sample[i] += 1;
            if *dist <= thr {
                correct[j] += 1;
            }
        }
    }

    let per_keypoint = Array1::from_shape_fn(k, |j| {
        if visible[j] > 0 {
            correct[j] as f64 / visible[j] as f64
        } else {
            0.0
        }
    });
    let total_visible: usize = visible.iter().sum();
    let total_correct: usize = correct.iter().sum();
    let mean = if total_visible > 0 {
        total_correct as f64 / total_visible as f64
    } else {
        0.0
    };

    PckStats {
        per_keypoint,
        mean,
        num_valid_keypoints: visible.iter().filter(|&&v| v > 0).count(),
        visible_per_sample,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
