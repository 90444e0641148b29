//! Evaluation samples and the records metrics accumulate from them.
//!
//! A [`DataSample`] pairs one predicted pose with its ground truth. Metrics
//! turn each sample into a [`KeypointRecord`] (plus whatever normalization
//! size they need) during `process`, and later stack all records into
//! `[N, K, D]` arrays with [`stack_records`].
//!
//! Samples are single-instance: one person per sample, `K × D` coordinates.

use std::collections::BTreeMap;

use ndarray::{s, Array1, Array2, Array3, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{MetricError, MetricResult};

// ---------------------------------------------------------------------------
// DatasetMeta
// ---------------------------------------------------------------------------

/// Dataset description some metrics need at compute time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMeta {
    /// Dataset identifier, e.g. `"wflw"`.
    pub dataset_name: String,
    /// Number of keypoints in the dataset's skeleton.
    pub num_keypoints: usize,
}

impl DatasetMeta {
    /// Create a new dataset description.
    pub fn new<S: Into<String>>(dataset_name: S, num_keypoints: usize) -> Self {
        DatasetMeta { dataset_name: dataset_name.into(), num_keypoints }
    }
}

// ---------------------------------------------------------------------------
// GroundTruth / DataSample
// ---------------------------------------------------------------------------

/// Ground-truth annotation of one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruth {
    /// `[K, D]` keypoint coordinates.
    pub keypoints: Array2<f32>,
    /// `[K]` visibility; a keypoint is scored iff its value is `> 0`.
    pub keypoints_visible: Array1<f32>,
    /// Bounding box as `[x, y, w, h]`.
    pub bbox: Option<[f32; 4]>,
    /// Head segment length (PCKh normalizer).
    pub head_size: Option<f32>,
    /// Other named scalar fields usable as NME normalizers.
    pub extras: BTreeMap<String, f32>,
}

impl GroundTruth {
    /// Ground truth with only keypoints and visibility.
    pub fn new(keypoints: Array2<f32>, keypoints_visible: Array1<f32>) -> Self {
        GroundTruth {
            keypoints,
            keypoints_visible,
            bbox: None,
            head_size: None,
            extras: BTreeMap::new(),
        }
    }

    /// Ground truth with every keypoint visible.
    pub fn all_visible(keypoints: Array2<f32>) -> Self {
        let k = keypoints.nrows();
        Self::new(keypoints, Array1::ones(k))
    }

    /// Attach a bounding box `[x, y, w, h]`.
    pub fn with_bbox(mut self, bbox: [f32; 4]) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Attach a head size.
    pub fn with_head_size(mut self, head_size: f32) -> Self {
        self.head_size = Some(head_size);
        self
    }

    /// Attach an extra named scalar field.
    pub fn with_field<S: Into<String>>(mut self, name: S, value: f32) -> Self {
        self.extras.insert(name.into(), value);
        self
    }

    /// Number of keypoints `K`.
    pub fn num_keypoints(&self) -> usize {
        self.keypoints.nrows()
    }

    /// Larger side of the bounding box.
    pub fn bbox_size(&self) -> Option<f32> {
        self.bbox.map(|[_, _, w, h]| w.max(h))
    }

    /// Look up a named scalar field.
    ///
    /// `bbox_size` and `head_size` resolve to the dedicated fields; any other
    /// name is looked up in [`extras`](Self::extras).
    pub fn field(&self, name: &str) -> Option<f32> {
        match name {
            "bbox_size" => self.bbox_size(),
            "head_size" => self.head_size,
            other => self.extras.get(other).copied(),
        }
    }
}

/// One evaluation instance: a prediction and its ground truth.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSample {
    /// `[K, D]` predicted keypoint coordinates.
    pub pred_keypoints: Array2<f32>,
    /// Ground truth for the same instance.
    pub gt: GroundTruth,
}

impl DataSample {
    /// Pair a prediction with its ground truth.
    pub fn new(pred_keypoints: Array2<f32>, gt: GroundTruth) -> Self {
        DataSample { pred_keypoints, gt }
    }
}

// ---------------------------------------------------------------------------
// KeypointRecord
// ---------------------------------------------------------------------------

/// The coordinate data every metric keeps for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointRecord {
    /// `[K, D]` predicted coordinates.
    pub pred_coords: Array2<f32>,
    /// `[K, D]` ground-truth coordinates.
    pub gt_coords: Array2<f32>,
    /// `[K]` visibility mask.
    pub mask: Array1<bool>,
}

impl KeypointRecord {
    /// Extract a record from a sample, checking that shapes agree.
    pub fn from_sample(sample: &DataSample) -> MetricResult<Self> {
        Self::check_sample(sample)?;
        let gt = &sample.gt;
        Ok(KeypointRecord {
            pred_coords: sample.pred_keypoints.clone(),
            gt_coords: gt.keypoints.clone(),
            mask: gt.keypoints_visible.mapv(|v| v > 0.0),
        })
    }

    /// The shape checks of [`from_sample`](Self::from_sample), without
    /// copying any coordinates.
    pub fn check_sample(sample: &DataSample) -> MetricResult<()> {
        let gt = &sample.gt;
        if sample.pred_keypoints.dim() != gt.keypoints.dim() {
            return Err(MetricError::shape_mismatch(
                "pred_keypoints",
                gt.keypoints.shape().to_vec(),
                sample.pred_keypoints.shape().to_vec(),
            ));
        }
        if gt.keypoints_visible.len() != gt.num_keypoints() {
            return Err(MetricError::shape_mismatch(
                "keypoints_visible",
                vec![gt.num_keypoints()],
                vec![gt.keypoints_visible.len()],
            ));
        }
        Ok(())
    }

    /// `(K, D)` of this record.
    pub fn dim(&self) -> (usize, usize) {
        self.gt_coords.dim()
    }
}

/// Euclidean distance between rows `a` and `b` of a `[K, D]` array.
pub fn keypoint_distance(coords: &Array2<f32>, a: usize, b: usize) -> f32 {
    row_distance(coords.row(a), coords.row(b))
}

fn row_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

// ---------------------------------------------------------------------------
// Stacking
// ---------------------------------------------------------------------------

/// Records concatenated along a leading sample axis.
#[derive(Debug, Clone)]
pub struct StackedKeypoints {
    /// `[N, K, D]` predicted coordinates.
    pub pred: Array3<f32>,
    /// `[N, K, D]` ground-truth coordinates.
    pub gt: Array3<f32>,
    /// `[N, K]` visibility mask.
    pub mask: Array2<bool>,
}

impl StackedKeypoints {
    /// Number of samples `N`.
    pub fn num_samples(&self) -> usize {
        self.gt.shape()[0]
    }

    /// Number of keypoints `K`.
    pub fn num_keypoints(&self) -> usize {
        self.gt.shape()[1]
    }

    /// Coordinate dimensionality `D`.
    pub fn dims(&self) -> usize {
        self.gt.shape()[2]
    }

    /// Tile one scalar per sample into an `[N, D]` normalization array.
    pub fn tile_scale(&self, per_sample: &[f32]) -> Array2<f32> {
        Array2::from_shape_fn((self.num_samples(), self.dims()), |(i, _)| per_sample[i])
    }
}

/// Concatenate records in order into `[N, K, D]` arrays.
///
/// Every record must share the first record's `(K, D)`.
pub fn stack_records<'a, I>(records: I) -> MetricResult<StackedKeypoints>
where
    I: IntoIterator<Item = &'a KeypointRecord>,
    I::IntoIter: ExactSizeIterator,
{
    let mut records = records.into_iter().peekable();
    let n = records.len();
    let (k, d) = records.peek().map_or((0, 0), |r| r.dim());

    let mut pred = Array3::<f32>::zeros((n, k, d));
    let mut gt = Array3::<f32>::zeros((n, k, d));
    let mut mask = Array2::<bool>::from_elem((n, k), false);

    for (i, record) in records.enumerate() {
        if record.dim() != (k, d) || record.pred_coords.dim() != (k, d) || record.mask.len() != k {
            return Err(MetricError::shape_mismatch(
                "stacked record",
                vec![k, d],
                record.gt_coords.shape().to_vec(),
            ));
        }
        pred.slice_mut(s![i, .., ..]).assign(&record.pred_coords);
        gt.slice_mut(s![i, .., ..]).assign(&record.gt_coords);
        mask.row_mut(i).assign(&record.mask);
    }

    Ok(StackedKeypoints { pred, gt, mask })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn bbox_size_is_larger_side() {
        let gt = GroundTruth::all_visible(Array2::zeros((2, 2))).with_bbox([5.0, 5.0, 8.0, 12.0]);
        assert_eq!(gt.bbox_size(), Some(12.0));
        assert_eq!(gt.field("bbox_size"), Some(12.0));
    }

    #[test]
    fn field_lookup_prefers_dedicated_fields() {
        let gt = GroundTruth::all_visible(Array2::zeros((1, 2)))
            .with_head_size(3.0)
            .with_field("box_size", 40.0);
        assert_eq!(gt.field("head_size"), Some(3.0));
        assert_eq!(gt.field("box_size"), Some(40.0));
        assert_eq!(gt.field("missing"), None);
    }

    #[test]
    fn record_mask_uses_positive_visibility() {
        let gt = GroundTruth::new(Array2::zeros((3, 2)), array![0.0, 1.0, 2.0]);
        let sample = DataSample::new(Array2::zeros((3, 2)), gt);
        let record = KeypointRecord::from_sample(&sample).unwrap();
        assert_eq!(record.mask, array![false, true, true]);
    }

    #[test]
    fn record_rejects_mismatched_prediction() {
        let sample = DataSample::new(Array2::zeros((4, 2)), GroundTruth::all_visible(Array2::zeros((3, 2))));
        assert!(matches!(
            KeypointRecord::from_sample(&sample),
            Err(MetricError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn stack_preserves_order() {
        let a = KeypointRecord {
            pred_coords: array![[1.0, 1.0]],
            gt_coords: array![[0.0, 0.0]],
            mask: array![true],
        };
        let b = KeypointRecord {
            pred_coords: array![[2.0, 2.0]],
            gt_coords: array![[0.0, 0.0]],
            mask: array![false],
        };
        let stacked = stack_records(&[a, b]).unwrap();
        assert_eq!(stacked.pred.shape(), &[2, 1, 2]);
        assert_eq!(stacked.pred[[1, 0, 0]], 2.0);
        assert!(!stacked.mask[[1, 0]]);
    }

    #[test]
    fn stack_rejects_inconsistent_keypoint_counts() {
        let a = KeypointRecord {
            pred_coords: Array2::zeros((2, 2)),
            gt_coords: Array2::zeros((2, 2)),
            mask: Array1::from_elem(2, true),
        };
        let b = KeypointRecord {
            pred_coords: Array2::zeros((3, 2)),
            gt_coords: Array2::zeros((3, 2)),
            mask: Array1::from_elem(3, true),
        };
        assert!(stack_records(&[a, b]).is_err());
    }

    #[test]
    fn keypoint_distance_is_euclidean() {
        let coords = array![[0.0_f32, 0.0], [3.0, 4.0]];
        assert!((keypoint_distance(&coords, 0, 1) - 5.0).abs() < 1e-6);
    }
}
