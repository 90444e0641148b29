//! PCK accuracy accumulator.
//!
//! Percentage of Correct Keypoints, normalized by one or more per-sample
//! sizes:
//!
//! | source  | size                                   | label              |
//! |---------|----------------------------------------|--------------------|
//! | `bbox`  | larger side of the ground-truth bbox   | `@thr-<thr>`       |
//! | `head`  | ground-truth head size                 | `PCKh@thr-<thr>`   |
//! | `torso` | distance between the two torso joints  | `<Part>@thr-<thr>` |
//!
//! Torso mode reports one value per body part of the configured
//! [`TorsoLayout`] followed by `Mean@thr-<thr>`.

use ndarray::Array1;
use tracing::{debug, info, warn};

use super::{format_threshold, resolve_prefix, Metric, MetricMap};
use crate::config::{NormItem, PckConfig};
use crate::error::{ConfigError, MetricError, MetricResult};
use crate::functional::keypoint_pck_accuracy;
use crate::sample::{keypoint_distance, stack_records, DataSample, KeypointRecord};
use crate::skeleton::TorsoLayout;

/// Ground-truth torso sizes below this are considered degenerate.
const MIN_TORSO_SIZE: f32 = 1.0;

/// One processed sample: coordinates plus the sizes of the configured
/// normalization sources.
#[derive(Debug, Clone, PartialEq)]
pub struct PckRecord {
    /// Coordinates and mask.
    pub keypoints: KeypointRecord,
    /// Larger bbox side, when `bbox` is configured.
    pub bbox_size: Option<f32>,
    /// Head size, when `head` is configured.
    pub head_size: Option<f32>,
    /// Torso size, when `torso` is configured.
    pub torso_size: Option<f32>,
}

impl PckRecord {
    fn size(&self, item: NormItem) -> Option<f32> {
        match item {
            NormItem::Bbox => self.bbox_size,
            NormItem::Head => self.head_size,
            NormItem::Torso => self.torso_size,
        }
    }
}

/// PCK accuracy metric.
///
/// ```rust
/// use keypoint_metrics::config::PckConfig;
/// use keypoint_metrics::metrics::{Metric, PckAccuracy};
/// use keypoint_metrics::sample::{DataSample, GroundTruth};
/// use ndarray::array;
///
/// let gt = GroundTruth::all_visible(array![[0.0_f32, 0.0], [1.0, 1.0], [3.0, 2.0]])
///     .with_bbox([0.0, 0.0, 10.0, 10.0]);
/// let sample = DataSample::new(array![[0.0_f32, 0.0], [1.0, 1.0], [2.0, 2.0]], gt);
///
/// let mut pck = PckAccuracy::new(PckConfig::default()).unwrap();
/// pck.process(&[sample]).unwrap();
/// let metrics = pck.evaluate().unwrap();
/// assert!((metrics.get("pck/@thr-0.05").unwrap() - 2.0 / 3.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct PckAccuracy {
    thr: f64,
    norm_items: Vec<NormItem>,
    torso_layout: TorsoLayout,
    prefix: String,
    results: Vec<PckRecord>,
}

impl PckAccuracy {
    /// Prefix used when the config does not set one.
    pub const DEFAULT_PREFIX: &'static str = "pck";

    /// Create the metric, validating its configuration.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from [`PckConfig::validate`].
    pub fn new(config: PckConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(PckAccuracy {
            thr: config.thr,
            norm_items: config.norm_item,
            torso_layout: config.torso_layout,
            prefix: resolve_prefix(config.prefix, Self::DEFAULT_PREFIX),
            results: Vec::new(),
        })
    }

    /// The configured threshold.
    pub fn thr(&self) -> f64 {
        self.thr
    }

    /// The configured normalization sources.
    pub fn norm_items(&self) -> &[NormItem] {
        &self.norm_items
    }

    /// Records accumulated so far.
    pub fn results(&self) -> &[PckRecord] {
        &self.results
    }

    fn uses(&self, item: NormItem) -> bool {
        self.norm_items.contains(&item)
    }

    /// Turn one sample into a record.
    ///
    /// # Errors
    ///
    /// [`MetricError::MissingField`] when `bbox` or `head` is configured but
    /// absent from the ground truth; [`MetricError::KeypointIndexOutOfRange`]
    /// when the torso layout does not fit the skeleton.
    pub fn extract(&self, sample: &DataSample) -> MetricResult<PckRecord> {
        let keypoints = KeypointRecord::from_sample(sample)?;

        let bbox_size = if self.uses(NormItem::Bbox) {
            Some(sample.gt.bbox_size().ok_or_else(|| MetricError::missing_field(self.name(), "bbox"))?)
        } else {
            None
        };

        let head_size = if self.uses(NormItem::Head) {
            Some(sample.gt.head_size.ok_or_else(|| MetricError::missing_field(self.name(), "head_size"))?)
        } else {
            None
        };

        let torso_size = if self.uses(NormItem::Torso) {
            Some(self.torso_size(&keypoints)?)
        } else {
            None
        };

        Ok(PckRecord { keypoints, bbox_size, head_size, torso_size })
    }

    /// Fail exactly when [`extract`](Self::extract) would, without building
    /// the record.
    pub fn check_sample(&self, sample: &DataSample) -> MetricResult<()> {
        KeypointRecord::check_sample(sample)?;
        if self.uses(NormItem::Bbox) && sample.gt.bbox.is_none() {
            return Err(MetricError::missing_field(self.name(), "bbox"));
        }
        if self.uses(NormItem::Head) && sample.gt.head_size.is_none() {
            return Err(MetricError::missing_field(self.name(), "head_size"));
        }
        if self.uses(NormItem::Torso) {
            self.torso_layout.check_fits(sample.gt.num_keypoints())?;
        }
        Ok(())
    }

    /// Ground-truth torso size, falling back to the predicted torso when the
    /// ground truth is degenerate.
    fn torso_size(&self, record: &KeypointRecord) -> MetricResult<f32> {
        self.torso_layout.check_fits(record.dim().0)?;
        let [a, b] = self.torso_layout.torso_pair;
        let gt_size = keypoint_distance(&record.gt_coords, a, b);
        if gt_size >= MIN_TORSO_SIZE {
            return Ok(gt_size);
        }
        let pred_size = keypoint_distance(&record.pred_coords, a, b);
        warn!(
            gt_torso = gt_size,
            pred_torso = pred_size,
            "Ground truth torso size < 1. Using torso size from predicted keypoints instead."
        );
        Ok(pred_size)
    }

    /// Compute the unprefixed metrics over `results`.
    ///
    /// # Errors
    ///
    /// [`MetricError::EmptyResults`] for an empty slice,
    /// [`MetricError::MissingField`] if a record lacks a configured size, and
    /// shape errors from stacking.
    pub fn compute_metrics(&self, results: &[PckRecord]) -> MetricResult<MetricMap> {
        if results.is_empty() {
            return Err(MetricError::EmptyResults { metric: self.name() });
        }
        let stacked = stack_records(results.iter().map(|r| &r.keypoints))?;
        let thr_label = format_threshold(self.thr);
        let mut metrics = MetricMap::new();

        for item in NormItem::ALL.into_iter().filter(|i| self.uses(*i)) {
            let sizes = results
                .iter()
                .map(|r| r.size(item).ok_or_else(|| MetricError::missing_field(self.name(), item.size_field())))
                .collect::<MetricResult<Vec<f32>>>()?;
            let norm = stacked.tile_scale(&sizes);

            info!("Evaluating {} (normalized by \"{}\")...", self.name(), item.size_field());
            let stats = keypoint_pck_accuracy(
                stacked.pred.view(),
                stacked.gt.view(),
                stacked.mask.view(),
                self.thr,
                norm.view(),
            )?;

            match item {
                NormItem::Bbox => {
                    metrics.insert(format!("@thr-{thr_label}"), stats.mean);
                }
                NormItem::Head => {
                    metrics.insert(format!("PCKh@thr-{thr_label}"), stats.mean);
                }
                NormItem::Torso => {
                    self.torso_layout.check_fits(stacked.num_keypoints())?;
                    for part in &self.torso_layout.parts {
                        let acc = part_accuracy(&stats.per_keypoint, &part.keypoints);
                        metrics.insert(format!("{}@thr-{thr_label}", part.name), acc);
                    }
                    metrics.insert(format!("Mean@thr-{thr_label}"), stats.mean);
                }
            }
        }

        Ok(metrics)
    }
}

fn part_accuracy(per_keypoint: &Array1<f64>, keypoints: &[usize]) -> f64 {
    let sum: f64 = keypoints.iter().map(|&k| per_keypoint[k]).sum();
    sum / keypoints.len() as f64
}

impl Metric for PckAccuracy {
    fn name(&self) -> &'static str {
        "PCKAccuracy"
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn check(&self, batch: &[DataSample]) -> MetricResult<()> {
        batch.iter().try_for_each(|s| self.check_sample(s))
    }

    fn process(&mut self, batch: &[DataSample]) -> MetricResult<()> {
        let records = batch.iter().map(|s| self.extract(s)).collect::<MetricResult<Vec<_>>>()?;
        self.results.extend(records);
        debug!(metric = self.name(), batch = batch.len(), total = self.results.len(), "processed batch");
        Ok(())
    }

    fn len(&self) -> usize {
        self.results.len()
    }

    fn compute(&self) -> MetricResult<MetricMap> {
        self.compute_metrics(&self.results)
    }

    fn reset(&mut self) {
        self.results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::GroundTruth;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn scenario_sample() -> DataSample {
        let gt = GroundTruth::all_visible(array![[0.0_f32, 0.0], [1.0, 1.0], [3.0, 2.0]])
            .with_bbox([0.0, 0.0, 10.0, 4.0])
            .with_head_size(10.0);
        DataSample::new(array![[0.0_f32, 0.0], [1.0, 1.0], [2.0, 2.0]], gt)
    }

    #[test]
    fn bbox_and_head_labels() {
        let mut pck = PckAccuracy::new(PckConfig::new(0.05, &["head", "bbox"]).unwrap()).unwrap();
        pck.process(&[scenario_sample()]).unwrap();
        let metrics = pck.compute().unwrap();
        // Reported in bbox, head order regardless of config order.
        assert_eq!(metrics.labels().collect::<Vec<_>>(), vec!["@thr-0.05", "PCKh@thr-0.05"]);
        assert_abs_diff_eq!(metrics.get("@thr-0.05").unwrap(), 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(metrics.get("PCKh@thr-0.05").unwrap(), 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn missing_bbox_fails_process() {
        let mut pck = PckAccuracy::new(PckConfig::default()).unwrap();
        let sample = DataSample::new(Array2::zeros((3, 2)), GroundTruth::all_visible(Array2::zeros((3, 2))));
        let err = pck.process(&[sample]).unwrap_err();
        assert!(matches!(err, MetricError::MissingField { ref field, .. } if field == "bbox"));
        assert!(pck.is_empty());
    }

    #[test]
    fn missing_head_size_fails_process() {
        let mut pck = PckAccuracy::new(PckConfig::new(0.1, &["head"]).unwrap()).unwrap();
        let sample = DataSample::new(Array2::zeros((3, 2)), GroundTruth::all_visible(Array2::zeros((3, 2))));
        assert!(pck.process(&[sample]).is_err());
    }

    #[test]
    fn torso_size_falls_back_to_prediction() {
        let pck = PckAccuracy::new(PckConfig::new(0.2, &["torso"]).unwrap()).unwrap();
        let gt = Array2::<f32>::zeros((15, 2));
        let mut pred = gt.clone();
        pred[[5, 0]] = 6.0;
        pred[[5, 1]] = 8.0;
        let sample = DataSample::new(pred, GroundTruth::all_visible(gt));
        let record = pck.extract(&sample).expect("degenerate torso must not fail");
        assert_abs_diff_eq!(record.torso_size.unwrap(), 10.0, epsilon = 1e-6);
    }

    #[test]
    fn torso_layout_must_fit_skeleton() {
        let pck = PckAccuracy::new(PckConfig::new(0.2, &["torso"]).unwrap()).unwrap();
        let sample = DataSample::new(Array2::zeros((5, 2)), GroundTruth::all_visible(Array2::zeros((5, 2))));
        assert!(matches!(
            pck.extract(&sample),
            Err(MetricError::KeypointIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn check_matches_extract_without_storing() {
        let mut pck = PckAccuracy::new(PckConfig::new(0.1, &["bbox", "head"]).unwrap()).unwrap();
        let no_head = DataSample::new(
            Array2::zeros((3, 2)),
            GroundTruth::all_visible(Array2::zeros((3, 2))).with_bbox([0.0, 0.0, 4.0, 4.0]),
        );
        assert!(matches!(
            pck.check(&[scenario_sample(), no_head.clone()]),
            Err(MetricError::MissingField { ref field, .. }) if field == "head_size"
        ));
        assert!(pck.extract(&no_head).is_err());
        assert!(pck.check(&[scenario_sample()]).is_ok());
        assert!(pck.is_empty());
        pck.process(&[scenario_sample()]).unwrap();
        assert_eq!(pck.len(), 1);
    }

    #[test]
    fn compute_on_empty_results_fails() {
        let pck = PckAccuracy::new(PckConfig::default()).unwrap();
        assert!(matches!(pck.compute_metrics(&[]), Err(MetricError::EmptyResults { .. })));
    }

    #[test]
    fn part_accuracy_averages_pairs() {
        let acc = array![0.0, 1.0, 0.5];
        assert_abs_diff_eq!(part_accuracy(&acc, &[1, 2]), 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(part_accuracy(&acc, &[0]), 0.0, epsilon = 1e-12);
    }
}
