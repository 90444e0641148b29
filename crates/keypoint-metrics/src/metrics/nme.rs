//! NME accumulator: normalized mean error.
//!
//! Two normalization modes:
//!
//! - [`NormMode::UseNormItem`]: the factor is a named scalar field on each
//!   ground-truth sample (for example `box_size`). Label `@<norm_item>`.
//! - [`NormMode::KeypointDistance`]: the factor is the distance between two
//!   ground-truth keypoints, usually the outer eye corners. The pair is
//!   either configured explicitly or looked up by dataset name in a
//!   [`KeypointIndexTable`]. Label `@[i, j]`.

use tracing::{debug, info};

use super::{resolve_prefix, Metric, MetricMap};
use crate::config::{NmeConfig, NormMode};
use crate::error::{ConfigError, MetricError, MetricResult};
use crate::functional::keypoint_nme;
use crate::sample::{keypoint_distance, stack_records, DataSample, DatasetMeta, KeypointRecord};
use crate::skeleton::KeypointIndexTable;

/// One processed sample.
#[derive(Debug, Clone, PartialEq)]
pub struct NmeRecord {
    /// Coordinates and mask.
    pub keypoints: KeypointRecord,
    /// Value of the configured `norm_item`, in named-field mode.
    pub norm_factor: Option<f32>,
}

/// Normalized mean error metric.
#[derive(Debug, Clone)]
pub struct Nme {
    norm_mode: NormMode,
    norm_item: Option<String>,
    keypoint_indices: Option<[usize; 2]>,
    index_table: KeypointIndexTable,
    dataset_meta: Option<DatasetMeta>,
    prefix: String,
    results: Vec<NmeRecord>,
}

impl Nme {
    /// Prefix used when the config does not set one.
    pub const DEFAULT_PREFIX: &'static str = "nme";

    /// Create the metric, validating its configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingNormItem`] for named-field mode without an item,
    /// [`ConfigError::InvalidKeypointPair`] for explicit indices that are not
    /// a pair.
    pub fn new(config: NmeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let keypoint_indices = config.explicit_pair();
        Ok(Nme {
            norm_mode: config.norm_mode,
            norm_item: config.norm_item,
            keypoint_indices,
            index_table: config.index_table,
            dataset_meta: None,
            prefix: resolve_prefix(config.prefix, Self::DEFAULT_PREFIX),
            results: Vec::new(),
        })
    }

    /// Builder-style [`Metric::set_dataset_meta`].
    pub fn with_dataset_meta(mut self, meta: DatasetMeta) -> Self {
        self.dataset_meta = Some(meta);
        self
    }

    /// The configured normalization mode.
    pub fn norm_mode(&self) -> NormMode {
        self.norm_mode
    }

    /// Records accumulated so far.
    pub fn results(&self) -> &[NmeRecord] {
        &self.results
    }

    /// Name of the ground-truth field read in named-field mode.
    fn named_item(&self) -> Option<&str> {
        match self.norm_mode {
            NormMode::UseNormItem => self.norm_item.as_deref(),
            NormMode::KeypointDistance => None,
        }
    }

    /// Turn one sample into a record.
    ///
    /// # Errors
    ///
    /// [`MetricError::MissingField`] when the configured `norm_item` is
    /// absent from the ground truth.
    pub fn extract(&self, sample: &DataSample) -> MetricResult<NmeRecord> {
        let keypoints = KeypointRecord::from_sample(sample)?;
        let norm_factor = match self.named_item() {
            Some(item) => Some(
                sample
                    .gt
                    .field(item)
                    .ok_or_else(|| MetricError::missing_field(self.name(), item))?,
            ),
            None => None,
        };
        Ok(NmeRecord { keypoints, norm_factor })
    }

    /// Fail exactly when [`extract`](Self::extract) would, without building
    /// the record.
    pub fn check_sample(&self, sample: &DataSample) -> MetricResult<()> {
        KeypointRecord::check_sample(sample)?;
        match self.named_item() {
            Some(item) if sample.gt.field(item).is_none() => Err(MetricError::missing_field(self.name(), item)),
            _ => Ok(()),
        }
    }

    /// Resolve the keypoint pair for keypoint-distance mode and check it
    /// against the dataset meta (when known) and the actual keypoint count.
    pub fn resolve_keypoint_indices(&self, num_keypoints: usize) -> MetricResult<[usize; 2]> {
        let pair = match (self.keypoint_indices, &self.dataset_meta) {
            (Some(pair), Some(meta)) => {
                for idx in pair {
                    if idx >= meta.num_keypoints {
                        return Err(MetricError::index_out_of_range(
                            idx,
                            meta.num_keypoints,
                            format!("the {} dataset does not contain the required keypoint", meta.dataset_name),
                        ));
                    }
                }
                pair
            }
            (Some(pair), None) => pair,
            (None, Some(meta)) => self
                .index_table
                .get(&meta.dataset_name)
                .ok_or_else(|| MetricError::UnknownDataset { dataset: meta.dataset_name.clone() })?,
            (None, None) => return Err(MetricError::MissingDatasetMeta { metric: self.name() }),
        };
        for idx in pair {
            if idx >= num_keypoints {
                return Err(MetricError::index_out_of_range(idx, num_keypoints, "NME normalization keypoints"));
            }
        }
        Ok(pair)
    }

    /// Compute the unprefixed metrics over `results`.
    pub fn compute_metrics(&self, results: &[NmeRecord]) -> MetricResult<MetricMap> {
        if results.is_empty() {
            return Err(MetricError::EmptyResults { metric: self.name() });
        }
        let stacked = stack_records(results.iter().map(|r| &r.keypoints))?;

        info!("Evaluating {}...", self.name());
        let mut metrics = MetricMap::new();

        match self.norm_mode {
            NormMode::UseNormItem => {
                let item = self.norm_item.as_deref().unwrap_or_default();
                let factors = results
                    .iter()
                    .map(|r| r.norm_factor.ok_or_else(|| MetricError::missing_field(self.name(), item)))
                    .collect::<MetricResult<Vec<f32>>>()?;
                let norm = stacked.tile_scale(&factors);
                let nme = keypoint_nme(stacked.pred.view(), stacked.gt.view(), stacked.mask.view(), norm.view())?;
                metrics.insert(format!("@{item}"), nme);
            }
            NormMode::KeypointDistance => {
                let [a, b] = self.resolve_keypoint_indices(stacked.num_keypoints())?;
                let factors: Vec<f32> = results
                    .iter()
                    .map(|r| keypoint_distance(&r.keypoints.gt_coords, a, b))
                    .collect();
                let norm = stacked.tile_scale(&factors);
                let nme = keypoint_nme(stacked.pred.view(), stacked.gt.view(), stacked.mask.view(), norm.view())?;
                metrics.insert(format!("@[{a}, {b}]"), nme);
            }
        }

        Ok(metrics)
    }
}

impl Metric for Nme {
    fn name(&self) -> &'static str {
        "NME"
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

    fn set_dataset_meta(&mut self, meta: DatasetMeta) {
        self.dataset_meta = Some(meta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::GroundTruth;
    use ndarray::Array2;

    fn face_sample(k: usize) -> DataSample {
        let gt = Array2::from_shape_fn((k, 2), |(j, c)| if c == 0 { j as f32 } else { 0.0 });
        DataSample::new(gt.clone(), GroundTruth::all_visible(gt).with_field("box_size", 10.0))
    }

    #[test]
    fn default_indices_come_from_dataset_name() {
        let nme = Nme::new(NmeConfig::keypoint_distance(None))
            .unwrap()
            .with_dataset_meta(DatasetMeta::new("cofw", 29));
        assert_eq!(nme.resolve_keypoint_indices(29).unwrap(), [8, 9]);
    }

    #[test]
    fn unknown_dataset_without_indices_fails() {
        let nme = Nme::new(NmeConfig::keypoint_distance(None))
            .unwrap()
            .with_dataset_meta(DatasetMeta::new("mystery", 10));
        assert!(matches!(
            nme.resolve_keypoint_indices(10),
            Err(MetricError::UnknownDataset { .. })
        ));
    }

    #[test]
    fn missing_meta_without_indices_fails() {
        let nme = Nme::new(NmeConfig::keypoint_distance(None)).unwrap();
        assert!(matches!(
            nme.resolve_keypoint_indices(10),
            Err(MetricError::MissingDatasetMeta { .. })
        ));
    }

    #[test]
    fn explicit_indices_checked_against_meta() {
        let nme = Nme::new(NmeConfig::keypoint_distance(Some([0, 12])))
            .unwrap()
            .with_dataset_meta(DatasetMeta::new("tiny", 10));
        assert!(matches!(
            nme.resolve_keypoint_indices(20),
            Err(MetricError::KeypointIndexOutOfRange { index: 12, num_keypoints: 10, .. })
        ));
    }

    #[test]
    fn explicit_indices_checked_against_coordinates() {
        let nme = Nme::new(NmeConfig::keypoint_distance(Some([0, 7]))).unwrap();
        assert!(nme.resolve_keypoint_indices(5).is_err());
        assert_eq!(nme.resolve_keypoint_indices(8).unwrap(), [0, 7]);
    }

    #[test]
    fn named_field_missing_fails_process() {
        let mut nme = Nme::new(NmeConfig::use_norm_item("interocular")).unwrap();
        let err = nme.process(&[face_sample(4)]).unwrap_err();
        assert!(matches!(err, MetricError::MissingField { ref field, .. } if field == "interocular"));
    }

    #[test]
    fn check_rejects_missing_field_without_storing() {
        let nme = Nme::new(NmeConfig::use_norm_item("interocular")).unwrap();
        assert!(matches!(nme.check(&[face_sample(4)]), Err(MetricError::MissingField { .. })));
        let by_box = Nme::new(NmeConfig::use_norm_item("box_size")).unwrap();
        assert!(by_box.check(&[face_sample(4)]).is_ok());
        assert!(by_box.is_empty());
    }

    #[test]
    fn perfect_prediction_labels() {
        let mut by_item = Nme::new(NmeConfig::use_norm_item("box_size")).unwrap();
        by_item.process(&[face_sample(4)]).unwrap();
        assert_eq!(by_item.compute().unwrap().get("@box_size"), Some(0.0));

        let mut by_distance = Nme::new(NmeConfig::keypoint_distance(Some([0, 3]))).unwrap();
        by_distance.process(&[face_sample(4)]).unwrap();
        assert_eq!(by_distance.compute().unwrap().get("@[0, 3]"), Some(0.0));
    }
}
