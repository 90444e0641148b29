//! EPE accumulator: unnormalized mean end-point error.

use tracing::{debug, info};

use super::{resolve_prefix, Metric, MetricMap};
use crate::config::EpeConfig;
use crate::error::{MetricError, MetricResult};
use crate::functional::keypoint_epe;
use crate::sample::{stack_records, DataSample, KeypointRecord};

/// End-point error metric. Reports `epe`.
#[derive(Debug, Clone)]
pub struct Epe {
    prefix: String,
    results: Vec<KeypointRecord>,
}

impl Default for Epe {
    fn default() -> Self {
        Self::new(EpeConfig::default())
    }
}

impl Epe {
    /// Prefix used when the config does not set one.
    pub const DEFAULT_PREFIX: &'static str = "epe";

    /// Create the metric.
    pub fn new(config: EpeConfig) -> Self {
        Epe {
            prefix: resolve_prefix(config.prefix, Self::DEFAULT_PREFIX),
            results: Vec::new(),
        }
    }

    /// Records accumulated so far.
    pub fn results(&self) -> &[KeypointRecord] {
        &self.results
    }

    /// Compute the unprefixed metrics over `results`.
    ///
    /// # Errors
    ///
    /// [`MetricError::NoVisibleKeypoints`] when no keypoint is visible in any
    /// record.
    pub fn compute_metrics(&self, results: &[KeypointRecord]) -> MetricResult<MetricMap> {
        if results.is_empty() {
            return Err(MetricError::EmptyResults { metric: self.name() });
        }
        let stacked = stack_records(results)?;

        info!("Evaluating {}...", self.name());
        let epe = keypoint_epe(stacked.pred.view(), stacked.gt.view(), stacked.mask.view())?;

        let mut metrics = MetricMap::new();
        metrics.insert("epe", epe);
        Ok(metrics)
    }
}

impl Metric for Epe {
    fn name(&self) -> &'static str {
        "EPE"
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn check(&self, batch: &[DataSample]) -> MetricResult<()> {
        batch.iter().try_for_each(KeypointRecord::check_sample)
    }

    fn process(&mut self, batch: &[DataSample]) -> MetricResult<()> {
        let records = batch
            .iter()
            .map(KeypointRecord::from_sample)
            .collect::<MetricResult<Vec<_>>>()?;
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
    use ndarray::{array, Array1};

    #[test]
    fn invisible_keypoints_are_ignored() {
        let gt = GroundTruth::new(array![[0.0_f32, 0.0], [0.0, 0.0]], Array1::from(vec![1.0, 0.0]));
        let sample = DataSample::new(array![[3.0_f32, 4.0], [100.0, 100.0]], gt);
        let mut epe = Epe::default();
        epe.process(&[sample]).unwrap();
        assert_eq!(epe.compute().unwrap().get("epe"), Some(5.0));
    }

    #[test]
    fn custom_prefix() {
        let mut epe = Epe::new(EpeConfig { prefix: Some("hand".into()) });
        let kp = array![[1.0_f32, 1.0]];
        epe.process(&[DataSample::new(kp.clone(), GroundTruth::all_visible(kp))]).unwrap();
        assert_eq!(epe.evaluate().unwrap().labels().collect::<Vec<_>>(), vec!["hand/epe"]);
    }

    #[test]
    fn all_invisible_fails_without_clearing() {
        let gt = GroundTruth::new(array![[0.0_f32, 0.0]], Array1::from(vec![0.0]));
        let mut epe = Epe::default();
        epe.process(&[DataSample::new(array![[1.0_f32, 1.0]], gt)]).unwrap();
        assert!(matches!(epe.evaluate(), Err(MetricError::NoVisibleKeypoints { .. })));
        assert_eq!(epe.len(), 1);
    }
}
