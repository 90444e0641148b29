//! AUC accumulator: area under the PCK-vs-threshold curve.

use tracing::{debug, info};

use super::{resolve_prefix, Metric, MetricMap};
use crate::config::AucConfig;
use crate::error::{ConfigError, MetricError, MetricResult};
use crate::functional::keypoint_auc;
use crate::sample::{stack_records, DataSample, KeypointRecord};

/// AUC metric.
///
/// Sweeps `num_thrs` thresholds over `[0, 1)` with every distance divided by
/// `norm_factor` pixels. Reports `@<num_thrs>thrs`.
#[derive(Debug, Clone)]
pub struct Auc {
    norm_factor: f64,
    num_thrs: usize,
    prefix: String,
    results: Vec<KeypointRecord>,
}

impl Auc {
    /// Prefix used when the config does not set one.
    pub const DEFAULT_PREFIX: &'static str = "auc";

    /// Create the metric, validating its configuration.
    pub fn new(config: AucConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Auc {
            norm_factor: config.norm_factor,
            num_thrs: config.num_thrs,
            prefix: resolve_prefix(config.prefix, Self::DEFAULT_PREFIX),
            results: Vec::new(),
        })
    }

    /// Records accumulated so far.
    pub fn results(&self) -> &[KeypointRecord] {
        &self.results
    }

    /// Compute the unprefixed metrics over `results`.
    pub fn compute_metrics(&self, results: &[KeypointRecord]) -> MetricResult<MetricMap> {
        if results.is_empty() {
            return Err(MetricError::EmptyResults { metric: self.name() });
        }
        let stacked = stack_records(results)?;

        info!("Evaluating {}...", self.name());
        let auc = keypoint_auc(
            stacked.pred.view(),
            stacked.gt.view(),
            stacked.mask.view(),
            self.norm_factor,
            self.num_thrs,
        )?;

        let mut metrics = MetricMap::new();
        metrics.insert(format!("@{}thrs", self.num_thrs), auc);
        Ok(metrics)
    }
}

impl Metric for Auc {
    fn name(&self) -> &'static str {
        "AUC"
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
