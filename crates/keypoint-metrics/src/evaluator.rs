//! Multi-metric evaluator.
//!
//! Fans every batch out to a list of metrics and merges their prefixed
//! results into one ordered [`MetricMap`]. Label clashes between metrics are
//! an error rather than a silent overwrite.
//!
//! ```rust
//! use keypoint_metrics::config::{EpeConfig, EvaluatorConfig, MetricConfig, PckConfig};
//! use keypoint_metrics::evaluator::Evaluator;
//! use keypoint_metrics::sample::{DataSample, GroundTruth};
//! use ndarray::array;
//!
//! let config = EvaluatorConfig {
//!     metrics: vec![
//!         MetricConfig::Pck(PckConfig::default()),
//!         MetricConfig::Epe(EpeConfig::default()),
//!     ],
//!     dataset_meta: None,
//! };
//! let mut evaluator = Evaluator::from_config(&config).unwrap();
//!
//! let kp = array![[1.0_f32, 2.0], [3.0, 4.0]];
//! let gt = GroundTruth::all_visible(kp.clone()).with_bbox([0.0, 0.0, 50.0, 80.0]);
//! evaluator.process(&[DataSample::new(kp, gt)]).unwrap();
//!
//! let metrics = evaluator.evaluate().unwrap();
//! assert_eq!(metrics.get("pck/@thr-0.05"), Some(1.0));
//! assert_eq!(metrics.get("epe/epe"), Some(0.0));
//! ```

use tracing::info;

use crate::config::EvaluatorConfig;
use crate::error::{MetricError, MetricResult};
use crate::metrics::{build_metric, Metric, MetricMap};
use crate::sample::{DataSample, DatasetMeta};

/// A group of metrics evaluated together over the same samples.
#[derive(Default)]
pub struct Evaluator {
    metrics: Vec<Box<dyn Metric>>,
    dataset_meta: Option<DatasetMeta>,
}

impl Evaluator {
    /// Wrap an existing list of metrics.
    pub fn new(metrics: Vec<Box<dyn Metric>>) -> Self {
        Evaluator { metrics, dataset_meta: None }
    }

    /// Build every metric in `config` and push its dataset meta into them.
    pub fn from_config(config: &EvaluatorConfig) -> MetricResult<Self> {
        config.validate()?;
        let metrics = config
            .metrics
            .iter()
            .map(build_metric)
            .collect::<Result<Vec<_>, _>>()?;
        let mut evaluator = Evaluator::new(metrics);
        if let Some(meta) = &config.dataset_meta {
            evaluator.set_dataset_meta(meta.clone());
        }
        Ok(evaluator)
    }

    /// Add one more metric. It receives the current dataset meta, if any.
    pub fn push(&mut self, mut metric: Box<dyn Metric>) {
        if let Some(meta) = &self.dataset_meta {
            metric.set_dataset_meta(meta.clone());
        }
        self.metrics.push(metric);
    }

    /// Set the dataset meta on every metric.
    pub fn set_dataset_meta(&mut self, meta: DatasetMeta) {
        for metric in &mut self.metrics {
            metric.set_dataset_meta(meta.clone());
        }
        self.dataset_meta = Some(meta);
    }

    /// The current dataset meta.
    pub fn dataset_meta(&self) -> Option<&DatasetMeta> {
        self.dataset_meta.as_ref()
    }

    /// The registered metrics, in registration order.
    pub fn metrics(&self) -> &[Box<dyn Metric>] {
        &self.metrics
    }

    /// Number of metrics.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// `true` when no metric is registered.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Feed one batch to every metric.
    ///
    /// Every metric checks the batch before any of them stores it, so a
    /// batch rejected by one metric leaves all of them unchanged.
    pub fn process(&mut self, batch: &[DataSample]) -> MetricResult<()> {
        self.metrics.iter().try_for_each(|m| m.check(batch))?;
        self.metrics.iter_mut().try_for_each(|m| m.process(batch))
    }

    /// Evaluate every metric once and merge their outputs in registration
    /// order.
    ///
    /// Records are cleared only after every metric has computed and the
    /// merged labels are unique; on error every metric keeps its records.
    pub fn evaluate(&mut self) -> MetricResult<MetricMap> {
        let mut merged = MetricMap::new();
        for metric in &self.metrics {
            if metric.is_empty() {
                return Err(MetricError::EmptyResults { metric: metric.name() });
            }
            merged.merge(metric.compute()?.with_prefix(metric.prefix()))?;
        }
        self.reset();
        info!("{}", merged.summary());
        Ok(merged)
    }

    /// Clear every metric's stored records.
    pub fn reset(&mut self) {
        self.metrics.iter_mut().for_each(|m| m.reset());
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("metrics", &self.metrics.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("dataset_meta", &self.dataset_meta)
            .finish()
    }
}
