//! Metric accumulators.
//!
//! Every metric follows the same two-phase protocol:
//!
//! 1. [`Metric::process`] is called once per batch and appends one record per
//!    sample to the metric's private results list. No arithmetic happens here
//!    beyond extracting the normalization size the metric needs.
//! 2. [`Metric::evaluate`] runs the metric's pure `compute_metrics` over the
//!    complete list exactly once, prefixes the labels, and clears the list so
//!    the instance can be reused for the next run.
//!
//! Results are returned as a [`MetricMap`], an insertion-ordered label →
//! value map so reports are deterministic.
//!
//! ```rust
//! use keypoint_metrics::metrics::{Epe, Metric};
//! use keypoint_metrics::sample::{DataSample, GroundTruth};
//! use ndarray::array;
//!
//! let gt = GroundTruth::all_visible(array![[0.0_f32, 0.0], [1.0, 1.0]]);
//! let sample = DataSample::new(array![[3.0_f32, 4.0], [1.0, 1.0]], gt);
//!
//! let mut epe = Epe::default();
//! epe.process(&[sample]).unwrap();
//! let metrics = epe.evaluate().unwrap();
//! assert_eq!(metrics.get("epe/epe"), Some(2.5));
//! ```

mod auc;
mod epe;
mod nme;
mod pck;

pub use auc::Auc;
pub use epe::Epe;
pub use nme::{Nme, NmeRecord};
pub use pck::{PckAccuracy, PckRecord};

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::config::MetricConfig;
use crate::error::{ConfigError, MetricError, MetricResult};
use crate::sample::{DataSample, DatasetMeta};

// ---------------------------------------------------------------------------
// MetricMap
// ---------------------------------------------------------------------------

/// Insertion-ordered map from metric label to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricMap {
    entries: Vec<(String, f64)>,
}

impl MetricMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `label`. An existing label keeps its position
    /// and its previous value is returned.
    pub fn insert<S: Into<String>>(&mut self, label: S, value: f64) -> Option<f64> {
        let label = label.into();
        match self.entries.iter_mut().find(|(k, _)| *k == label) {
            Some((_, v)) => Some(std::mem::replace(v, value)),
            None => {
                self.entries.push((label, value));
                None
            }
        }
    }

    /// Value stored under `label`.
    pub fn get(&self, label: &str) -> Option<f64> {
        self.entries.iter().find(|(k, _)| k == label).map(|(_, v)| *v)
    }

    /// `true` if `label` is present.
    pub fn contains(&self, label: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == label)
    }

    /// Labels in insertion order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// `(label, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy with every label rewritten to `<prefix>/<label>`. An empty prefix
    /// leaves labels untouched.
    pub fn with_prefix(self, prefix: &str) -> Self {
        if prefix.is_empty() {
            return self;
        }
        MetricMap {
            entries: self
                .entries
                .into_iter()
                .map(|(k, v)| (format!("{prefix}/{k}"), v))
                .collect(),
        }
    }

    /// Append every entry of `other`, failing on the first label already
    /// present.
    pub fn merge(&mut self, other: MetricMap) -> MetricResult<()> {
        for (label, value) in other.entries {
            if self.contains(&label) {
                return Err(MetricError::DuplicateLabel { label });
            }
            self.entries.push((label, value));
        }
        Ok(())
    }

    /// A human-readable single-line summary suitable for logging.
    pub fn summary(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}={v:.4}"))
            .collect::<Vec<_>>()
            .join("  ")
    }
}

impl IntoIterator for MetricMap {
    type Item = (String, f64);
    type IntoIter = std::vec::IntoIter<(String, f64)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, f64)> for MetricMap {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut map = MetricMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for MetricMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Metric trait
// ---------------------------------------------------------------------------

/// Common interface of the accumulating metrics.
pub trait Metric: Send {
    /// Display name used in logs and errors, e.g. `"PCKAccuracy"`.
    fn name(&self) -> &'static str;

    /// Label prefix applied by [`evaluate`](Self::evaluate).
    fn prefix(&self) -> &str;

    /// Run every check [`process`](Self::process) would run on `batch`
    /// without storing anything. A batch that passes is accepted by
    /// `process`.
    fn check(&self, batch: &[DataSample]) -> MetricResult<()>;

    /// Extract and store one record per sample in `batch`. On error nothing
    /// from the batch is stored.
    fn process(&mut self, batch: &[DataSample]) -> MetricResult<()>;

    /// Number of stored records.
    fn len(&self) -> usize;

    /// `true` when no record is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute the unprefixed metrics over every stored record.
    fn compute(&self) -> MetricResult<MetricMap>;

    /// Discard every stored record.
    fn reset(&mut self);

    /// Provide dataset information. Metrics that do not need it ignore it.
    fn set_dataset_meta(&mut self, _meta: DatasetMeta) {}

    /// Compute the prefixed metrics and clear the stored records.
    ///
    /// # Errors
    ///
    /// [`MetricError::EmptyResults`] if nothing was processed, plus any error
    /// from [`compute`](Self::compute). Records are kept on error.
    fn evaluate(&mut self) -> MetricResult<MetricMap> {
        if self.is_empty() {
            return Err(MetricError::EmptyResults { metric: self.name() });
        }
        let metrics = self.compute()?;
        self.reset();
        Ok(metrics.with_prefix(self.prefix()))
    }
}

/// Build a boxed metric from its config.
pub fn build_metric(config: &MetricConfig) -> Result<Box<dyn Metric>, ConfigError> {
    let metric: Box<dyn Metric> = match config {
        MetricConfig::Pck(c) => Box::new(PckAccuracy::new(c.clone())?),
        MetricConfig::Auc(c) => Box::new(Auc::new(c.clone())?),
        MetricConfig::Epe(c) => Box::new(Epe::new(c.clone())),
        MetricConfig::Nme(c) => Box::new(Nme::new(c.clone())?),
    };
    Ok(metric)
}

/// Render a threshold for a metric label: shortest round-trip decimal with
/// a fractional part always present (`0.05` stays `0.05`, `1` is `1.0`).
/// Magnitudes below `1e-4` or from `1e16` up switch to exponent form with a
/// signed, two-digit exponent (`1e-05`, `2.5e-07`, `1e+16`).
pub(crate) fn format_threshold(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let magnitude = value.abs();
    if value != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let sci = format!("{value:e}");
        return match sci.split_once('e') {
            Some((mantissa, exp)) => match exp.parse::<i32>() {
                Ok(exp) => {
                    let sign = if exp < 0 { '-' } else { '+' };
                    format!("{mantissa}e{sign}{:02}", exp.abs())
                }
                Err(_) => sci,
            },
            None => sci,
        };
    }
    let s = value.to_string();
    if s.contains('.') {
        s
    } else {
        format!("{s}.0")
    }
}

fn resolve_prefix(prefix: Option<String>, default: &str) -> String {
    prefix.unwrap_or_else(|| default.to_string())
}
