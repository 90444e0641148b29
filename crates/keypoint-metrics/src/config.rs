//! Metric configuration.
//!
//! Each metric has a serde-friendly config struct with documented defaults
//! and a `validate` method; metrics validate their config on construction so
//! a bad setup fails before any sample is processed. [`MetricConfig`] is the
//! tagged union used to describe a whole evaluation pipeline in JSON:
//!
//! ```json
//! {
//!   "metrics": [
//!     { "type": "PCKAccuracy", "thr": 0.2, "norm_item": ["bbox", "head"] },
//!     { "type": "AUC", "norm_factor": 30.0, "num_thrs": 20 },
//!     { "type": "EPE" },
//!     { "type": "NME", "norm_mode": "keypoint_distance" }
//!   ],
//!   "dataset_meta": { "dataset_name": "wflw", "num_keypoints": 98 }
//! }
//! ```
//!
//! # Example
//!
//! ```rust
//! use keypoint_metrics::config::{NormItem, PckConfig};
//!
//! let cfg = PckConfig::default();
//! cfg.validate().expect("default config is valid");
//! assert_eq!(cfg.norm_item, vec![NormItem::Bbox]);
//!
//! assert!(PckConfig::new(0.05, &["bbox", "wrist"]).is_err());
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;
use crate::sample::DatasetMeta;
use crate::skeleton::{KeypointIndexTable, TorsoLayout};

// ---------------------------------------------------------------------------
// NormItem
// ---------------------------------------------------------------------------

/// Normalization source for PCK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum NormItem {
    /// Larger side of the ground-truth bounding box (PCK).
    Bbox,
    /// Ground-truth head size (PCKh).
    Head,
    /// Distance between the two torso keypoints (tPCK).
    Torso,
}

impl NormItem {
    /// All items, in the order their metrics are reported.
    pub const ALL: [NormItem; 3] = [NormItem::Bbox, NormItem::Head, NormItem::Torso];

    /// Config name of the item.
    pub fn as_str(&self) -> &'static str {
        match self {
            NormItem::Bbox => "bbox",
            NormItem::Head => "head",
            NormItem::Torso => "torso",
        }
    }

    /// Name of the per-sample size this item normalizes by.
    pub fn size_field(&self) -> &'static str {
        match self {
            NormItem::Bbox => "bbox_size",
            NormItem::Head => "head_size",
            NormItem::Torso => "torso_size",
        }
    }
}

impl fmt::Display for NormItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormItem {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bbox" => Ok(NormItem::Bbox),
            "head" => Ok(NormItem::Head),
            "torso" => Ok(NormItem::Torso),
            other => Err(ConfigError::UnsupportedNormItem(other.to_string())),
        }
    }
}

impl TryFrom<String> for NormItem {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// NormMode
// ---------------------------------------------------------------------------

/// Where NME takes its per-sample normalization factor from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum NormMode {
    /// A named scalar field on each ground-truth sample.
    UseNormItem,
    /// The distance between two ground-truth keypoints.
    KeypointDistance,
}

impl NormMode {
    /// Config name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            NormMode::UseNormItem => "use_norm_item",
            NormMode::KeypointDistance => "keypoint_distance",
        }
    }
}

impl fmt::Display for NormMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "use_norm_item" => Ok(NormMode::UseNormItem),
            "keypoint_distance" => Ok(NormMode::KeypointDistance),
            other => Err(ConfigError::UnsupportedNormMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for NormMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// PckConfig
// ---------------------------------------------------------------------------

/// Configuration for [`PckAccuracy`](crate::metrics::PckAccuracy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PckConfig {
    /// Normalized distance threshold. Default: **0.05**.
    pub thr: f64,

    /// Normalization sources; a single string is accepted in JSON.
    /// Default: **`["bbox"]`**.
    #[serde(deserialize_with = "one_or_many")]
    pub norm_item: Vec<NormItem>,

    /// Skeleton layout used by the `torso` source. Default: JHMDB.
    pub torso_layout: TorsoLayout,

    /// Label prefix; `None` uses `"pck"`, `Some("")` disables prefixing.
    pub prefix: Option<String>,
}

impl Default for PckConfig {
    fn default() -> Self {
        PckConfig {
            thr: 0.05,
            norm_item: vec![NormItem::Bbox],
            torso_layout: TorsoLayout::default(),
            prefix: None,
        }
    }
}

impl PckConfig {
    /// Build a config from a threshold and normalization source names.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnsupportedNormItem`] for a name outside
    /// `bbox`/`head`/`torso`, plus anything [`validate`](Self::validate)
    /// rejects.
    pub fn new(thr: f64, norm_items: &[&str]) -> Result<Self, ConfigError> {
        let norm_item = norm_items
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<NormItem>, _>>()?;
        let cfg = PckConfig { thr, norm_item, ..PckConfig::default() };
        cfg.validate()?;
        Ok(cfg)
    }

    /// `true` when `item` is one of the configured sources.
    pub fn uses(&self, item: NormItem) -> bool {
        self.norm_item.contains(&item)
    }

    /// Validate all fields.
    ///
    /// - `thr` must be finite and non-negative.
    /// - At least one normalization source, none repeated.
    /// - The torso layout must be structurally sound when `torso` is used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.thr.is_finite() || self.thr < 0.0 {
            return Err(ConfigError::invalid_value("thr", "must be finite and >= 0.0"));
        }
        if self.norm_item.is_empty() {
            return Err(ConfigError::invalid_value(
                "norm_item",
                "at least one normalization item is required",
            ));
        }
        for (i, item) in self.norm_item.iter().enumerate() {
            if self.norm_item[..i].contains(item) {
                return Err(ConfigError::invalid_value(
                    "norm_item",
                    format!("`{item}` is listed more than once"),
                ));
            }
        }
        if self.uses(NormItem::Torso) {
            self.torso_layout.validate()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AucConfig
// ---------------------------------------------------------------------------

/// Configuration for [`Auc`](crate::metrics::Auc).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AucConfig {
    /// Pixel distance that maps to threshold 1.0. Default: **30.0**.
    pub norm_factor: f64,
    /// Number of threshold steps in `[0, 1)`. Default: **20**.
    pub num_thrs: usize,
    /// Label prefix; `None` uses `"auc"`.
    pub prefix: Option<String>,
}

impl Default for AucConfig {
    fn default() -> Self {
        AucConfig { norm_factor: 30.0, num_thrs: 20, prefix: None }
    }
}

impl AucConfig {
    /// Validate all fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.norm_factor.is_finite() || self.norm_factor <= 0.0 {
            return Err(ConfigError::invalid_value("norm_factor", "must be finite and > 0.0"));
        }
        if self.num_thrs == 0 {
            return Err(ConfigError::invalid_value("num_thrs", "must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EpeConfig
// ---------------------------------------------------------------------------

/// Configuration for [`Epe`](crate::metrics::Epe).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpeConfig {
    /// Label prefix; `None` uses `"epe"`.
    pub prefix: Option<String>,
}

// ---------------------------------------------------------------------------
// NmeConfig
// ---------------------------------------------------------------------------

/// Configuration for [`Nme`](crate::metrics::Nme).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NmeConfig {
    /// Normalization mode.
    pub norm_mode: NormMode,

    /// Ground-truth field holding the factor. Required for
    /// [`NormMode::UseNormItem`], ignored otherwise.
    #[serde(default)]
    pub norm_item: Option<String>,

    /// Explicit keypoint pair for [`NormMode::KeypointDistance`]. When
    /// `None` the pair is looked up in `index_table` by dataset name.
    #[serde(default)]
    pub keypoint_indices: Option<Vec<usize>>,

    /// Default pairs per dataset. Default: the built-in face/animal table.
    #[serde(default)]
    pub index_table: KeypointIndexTable,

    /// Label prefix; `None` uses `"nme"`.
    #[serde(default)]
    pub prefix: Option<String>,
}

impl NmeConfig {
    /// Named-field mode reading the factor from `norm_item`.
    pub fn use_norm_item<S: Into<String>>(norm_item: S) -> Self {
        NmeConfig {
            norm_mode: NormMode::UseNormItem,
            norm_item: Some(norm_item.into()),
            keypoint_indices: None,
            index_table: KeypointIndexTable::default(),
            prefix: None,
        }
    }

    /// Keypoint-distance mode; `None` looks the pair up by dataset name.
    pub fn keypoint_distance(keypoint_indices: Option<[usize; 2]>) -> Self {
        NmeConfig {
            norm_mode: NormMode::KeypointDistance,
            norm_item: None,
            keypoint_indices: keypoint_indices.map(|p| p.to_vec()),
            index_table: KeypointIndexTable::default(),
            prefix: None,
        }
    }

    /// Validate the mode-specific requirements.
    ///
    /// - [`NormMode::UseNormItem`] needs a non-empty `norm_item`.
    /// - Explicit `keypoint_indices` must be exactly two distinct indices.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.norm_mode == NormMode::UseNormItem
            && self.norm_item.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::MissingNormItem);
        }
        if let Some(indices) = &self.keypoint_indices {
            if indices.len() != 2 || indices[0] == indices[1] {
                return Err(ConfigError::InvalidKeypointPair(indices.clone()));
            }
        }
        Ok(())
    }

    /// The explicit pair, if configured. Only meaningful after
    /// [`validate`](Self::validate) has succeeded.
    pub fn explicit_pair(&self) -> Option<[usize; 2]> {
        match self.keypoint_indices.as_deref() {
            Some(&[a, b]) => Some([a, b]),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// MetricConfig / EvaluatorConfig
// ---------------------------------------------------------------------------

/// One metric in an evaluation pipeline, tagged by its type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MetricConfig {
    /// [`PckAccuracy`](crate::metrics::PckAccuracy).
    #[serde(rename = "PCKAccuracy")]
    Pck(PckConfig),
    /// [`Auc`](crate::metrics::Auc).
    #[serde(rename = "AUC")]
    Auc(AucConfig),
    /// [`Epe`](crate::metrics::Epe).
    #[serde(rename = "EPE")]
    Epe(EpeConfig),
    /// [`Nme`](crate::metrics::Nme).
    #[serde(rename = "NME")]
    Nme(NmeConfig),
}

impl MetricConfig {
    /// Validate the wrapped config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            MetricConfig::Pck(c) => c.validate(),
            MetricConfig::Auc(c) => c.validate(),
            MetricConfig::Epe(_) => Ok(()),
            MetricConfig::Nme(c) => c.validate(),
        }
    }
}

/// A full evaluation pipeline: the metrics to run and the dataset they run on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Metrics, in reporting order.
    pub metrics: Vec<MetricConfig>,
    /// Dataset description pushed into every metric.
    #[serde(default)]
    pub dataset_meta: Option<DatasetMeta>,
}

impl EvaluatorConfig {
    /// Load an [`EvaluatorConfig`] from a JSON file at `path` and validate it.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FileRead`] if the file cannot be read,
    /// [`ConfigError::ParseError`] if the JSON is malformed (including
    /// unsupported normalization names), and any validation error.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: EvaluatorConfig = serde_json::from_str(&contents).map_err(|source| {
            ConfigError::ParseError { path: path.to_path_buf(), source }
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize to pretty-printed JSON at `path`, creating parent
    /// directories if necessary.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Validate every metric config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.is_empty() {
            return Err(ConfigError::invalid_value("metrics", "at least one metric is required"));
        }
        self.metrics.iter().try_for_each(MetricConfig::validate)
    }
}

// ---------------------------------------------------------------------------
// serde helpers
// ---------------------------------------------------------------------------

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<NormItem>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let names = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
    };
    names
        .iter()
        .map(|name| name.parse().map_err(serde::de::Error::custom))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
