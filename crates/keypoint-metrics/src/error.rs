//! Error types for keypoint metric evaluation.
//!
//! This module is the single source of truth for all error types in the
//! crate. Kernels, metric accumulators and the evaluator all import their
//! error type from here rather than defining it inline.
//!
//! ## Hierarchy
//!
//! ```text
//! MetricError (top-level)
//! └── ConfigError   (construction-time validation / config file loading)
//! ```

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// MetricResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used by kernels and metric accumulators.
pub type MetricResult<T> = Result<T, MetricError>;

// ---------------------------------------------------------------------------
// MetricError
// ---------------------------------------------------------------------------

/// Top-level error type for keypoint metric evaluation.
///
/// Any error aborts the evaluation run; nothing in this crate retries.
#[derive(Debug, Error)]
pub enum MetricError {
    /// A configuration validation or loading error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A ground-truth sample lacks a field required by the configured
    /// normalization source.
    #[error("Ground truth is missing the normalization field `{field}` required by {metric}")]
    MissingField {
        /// Name of the metric that requested the field.
        metric: &'static str,
        /// Name of the missing field.
        field: String,
    },

    /// A shape mismatch was detected between two arrays.
    #[error("Shape mismatch in `{context}`: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Which array was being checked.
        context: &'static str,
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// No keypoint was visible anywhere, so a mean error is undefined.
    #[error("No visible keypoints: {metric} is undefined over an empty set")]
    NoVisibleKeypoints {
        /// Name of the kernel that found nothing to average.
        metric: &'static str,
    },

    /// `evaluate` was called before any sample was processed.
    #[error("{metric} was evaluated with an empty results list")]
    EmptyResults {
        /// Name of the metric.
        metric: &'static str,
    },

    /// Default keypoint indices were requested for a dataset with no entry
    /// in the index table.
    #[error(
        "No default keypoint indices for dataset `{dataset}`; \
         specify `keypoint_indices` explicitly"
    )]
    UnknownDataset {
        /// Dataset name that was looked up.
        dataset: String,
    },

    /// A keypoint index refers past the end of the skeleton.
    #[error("Keypoint index {index} is out of range for {num_keypoints} keypoints ({context})")]
    KeypointIndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of keypoints available.
        num_keypoints: usize,
        /// Where the index came from.
        context: String,
    },

    /// Dataset meta information is required but was never set.
    #[error("{metric} requires dataset meta information (call `set_dataset_meta`)")]
    MissingDatasetMeta {
        /// Name of the metric.
        metric: &'static str,
    },

    /// Two metrics in one evaluator produced the same output label.
    #[error("Metric label `{label}` was produced by more than one metric; set distinct prefixes")]
    DuplicateLabel {
        /// The clashing, already-prefixed label.
        label: String,
    },
}

impl MetricError {
    /// Construct a [`MetricError::MissingField`].
    pub fn missing_field<S: Into<String>>(metric: &'static str, field: S) -> Self {
        MetricError::MissingField { metric, field: field.into() }
    }

    /// Construct a [`MetricError::ShapeMismatch`].
    pub fn shape_mismatch(context: &'static str, expected: Vec<usize>, actual: Vec<usize>) -> Self {
        MetricError::ShapeMismatch { context, expected, actual }
    }

    /// Construct a [`MetricError::KeypointIndexOutOfRange`].
    pub fn index_out_of_range<S: Into<String>>(index: usize, num_keypoints: usize, context: S) -> Self {
        MetricError::KeypointIndexOutOfRange { index, num_keypoints, context: context.into() }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when loading or validating metric configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A PCK normalization source outside `bbox`, `head`, `torso`.
    #[error(
        "The normalized item `{0}` is not supported by PCKAccuracy. \
         Should be one of 'bbox', 'head', 'torso'"
    )]
    UnsupportedNormItem(String),

    /// An NME normalization mode outside `use_norm_item`, `keypoint_distance`.
    #[error("`norm_mode` should be 'use_norm_item' or 'keypoint_distance', but got `{0}`")]
    UnsupportedNormMode(String),

    /// `use_norm_item` mode was selected without naming the item.
    #[error(
        "`norm_mode` is set to \"use_norm_item\"; specify the `norm_item` \
         in the ground truth used as the normalization factor"
    )]
    MissingNormItem,

    /// Explicit keypoint indices were not a pair.
    #[error("The keypoint indices used for normalization should be a pair, got {0:?}")]
    InvalidKeypointPair(Vec<usize>),

    /// A configuration file could not be read from or written to disk.
    #[error("Cannot access config file `{path}`: {source}")]
    FileRead {
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    ParseError {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }
}
