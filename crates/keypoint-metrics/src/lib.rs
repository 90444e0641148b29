//! # Keypoint Metrics
//!
//! Accuracy statistics for 2D pose estimation: PCK, AUC, end-point error and
//! normalized mean error, computed by comparing predicted keypoints with
//! ground truth across a whole evaluation set.
//!
//! ## Architecture
//!
//! ```text
//! EvaluatorConfig ──► Evaluator ──► Metric (PckAccuracy | Auc | Epe | Nme)
//!                                      │
//!                          process ────┤ per batch: DataSample → record
//!                                      │
//!                          evaluate ───┴─► stack_records ─► functional kernels
//!                                                              │
//!                                                          MetricMap
//! ```
//!
//! Kernels in [`functional`] are pure functions over `[N, K, D]` arrays; each
//! metric in [`metrics`] only extracts per-sample records and calls its
//! kernel once at the end.
//!
//! ## Quick Start
//!
//! ```rust
//! use keypoint_metrics::config::PckConfig;
//! use keypoint_metrics::metrics::{Metric, PckAccuracy};
//! use keypoint_metrics::sample::{DataSample, GroundTruth};
//! use ndarray::array;
//!
//! let mut pck = PckAccuracy::new(PckConfig::new(0.2, &["bbox"]).unwrap()).unwrap();
//!
//! let gt = GroundTruth::all_visible(array![[10.0_f32, 10.0], [20.0, 20.0]])
//!     .with_bbox([0.0, 0.0, 40.0, 40.0]);
//! let pred = array![[11.0_f32, 10.0], [40.0, 20.0]];
//! pck.process(&[DataSample::new(pred, gt)]).unwrap();
//!
//! let metrics = pck.evaluate().unwrap();
//! assert_eq!(metrics.get("pck/@thr-0.2"), Some(0.5));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod evaluator;
pub mod functional;
pub mod metrics;
pub mod sample;
pub mod skeleton;

// Convenient re-exports at the crate root.
pub use config::{AucConfig, EpeConfig, EvaluatorConfig, MetricConfig, NmeConfig, NormItem, NormMode, PckConfig};
pub use error::{ConfigError, MetricError, MetricResult};
pub use evaluator::Evaluator;
pub use functional::{keypoint_auc, keypoint_epe, keypoint_nme, keypoint_pck_accuracy, PckStats};
pub use metrics::{Auc, Epe, Metric, MetricMap, Nme, PckAccuracy};
pub use sample::{DataSample, DatasetMeta, GroundTruth, KeypointRecord};
pub use skeleton::{BodyPartGroup, KeypointIndexTable, TorsoLayout};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
