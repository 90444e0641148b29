//! Integration tests for [`keypoint_metrics::config`].
//!
//! Covers defaults, validation failures, the tagged JSON format, and the
//! file round trip through a temporary directory.

use keypoint_metrics::config::{
    AucConfig, EpeConfig, EvaluatorConfig, MetricConfig, NmeConfig, NormItem, NormMode, PckConfig,
};
use keypoint_metrics::sample::DatasetMeta;
use keypoint_metrics::ConfigError;
use tempfile::tempdir;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[test]
fn defaults_match_documented_values() {
    let pck = PckConfig::default();
    assert!((pck.thr - 0.05).abs() < 1e-12);
    assert_eq!(pck.norm_item, vec![NormItem::Bbox]);
    assert!(pck.prefix.is_none());

    let auc = AucConfig::default();
    assert!((auc.norm_factor - 30.0).abs() < 1e-12);
    assert_eq!(auc.num_thrs, 20);

    assert!(EpeConfig::default().prefix.is_none());
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn pck_rejects_unknown_norm_item() {
    let err = PckConfig::new(0.05, &["bbox", "elbow"]).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedNormItem(ref s) if s == "elbow"));
}

#[test]
fn pck_rejects_negative_threshold_and_duplicates() {
    assert!(PckConfig::new(-0.1, &["bbox"]).is_err());
    assert!(PckConfig::new(f64::NAN, &["bbox"]).is_err());
    assert!(PckConfig::new(0.1, &["head", "head"]).is_err());
    assert!(PckConfig::new(0.1, &[]).is_err());
}

#[test]
fn nme_mode_requirements() {
    let mut cfg = NmeConfig::use_norm_item("");
    assert!(matches!(cfg.validate(), Err(ConfigError::MissingNormItem)));
    cfg.norm_item = None;
    assert!(matches!(cfg.validate(), Err(ConfigError::MissingNormItem)));

    let mut cfg = NmeConfig::keypoint_distance(None);
    cfg.keypoint_indices = Some(vec![1, 2, 3]);
    assert!(matches!(cfg.validate(), Err(ConfigError::InvalidKeypointPair(_))));
    cfg.keypoint_indices = Some(vec![4, 4]);
    assert!(cfg.validate().is_err());
}

#[test]
fn norm_mode_parses_known_names_only() {
    assert_eq!("use_norm_item".parse::<NormMode>().unwrap(), NormMode::UseNormItem);
    assert_eq!("keypoint_distance".parse::<NormMode>().unwrap(), NormMode::KeypointDistance);
    assert!(matches!(
        "interocular".parse::<NormMode>(),
        Err(ConfigError::UnsupportedNormMode(_))
    ));
}

#[test]
fn evaluator_config_needs_a_metric() {
    assert!(EvaluatorConfig::default().validate().is_err());
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

#[test]
fn tagged_json_parses_every_metric() {
    let json = r#"{
        "metrics": [
            {"type": "PCKAccuracy", "thr": 0.2, "norm_item": ["bbox", "torso"]},
            {"type": "AUC", "norm_factor": 25.0},
            {"type": "EPE"},
            {"type": "NME", "norm_mode": "keypoint_distance"}
        ],
        "dataset_meta": {"dataset_name": "wflw", "num_keypoints": 98}
    }"#;
    let cfg: EvaluatorConfig = serde_json::from_str(json).unwrap();
    cfg.validate().unwrap();

    assert_eq!(cfg.metrics.len(), 4);
    match &cfg.metrics[0] {
        MetricConfig::Pck(pck) => assert_eq!(pck.norm_item, vec![NormItem::Bbox, NormItem::Torso]),
        other => panic!("expected PCKAccuracy, got {other:?}"),
    }
    match &cfg.metrics[1] {
        MetricConfig::Auc(auc) => assert_eq!(auc.num_thrs, 20),
        other => panic!("expected AUC, got {other:?}"),
    }
    assert_eq!(cfg.dataset_meta, Some(DatasetMeta::new("wflw", 98)));
}

#[test]
fn unsupported_norm_mode_fails_to_parse() {
    let json = r#"{"metrics": [{"type": "NME", "norm_mode": "interocular"}]}"#;
    let err = serde_json::from_str::<EvaluatorConfig>(json).unwrap_err();
    assert!(err.to_string().contains("interocular"));
}

#[test]
fn json_file_round_trip() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("eval.json");

    let original = EvaluatorConfig {
        metrics: vec![
            MetricConfig::Pck(PckConfig::new(0.1, &["head"]).unwrap()),
            MetricConfig::Nme(NmeConfig::keypoint_distance(Some([36, 45]))),
        ],
        dataset_meta: Some(DatasetMeta::new("300w", 68)),
    };
    original.to_json(&path).expect("write config");
    let loaded = EvaluatorConfig::from_json(&path).expect("read config");
    assert_eq!(loaded, original);
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempdir().expect("tempdir");
    let err = EvaluatorConfig::from_json(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::FileRead { .. }));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        EvaluatorConfig::from_json(&path),
        Err(ConfigError::ParseError { .. })
    ));
}
