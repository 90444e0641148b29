//! Dataset-specific keypoint index tables.
//!
//! Some metrics depend on where particular joints sit in a dataset's
//! skeleton: torso-normalized PCK needs the two torso keypoints and the
//! keypoints of each reported body part, and NME in keypoint-distance mode
//! needs a default pair of reference keypoints (usually the outer eye
//! corners). These layouts are plain data so a new skeleton only needs a new
//! table entry, not a code change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, MetricError, MetricResult};

// ---------------------------------------------------------------------------
// KeypointIndexTable
// ---------------------------------------------------------------------------

/// Default NME normalization keypoint pairs, keyed by dataset name.
///
/// The built-in table covers:
///
/// | dataset               | pair       | keypoints                  |
/// |-----------------------|------------|----------------------------|
/// | `horse10`             | `[0, 1]`   | nose, eye                  |
/// | `300w`                | `[36, 45]` | right-most, left-most eye  |
/// | `coco_wholebody_face` | `[36, 45]` | right-most, left-most eye  |
/// | `cofw`                | `[8, 9]`   | right-most, left-most eye  |
/// | `wflw`                | `[60, 72]` | right-most, left-most eye  |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeypointIndexTable {
    entries: BTreeMap<String, [usize; 2]>,
}

impl Default for KeypointIndexTable {
    fn default() -> Self {
        let entries = [
            ("horse10", [0, 1]),
            ("300w", [36, 45]),
            ("coco_wholebody_face", [36, 45]),
            ("cofw", [8, 9]),
            ("wflw", [60, 72]),
        ]
        .into_iter()
        .map(|(name, pair)| (name.to_string(), pair))
        .collect();
        KeypointIndexTable { entries }
    }
}

impl KeypointIndexTable {
    /// An empty table with no defaults.
    pub fn empty() -> Self {
        KeypointIndexTable { entries: BTreeMap::new() }
    }

    /// Look up the default pair for `dataset`.
    pub fn get(&self, dataset: &str) -> Option<[usize; 2]> {
        self.entries.get(dataset).copied()
    }

    /// Register (or replace) the default pair for `dataset`.
    pub fn insert<S: Into<String>>(&mut self, dataset: S, pair: [usize; 2]) -> Option<[usize; 2]> {
        self.entries.insert(dataset.into(), pair)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_entry<S: Into<String>>(mut self, dataset: S, pair: [usize; 2]) -> Self {
        self.insert(dataset, pair);
        self
    }

    /// Dataset names with a registered pair, in sorted order.
    pub fn datasets(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered datasets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no dataset is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TorsoLayout
// ---------------------------------------------------------------------------

/// A named body part reported by torso-normalized PCK.
///
/// Its accuracy is the mean of the per-keypoint accuracies of `keypoints`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyPartGroup {
    /// Label prefix, e.g. `"Sho"`.
    pub name: String,
    /// Keypoint indices averaged into this part.
    pub keypoints: Vec<usize>,
}

impl BodyPartGroup {
    /// Create a group from a name and its keypoint indices.
    pub fn new<S: Into<String>>(name: S, keypoints: &[usize]) -> Self {
        BodyPartGroup { name: name.into(), keypoints: keypoints.to_vec() }
    }
}

/// Skeleton layout used by torso-normalized PCK.
///
/// The default is the 15-joint JHMDB layout, where the torso is measured
/// from the left shoulder (4) to the right hip (5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorsoLayout {
    /// The two keypoints whose distance is the torso size.
    pub torso_pair: [usize; 2],
    /// Body parts reported alongside the mean, in output order.
    pub parts: Vec<BodyPartGroup>,
}

impl Default for TorsoLayout {
    fn default() -> Self {
        Self::jhmdb()
    }
}

impl TorsoLayout {
    /// The JHMDB layout.
    pub fn jhmdb() -> Self {
        TorsoLayout {
            torso_pair: [4, 5],
            parts: vec![
                BodyPartGroup::new("Head", &[2]),
                BodyPartGroup::new("Sho", &[3, 4]),
                BodyPartGroup::new("Elb", &[7, 8]),
                BodyPartGroup::new("Wri", &[11, 12]),
                BodyPartGroup::new("Hip", &[5, 6]),
                BodyPartGroup::new("Knee", &[9, 10]),
                BodyPartGroup::new("Ank", &[13, 14]),
            ],
        }
    }

    /// Look up a built-in layout by dataset name.
    pub fn for_dataset(dataset: &str) -> Option<Self> {
        match dataset.to_ascii_lowercase().as_str() {
            "jhmdb" => Some(Self::jhmdb()),
            _ => None,
        }
    }

    /// Check the layout is structurally sound (independent of any dataset).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.torso_pair[0] == self.torso_pair[1] {
            return Err(ConfigError::invalid_value(
                "torso_layout.torso_pair",
                "the two torso keypoints must differ",
            ));
        }
        for part in &self.parts {
            if part.name.is_empty() {
                return Err(ConfigError::invalid_value(
                    "torso_layout.parts",
                    "part names must be non-empty",
                ));
            }
            if part.keypoints.is_empty() {
                return Err(ConfigError::invalid_value(
                    "torso_layout.parts",
                    format!("part `{}` lists no keypoints", part.name),
                ));
            }
        }
        Ok(())
    }

    /// Largest keypoint index the layout refers to.
    pub fn max_index(&self) -> usize {
        self.parts
            .iter()
            .flat_map(|p| p.keypoints.iter().copied())
            .chain(self.torso_pair)
            .max()
            .unwrap_or(0)
    }

    /// Fail unless every index is below `num_keypoints`.
    pub fn check_fits(&self, num_keypoints: usize) -> MetricResult<()> {
        let max = self.max_index();
        if max >= num_keypoints {
            return Err(MetricError::index_out_of_range(max, num_keypoints, "torso layout"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_index_table_has_face_datasets() {
        let table = KeypointIndexTable::default();
        assert_eq!(table.get("300w"), Some([36, 45]));
        assert_eq!(table.get("wflw"), Some([60, 72]));
        assert_eq!(table.get("horse10"), Some([0, 1]));
        assert_eq!(table.get("coco"), None);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn index_table_accepts_new_layouts() {
        let table = KeypointIndexTable::empty().with_entry("my_face", [3, 7]);
        assert_eq!(table.get("my_face"), Some([3, 7]));
        assert_eq!(table.datasets().collect::<Vec<_>>(), vec!["my_face"]);
    }

    #[test]
    fn jhmdb_layout_spans_fifteen_keypoints() {
        let layout = TorsoLayout::jhmdb();
        assert_eq!(layout.max_index(), 14);
        assert!(layout.check_fits(15).is_ok());
        assert!(layout.check_fits(14).is_err());
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn layout_with_empty_part_is_invalid() {
        let mut layout = TorsoLayout::jhmdb();
        layout.parts.push(BodyPartGroup::new("Tail", &[]));
        assert!(layout.validate().is_err());
    }

    #[test]
    fn layout_lookup_is_case_insensitive() {
        assert_eq!(TorsoLayout::for_dataset("JHMDB"), Some(TorsoLayout::jhmdb()));
        assert!(TorsoLayout::for_dataset("mpii").is_none());
    }
}
