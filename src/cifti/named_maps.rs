//! Scalar, label, and series axes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named map with free-form metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedMap {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl NamedMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalarsMap {
    pub maps: Vec<NamedMap>,
}

impl ScalarsMap {
    /// `count` maps with empty names.
    pub fn with_count(count: usize) -> Self {
        Self {
            maps: vec![NamedMap::default(); count],
        }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            maps: names.into_iter().map(NamedMap::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub rgba: [f32; 4],
}

/// A named map carrying a key to label table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelMap {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub table: BTreeMap<i32, Label>,
}

impl LabelMap {
    /// New map whose table holds only the unassigned key 0.
    pub fn new(name: impl Into<String>) -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            0,
            Label {
                name: "???".to_string(),
                rgba: [0.0, 0.0, 0.0, 0.0],
            },
        );
        Self {
            name: name.into(),
            metadata: BTreeMap::new(),
            table,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelsMap {
    pub maps: Vec<LabelMap>,
}

impl LabelsMap {
    pub fn with_count(count: usize) -> Self {
        Self {
            maps: (0..count).map(|_| LabelMap::new("")).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeriesUnit {
    #[default]
    Second,
    Hertz,
    Meter,
    Radian,
}

/// Evenly spaced samples: index `i` sits at `start + i * step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMap {
    pub start: f32,
    pub step: f32,
    pub unit: SeriesUnit,
    pub length: usize,
}

impl SeriesMap {
    pub fn timepoints(step: f32, length: usize, start: f32) -> Self {
        Self {
            start,
            step,
            unit: SeriesUnit::Second,
            length,
        }
    }

    pub fn value_at(&self, index: usize) -> f32 {
        self.start + index as f32 * self.step
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_from_names() {
        let map = ScalarsMap::from_names(["a", "b"]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.maps[1].name, "b");
        assert_eq!(ScalarsMap::with_count(3).len(), 3);
    }

    #[test]
    fn test_label_map_has_unassigned_key() {
        let map = LabelMap::new("parc");
        assert_eq!(map.table.get(&0).map(|l| l.name.as_str()), Some("???"));
    }

    #[test]
    fn test_series_values() {
        let series = SeriesMap::timepoints(0.72, 10, 1.0);
        assert!((series.value_at(0) - 1.0).abs() < 1e-6);
        assert!((series.value_at(5) - 4.6).abs() < 1e-5);
        assert_eq!(series.unit, SeriesUnit::Second);
    }
}
