//! Labeled sample collection used for training and neighbour search.
//!
//! Samples are immutable once created. The collection only grows (append,
//! merge) or is cleared wholesale; see [`DatasetStore`] for the validating
//! entry points.

mod store;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::features::FeatureVector;
use crate::ml::LabeledRow;

pub use store::{DatasetStats, DatasetStore};

/// Layout version of a serialized [`Dataset`].
pub const DATASET_FORMAT_VERSION: u32 = 1;

/// One labeled image, reduced to its feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: String,
    /// Original file name of the image.
    pub name: String,
    /// Percentage in `[0, 100]`.
    pub label: f32,
    pub features: FeatureVector,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Sample {
    /// Create a sample with a fresh id and the current time.
    pub fn new(name: impl Into<String>, label: f32, features: FeatureVector) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            label,
            features,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

impl LabeledRow for Sample {
    fn features(&self) -> &[f32] {
        &self.features
    }

    fn label(&self) -> f32 {
        self.label
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Ordered samples plus creation/update timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub samples: Vec<Sample>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataset {
    pub fn new() -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            version: DATASET_FORMAT_VERSION,
            created_at: now,
            updated_at: now,
            samples: Vec::new(),
        }
    }

    /// Wrap existing samples in a fresh dataset.
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            ..Self::new()
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_get_unique_ids() {
        let a = Sample::new("a.png", 10.0, vec![0.0]);
        let b = Sample::new("a.png", 10.0, vec![0.0]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn dataset_serializes_with_camel_case_fields() {
        let dataset = Dataset::from_samples(vec![Sample::new("a.png", 12.5, vec![0.5, 0.5])]);
        let value = serde_json::to_value(&dataset).unwrap();
        assert_eq!(value["version"], 1);
        assert!(value["createdAt"].is_string());
        assert_eq!(value["samples"][0]["name"], "a.png");
        assert!(value["samples"][0]["createdAt"].is_string());
        let back: Dataset = serde_json::from_value(value).unwrap();
        assert_eq!(back, dataset);
    }
}
