use serde::Serialize;

use super::{Dataset, Sample};
use crate::report::BatchReport;
use crate::validation::{ValidationError, validate_features, validate_label};

/// Label statistics over the stored samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DatasetStats {
    pub count: usize,
    pub label_mean: Option<f32>,
    pub label_min: Option<f32>,
    pub label_max: Option<f32>,
    /// Population standard deviation.
    pub label_std: Option<f32>,
}

/// A [`Dataset`] bound to the feature dimension of the active extractor.
///
/// Every sample entering the store is checked individually; a rejected sample
/// never prevents its siblings from being stored.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    dimension: usize,
    dataset: Dataset,
}

impl DatasetStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            dataset: Dataset::new(),
        }
    }

    /// Adopt a previously persisted dataset, dropping samples that no longer fit.
    pub fn from_dataset(dimension: usize, dataset: Dataset) -> (Self, BatchReport) {
        let Dataset {
            version,
            created_at,
            updated_at,
            samples,
        } = dataset;
        let mut store = Self {
            dimension,
            dataset: Dataset {
                version,
                created_at,
                updated_at,
                samples: Vec::with_capacity(samples.len()),
            },
        };
        let report = store.push_checked(samples);
        store.dataset.updated_at = updated_at;
        (store, report)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn samples(&self) -> &[Sample] {
        &self.dataset.samples
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Check a sample against the label range and the store's dimension.
    pub fn validate(&self, sample: &Sample) -> Result<(), ValidationError> {
        validate_label(sample.label)?;
        validate_features(&sample.features, self.dimension)
    }

    pub fn append(&mut self, sample: Sample) -> Result<(), ValidationError> {
        self.validate(&sample)?;
        self.dataset.samples.push(sample);
        self.dataset.touch();
        Ok(())
    }

    /// Append each valid sample in order and report the rejected ones.
    pub fn append_batch(&mut self, samples: impl IntoIterator<Item = Sample>) -> BatchReport {
        let report = self.push_checked(samples);
        if report.processed > 0 {
            self.dataset.touch();
        }
        report
    }

    /// Concatenate `other`'s samples after the existing ones.
    ///
    /// Identical samples are kept twice; only validation can drop a sample.
    pub fn merge(&mut self, other: Dataset) -> BatchReport {
        self.append_batch(other.samples)
    }

    /// Remove every sample. Trained models are unaffected.
    pub fn clear(&mut self) {
        self.dataset.samples.clear();
        self.dataset.touch();
    }

    pub fn stats(&self) -> DatasetStats {
        let samples = &self.dataset.samples;
        if samples.is_empty() {
            return DatasetStats::default();
        }
        let n = samples.len() as f64;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        for sample in samples {
            min = min.min(sample.label);
            max = max.max(sample.label);
            sum += sample.label as f64;
        }
        let mean = sum / n;
        let variance = samples
            .iter()
            .map(|s| {
                let d = s.label as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        DatasetStats {
            count: samples.len(),
            label_mean: Some(mean as f32),
            label_min: Some(min),
            label_max: Some(max),
            label_std: Some(variance.sqrt() as f32),
        }
    }

    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }

    fn push_checked(&mut self, samples: impl IntoIterator<Item = Sample>) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, sample) in samples.into_iter().enumerate() {
            match self.validate(&sample) {
                Ok(()) => {
                    self.dataset.samples.push(sample);
                    report.record_processed();
                }
                Err(err) => report.record_skipped(index, sample.name.clone(), err),
            }
        }
        report
    }
}
