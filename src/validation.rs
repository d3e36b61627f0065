//! Per-item validation shared by the dataset store, the regressor and the codec.
//!
//! A [`ValidationError`] always concerns one sample or one document and is
//! recoverable: batch callers record it and move on to the next item.

use thiserror::Error;

/// Lowest accepted label, in percent.
pub const LABEL_MIN: f32 = 0.0;
/// Highest accepted label, in percent.
pub const LABEL_MAX: f32 = 100.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("label out of range: {0} (expected {LABEL_MIN}..={LABEL_MAX})")]
    LabelOutOfRange(f32),
    #[error("label is not a number")]
    LabelNotNumeric,
    #[error("feature dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("non-finite feature value at index {index}")]
    NonFiniteFeature { index: usize },
    #[error("unsupported schema version {found} (expected {expected})")]
    UnsupportedSchema { expected: u32, found: u32 },
    #[error("weights length mismatch: expected {expected}, found {found}")]
    WeightsLength { expected: usize, found: usize },
    #[error("non-finite model parameter: {0}")]
    NonFiniteParameter(&'static str),
    #[error("extractor mismatch: model was trained with {found}, active extractor is {expected}")]
    ExtractorMismatch { expected: String, found: String },
    #[error("{0} models cannot be trained")]
    NotTrainable(&'static str),
}

/// Check that a label is a finite percentage.
pub fn validate_label(label: f32) -> Result<(), ValidationError> {
    if label.is_nan() {
        return Err(ValidationError::LabelNotNumeric);
    }
    if !(LABEL_MIN..=LABEL_MAX).contains(&label) {
        return Err(ValidationError::LabelOutOfRange(label));
    }
    Ok(())
}

/// Check a feature vector's length and that every value is finite.
pub fn validate_features(features: &[f32], expected: usize) -> Result<(), ValidationError> {
    if features.len() != expected {
        return Err(ValidationError::DimensionMismatch {
            expected,
            found: features.len(),
        });
    }
    if let Some(index) = features.iter().position(|v| !v.is_finite()) {
        return Err(ValidationError::NonFiniteFeature { index });
    }
    Ok(())
}
