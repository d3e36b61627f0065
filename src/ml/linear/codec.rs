//! JSON export/import for [`ModelState`].
//!
//! Import never coerces: a document is either accepted as-is or rejected with
//! the first problem found, and the caller keeps whatever state it had.

use thiserror::Error;

use super::{MODEL_SCHEMA_VERSION, ModelState};
use crate::features::FeatureExtractor;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("model document is not valid: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("model document has no schemaVersion")]
    MissingSchema,
    #[error("model document rejected: {0}")]
    Invalid(#[from] ValidationError),
}

/// Serialize a model verbatim as pretty-printed JSON.
pub fn export_model(state: &ModelState) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(state)
}

/// Parse and validate a model document for vectors of `expected_dimension`.
pub fn import_model(text: &str, expected_dimension: usize) -> Result<ModelState, ImportError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    model_from_value(value, expected_dimension)
}

/// Like [`import_model`], also requiring a recorded extractor fingerprint to
/// match the active extractor.
pub fn import_model_for(text: &str, extractor: &FeatureExtractor) -> Result<ModelState, ImportError> {
    let state = import_model(text, extractor.dimension())?;
    check_extractor(&state, extractor)?;
    Ok(state)
}

/// Validate an already-parsed model value.
///
/// The schema version is read first so an unknown layout is reported as such
/// instead of as a field-level decode error.
pub(crate) fn model_from_value(
    value: serde_json::Value,
    expected_dimension: usize,
) -> Result<ModelState, ImportError> {
    let schema = value
        .get("schemaVersion")
        .and_then(serde_json::Value::as_u64)
        .ok_or(ImportError::MissingSchema)?;
    if schema != MODEL_SCHEMA_VERSION as u64 {
        return Err(ValidationError::UnsupportedSchema {
            expected: MODEL_SCHEMA_VERSION,
            found: u32::try_from(schema).unwrap_or(u32::MAX),
        }
        .into());
    }
    let state: ModelState = serde_json::from_value(value)?;
    if state.feature_dimension != expected_dimension {
        return Err(ValidationError::DimensionMismatch {
            expected: expected_dimension,
            found: state.feature_dimension,
        }
        .into());
    }
    state.validate()?;
    Ok(state)
}

pub(crate) fn check_extractor(
    state: &ModelState,
    extractor: &FeatureExtractor,
) -> Result<(), ValidationError> {
    let expected = extractor.fingerprint();
    match &state.extractor {
        Some(found) if *found != expected => Err(ValidationError::ExtractorMismatch {
            expected,
            found: found.clone(),
        }),
        _ => Ok(()),
    }
}
