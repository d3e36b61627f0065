use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::dataset::{Dataset, Sample};
use crate::ml::linear::{ImportError, ModelState, model_from_value};
use crate::report::BatchReport;

/// Layout version of the persisted document.
pub const DOCUMENT_VERSION: u32 = 1;
/// Storage key the document lives under unless configured otherwise.
pub const DEFAULT_DOCUMENT_KEY: &str = "lipid_dataset_v1";

/// Dataset plus optional model, as written to storage and export files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDocument {
    pub version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub samples: Vec<Sample>,
    pub model_state: Option<ModelState>,
}

impl PersistedDocument {
    pub fn new(dataset: &Dataset, model_state: Option<&ModelState>) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            created_at: dataset.created_at,
            updated_at: dataset.updated_at,
            samples: dataset.samples.clone(),
            model_state: model_state.cloned(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Persisted state that could not be read back and was replaced by a fresh one.
#[derive(Debug, Clone, Error)]
#[error("Stored state under '{key}' is unreadable ({reason}); starting fresh")]
pub struct CorruptStateError {
    pub key: String,
    pub reason: String,
}

/// Reasons a document is refused as a whole.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Document is not UTF-8")]
    NotUtf8,
    #[error("Document must be a JSON object")]
    NotAnObject,
    #[error("Document has no version")]
    MissingVersion,
    #[error("Unsupported document version {found} (expected {expected})")]
    UnsupportedVersion { expected: u32, found: u64 },
    #[error("Document samples must be an array")]
    SamplesNotArray,
    #[error("Document model rejected: {0}")]
    Model(#[from] ImportError),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentTimes {
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
}

/// A document whose envelope is valid; samples were decoded one by one.
#[derive(Debug)]
pub struct ParsedDocument {
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
    /// Decoded samples with their position in the document.
    pub samples: Vec<(usize, Sample)>,
    /// Entries that did not decode as a sample.
    pub rejected: BatchReport,
    model_state: Option<Value>,
}

impl ParsedDocument {
    pub fn has_model(&self) -> bool {
        self.model_state.is_some()
    }

    /// Validate the embedded model against the active feature dimension.
    pub fn model(&self, expected_dimension: usize) -> Result<Option<ModelState>, ImportError> {
        match &self.model_state {
            Some(value) => model_from_value(value.clone(), expected_dimension).map(Some),
            None => Ok(None),
        }
    }
}

/// Parse a document from raw bytes.
///
/// The envelope (version, sample array) must be intact. Individual samples
/// that fail to decode are reported in [`ParsedDocument::rejected`]. The model
/// is kept as raw JSON until [`ParsedDocument::model`] validates it.
pub fn parse_document(bytes: &[u8]) -> Result<ParsedDocument, DocumentError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DocumentError::NotUtf8)?;
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(mut object) = value else {
        return Err(DocumentError::NotAnObject);
    };
    let version = object
        .get("version")
        .and_then(Value::as_u64)
        .ok_or(DocumentError::MissingVersion)?;
    if version != DOCUMENT_VERSION as u64 {
        return Err(DocumentError::UnsupportedVersion {
            expected: DOCUMENT_VERSION,
            found: version,
        });
    }
    let times: DocumentTimes = serde_json::from_value(Value::Object(object.clone()))?;
    let entries = match object.remove("samples") {
        Some(Value::Array(entries)) => entries,
        None | Some(Value::Null) => Vec::new(),
        Some(_) => return Err(DocumentError::SamplesNotArray),
    };
    let mut samples = Vec::with_capacity(entries.len());
    let mut rejected = BatchReport::default();
    for (index, entry) in entries.into_iter().enumerate() {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match serde_json::from_value::<Sample>(entry) {
            Ok(sample) => samples.push((index, sample)),
            Err(err) => rejected.record_skipped(index, name, format!("malformed sample: {err}")),
        }
    }
    let model_state = match object.remove("modelState") {
        None | Some(Value::Null) => None,
        Some(value) => Some(value),
    };
    Ok(ParsedDocument {
        created_at: times.created_at,
        updated_at: times.updated_at,
        samples,
        rejected,
        model_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::linear::{ModelKind, WeightInit};
    use crate::validation::ValidationError;

    fn document_with_model() -> PersistedDocument {
        let dataset = Dataset::from_samples(vec![
            Sample::new("a.png", 10.0, vec![0.1, 0.2]),
            Sample::new("b.png", 90.0, vec![0.8, 0.9]),
        ]);
        let model = ModelState::new(ModelKind::Linear, 2, 0.01, WeightInit::Zeros);
        PersistedDocument::new(&dataset, Some(&model))
    }

    #[test]
    fn document_round_trips_through_parse() {
        let document = document_with_model();
        let text = document.to_json_pretty().unwrap();
        assert!(text.contains("\"modelState\""));
        let parsed = parse_document(text.as_bytes()).unwrap();
        assert!(parsed.rejected.is_clean());
        let samples: Vec<Sample> = parsed.samples.iter().map(|(_, s)| s.clone()).collect();
        assert_eq!(samples, document.samples);
        assert_eq!(parsed.created_at, Some(document.created_at));
        assert_eq!(parsed.model(2).unwrap(), document.model_state);
    }

    #[test]
    fn malformed_samples_are_reported_individually() {
        let mut value = serde_json::to_value(document_with_model()).unwrap();
        value["samples"][0]["label"] = Value::String("high".into());
        let parsed = parse_document(value.to_string().as_bytes()).unwrap();
        assert_eq!(parsed.samples.len(), 1);
        assert_eq!(parsed.samples[0].0, 1);
        assert_eq!(parsed.rejected.skipped, 1);
        assert_eq!(parsed.rejected.reasons[0].name, "a.png");
    }

    #[test]
    fn envelope_problems_reject_the_document() {
        assert!(matches!(
            parse_document(b"{not json"),
            Err(DocumentError::Parse(_))
        ));
        assert!(matches!(parse_document(b"[1,2]"), Err(DocumentError::NotAnObject)));
        assert!(matches!(
            parse_document(br#"{"samples": []}"#),
            Err(DocumentError::MissingVersion)
        ));
        assert!(matches!(
            parse_document(br#"{"version": 2, "samples": []}"#),
            Err(DocumentError::UnsupportedVersion { found: 2, .. })
        ));
        assert!(matches!(
            parse_document(br#"{"version": 1, "samples": 3}"#),
            Err(DocumentError::SamplesNotArray)
        ));
        assert!(matches!(parse_document(&[0xff, 0xfe]), Err(DocumentError::NotUtf8)));
    }

    #[test]
    fn embedded_model_is_checked_against_dimension() {
        let text = document_with_model().to_json_pretty().unwrap();
        let parsed = parse_document(text.as_bytes()).unwrap();
        assert!(parsed.has_model());
        assert!(matches!(
            parsed.model(16),
            Err(ImportError::Invalid(ValidationError::DimensionMismatch {
                expected: 16,
                found: 2
            }))
        ));
    }

    #[test]
    fn null_model_means_no_model() {
        let parsed =
            parse_document(br#"{"version": 1, "samples": [], "modelState": null}"#).unwrap();
        assert!(!parsed.has_model());
        assert_eq!(parsed.model(16).unwrap(), None);
        assert!(parsed.samples.is_empty());
    }
}
