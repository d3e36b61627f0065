use tracing::info;

use super::{Session, SessionError, remap_indices};
use crate::dataset::Dataset;
use crate::ml::linear::{ImportError, check_extractor, export_model, import_model_for};
use crate::report::BatchReport;
use crate::storage::{DocumentError, KvStore, parse_document};

/// Outcome of importing a persisted document into a session.
#[derive(Debug, Clone, Default)]
pub struct DocumentImport {
    /// Samples merged vs rejected, indexed by position in the document.
    pub samples: BatchReport,
    pub model_replaced: bool,
}

impl<S: KvStore> Session<S> {
    /// Pretty JSON of the current model.
    pub fn export_model(&self) -> Result<String, SessionError> {
        let state = self.model.as_ref().ok_or(SessionError::NoModel)?;
        Ok(export_model(state)?)
    }

    /// Replace the model with an imported one. A rejected document leaves the
    /// current model in place.
    pub fn import_model(&mut self, text: &str) -> Result<(), SessionError> {
        let state = import_model_for(text, &self.extractor)?;
        info!(
            "Imported {} model trained on {} samples",
            state.kind, state.trained_sample_count
        );
        self.model = Some(state);
        self.persist()
    }

    /// Dataset and model as a pretty-printed document.
    pub fn export_document(&self) -> Result<String, SessionError> {
        Ok(self.document().to_json_pretty()?)
    }

    /// Merge a document's samples after the current ones and adopt its model.
    ///
    /// An unreadable envelope or an invalid embedded model rejects the whole
    /// document. Individual samples that fail to decode or validate are
    /// reported while their siblings are merged.
    pub fn import_document(&mut self, bytes: &[u8]) -> Result<DocumentImport, SessionError> {
        let parsed = parse_document(bytes)?;
        let model = parsed
            .model(self.extractor.dimension())
            .map_err(DocumentError::Model)?;
        if let Some(state) = &model {
            check_extractor(state, &self.extractor)
                .map_err(|err| DocumentError::Model(ImportError::from(err)))?;
        }

        let (positions, samples): (Vec<usize>, Vec<_>) = parsed.samples.into_iter().unzip();
        let mut report = self.dataset.merge(Dataset::from_samples(samples));
        remap_indices(&mut report, &positions);
        report.absorb(parsed.rejected);
        report.log_skipped("import document");

        let model_replaced = model.is_some();
        if model.is_some() {
            self.model = model;
        }
        info!(
            "Imported document: {} samples merged, {} skipped, model {}",
            report.processed,
            report.skipped,
            if model_replaced { "replaced" } else { "kept" }
        );
        self.persist()?;
        Ok(DocumentImport {
            samples: report,
            model_replaced,
        })
    }
}
