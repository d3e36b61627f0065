//! Explicit session context owning the dataset, the model and their storage.
//!
//! A [`Session`] is the only writer of its dataset and model; every mutation
//! is followed by a write of the whole persisted document to the key-value
//! store.

mod exchange;
mod ingest;

use thiserror::Error;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::dataset::{Dataset, DatasetStats, DatasetStore, Sample};
use crate::features::{ExtractionError, FeatureExtractor};
use crate::ml::knn::predict_knn;
use crate::ml::metrics::{RegressionMetrics, evaluate};
use crate::ml::linear::{
    ImportError, ModelKind, ModelState, TrainReport, TrainingProgress, check_extractor, train_batch,
};
use crate::report::BatchReport;
use crate::settings::{AppSettings, TrainingSettings};
use crate::storage::{
    CorruptStateError, DocumentError, KvStore, ParsedDocument, PersistedDocument, SqliteStore,
    StorageError, parse_document,
};
use crate::validation::ValidationError;

pub use exchange::DocumentImport;
pub use ingest::{
    AnalyzeReport, BatchProgress, IngestReport, LabeledFile, LabeledImage, NamedImage, Prediction,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("Failed to serialize session state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Training needs at least {required} samples, dataset has {found}")]
    NotEnoughSamples { required: usize, found: usize },
    #[error("No model has been trained or imported yet")]
    NoModel,
}

/// Problems recovered from while opening a session.
#[derive(Debug, Clone, Error)]
pub enum SessionWarning {
    #[error(transparent)]
    Corrupt(#[from] CorruptStateError),
    #[error("Dropped {} stored samples that no longer fit", .0.skipped)]
    DroppedSamples(BatchReport),
    #[error("Dropped stored model: {0}")]
    DroppedModel(String),
}

/// A freshly opened session plus anything that had to be discarded.
pub struct SessionOpen<S: KvStore> {
    pub session: Session<S>,
    pub warnings: Vec<SessionWarning>,
}

pub struct Session<S: KvStore> {
    extractor: FeatureExtractor,
    dataset: DatasetStore,
    model: Option<ModelState>,
    training: TrainingSettings,
    k: usize,
    store: S,
    key: String,
}

impl<S: KvStore> Session<S> {
    /// Open a session, restoring the document stored under the configured key.
    ///
    /// An unreadable document is replaced by fresh state and reported as a
    /// [`SessionWarning::Corrupt`]; storage failures are returned as errors.
    pub fn open(settings: &AppSettings, store: S) -> Result<SessionOpen<S>, SessionError> {
        let extractor = FeatureExtractor::new(settings.extractor.clone())?;
        let key = settings.storage.key.clone();
        let dimension = extractor.dimension();
        let mut warnings = Vec::new();

        let (dataset, model) = match store.get(&key)? {
            None => {
                info!("No stored state under '{key}'; starting fresh");
                (DatasetStore::new(dimension), None)
            }
            Some(bytes) => match parse_document(&bytes) {
                Ok(parsed) => restore(parsed, &extractor, &mut warnings),
                Err(err) => {
                    let corrupt = CorruptStateError {
                        key: key.clone(),
                        reason: err.to_string(),
                    };
                    warn!("{corrupt}");
                    warnings.push(corrupt.into());
                    (DatasetStore::new(dimension), None)
                }
            },
        };
        info!(
            "Session opened: {} samples, model={}",
            dataset.len(),
            model.as_ref().map_or("none", |m: &ModelState| m.kind.as_str())
        );
        Ok(SessionOpen {
            session: Self {
                extractor,
                dataset,
                model,
                training: settings.training.clone(),
                k: settings.knn.k.max(1),
                store,
                key,
            },
            warnings,
        })
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn dataset(&self) -> &DatasetStore {
        &self.dataset
    }

    pub fn model(&self) -> Option<&ModelState> {
        self.model.as_ref()
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn stats(&self) -> DatasetStats {
        self.dataset.stats()
    }

    /// Append one already-extracted sample.
    pub fn add_sample(&mut self, sample: Sample) -> Result<(), SessionError> {
        self.dataset.append(sample)?;
        self.persist()
    }

    /// Append samples individually; rejected ones are reported, not fatal.
    pub fn add_samples(&mut self, samples: Vec<Sample>) -> Result<BatchReport, SessionError> {
        let report = self.dataset.append_batch(samples);
        report.log_skipped("add samples");
        if report.processed > 0 {
            self.persist()?;
        }
        Ok(report)
    }

    /// Apply one gradient step, creating the model on first use.
    ///
    /// A refused step leaves no model behind if none existed before the call.
    pub fn train_on_sample(&mut self, features: &[f32], label: f32) -> Result<(), SessionError> {
        let created = self.model.is_none();
        if let Err(err) = self.ensure_model().train_on_sample(features, label) {
            if created {
                self.model = None;
            }
            return Err(err.into());
        }
        self.persist()
    }

    /// Train the model over the whole dataset.
    ///
    /// A cancelled run keeps (and persists) every update completed before the
    /// token was observed.
    pub fn train(
        &mut self,
        cancel: Option<&CancelToken>,
        progress: Option<&mut dyn FnMut(TrainingProgress)>,
    ) -> Result<TrainReport, SessionError> {
        let found = self.dataset.len();
        let required = self.training.min_samples;
        if found < required {
            return Err(SessionError::NotEnoughSamples { required, found });
        }
        let options = self.training.train_options();
        self.ensure_model();
        let Some(state) = self.model.as_mut() else {
            return Err(SessionError::NoModel);
        };
        let report = if state.kind.is_trainable() {
            info!(
                "Training {} model: epochs={}, samples={found}",
                state.kind, options.epochs
            );
            train_batch(state, self.dataset.samples(), &options, cancel, progress)
        } else {
            info!("k-NN model predicts from the {found} stored samples; nothing to fit");
            let mut report = TrainReport::default();
            report.samples.processed = found;
            report
        };
        if report.cancelled {
            warn!("Training cancelled after {} updates", report.applied);
        }
        self.persist()?;
        Ok(report)
    }

    /// Estimate a percentage for an extracted feature vector.
    ///
    /// `None` when no model exists, when a k-NN model has no samples, or when
    /// the vector length does not match the model.
    pub fn predict(&self, features: &[f32]) -> Option<f32> {
        let state = self.model.as_ref()?;
        match state.kind {
            ModelKind::Linear | ModelKind::Logistic => state.predict(features),
            ModelKind::Knn => predict_knn(self.dataset.samples(), features, self.k),
        }
    }

    /// In-sample error of the current model over the stored dataset.
    pub fn evaluate(&self) -> Option<RegressionMetrics> {
        evaluate(self.dataset.samples(), |features| self.predict(features))
    }

    /// Decode, extract and predict one encoded image.
    pub fn analyze_image(&self, bytes: &[u8]) -> Result<Option<f32>, SessionError> {
        let features = self.extractor.extract_encoded(bytes)?;
        Ok(self.predict(&features))
    }

    /// Remove every sample. The model is kept.
    pub fn clear_dataset(&mut self) -> Result<(), SessionError> {
        self.dataset.clear();
        info!("Dataset cleared");
        self.persist()
    }

    /// Forget the model; the next training call starts from scratch.
    pub fn reset_model(&mut self) -> Result<(), SessionError> {
        self.model = None;
        info!("Model reset");
        self.persist()
    }

    /// Write the current document to the store.
    pub fn persist(&mut self) -> Result<(), SessionError> {
        let document = self.document();
        let bytes = serde_json::to_vec_pretty(&document)?;
        self.store.set(&self.key, &bytes)?;
        Ok(())
    }

    fn document(&self) -> PersistedDocument {
        PersistedDocument::new(self.dataset.dataset(), self.model.as_ref())
    }

    fn ensure_model(&mut self) -> &mut ModelState {
        let training = &self.training;
        let extractor = &self.extractor;
        self.model.get_or_insert_with(|| {
            info!("Creating {} model for {} features", training.kind, extractor.dimension());
            ModelState::new(
                training.kind,
                extractor.dimension(),
                training.learning_rate,
                training.weight_init(),
            )
            .with_extractor(extractor.fingerprint())
        })
    }
}

impl Session<SqliteStore> {
    /// Open the session stored in the SQLite database under the app data directory.
    pub fn open_default(settings: &AppSettings) -> Result<SessionOpen<SqliteStore>, SessionError> {
        let store = SqliteStore::open_default(&settings.storage.database_file)?;
        Self::open(settings, store)
    }
}

/// Rebuild dataset and model from a parsed document, dropping what no longer fits.
fn restore(
    parsed: ParsedDocument,
    extractor: &FeatureExtractor,
    warnings: &mut Vec<SessionWarning>,
) -> (DatasetStore, Option<ModelState>) {
    let dimension = extractor.dimension();
    let model = match parsed.model(dimension).and_then(|state| match state {
        Some(state) => check_extractor(&state, extractor)
            .map(|_| Some(state))
            .map_err(ImportError::from),
        None => Ok(None),
    }) {
        Ok(model) => model,
        Err(err) => {
            warn!("Stored model dropped: {err}");
            warnings.push(SessionWarning::DroppedModel(err.to_string()));
            None
        }
    };

    let ParsedDocument {
        created_at,
        updated_at,
        samples,
        rejected,
        ..
    } = parsed;
    let (positions, samples): (Vec<usize>, Vec<Sample>) = samples.into_iter().unzip();
    let mut dataset = Dataset::from_samples(samples);
    if let Some(created_at) = created_at {
        dataset.created_at = created_at;
    }
    if let Some(updated_at) = updated_at {
        dataset.updated_at = updated_at;
    }
    let (store, mut report) = DatasetStore::from_dataset(dimension, dataset);
    remap_indices(&mut report, &positions);
    report.absorb(rejected);
    if !report.is_clean() {
        report.log_skipped("restore");
        warnings.push(SessionWarning::DroppedSamples(report));
    }
    (store, model)
}

/// Translate report indices from a filtered list back to document positions.
pub(crate) fn remap_indices(report: &mut BatchReport, positions: &[usize]) {
    for item in &mut report.reasons {
        if let Some(&position) = positions.get(item.index) {
            item.index = position;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{ExtractionStrategy, ExtractorConfig, ResampleMethod};
    use crate::settings::InitMode;
    use crate::storage::MemoryStore;

    pub(super) fn small_settings() -> AppSettings {
        let mut settings = AppSettings::default();
        settings.extractor = ExtractorConfig {
            strategy: ExtractionStrategy::Histogram,
            canonical_width: 8,
            canonical_height: 8,
            resample: ResampleMethod::Nearest,
            histogram_bins: 4,
        };
        settings.training.init = InitMode::Seeded;
        settings
    }

    pub(super) fn open(settings: &AppSettings, store: MemoryStore) -> Session<MemoryStore> {
        let opened = Session::open(settings, store).unwrap();
        assert!(opened.warnings.is_empty(), "{:?}", opened.warnings);
        opened.session
    }

    fn vector(level: f32) -> Vec<f32> {
        vec![level, 1.0 - level, 0.0, 0.0]
    }

    #[test]
    fn fresh_session_has_no_model_and_no_prediction() {
        let session = open(&small_settings(), MemoryStore::new());
        assert!(session.dataset().is_empty());
        assert!(session.model().is_none());
        assert_eq!(session.predict(&vector(0.5)), None);
        assert!(session.evaluate().is_none());
    }

    #[test]
    fn train_requires_minimum_samples() {
        let mut session = open(&small_settings(), MemoryStore::new());
        session.add_sample(Sample::new("a", 10.0, vector(0.1))).unwrap();
        let err = session.train(None, None).unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotEnoughSamples {
                required: 3,
                found: 1
            }
        ));
        assert!(session.model().is_none());
    }

    #[test]
    fn training_creates_fingerprinted_model_and_persists() {
        let settings = small_settings();
        let mut session = open(&settings, MemoryStore::new());
        let samples = vec![
            Sample::new("a", 10.0, vector(0.1)),
            Sample::new("b", 50.0, vector(0.5)),
            Sample::new("c", 90.0, vector(0.9)),
        ];
        assert_eq!(session.add_samples(samples).unwrap().processed, 3);
        let report = session.train(None, None).unwrap();
        assert_eq!(report.epochs_completed, 20);
        assert_eq!(report.applied, 60);
        let model = session.model().unwrap();
        assert_eq!(model.trained_sample_count, 60);
        assert_eq!(model.extractor.as_deref(), Some(session.extractor().fingerprint().as_str()));
        let fit = session.evaluate().unwrap();
        assert_eq!(fit.count, 3);
        assert!(fit.mae.is_finite());

        let reopened = open(&settings, session.into_store());
        assert_eq!(reopened.dataset().len(), 3);
        assert_eq!(reopened.model().unwrap().trained_sample_count, 60);
    }

    #[test]
    fn knn_model_predicts_from_dataset() {
        let mut settings = small_settings();
        settings.training.kind = ModelKind::Knn;
        let mut session = open(&settings, MemoryStore::new());
        for (name, label, level) in [("a", 10.0, 0.1), ("b", 50.0, 0.5), ("c", 90.0, 0.9)] {
            session.add_sample(Sample::new(name, label, vector(level))).unwrap();
        }
        let report = session.train(None, None).unwrap();
        assert_eq!(report.samples.processed, 3);
        assert_eq!(session.model().unwrap().kind, ModelKind::Knn);
        assert_eq!(session.predict(&vector(0.5)), Some(50.0));
        assert!(matches!(
            session.train_on_sample(&vector(0.2), 20.0),
            Err(SessionError::Validation(ValidationError::NotTrainable("knn")))
        ));
    }

    #[test]
    fn diverging_training_keeps_a_storable_model() {
        let mut settings = small_settings();
        settings.extractor.strategy = ExtractionStrategy::RawGrayscale;
        settings.extractor.canonical_width = 16;
        settings.extractor.canonical_height = 16;
        settings.training.epochs = 200;
        let mut session = open(&settings, MemoryStore::new());
        for (name, label) in [("a", 10.0), ("b", 50.0), ("c", 90.0)] {
            session.add_sample(Sample::new(name, label, vec![1.0; 256])).unwrap();
        }
        let report = session.train(None, None).unwrap();
        assert!(!report.diverged.is_clean());
        assert!(session.model().unwrap().validate().is_ok());

        let reopened = open(&settings, session.into_store());
        let model = reopened.model().unwrap();
        assert!(model.validate().is_ok());
        let value = reopened.predict(&vec![1.0; 256]).unwrap();
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn rejected_first_step_leaves_no_model() {
        let mut session = open(&small_settings(), MemoryStore::new());
        assert!(session.train_on_sample(&vector(0.4), 150.0).is_err());
        assert!(session.train_on_sample(&[0.4], 40.0).is_err());
        assert!(session.model().is_none());

        let reopened = open(&small_settings(), session.into_store());
        assert!(reopened.model().is_none());
    }

    #[test]
    fn clear_keeps_model_and_reset_drops_it() {
        let mut session = open(&small_settings(), MemoryStore::new());
        session.add_sample(Sample::new("a", 40.0, vector(0.4))).unwrap();
        session.train_on_sample(&vector(0.4), 40.0).unwrap();
        session.clear_dataset().unwrap();
        assert!(session.dataset().is_empty());
        assert!(session.model().is_some());
        session.reset_model().unwrap();
        assert!(session.model().is_none());
    }

    #[test]
    fn cancelled_training_keeps_valid_partial_state() {
        let mut session = open(&small_settings(), MemoryStore::new());
        for i in 0..10 {
            let level = i as f32 / 10.0;
            session
                .add_sample(Sample::new(format!("s{i}"), level * 100.0, vector(level)))
                .unwrap();
        }
        let token = CancelToken::new();
        let mut seen = 0;
        let mut cancel_after_five = |_: TrainingProgress| {
            seen += 1;
            if seen == 5 {
                token.cancel();
            }
        };
        let report = session
            .train(Some(&token), Some(&mut cancel_after_five))
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.applied, 5);
        let model = session.model().unwrap();
        assert_eq!(model.trained_sample_count, 5);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn corrupt_document_opens_fresh_with_warning() {
        let settings = small_settings();
        let mut store = MemoryStore::new();
        store.set(&settings.storage.key, b"{\"version\": 1, \"samples\": [").unwrap();
        let opened = Session::open(&settings, store).unwrap();
        assert!(opened.session.dataset().is_empty());
        assert!(opened.session.model().is_none());
        assert_eq!(opened.warnings.len(), 1);
        assert!(matches!(opened.warnings[0], SessionWarning::Corrupt(_)));
    }

    #[test]
    fn samples_of_another_extractor_are_dropped_on_open() {
        let settings = small_settings();
        let mut session = open(&settings, MemoryStore::new());
        session.add_sample(Sample::new("a", 40.0, vector(0.4))).unwrap();
        session.train_on_sample(&vector(0.4), 40.0).unwrap();

        let mut wider = settings.clone();
        wider.extractor.histogram_bins = 8;
        let opened = Session::open(&wider, session.into_store()).unwrap();
        assert!(opened.session.dataset().is_empty());
        assert!(opened.session.model().is_none());
        assert_eq!(opened.warnings.len(), 2);
    }
}
