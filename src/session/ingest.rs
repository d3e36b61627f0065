use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::{Session, SessionError};
use crate::cancel::CancelToken;
use crate::dataset::Sample;
use crate::features::{ExtractionError, FeatureExtractor, FeatureVector};
use crate::report::BatchReport;
use crate::storage::KvStore;
use crate::validation::validate_label;

/// Encoded image with the percentage a user assigned to it.
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub name: String,
    pub bytes: Vec<u8>,
    pub label: f32,
}

/// Image file with the percentage a user assigned to it.
#[derive(Debug, Clone)]
pub struct LabeledFile {
    pub path: PathBuf,
    pub label: f32,
}

/// Encoded image awaiting analysis.
#[derive(Debug, Clone)]
pub struct NamedImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Emitted after each item of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub samples: BatchReport,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub index: usize,
    pub name: String,
    /// `None` when no estimate is available.
    pub value: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzeReport {
    pub predictions: Vec<Prediction>,
    pub images: BatchReport,
    pub cancelled: bool,
}

type Extract<T> = fn(&FeatureExtractor, T) -> Result<FeatureVector, ExtractionError>;

fn extract_bytes(extractor: &FeatureExtractor, bytes: &[u8]) -> Result<FeatureVector, ExtractionError> {
    extractor.extract_encoded(bytes)
}

fn extract_path(extractor: &FeatureExtractor, path: &Path) -> Result<FeatureVector, ExtractionError> {
    extractor.extract_file(path)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl<S: KvStore> Session<S> {
    /// Decode, extract and store each labeled image.
    ///
    /// A bad label or an undecodable image skips that item only. The dataset
    /// is persisted once at the end if anything was added.
    pub fn add_labeled_images(
        &mut self,
        images: Vec<LabeledImage>,
        cancel: Option<&CancelToken>,
        progress: Option<&mut dyn FnMut(BatchProgress)>,
    ) -> Result<IngestReport, SessionError> {
        let total = images.len();
        let items = images
            .iter()
            .map(|image| (image.name.clone(), image.label, image.bytes.as_slice()));
        self.ingest(items, total, extract_bytes, cancel, progress)
    }

    /// Like [`Session::add_labeled_images`], reading each file only when its
    /// turn comes. An unreadable file is skipped like an undecodable one.
    pub fn add_labeled_files(
        &mut self,
        files: &[LabeledFile],
        cancel: Option<&CancelToken>,
        progress: Option<&mut dyn FnMut(BatchProgress)>,
    ) -> Result<IngestReport, SessionError> {
        let items = files
            .iter()
            .map(|file| (file_name(&file.path), file.label, file.path.as_path()));
        self.ingest(items, files.len(), extract_path, cancel, progress)
    }

    /// Predict every image, reporting the ones that fail to decode.
    pub fn analyze_batch(
        &self,
        images: &[NamedImage],
        cancel: Option<&CancelToken>,
        progress: Option<&mut dyn FnMut(BatchProgress)>,
    ) -> AnalyzeReport {
        let items = images
            .iter()
            .map(|image| (image.name.clone(), image.bytes.as_slice()));
        self.analyze_each(items, images.len(), extract_bytes, cancel, progress)
    }

    /// Predict every image file; unreadable files are reported and skipped.
    pub fn analyze_files(
        &self,
        paths: &[PathBuf],
        cancel: Option<&CancelToken>,
        progress: Option<&mut dyn FnMut(BatchProgress)>,
    ) -> AnalyzeReport {
        let items = paths
            .iter()
            .map(|path| (path.display().to_string(), path.as_path()));
        self.analyze_each(items, paths.len(), extract_path, cancel, progress)
    }

    fn ingest<T>(
        &mut self,
        items: impl Iterator<Item = (String, f32, T)>,
        total: usize,
        extract: Extract<T>,
        cancel: Option<&CancelToken>,
        mut progress: Option<&mut dyn FnMut(BatchProgress)>,
    ) -> Result<IngestReport, SessionError> {
        let mut report = IngestReport::default();
        for (index, (name, label, source)) in items.enumerate() {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                report.cancelled = true;
                break;
            }
            let outcome = validate_label(label)
                .map_err(SessionError::from)
                .and_then(|_| Ok(extract(&self.extractor, source)?))
                .and_then(|features| {
                    Ok(self.dataset.append(Sample::new(name.clone(), label, features))?)
                });
            match outcome {
                Ok(()) => report.samples.record_processed(),
                Err(err) => report.samples.record_skipped(index, name, err),
            }
            if let Some(callback) = progress.as_deref_mut() {
                callback(BatchProgress {
                    processed: index + 1,
                    total,
                });
            }
        }
        report.samples.log_skipped("add images");
        if report.cancelled {
            warn!("Adding images cancelled after {} of {total}", report.samples.total());
        }
        info!(
            "Added {} images ({} skipped); dataset now holds {}",
            report.samples.processed,
            report.samples.skipped,
            self.dataset.len()
        );
        if report.samples.processed > 0 {
            self.persist()?;
        }
        Ok(report)
    }

    fn analyze_each<T>(
        &self,
        items: impl Iterator<Item = (String, T)>,
        total: usize,
        extract: Extract<T>,
        cancel: Option<&CancelToken>,
        mut progress: Option<&mut dyn FnMut(BatchProgress)>,
    ) -> AnalyzeReport {
        let mut report = AnalyzeReport::default();
        for (index, (name, source)) in items.enumerate() {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                report.cancelled = true;
                break;
            }
            match extract(&self.extractor, source) {
                Ok(features) => {
                    report.images.record_processed();
                    report.predictions.push(Prediction {
                        index,
                        name,
                        value: self.predict(&features),
                    });
                }
                Err(err) => report.images.record_skipped(index, name, SessionError::from(err)),
            }
            if let Some(callback) = progress.as_deref_mut() {
                callback(BatchProgress {
                    processed: index + 1,
                    total,
                });
            }
        }
        report.images.log_skipped("analyze");
        report
    }
}
