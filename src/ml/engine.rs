//! Common estimator interface and the adapter for an external network engine.
//!
//! The regressor, the k-NN estimator and any deep-network backend all answer
//! the same question: "what percentage does this vector look like?". The
//! [`Estimator`] trait captures that plus an optional training capability.

use thiserror::Error;
use tracing::warn;

use super::LabeledRow;
use super::knn::KnnEstimator;
use super::linear::ModelState;
use crate::report::BatchReport;
use crate::validation::{ValidationError, validate_features, validate_label};

/// Failure reported by a network engine backend.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("network engine failed: {0}")]
    Backend(String),
    #[error("no saved network at {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Predict (and optionally learn) percentages from feature vectors.
pub trait Estimator {
    /// Short name used in logs and reports.
    fn kind(&self) -> &'static str;

    /// Percentage in `[0, 100]`, or `None` when no estimate is available.
    fn predict(&self, features: &[f32]) -> Option<f32>;

    /// Learn from one labeled example.
    fn train_sample(&mut self, features: &[f32], target: f32) -> Result<(), EstimatorError>;
}

impl Estimator for ModelState {
    fn kind(&self) -> &'static str {
        self.kind.as_str()
    }

    fn predict(&self, features: &[f32]) -> Option<f32> {
        ModelState::predict(self, features)
    }

    fn train_sample(&mut self, features: &[f32], target: f32) -> Result<(), EstimatorError> {
        Ok(self.train_on_sample(features, target)?)
    }
}

impl<R: LabeledRow> Estimator for KnnEstimator<'_, R> {
    fn kind(&self) -> &'static str {
        "knn"
    }

    fn predict(&self, features: &[f32]) -> Option<f32> {
        KnnEstimator::predict(self, features)
    }

    /// Neighbour search learns by growing the dataset, not through the estimator.
    fn train_sample(&mut self, _features: &[f32], _target: f32) -> Result<(), EstimatorError> {
        Err(ValidationError::NotTrainable("knn").into())
    }
}

/// Metrics reported by the engine after each epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochLog {
    /// Zero-based epoch index.
    pub epoch: usize,
    pub loss: f32,
    pub mae: f32,
}

/// Per-epoch history returned by [`NetworkEngine::fit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitHistory {
    pub epochs: Vec<EpochLog>,
}

/// Opaque deep-network backend working on already-extracted vectors.
///
/// Targets handed to `fit` and values returned by `predict` are fractions in
/// `[0, 1]`; [`EngineEstimator`] does the percentage scaling.
pub trait NetworkEngine {
    type Handle;

    fn build(&self) -> Result<Self::Handle, EngineError>;

    fn fit(
        &self,
        handle: &mut Self::Handle,
        x: &[Vec<f32>],
        y: &[f32],
        epochs: usize,
        batch_size: usize,
        on_epoch_end: &mut dyn FnMut(&EpochLog),
    ) -> Result<FitHistory, EngineError>;

    fn predict(&self, handle: &Self::Handle, x: &[f32]) -> Result<f32, EngineError>;

    fn save(&self, handle: &Self::Handle, uri: &str) -> Result<(), EngineError>;

    fn load(&self, uri: &str) -> Result<Self::Handle, EngineError>;
}

/// Adapts a [`NetworkEngine`] to the [`Estimator`] contract.
pub struct EngineEstimator<E: NetworkEngine> {
    engine: E,
    handle: E::Handle,
    dimension: usize,
}

impl<E: NetworkEngine> EngineEstimator<E> {
    /// Build a fresh network for `dimension`-long vectors.
    pub fn new(engine: E, dimension: usize) -> Result<Self, EngineError> {
        let handle = engine.build()?;
        Ok(Self {
            engine,
            handle,
            dimension,
        })
    }

    /// Load a saved network, building a fresh one when none exists at `uri`.
    pub fn load_or_build(engine: E, uri: &str, dimension: usize) -> Result<Self, EngineError> {
        let handle = match engine.load(uri) {
            Ok(handle) => handle,
            Err(EngineError::NotFound(_)) => {
                warn!("No saved network at {uri}; building a new one");
                engine.build()?
            }
            Err(err) => return Err(err),
        };
        Ok(Self {
            engine,
            handle,
            dimension,
        })
    }

    pub fn save(&self, uri: &str) -> Result<(), EngineError> {
        self.engine.save(&self.handle, uri)
    }

    /// Fit on every valid row; invalid rows are reported and left out.
    pub fn fit_rows<R: LabeledRow>(
        &mut self,
        rows: &[R],
        epochs: usize,
        batch_size: usize,
        on_epoch_end: &mut dyn FnMut(&EpochLog),
    ) -> Result<(FitHistory, BatchReport), EngineError> {
        let mut report = BatchReport::default();
        let mut x = Vec::with_capacity(rows.len());
        let mut y = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let check = validate_label(row.label())
                .and_then(|_| validate_features(row.features(), self.dimension));
            match check {
                Ok(()) => {
                    report.record_processed();
                    x.push(row.features().to_vec());
                    y.push(row.label() / 100.0);
                }
                Err(err) => report.record_skipped(index, row.name(), err),
            }
        }
        if x.is_empty() {
            return Ok((FitHistory::default(), report));
        }
        let history = self.engine.fit(
            &mut self.handle,
            &x,
            &y,
            epochs,
            batch_size.max(1),
            on_epoch_end,
        )?;
        Ok((history, report))
    }
}

impl<E: NetworkEngine> Estimator for EngineEstimator<E> {
    fn kind(&self) -> &'static str {
        "network"
    }

    fn predict(&self, features: &[f32]) -> Option<f32> {
        if features.len() != self.dimension {
            return None;
        }
        match self.engine.predict(&self.handle, features) {
            Ok(fraction) if fraction.is_finite() => Some((fraction * 100.0).clamp(0.0, 100.0)),
            Ok(_) => Some(0.0),
            Err(err) => {
                warn!("Network prediction failed: {err}");
                None
            }
        }
    }

    fn train_sample(&mut self, features: &[f32], target: f32) -> Result<(), EstimatorError> {
        validate_label(target)?;
        validate_features(features, self.dimension)?;
        self.engine.fit(
            &mut self.handle,
            &[features.to_vec()],
            &[target / 100.0],
            1,
            1,
            &mut |_| {},
        )?;
        Ok(())
    }
}
