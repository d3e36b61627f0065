//! Online-learning linear and logistic regression units.
//!
//! A [`ModelState`] is the whole learned state: weights, bias and learning rate
//! plus the bookkeeping needed to validate it against a feature extractor. The
//! same struct tags `knn` models, which carry no weights and predict from the
//! dataset instead.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::validation::ValidationError;

mod codec;
mod train;

pub(crate) use codec::{check_extractor, model_from_value};
pub use codec::{ImportError, export_model, import_model, import_model_for};
pub use train::{TrainOptions, TrainReport, TrainingProgress, train_batch};

/// Schema version written into every exported model.
pub const MODEL_SCHEMA_VERSION: u32 = 1;
/// Learning rate used when none is configured.
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

/// Which estimator a [`ModelState`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Linear,
    Logistic,
    Knn,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::Logistic => "logistic",
            ModelKind::Knn => "knn",
        }
    }

    /// Whether the kind has parameters updated by gradient descent.
    pub fn is_trainable(self) -> bool {
        !matches!(self, ModelKind::Knn)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(ModelKind::Linear),
            "logistic" => Ok(ModelKind::Logistic),
            "knn" => Ok(ModelKind::Knn),
            other => Err(format!("Unknown model kind: {other}")),
        }
    }
}

/// Initial weight values for a fresh model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightInit {
    #[default]
    Zeros,
    /// Small uniform values in `[-0.005, 0.005)` from a seeded generator.
    Seeded { seed: u64 },
}

/// Persisted parameters of a regressor (or the tag of a k-NN model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelState {
    pub kind: ModelKind,
    pub schema_version: u32,
    pub feature_dimension: usize,
    pub weights: Vec<f32>,
    pub bias: f32,
    pub learning_rate: f32,
    pub trained_sample_count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    /// Fingerprint of the extractor the model was trained against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor: Option<String>,
}

impl ModelState {
    /// Create an untrained model for `feature_dimension`-long vectors.
    pub fn new(kind: ModelKind, feature_dimension: usize, learning_rate: f32, init: WeightInit) -> Self {
        let weights = match (kind, init) {
            (ModelKind::Knn, _) => Vec::new(),
            (_, WeightInit::Zeros) => vec![0.0; feature_dimension],
            (_, WeightInit::Seeded { seed }) => {
                let mut rng = StdRng::seed_from_u64(seed);
                (0..feature_dimension)
                    .map(|_| (rng.random::<f32>() - 0.5) * 0.01)
                    .collect()
            }
        };
        Self {
            kind,
            schema_version: MODEL_SCHEMA_VERSION,
            feature_dimension,
            weights,
            bias: 0.0,
            learning_rate,
            trained_sample_count: 0,
            last_updated: OffsetDateTime::now_utc(),
            extractor: None,
        }
    }

    /// Record the extractor fingerprint this model belongs to.
    pub fn with_extractor(mut self, fingerprint: impl Into<String>) -> Self {
        self.extractor = Some(fingerprint.into());
        self
    }

    /// Validate structural invariants of the state.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != MODEL_SCHEMA_VERSION {
            return Err(ValidationError::UnsupportedSchema {
                expected: MODEL_SCHEMA_VERSION,
                found: self.schema_version,
            });
        }
        let expected_weights = if self.kind.is_trainable() {
            self.feature_dimension
        } else {
            0
        };
        if self.weights.len() != expected_weights {
            return Err(ValidationError::WeightsLength {
                expected: expected_weights,
                found: self.weights.len(),
            });
        }
        if self.weights.iter().any(|w| !w.is_finite()) {
            return Err(ValidationError::NonFiniteParameter("weights"));
        }
        if !self.bias.is_finite() {
            return Err(ValidationError::NonFiniteParameter("bias"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(ValidationError::NonFiniteParameter("learningRate"));
        }
        Ok(())
    }

    /// Unclamped linear score `b + w·x`.
    pub(crate) fn raw_score(&self, features: &[f32]) -> f64 {
        let dot: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(&w, &x)| w as f64 * x as f64)
            .sum();
        self.bias as f64 + dot
    }

    /// Predict a percentage in `[0, 100]`.
    ///
    /// Returns `None` for k-NN states (they need the dataset) and for vectors
    /// of the wrong length.
    pub fn predict(&self, features: &[f32]) -> Option<f32> {
        if !self.kind.is_trainable() || features.len() != self.feature_dimension {
            return None;
        }
        let z = self.raw_score(features);
        if z.is_nan() {
            return Some(0.0);
        }
        let value = match self.kind {
            ModelKind::Logistic => sigmoid(z) * 100.0,
            _ => z.clamp(0.0, 100.0),
        };
        Some(value as f32)
    }
}

/// Logistic function, saturating cleanly for large magnitudes.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
