use serde::{Deserialize, Serialize};

use super::defaults::{
    MAX_CANONICAL_SIDE, MAX_EPOCHS, MAX_HISTOGRAM_BINS, default_database_file,
    default_epochs, default_k, default_learning_rate, default_min_samples, default_model_kind,
    default_seed, default_storage_key,
};
use crate::features::ExtractorConfig;
use crate::ml::linear::{ModelKind, TrainOptions, WeightInit};

/// Everything persisted in `settings.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Feature extractor identity. Changing it invalidates stored samples.
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub knn: KnnSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl AppSettings {
    /// Clamp values into their supported ranges.
    pub fn normalized(mut self) -> Self {
        let extractor = &mut self.extractor;
        extractor.canonical_width = extractor.canonical_width.clamp(1, MAX_CANONICAL_SIDE);
        extractor.canonical_height = extractor.canonical_height.clamp(1, MAX_CANONICAL_SIDE);
        extractor.histogram_bins = extractor.histogram_bins.clamp(1, MAX_HISTOGRAM_BINS);

        let training = &mut self.training;
        training.epochs = training.epochs.clamp(1, MAX_EPOCHS);
        if !training.learning_rate.is_finite() || training.learning_rate <= 0.0 {
            training.learning_rate = default_learning_rate();
        }
        training.min_samples = training.min_samples.max(1);

        self.knn.k = self.knn.k.max(1);

        if self.storage.database_file.trim().is_empty() {
            self.storage.database_file = default_database_file();
        }
        if self.storage.key.trim().is_empty() {
            self.storage.key = default_storage_key();
        }
        self
    }
}

/// How fresh weights are initialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitMode {
    #[default]
    Zeros,
    /// Small random values drawn from `seed`.
    Seeded,
}

/// Training preferences for the regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Estimator created on first training: `linear`, `logistic` or `knn`.
    #[serde(default = "default_model_kind")]
    pub kind: ModelKind,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    /// Seed for weight initialization and shuffling.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub init: InitMode,
    /// Visit samples in a seeded random order each epoch.
    #[serde(default)]
    pub shuffle: bool,
    /// Batch training refuses datasets smaller than this.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            kind: default_model_kind(),
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            seed: default_seed(),
            init: InitMode::default(),
            shuffle: false,
            min_samples: default_min_samples(),
        }
    }
}

impl TrainingSettings {
    pub fn weight_init(&self) -> WeightInit {
        match self.init {
            InitMode::Zeros => WeightInit::Zeros,
            InitMode::Seeded => WeightInit::Seeded { seed: self.seed },
        }
    }

    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            epochs: self.epochs,
            learning_rate: Some(self.learning_rate),
            shuffle_seed: self.shuffle.then_some(self.seed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnnSettings {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for KnnSettings {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

/// Where the persisted document lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file name inside the app data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Key of the document inside the store.
    #[serde(default = "default_storage_key")]
    pub key: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
            key: default_storage_key(),
        }
    }
}
