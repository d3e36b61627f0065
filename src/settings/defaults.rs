use crate::ml::linear::{DEFAULT_LEARNING_RATE, ModelKind};
use crate::storage::{DEFAULT_DOCUMENT_KEY, STORE_DB_FILE_NAME};

pub(super) const MAX_EPOCHS: usize = 10_000;
pub(super) const MAX_CANONICAL_SIDE: u32 = 4_096;
pub(super) const MAX_HISTOGRAM_BINS: usize = 1_024;

pub(super) fn default_model_kind() -> ModelKind {
    ModelKind::Linear
}

pub(super) fn default_epochs() -> usize {
    20
}

pub(super) fn default_learning_rate() -> f32 {
    DEFAULT_LEARNING_RATE
}

pub(super) fn default_seed() -> u64 {
    42
}

pub(super) fn default_min_samples() -> usize {
    3
}

pub(super) fn default_k() -> usize {
    crate::ml::knn::DEFAULT_K
}

pub(super) fn default_database_file() -> String {
    STORE_DB_FILE_NAME.to_string()
}

pub(super) fn default_storage_key() -> String {
    DEFAULT_DOCUMENT_KEY.to_string()
}
