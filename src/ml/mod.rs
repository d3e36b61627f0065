//! Estimators that turn feature vectors into percentage estimates.
//!
//! - [`linear`]: online gradient-descent linear/logistic unit with a persisted state.
//! - [`knn`]: inverse-distance weighted nearest neighbours over labeled rows.
//! - [`engine`]: the common [`engine::Estimator`] seam and the adapter for an
//!   external deep-network engine.

pub mod engine;
pub mod knn;
pub mod linear;
pub mod metrics;

/// A labeled feature row usable for training and neighbour search.
pub trait LabeledRow {
    fn features(&self) -> &[f32];
    /// Target percentage in `[0, 100]`.
    fn label(&self) -> f32;
    /// Name used when reporting a skipped row.
    fn name(&self) -> &str {
        ""
    }
}

impl LabeledRow for (Vec<f32>, f32) {
    fn features(&self) -> &[f32] {
        &self.0
    }

    fn label(&self) -> f32 {
        self.1
    }
}
