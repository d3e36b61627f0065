//! Evaluation metrics for percentage regressors.

use serde::{Deserialize, Serialize};

use super::LabeledRow;

/// Error summary in percentage points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Number of predictions that contributed.
    pub count: usize,
    /// Mean absolute error.
    pub mae: f32,
    /// Mean squared error.
    pub mse: f32,
    /// Root mean squared error.
    pub rmse: f32,
}

/// Running sums for [`RegressionMetrics`].
#[derive(Debug, Clone, Default)]
pub struct ErrorAccumulator {
    count: usize,
    abs_sum: f64,
    sq_sum: f64,
}

impl ErrorAccumulator {
    pub fn add(&mut self, predicted: f32, truth: f32) {
        let diff = predicted as f64 - truth as f64;
        if !diff.is_finite() {
            return;
        }
        self.count += 1;
        self.abs_sum += diff.abs();
        self.sq_sum += diff * diff;
    }

    /// Metrics over everything added so far, or `None` when nothing was added.
    pub fn finish(&self) -> Option<RegressionMetrics> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let mse = self.sq_sum / n;
        Some(RegressionMetrics {
            count: self.count,
            mae: (self.abs_sum / n) as f32,
            mse: mse as f32,
            rmse: mse.sqrt() as f32,
        })
    }
}

/// Score `predict` against labeled rows; rows without a prediction are ignored.
pub fn evaluate<R, F>(rows: &[R], mut predict: F) -> Option<RegressionMetrics>
where
    R: LabeledRow,
    F: FnMut(&[f32]) -> Option<f32>,
{
    let mut acc = ErrorAccumulator::default();
    for row in rows {
        if let Some(predicted) = predict(row.features()) {
            acc.add(predicted, row.label());
        }
    }
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_mae_and_rmse() {
        let mut acc = ErrorAccumulator::default();
        acc.add(10.0, 12.0);
        acc.add(50.0, 46.0);
        let metrics = acc.finish().unwrap();
        assert_eq!(metrics.count, 2);
        assert!((metrics.mae - 3.0).abs() < 1e-6);
        assert!((metrics.mse - 10.0).abs() < 1e-6);
        assert!((metrics.rmse - 10.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn empty_accumulator_has_no_metrics() {
        assert!(ErrorAccumulator::default().finish().is_none());
    }

    #[test]
    fn evaluate_skips_rows_without_prediction() {
        let rows = vec![(vec![0.0], 20.0), (vec![1.0], 40.0)];
        let metrics = evaluate(&rows, |x| (x[0] > 0.5).then_some(30.0)).unwrap();
        assert_eq!(metrics.count, 1);
        assert!((metrics.mae - 10.0).abs() < 1e-6);
    }
}
