use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::{ModelKind, ModelState};
use crate::cancel::CancelToken;
use crate::ml::LabeledRow;
use crate::ml::metrics::{ErrorAccumulator, RegressionMetrics};
use crate::report::BatchReport;
use crate::validation::{ValidationError, validate_features, validate_label};

/// Options for multi-epoch training over a set of rows.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    /// Replaces the state's learning rate before training when set.
    pub learning_rate: Option<f32>,
    /// Shuffle the visiting order each epoch with this seed; insertion order when `None`.
    pub shuffle_seed: Option<u64>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 20,
            learning_rate: None,
            shuffle_seed: None,
        }
    }
}

/// Progress update emitted after every sample and at the end of each epoch.
#[derive(Clone, Copy, Debug)]
pub struct TrainingProgress {
    /// One-based epoch number.
    pub epoch: usize,
    pub epochs: usize,
    /// Samples visited in the current epoch.
    pub processed: usize,
    /// Valid samples per epoch.
    pub total: usize,
    /// Rows rejected before training started.
    pub skipped: usize,
    /// Set only on the end-of-epoch update.
    pub epoch_metrics: Option<RegressionMetrics>,
}

/// Outcome of [`train_batch`].
#[derive(Debug, Clone, Default)]
pub struct TrainReport {
    pub epochs_completed: usize,
    /// Per-sample weight updates applied across all epochs.
    pub applied: usize,
    /// Valid vs rejected rows; each row is counted once.
    pub samples: BatchReport,
    /// Valid rows whose update was refused because it diverged, each listed
    /// once with the first refusal.
    pub diverged: BatchReport,
    pub cancelled: bool,
    /// Online error of the last completed epoch, measured before each update.
    pub metrics: Option<RegressionMetrics>,
}

impl ModelState {
    /// Apply one stochastic gradient step towards `target` (percent).
    ///
    /// The gradient uses the unclamped score so training keeps moving when the
    /// prediction sits at 0 or 100. Invalid input, or a step that would leave a
    /// non-finite weight or bias, leaves the state untouched.
    pub fn train_on_sample(&mut self, features: &[f32], target: f32) -> Result<(), ValidationError> {
        if !self.kind.is_trainable() {
            return Err(ValidationError::NotTrainable(self.kind.as_str()));
        }
        validate_label(target)?;
        validate_features(features, self.feature_dimension)?;

        let z = self.raw_score(features);
        let term = match self.kind {
            ModelKind::Logistic => {
                let y = super::sigmoid(z);
                (y - target as f64 / 100.0) * y * (1.0 - y)
            }
            _ => z - target as f64,
        };
        let step = self.learning_rate as f64 * term;
        let weights: Vec<f32> = self
            .weights
            .iter()
            .zip(features)
            .map(|(&w, &x)| (w as f64 - step * x as f64) as f32)
            .collect();
        let bias = (self.bias as f64 - step) as f32;
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(ValidationError::NonFiniteParameter("weights"));
        }
        if !bias.is_finite() {
            return Err(ValidationError::NonFiniteParameter("bias"));
        }
        self.weights = weights;
        self.bias = bias;
        self.trained_sample_count += 1;
        self.last_updated = OffsetDateTime::now_utc();
        Ok(())
    }
}

/// Run per-sample SGD over `rows` for `options.epochs` passes.
///
/// Invalid rows are reported and skipped; the remaining rows are visited in
/// insertion order unless a shuffle seed is given. Cancellation is honoured
/// between samples, so every completed update stays in `state`.
pub fn train_batch<R: LabeledRow>(
    state: &mut ModelState,
    rows: &[R],
    options: &TrainOptions,
    cancel: Option<&CancelToken>,
    mut progress: Option<&mut dyn FnMut(TrainingProgress)>,
) -> TrainReport {
    let mut report = TrainReport::default();
    if let Some(lr) = options.learning_rate {
        state.learning_rate = lr;
    }
    if !state.kind.is_trainable() {
        for (index, row) in rows.iter().enumerate() {
            report
                .samples
                .record_skipped(index, row.name(), ValidationError::NotTrainable(state.kind.as_str()));
        }
        return report;
    }

    let mut order = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let check = validate_label(row.label())
            .and_then(|_| validate_features(row.features(), state.feature_dimension));
        match check {
            Ok(()) => {
                report.samples.record_processed();
                order.push(index);
            }
            Err(err) => report.samples.record_skipped(index, row.name(), err),
        }
    }
    report.samples.log_skipped("training");
    let total = order.len();
    let skipped = report.samples.skipped;
    let mut rng = options.shuffle_seed.map(StdRng::seed_from_u64);
    let mut refused = vec![false; rows.len()];

    'epochs: for epoch in 1..=options.epochs {
        if let Some(rng) = rng.as_mut() {
            order.shuffle(rng);
        }
        let mut acc = ErrorAccumulator::default();
        for (position, &index) in order.iter().enumerate() {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                report.cancelled = true;
                break 'epochs;
            }
            let row = &rows[index];
            if let Some(predicted) = state.predict(row.features()) {
                acc.add(predicted, row.label());
            }
            match state.train_on_sample(row.features(), row.label()) {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    if !refused[index] {
                        refused[index] = true;
                        report.diverged.record_skipped(index, row.name(), err);
                    }
                }
            }
            emit(&mut progress, TrainingProgress {
                epoch,
                epochs: options.epochs,
                processed: position + 1,
                total,
                skipped,
                epoch_metrics: None,
            });
        }
        let metrics = acc.finish();
        if let Some(m) = metrics {
            debug!(
                "Epoch {epoch}/{} loss={:.4} mae={:.4}",
                options.epochs, m.mse, m.mae
            );
        }
        report.metrics = metrics;
        report.epochs_completed = epoch;
        emit(&mut progress, TrainingProgress {
            epoch,
            epochs: options.epochs,
            processed: total,
            total,
            skipped,
            epoch_metrics: metrics,
        });
    }
    if !report.diverged.is_clean() {
        warn!(
            "Training diverged on {} samples; lower the learning rate",
            report.diverged.skipped
        );
        report.diverged.log_skipped("training update");
    }
    report
}

fn emit(progress: &mut Option<&mut dyn FnMut(TrainingProgress)>, update: TrainingProgress) {
    if let Some(callback) = progress.as_deref_mut() {
        callback(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::linear::WeightInit;

    fn rows() -> Vec<(Vec<f32>, f32)> {
        vec![
            (vec![0.9, 0.1, 0.0], 10.0),
            (vec![0.2, 0.6, 0.2], 45.0),
            (vec![0.0, 0.3, 0.7], 80.0),
        ]
    }

    #[test]
    fn repeated_sample_converges_linear() {
        let mut state = ModelState::new(ModelKind::Linear, 2, 0.01, WeightInit::Zeros);
        let x = [1.0, 0.5];
        for _ in 0..1000 {
            state.train_on_sample(&x, 42.0).unwrap();
        }
        let predicted = state.predict(&x).unwrap();
        assert!((predicted - 42.0).abs() < 1.0, "predicted {predicted}");
        assert_eq!(state.trained_sample_count, 1000);
    }

    #[test]
    fn repeated_sample_converges_logistic() {
        let mut state = ModelState::new(ModelKind::Logistic, 2, 0.5, WeightInit::Zeros);
        let x = [1.0, 0.5];
        for _ in 0..2000 {
            state.train_on_sample(&x, 42.0).unwrap();
        }
        let predicted = state.predict(&x).unwrap();
        assert!((predicted - 42.0).abs() < 1.0, "predicted {predicted}");
    }

    #[test]
    fn gradient_flows_while_prediction_is_clamped() {
        let mut state = ModelState::new(ModelKind::Linear, 1, 0.01, WeightInit::Zeros);
        state.bias = -50.0;
        assert_eq!(state.predict(&[1.0]), Some(0.0));
        state.train_on_sample(&[1.0], 30.0).unwrap();
        assert!(state.bias > -50.0);
    }

    #[test]
    fn invalid_target_leaves_state_untouched() {
        let mut state = ModelState::new(ModelKind::Linear, 2, 0.01, WeightInit::Seeded { seed: 3 });
        let before = state.clone();
        assert!(state.train_on_sample(&[0.5, 0.5], 150.0).is_err());
        assert!(state.train_on_sample(&[0.5, 0.5], f32::NAN).is_err());
        assert!(state.train_on_sample(&[0.5], 20.0).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn diverging_step_is_refused_and_state_stays_finite() {
        let mut state = ModelState::new(ModelKind::Linear, 256, 0.01, WeightInit::Zeros);
        let ones = vec![1.0; 256];
        let mut refused = 0;
        for _ in 0..400 {
            match state.train_on_sample(&ones, 50.0) {
                Ok(()) => {}
                Err(err) => {
                    assert!(matches!(err, ValidationError::NonFiniteParameter(_)));
                    refused += 1;
                }
            }
        }
        assert!(refused > 0);
        assert!(state.validate().is_ok());
        assert!(state.bias.is_finite());
        let prediction = state.predict(&ones).unwrap();
        assert!((0.0..=100.0).contains(&prediction));
        let text = super::super::export_model(&state).unwrap();
        assert_eq!(super::super::import_model(&text, 256).unwrap(), state);
    }

    #[test]
    fn batch_reports_diverging_rows_once() {
        let data: Vec<(Vec<f32>, f32)> = vec![(vec![1.0; 64], 80.0), (vec![1.0; 64], 20.0)];
        let mut state = ModelState::new(ModelKind::Linear, 64, 0.5, WeightInit::Zeros);
        let options = TrainOptions {
            epochs: 200,
            ..TrainOptions::default()
        };
        let report = train_batch(&mut state, &data, &options, None, None);
        assert_eq!(report.samples.processed, 2);
        assert!(!report.diverged.is_clean());
        assert!(report.diverged.skipped <= 2);
        assert_eq!(report.epochs_completed, 200);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn knn_state_refuses_training() {
        let mut state = ModelState::new(ModelKind::Knn, 2, 0.0, WeightInit::Zeros);
        assert_eq!(
            state.train_on_sample(&[0.5, 0.5], 20.0),
            Err(ValidationError::NotTrainable("knn"))
        );
    }

    #[test]
    fn batch_skips_invalid_rows_and_continues() {
        let mut data = rows();
        data.insert(1, (vec![0.5, 0.5, 0.0], 150.0));
        data.push((vec![0.5, 0.5], 20.0));
        let mut state = ModelState::new(ModelKind::Linear, 3, 0.05, WeightInit::Zeros);
        let options = TrainOptions {
            epochs: 4,
            ..TrainOptions::default()
        };
        let report = train_batch(&mut state, &data, &options, None, None);
        assert_eq!(report.samples.processed, 3);
        assert_eq!(report.samples.skipped, 2);
        assert_eq!(report.samples.reasons[0].index, 1);
        assert!(report.samples.reasons[0].reason.starts_with("label out of range"));
        assert_eq!(report.applied, 12);
        assert_eq!(report.epochs_completed, 4);
        assert_eq!(state.trained_sample_count, 12);
    }

    #[test]
    fn same_seed_and_data_give_identical_weights() {
        let options = TrainOptions {
            epochs: 5,
            learning_rate: Some(0.1),
            shuffle_seed: Some(11),
        };
        let mut a = ModelState::new(ModelKind::Linear, 3, 0.01, WeightInit::Seeded { seed: 5 });
        let mut b = ModelState::new(ModelKind::Linear, 3, 0.01, WeightInit::Seeded { seed: 5 });
        train_batch(&mut a, &rows(), &options, None, None);
        train_batch(&mut b, &rows(), &options, None, None);
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.bias.to_bits(), b.bias.to_bits());
        assert_eq!(a.learning_rate, 0.1);
    }

    #[test]
    fn epoch_metrics_shrink_as_training_proceeds() {
        let mut state = ModelState::new(ModelKind::Linear, 3, 0.1, WeightInit::Zeros);
        let mut epoch_mae = Vec::new();
        let mut on_progress = |update: TrainingProgress| {
            if let Some(metrics) = update.epoch_metrics {
                epoch_mae.push(metrics.mae);
            }
        };
        let options = TrainOptions {
            epochs: 30,
            ..TrainOptions::default()
        };
        train_batch(&mut state, &rows(), &options, None, Some(&mut on_progress));
        assert_eq!(epoch_mae.len(), 30);
        assert!(epoch_mae[29] < epoch_mae[0]);
    }

    #[test]
    fn cancellation_stops_between_samples() {
        let token = CancelToken::new();
        let mut state = ModelState::new(ModelKind::Linear, 3, 0.05, WeightInit::Zeros);
        let mut seen = 0usize;
        let mut on_progress = |update: TrainingProgress| {
            if update.epoch_metrics.is_none() {
                seen += 1;
                if seen == 4 {
                    token.cancel();
                }
            }
        };
        let options = TrainOptions {
            epochs: 10,
            ..TrainOptions::default()
        };
        let report = train_batch(&mut state, &rows(), &options, Some(&token), Some(&mut on_progress));
        assert!(report.cancelled);
        assert_eq!(report.applied, 4);
        assert_eq!(report.epochs_completed, 1);
        assert_eq!(state.trained_sample_count, 4);
        assert!(state.validate().is_ok());
    }
}
