//! Inverse-distance weighted k-nearest-neighbour estimator.
//!
//! There is no training step: the labeled rows are the model.

use tracing::warn;

use super::LabeledRow;

/// Neighbour count used when none is configured.
pub const DEFAULT_K: usize = 5;
/// Added to every distance before inverting it.
pub const DISTANCE_EPSILON: f64 = 1e-6;

/// Estimate a percentage for `query` from the `k` closest rows.
///
/// Returns `None` when there is nothing to compare against (no rows, or no row
/// of the query's length). An exact feature match returns that row's label
/// unchanged; distance ties keep insertion order.
pub fn predict_knn<R: LabeledRow>(rows: &[R], query: &[f32], k: usize) -> Option<f32> {
    if rows.is_empty() {
        return None;
    }
    let mut scored: Vec<(f64, f32)> = Vec::with_capacity(rows.len());
    let mut mismatched = 0usize;
    for row in rows {
        let features = row.features();
        if features.len() != query.len() {
            mismatched += 1;
            continue;
        }
        let distance = euclidean(features, query);
        if distance == 0.0 {
            return Some(row.label());
        }
        scored.push((distance, row.label()));
    }
    if mismatched > 0 {
        warn!(
            "k-NN query of length {} ignored {mismatched} rows of another length",
            query.len()
        );
    }
    if scored.is_empty() {
        return None;
    }

    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    let take = k.max(1).min(scored.len());
    let neighbours = &scored[..take];

    let mut weight_sum = 0.0f64;
    let mut weighted = 0.0f64;
    for &(distance, label) in neighbours {
        let weight = 1.0 / (distance + DISTANCE_EPSILON);
        weight_sum += weight;
        weighted += weight * label as f64;
    }
    if weight_sum == 0.0 || !weight_sum.is_finite() || !weighted.is_finite() {
        return Some(neighbours[0].1);
    }
    Some((weighted / weight_sum) as f32)
}

fn euclidean(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Borrowing estimator over a row slice.
#[derive(Debug, Clone, Copy)]
pub struct KnnEstimator<'a, R> {
    rows: &'a [R],
    k: usize,
}

impl<'a, R: LabeledRow> KnnEstimator<'a, R> {
    pub fn new(rows: &'a [R], k: usize) -> Self {
        Self { rows, k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn predict(&self, query: &[f32]) -> Option<f32> {
        predict_knn(self.rows, query, self.k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(x: &[f32], label: f32) -> (Vec<f32>, f32) {
        (x.to_vec(), label)
    }

    #[test]
    fn empty_rows_have_no_prediction() {
        let rows: Vec<(Vec<f32>, f32)> = Vec::new();
        assert_eq!(predict_knn(&rows, &[0.1, 0.2], 5), None);
    }

    #[test]
    fn exact_match_returns_label_verbatim() {
        let rows = vec![
            row(&[0.0, 1.0], 10.0),
            row(&[0.3, 0.3], 42.0),
            row(&[0.31, 0.3], 90.0),
        ];
        assert_eq!(predict_knn(&rows, &[0.3, 0.3], 5), Some(42.0));
    }

    #[test]
    fn first_of_duplicate_exact_matches_wins() {
        let rows = vec![row(&[0.5], 20.0), row(&[0.5], 80.0)];
        assert_eq!(predict_knn(&rows, &[0.5], 5), Some(20.0));
    }

    #[test]
    fn weights_by_inverse_distance() {
        let rows = vec![row(&[0.0], 0.0), row(&[1.0], 100.0)];
        let predicted = predict_knn(&rows, &[0.25], 2).unwrap();
        let w0 = 1.0 / (0.25 + DISTANCE_EPSILON);
        let w1 = 1.0 / (0.75 + DISTANCE_EPSILON);
        let expected = (100.0 * w1 / (w0 + w1)) as f32;
        assert!((predicted - expected).abs() < 1e-4);
        assert!((predicted - 25.0).abs() < 1e-3);
    }

    #[test]
    fn only_k_nearest_contribute() {
        let rows = vec![row(&[0.0], 10.0), row(&[0.1], 10.0), row(&[5.0], 100.0)];
        assert_eq!(predict_knn(&rows, &[0.05], 2), Some(10.0));
    }

    #[test]
    fn equal_distances_keep_insertion_order() {
        let rows = vec![row(&[1.0], 30.0), row(&[-1.0], 70.0), row(&[3.0], 0.0)];
        assert_eq!(predict_knn(&rows, &[0.0], 1), Some(30.0));
    }

    #[test]
    fn zero_k_behaves_like_one() {
        let rows = vec![row(&[0.0], 10.0), row(&[1.0], 90.0)];
        assert_eq!(predict_knn(&rows, &[0.2], 0), Some(10.0));
    }

    #[test]
    fn mismatched_query_length_has_no_prediction() {
        let rows = vec![row(&[0.0, 0.0], 10.0)];
        assert_eq!(predict_knn(&rows, &[0.0], 5), None);
    }

    #[test]
    fn estimator_uses_configured_k() {
        let rows = vec![row(&[0.0], 0.0), row(&[0.2], 100.0)];
        let estimator = KnnEstimator::new(&rows, 1);
        assert_eq!(estimator.predict(&[0.05]), Some(0.0));
        assert_eq!(estimator.k(), 1);
    }
}
