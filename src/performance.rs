use serde::Serialize;
use statrs::statistics::Statistics;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionPerformance {
    pub mean_absolute_error: f64,
    pub r_squared: f64,
    pub rows: usize,
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Pairs `actual` and `predicted` by position; extra values on either
    /// side are ignored.
    pub fn calculate_regression(actual: &[f64], predicted: &[f64]) -> RegressionPerformance {
        let rows = actual.len().min(predicted.len());
        let actual = &actual[..rows];
        let predicted = &predicted[..rows];

        RegressionPerformance {
            mean_absolute_error: Self::mean_absolute_error(actual, predicted),
            r_squared: Self::r_squared(actual, predicted),
            rows,
        }
    }

    fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
        if actual.is_empty() {
            return 0.0;
        }
        actual
            .iter()
            .zip(predicted)
            .map(|(y, y_hat)| (y - y_hat).abs())
            .mean()
    }

    /// Coefficient of determination. When the actual values are constant the
    /// score is 1.0 for an exact fit and 0.0 otherwise.
    fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
        if actual.is_empty() {
            return 0.0;
        }
        let mean_actual = actual.iter().mean();
        let ss_res: f64 = actual
            .iter()
            .zip(predicted)
            .map(|(y, y_hat)| (y - y_hat).powi(2))
            .sum();
        let ss_tot: f64 = actual.iter().map(|y| (y - mean_actual).powi(2)).sum();

        if ss_tot == 0.0 {
            if ss_res == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - ss_res / ss_tot
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions() {
        let perf = PerformanceCalculator::calculate_regression(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert_eq!(perf.mean_absolute_error, 0.0);
        assert_eq!(perf.r_squared, 1.0);
        assert_eq!(perf.rows, 3);
    }

    #[test]
    fn mean_prediction_scores_zero_r_squared() {
        let perf = PerformanceCalculator::calculate_regression(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0]);
        assert!((perf.mean_absolute_error - 2.0 / 3.0).abs() < 1e-12);
        assert!(perf.r_squared.abs() < 1e-12);
    }

    #[test]
    fn constant_actuals() {
        let exact = PerformanceCalculator::calculate_regression(&[2.0, 2.0], &[2.0, 2.0]);
        assert_eq!(exact.r_squared, 1.0);
        let off = PerformanceCalculator::calculate_regression(&[2.0, 2.0], &[1.0, 2.0]);
        assert_eq!(off.r_squared, 0.0);
        assert!((off.mean_absolute_error - 0.5).abs() < 1e-12);
    }

    #[test]
    fn negative_r_squared_for_worse_than_mean() {
        let perf = PerformanceCalculator::calculate_regression(&[1.0, 3.0], &[3.0, 1.0]);
        assert!((perf.r_squared - (-3.0)).abs() < 1e-12);
    }
}
