//! Regression metrics

use crate::error::{Result, TripcastError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Error summary of one partition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// R-squared
    pub r2: f64,
    /// Number of rows scored
    pub samples: usize,
}

impl RegressionMetrics {
    /// Compute regression metrics
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(TripcastError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(TripcastError::DataQualityError(
                "Cannot compute metrics on zero rows".to_string(),
            ));
        }

        let n = y_true.len() as f64;
        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
        let mae: f64 = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        let y_mean: f64 = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();

        // Constant targets: perfect predictions score 1, anything else 0
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(Self {
            mae,
            rmse: mse.sqrt(),
            r2,
            samples: y_true.len(),
        })
    }
}

/// Mean absolute error, the selection criterion
pub fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len().max(1) as f64;
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y_pred = array![1.1, 2.0, 2.9, 4.1, 5.0];

        let metrics = RegressionMetrics::compute(&y_true, &y_pred).unwrap();

        assert!((metrics.mae - 0.06).abs() < 1e-9);
        assert!((metrics.rmse - (0.03f64 / 5.0).sqrt()).abs() < 1e-9);
        assert!(metrics.r2 > 0.99);
        assert_eq!(metrics.samples, 5);
    }

    #[test]
    fn test_constant_target() {
        let y = array![3.0, 3.0];
        assert_eq!(RegressionMetrics::compute(&y, &y).unwrap().r2, 1.0);
        let off = array![3.0, 4.0];
        assert_eq!(RegressionMetrics::compute(&y, &off).unwrap().r2, 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        let err = RegressionMetrics::compute(&array![1.0, 2.0], &array![1.0]).unwrap_err();
        assert!(matches!(err, TripcastError::ShapeError { .. }));
    }

    #[test]
    fn test_mean_absolute_error() {
        assert_eq!(mean_absolute_error(&array![1.0, -1.0], &array![0.0, 0.0]), 1.0);
    }
}
