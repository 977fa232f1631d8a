//! Degree-2 polynomial fit of close against time

use tracing::debug;

use super::numeric::{polyfit, polyval, r_squared};
use super::{non_negative, ForecastModel};
use crate::error::{ForecastError, Result};
use crate::types::{ForecastResult, ForecastTier, ModelKind, OhlcvSeries};

/// Confidence is the global R² of the fit, constant over the horizon.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadraticModel;

impl ForecastModel for QuadraticModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Quadratic
    }

    fn forecast(&self, series: &OhlcvSeries, horizon: usize) -> Result<ForecastResult> {
        let closes = series.closes();
        let n = closes.len();
        if n < 3 {
            return Err(ForecastError::fit(
                ModelKind::Quadratic,
                format!("need at least 3 closes, got {n}"),
            ));
        }

        // Time on [0, 1] keeps the normal equations well conditioned
        let scale = (n - 1) as f64;
        let t: Vec<f64> = (0..n).map(|i| i as f64 / scale).collect();
        let coeffs = polyfit(&t, &closes, 2)
            .ok_or_else(|| ForecastError::fit(ModelKind::Quadratic, "least squares failed"))?;

        let fitted: Vec<f64> = t.iter().map(|&x| polyval(&coeffs, x)).collect();
        let r2 = r_squared(&closes, &fitted).clamp(0.0, 1.0);
        let predictions: Vec<f64> = (0..horizon)
            .map(|i| polyval(&coeffs, (n + i) as f64 / scale))
            .collect();

        debug!(coeffs = ?coeffs, r2 = %format!("{r2:.4}"), "Quadratic model fitted");
        Ok(ForecastResult::new(
            ModelKind::Quadratic,
            non_negative(predictions),
            vec![r2; horizon],
            ForecastTier::Primary,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bar;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> OhlcvSeries {
        let start = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
        OhlcvSeries::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| Bar::new(start + chrono::Duration::days(i as i64), c, c, c, c, 1.0))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_exact_parabola_extrapolates() {
        let closes: Vec<f64> = (0..30).map(|i| 50.0 + 0.1 * (i * i) as f64).collect();
        let result = QuadraticModel
            .forecast(&series(&closes), 3)
            .unwrap();
        assert!((result.predictions[0] - (50.0 + 0.1 * 900.0)).abs() < 1e-6);
        assert!((result.predictions[2] - (50.0 + 0.1 * 1024.0)).abs() < 1e-6);
        assert!(result.confidences.iter().all(|c| (*c - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_flat_series_has_full_confidence() {
        let result = QuadraticModel
            .forecast(&series(&[20.0; 10]), 4)
            .unwrap();
        assert!(result.predictions.iter().all(|p| (*p - 20.0).abs() < 1e-9));
        assert_eq!(result.confidences, vec![1.0; 4]);
    }

    #[test]
    fn test_too_short_is_fit_error() {
        let err = QuadraticModel
            .forecast(&series(&[1.0, 2.0]), 2)
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
