//! Fourier low-pass filter with polynomial extrapolation

use rustfft::{num_complex::Complex, FftPlanner};
use tracing::debug;

use super::numeric::{polyfit, polyval, r_squared};
use super::{decayed, non_negative, ForecastModel};
use crate::config::ModelsConfig;
use crate::error::{ForecastError, Result};
use crate::types::{ForecastResult, ForecastTier, ModelKind, OhlcvSeries};

pub struct SpectralModel {
    config: ModelsConfig,
}

impl SpectralModel {
    pub fn new(config: ModelsConfig) -> Self {
        Self { config }
    }

    /// Keep the lowest `harmonics` frequency bins and their mirrors.
    ///
    /// With `spectral_detrend` the line through the first and last close is
    /// removed before the transform and added back afterwards. Without it the
    /// filter sees the raw closes, so on a trending series the periodic
    /// extension jumps at the boundary and the smoothed ends are pulled
    /// toward each other.
    pub fn low_pass(&self, closes: &[f64]) -> Vec<f64> {
        let n = closes.len();
        let (intercept, slope) = if self.config.spectral_detrend {
            (closes[0], (closes[n - 1] - closes[0]) / (n - 1).max(1) as f64)
        } else {
            (0.0, 0.0)
        };
        let mut buffer: Vec<Complex<f64>> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| Complex::new(c - (intercept + slope * i as f64), 0.0))
            .collect();

        let mut planner = FftPlanner::<f64>::new();
        planner.plan_fft_forward(n).process(&mut buffer);

        let h = self.config.harmonics.max(1);
        for (k, bin) in buffer.iter_mut().enumerate() {
            let keep = k < h || k + h >= n;
            if !keep {
                *bin = Complex::new(0.0, 0.0);
            }
        }

        planner.plan_fft_inverse(n).process(&mut buffer);
        buffer
            .iter()
            .enumerate()
            .map(|(i, c)| c.re / n as f64 + intercept + slope * i as f64)
            .collect()
    }
}

impl ForecastModel for SpectralModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Spectral
    }

    fn forecast(&self, series: &OhlcvSeries, horizon: usize) -> Result<ForecastResult> {
        let closes = series.closes();
        let n = closes.len();
        if n < 4 {
            return Err(ForecastError::fit(
                ModelKind::Spectral,
                format!("need at least 4 closes, got {n}"),
            ));
        }

        let smooth = self.low_pass(&closes);
        let r2 = r_squared(&closes, &smooth).clamp(0.0, 1.0);

        let degree = self.config.max_poly_degree.min(n / 10).max(1);
        let scale = (n - 1) as f64;
        let t: Vec<f64> = (0..n).map(|i| i as f64 / scale).collect();
        let coeffs = polyfit(&t, &smooth, degree)
            .ok_or_else(|| ForecastError::fit(ModelKind::Spectral, "polynomial fit failed"))?;
        let predictions: Vec<f64> = (0..horizon)
            .map(|i| polyval(&coeffs, (n + i) as f64 / scale))
            .collect();

        debug!(degree, r2 = %format!("{r2:.4}"), "Spectral model fitted");
        Ok(ForecastResult::new(
            ModelKind::Spectral,
            non_negative(predictions),
            decayed(r2, horizon, self.config.decay_rate),
            ForecastTier::Primary,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic;
    use std::f64::consts::PI;

    #[test]
    fn test_low_pass_keeps_slow_cycle_and_drops_fast_one() {
        let model = SpectralModel::new(ModelsConfig::default());
        let n = 128;
        let slow: Vec<f64> = (0..n).map(|i| (2.0 * PI * 2.0 * i as f64 / n as f64).sin()).collect();
        let mixed: Vec<f64> = (0..n)
            .map(|i| 10.0 + slow[i] + 0.5 * (2.0 * PI * 40.0 * i as f64 / n as f64).sin())
            .collect();
        let smooth = model.low_pass(&mixed);
        // edges carry some ringing from the endpoint mismatch of the fast cycle
        for i in 10..n - 10 {
            assert!((smooth[i] - (10.0 + slow[i])).abs() < 0.1, "i={i}");
        }
    }

    fn detrending() -> ModelsConfig {
        ModelsConfig {
            spectral_detrend: true,
            ..ModelsConfig::default()
        }
    }

    #[test]
    fn test_detrended_low_pass_preserves_linear_trend() {
        let model = SpectralModel::new(detrending());
        let line: Vec<f64> = (0..100).map(|i| 20.0 + 0.3 * i as f64).collect();
        let smooth = model.low_pass(&line);
        assert!(line.iter().zip(&smooth).all(|(a, b)| (a - b).abs() < 1e-9));
    }

    #[test]
    fn test_raw_low_pass_bends_trend_ends_together() {
        let closes = synthetic::uptrend(300, 4).closes();
        let last = closes[closes.len() - 1];

        let raw = SpectralModel::new(ModelsConfig::default()).low_pass(&closes);
        let detrended = SpectralModel::new(detrending()).low_pass(&closes);

        assert!(raw[299] < last - 30.0, "raw end {} vs close {last}", raw[299]);
        assert!(raw[0] > closes[0] + 30.0, "raw start {}", raw[0]);
        assert!((detrended[299] - last).abs() < 5.0);
        assert!(r_squared(&closes, &raw) < r_squared(&closes, &detrended));
        assert!(r_squared(&closes, &raw) > 0.85);
    }

    #[test]
    fn test_detrended_forecast_follows_trend() {
        let series = synthetic::uptrend(300, 4);
        let result = SpectralModel::new(detrending()).forecast(&series, 10).unwrap();
        assert!(result.predictions[9] > result.predictions[0]);
        assert!(result.confidences[0] > 0.99);
    }

    #[test]
    fn test_sine_series_has_high_confidence() {
        let series = synthetic::range_bound(200, 3);
        let result = SpectralModel::new(ModelsConfig::default())
            .forecast(&series, 15)
            .unwrap();
        assert!(result.is_well_formed(15));
        assert!(result.confidences[0] > 0.7, "{}", result.confidences[0]);
        assert!(result.confidences.windows(2).all(|w| w[1] <= w[0]));
    }
}
