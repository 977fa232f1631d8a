//! Forecast Models - Five interchangeable point forecasters
//!
//! Every variant implements [`ForecastModel`] and returns a day-by-day price
//! path with a parallel confidence path. Each model absorbs its own fit
//! failures through a fallback ladder and reports the tier it ended on.

use crate::config::{AppConfig, ModelsConfig};
use crate::error::Result;
use crate::features::{rolling, FeatureBuilder};
use crate::types::{ForecastResult, ModelKind, OhlcvSeries};

pub mod arima;
pub mod linear;
pub mod numeric;
pub mod quadratic;
pub mod regression;
pub mod spectral;
pub mod time_series;

pub use arima::ArimaModel;
pub use linear::LinearModel;
pub use quadratic::QuadraticModel;
pub use spectral::SpectralModel;
pub use time_series::TimeSeriesModel;

/// Base confidence of the naive trend and smoothing fallbacks
pub const FALLBACK_CONFIDENCE: f64 = 0.3;
/// Confidence of a flat last-price forecast
pub const FLAT_CONFIDENCE: f64 = 0.1;

/// Trait for all forecast models
pub trait ForecastModel {
    fn kind(&self) -> ModelKind;

    /// Forecast `horizon` days past the last bar
    fn forecast(&self, series: &OhlcvSeries, horizon: usize) -> Result<ForecastResult>;
}

/// Build the requested model set
pub fn build_models(kinds: &[ModelKind], config: &AppConfig) -> Vec<Box<dyn ForecastModel>> {
    kinds
        .iter()
        .map(|kind| -> Box<dyn ForecastModel> {
            let models = config.models.clone();
            let features = FeatureBuilder::new(config.features.clone());
            match kind {
                ModelKind::Linear => Box::new(LinearModel::new(features, models)),
                ModelKind::Quadratic => Box::new(QuadraticModel),
                ModelKind::Spectral => Box::new(SpectralModel::new(models)),
                ModelKind::Autoregressive => Box::new(ArimaModel::new(models)),
                ModelKind::TimeSeries => Box::new(TimeSeriesModel::new(features, models)),
            }
        })
        .collect()
}

/// `base * exp(-rate * i)` for `i` in `0..horizon`
pub fn decayed(base: f64, horizon: usize, rate: f64) -> Vec<f64> {
    let base = base.clamp(0.0, 1.0);
    (0..horizon).map(|i| base * (-rate * i as f64).exp()).collect()
}

/// Clamp a predicted price path at zero
pub fn non_negative(predictions: Vec<f64>) -> Vec<f64> {
    predictions.into_iter().map(|p| p.max(0.0)).collect()
}

/// Last close plus the mean of the last `lookback` daily deltas per day
pub fn trend_extrapolation(closes: &[f64], lookback: usize, horizon: usize) -> Vec<f64> {
    let last = closes.last().copied().unwrap_or(0.0);
    let start = closes.len().saturating_sub(lookback + 1);
    let deltas = rolling::diff(&closes[start..], 1);
    let slope = if deltas.len() > 1 {
        rolling::mean(&deltas[1..])
    } else {
        0.0
    };
    (0..horizon).map(|i| last + slope * (i + 1) as f64).collect()
}

/// Apply the shared numeric policy to a model's output.
///
/// Non-finite values become the last price, predictions are clamped at zero,
/// and a forecast whose mean exceeds `outlier_ratio` times the last price is
/// divided by that ratio with its confidences halved.
pub fn sanitize(mut result: ForecastResult, last_price: f64, models: &ModelsConfig) -> ForecastResult {
    for p in result.predictions.iter_mut() {
        if !p.is_finite() {
            *p = last_price;
        }
        *p = p.max(0.0);
    }
    for c in result.confidences.iter_mut() {
        *c = if c.is_finite() { c.clamp(0.0, 1.0) } else { 0.0 };
    }

    if last_price > 0.0 {
        let ratio = result.mean_prediction() / last_price;
        if ratio > models.outlier_ratio {
            tracing::warn!(
                model = %result.model,
                ratio = %format!("{ratio:.2}"),
                "Rescaling outlier forecast"
            );
            for p in result.predictions.iter_mut() {
                *p /= ratio;
            }
            for c in result.confidences.iter_mut() {
                *c *= 0.5;
            }
            result.rescaled = true;
        }
    }
    result
}
