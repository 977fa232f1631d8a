//! Hybrid of the ARIMA forecaster and a lagged-close ridge regression
//!
//! Each day blends the two branches with weights proportional to their
//! confidence for that day. When the regression branch cannot be fitted the
//! ARIMA path is returned on its own.

use ndarray::{concatenate, s, Array1, Array2, Axis};
use tracing::{debug, warn};

use super::arima::ArimaModel;
use super::regression::{select_and_fit, Regressor};
use super::{decayed, non_negative, ForecastModel};
use crate::config::ModelsConfig;
use crate::error::{ForecastError, Result};
use crate::features::FeatureBuilder;
use crate::types::{ForecastResult, ForecastTier, ModelKind, OhlcvSeries};

const RIDGE_ALPHAS: [f64; 3] = [0.1, 1.0, 10.0];

pub struct TimeSeriesModel {
    features: FeatureBuilder,
    config: ModelsConfig,
    arima: ArimaModel,
}

impl TimeSeriesModel {
    pub fn new(features: FeatureBuilder, config: ModelsConfig) -> Self {
        Self {
            features,
            arima: ArimaModel::new(config.clone()),
            config,
        }
    }

    /// Ridge path over features plus lagged closes. Lags roll forward with the
    /// model's own predictions; the other features stay at the last row.
    fn regression_branch(&self, series: &OhlcvSeries, horizon: usize) -> Result<ForecastResult> {
        let lags = self.config.lag_count;
        let matrix = self.features.build(series)?;
        let closes = series.closes();
        let index = matrix.source_index();
        let n = matrix.n_rows();
        if n < 2 || index[0] + 1 < lags {
            return Err(ForecastError::fit(ModelKind::TimeSeries, "not enough rows for lags"));
        }

        // lag_k at row t is close[t - k + 1], k = 1..=lags
        let lag_block = Array2::from_shape_fn((n, lags), |(r, k)| closes[index[r] - k]);
        let full = concatenate(Axis(1), &[matrix.values().view(), lag_block.view()])
            .map_err(|e| ForecastError::fit(ModelKind::TimeSeries, e.to_string()))?;

        let x = full.slice(s![..n - 1, ..]).to_owned();
        let y: Vec<f64> = index[..n - 1].iter().map(|&i| closes[i + 1]).collect();
        let candidates: Vec<Regressor> = RIDGE_ALPHAS
            .iter()
            .map(|&alpha| Regressor::Ridge { alpha })
            .collect();
        let fit = select_and_fit(&candidates, &x, &y, self.config.cv_folds, ModelKind::TimeSeries)?;

        let n_features = matrix.n_features();
        let mut row: Array1<f64> = full.row(n - 1).to_owned();
        let mut predictions = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let next = fit.predict_row(row.view())?;
            predictions.push(next);
            for k in (1..lags).rev() {
                row[n_features + k] = row[n_features + k - 1];
            }
            row[n_features] = next;
        }

        debug!(
            regressor = %fit.regressor,
            cv_r2 = %format!("{:.4}", fit.cv_score),
            "Time series regression fitted"
        );
        Ok(ForecastResult::new(
            ModelKind::TimeSeries,
            non_negative(predictions),
            decayed(fit.cv_score, horizon, self.config.decay_rate),
            ForecastTier::Primary,
        ))
    }
}

/// Confidence-weighted blend per day; the day's confidence is the larger of the two
pub fn blend(a: &ForecastResult, b: &ForecastResult) -> (Vec<f64>, Vec<f64>) {
    a.predictions
        .iter()
        .zip(&a.confidences)
        .zip(b.predictions.iter().zip(&b.confidences))
        .map(|((pa, ca), (pb, cb))| {
            let total = ca + cb;
            let pred = if total > 0.0 {
                (pa * ca + pb * cb) / total
            } else {
                (pa + pb) / 2.0
            };
            (pred, ca.max(*cb))
        })
        .unzip()
}

impl ForecastModel for TimeSeriesModel {
    fn kind(&self) -> ModelKind {
        ModelKind::TimeSeries
    }

    fn forecast(&self, series: &OhlcvSeries, horizon: usize) -> Result<ForecastResult> {
        let arima = self.arima.forecast(series, horizon)?;
        match self.regression_branch(series, horizon) {
            Ok(regression) => {
                let (predictions, confidences) = blend(&arima, &regression);
                // Degraded only if ARIMA itself degraded
                let tier = if arima.tier.is_degraded() {
                    ForecastTier::Fallback
                } else {
                    ForecastTier::Primary
                };
                Ok(ForecastResult::new(ModelKind::TimeSeries, predictions, confidences, tier))
            }
            Err(e) => {
                warn!(error = %e, "Time series regression failed, using ARIMA branch only");
                Ok(ForecastResult {
                    model: ModelKind::TimeSeries,
                    tier: ForecastTier::Fallback,
                    ..arima
                })
            }
        }
    }
}
