//! Linear regression over the engineered feature matrix

use ndarray::s;
use tracing::{debug, warn};

use super::regression::{select_and_fit, Regressor};
use super::{
    decayed, non_negative, trend_extrapolation, ForecastModel, FALLBACK_CONFIDENCE, FLAT_CONFIDENCE,
};
use crate::config::ModelsConfig;
use crate::error::{ForecastError, Result};
use crate::features::FeatureBuilder;
use crate::types::{ForecastResult, ForecastTier, ModelKind, OhlcvSeries};

const CANDIDATES: [Regressor; 3] = [
    Regressor::Ols,
    Regressor::Ridge { alpha: 1.0 },
    Regressor::Lasso { alpha: 0.1 },
];

/// Predicts the next close from today's features.
///
/// The last feature row is re-fed for every day of the horizon, so the path is
/// a flat repeat of the one-step prediction; confidence decay accounts for it.
pub struct LinearModel {
    features: FeatureBuilder,
    config: ModelsConfig,
}

impl LinearModel {
    pub fn new(features: FeatureBuilder, config: ModelsConfig) -> Self {
        Self { features, config }
    }

    fn fit_and_predict(&self, series: &OhlcvSeries) -> Result<(f64, f64)> {
        let matrix = self.features.build(series)?;
        let closes = series.closes();
        let n = matrix.n_rows();
        if n < 2 {
            return Err(ForecastError::fit(ModelKind::Linear, "feature matrix has a single row"));
        }

        // Row r predicts the close of the bar after it; the last row has no target
        let x = matrix.values().slice(s![..n - 1, ..]).to_owned();
        let y: Vec<f64> = matrix.source_index()[..n - 1]
            .iter()
            .map(|&i| closes[i + 1])
            .collect();

        let fit = select_and_fit(&CANDIDATES, &x, &y, self.config.cv_folds, ModelKind::Linear)?;
        let last = matrix
            .last_row()
            .ok_or_else(|| ForecastError::fit(ModelKind::Linear, "empty feature matrix"))?;
        let next = fit.predict_row(last)?;
        debug!(
            regressor = %fit.regressor,
            cv_r2 = %format!("{:.4}", fit.cv_score),
            next = %format!("{next:.4}"),
            "Linear model fitted"
        );
        Ok((next, fit.cv_score))
    }
}

impl ForecastModel for LinearModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn forecast(&self, series: &OhlcvSeries, horizon: usize) -> Result<ForecastResult> {
        match self.fit_and_predict(series) {
            Ok((next, score)) => Ok(ForecastResult::new(
                ModelKind::Linear,
                vec![next.max(0.0); horizon],
                decayed(score, horizon, self.config.decay_rate),
                ForecastTier::Primary,
            )),
            Err(e) => {
                let closes = series.closes();
                if closes.len() < 2 {
                    warn!(error = %e, "Linear model has no trend to extrapolate, using flat forecast");
                    return Ok(ForecastResult::new(
                        ModelKind::Linear,
                        vec![series.last_close(); horizon],
                        vec![FLAT_CONFIDENCE; horizon],
                        ForecastTier::Flat,
                    ));
                }
                warn!(error = %e, "Linear model falling back to trend extrapolation");
                Ok(ForecastResult::new(
                    ModelKind::Linear,
                    non_negative(trend_extrapolation(&closes, self.config.trend_lookback, horizon)),
                    decayed(FALLBACK_CONFIDENCE, horizon, self.config.decay_rate),
                    ForecastTier::Fallback,
                ))
            }
        }
    }
}
