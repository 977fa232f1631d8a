//! Ensemble Combiner - Regime-aware blending of model forecasts
//!
//! Per prediction day:
//! 1. Boost model confidences by regime and horizon position
//! 2. Normalize boosted confidences into weights
//! 3. Blend with the regime prior (0.7/0.3 when the regime is clear, 0.4/0.6 otherwise)
//! 4. Renormalize and take the weighted sum of predictions
//!
//! If blending fails, degrade to a Linear + TimeSeries average, then to a
//! trend extrapolation of the last 10 closes.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use crate::config::{EnsembleConfig, ModelsConfig};
use crate::error::{ForecastError, Result};
use crate::forecast::{decayed, non_negative, sanitize, trend_extrapolation};
use crate::regime::{ModelWeights, Regime, RegimeInfo};
use crate::types::{DegradationWarning, ForecastResult, ModelKind, OhlcvSeries};

/// Regime confidence above which the prior dominates the blend
const CLEAR_REGIME_CONFIDENCE: f64 = 0.7;
const TWO_MODEL_CONFIDENCE: f64 = 0.5;
const TREND_CONFIDENCE: f64 = 0.2;
const TREND_LOOKBACK: usize = 10;

/// Which rung of the degradation ladder produced the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleTier {
    Weighted,
    TwoModelAverage,
    TrendExtrapolation,
}

impl fmt::Display for EnsembleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnsembleTier::Weighted => write!(f, "weighted"),
            EnsembleTier::TwoModelAverage => write!(f, "two_model_average"),
            EnsembleTier::TrendExtrapolation => write!(f, "trend_extrapolation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleResult {
    pub predictions: Vec<f64>,
    pub confidences: Vec<f64>,
    /// Horizon x model weights; columns follow [`ModelKind::index`]
    pub weights: Array2<f64>,
    pub tier: EnsembleTier,
    pub warnings: Vec<DegradationWarning>,
}

impl EnsembleResult {
    pub fn horizon(&self) -> usize {
        self.predictions.len()
    }

    /// Weight of `kind` on day `day`
    pub fn weight(&self, day: usize, kind: ModelKind) -> f64 {
        self.weights[[day, kind.index()]]
    }
}

/// Multiplier applied to a model's confidence on a given day
pub fn confidence_boost(regime: Regime, kind: ModelKind, day: usize, horizon: usize) -> f64 {
    let early = 3 * day < horizon;
    let late = 3 * day >= 2 * horizon;
    match (regime, kind) {
        (Regime::TrendingUp, ModelKind::TimeSeries | ModelKind::Autoregressive) if early => 1.3,
        (Regime::TrendingUp, ModelKind::Linear) if late => 1.4,
        (Regime::TrendingDown, ModelKind::Autoregressive) if early => 1.4,
        (Regime::TrendingDown, ModelKind::Quadratic) if early => 1.2,
        (Regime::TrendingDown, ModelKind::Quadratic) => 1.4,
        (Regime::RangeBound, ModelKind::Spectral) => 1.3,
        (Regime::RangeBound, ModelKind::Quadratic) => 1.2,
        _ => 1.0,
    }
}

fn normalized(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 && total.is_finite() {
        values.iter().map(|v| v / total).collect()
    } else {
        vec![1.0 / values.len() as f64; values.len()]
    }
}

pub struct EnsembleCombiner {
    config: EnsembleConfig,
    models: ModelsConfig,
}

impl EnsembleCombiner {
    pub fn new(config: EnsembleConfig, models: ModelsConfig) -> Self {
        Self { config, models }
    }

    /// Combine model forecasts. Always returns a full-length result.
    pub fn combine(
        &self,
        forecasts: &[ForecastResult],
        regime: &RegimeInfo,
        priors: &ModelWeights,
        series: &OhlcvSeries,
        horizon: usize,
    ) -> EnsembleResult {
        let last = series.last_close();
        let cleaned: Vec<ForecastResult> = forecasts
            .iter()
            .cloned()
            .map(|f| sanitize(f, last, &self.models))
            .collect();

        let error = match self.weighted(&cleaned, regime, priors, horizon) {
            Ok(result) => return result,
            Err(e) => e,
        };
        let first = DegradationWarning::new(
            "ensemble",
            EnsembleTier::TwoModelAverage.to_string(),
            format!("weighted blend failed: {error}"),
        );
        warn!(error = %error, "Ensemble degrading to two-model average");

        match self.two_model_average(&cleaned, horizon) {
            Ok(mut result) => {
                result.warnings.insert(0, first);
                result
            }
            Err(e) => {
                warn!(error = %e, "Ensemble degrading to trend extrapolation");
                let mut result = self.trend(series, horizon);
                result.warnings.insert(0, first);
                result.warnings.insert(
                    1,
                    DegradationWarning::new(
                        "ensemble",
                        EnsembleTier::TrendExtrapolation.to_string(),
                        format!("two-model average failed: {e}"),
                    ),
                );
                result
            }
        }
    }

    fn weighted(
        &self,
        forecasts: &[ForecastResult],
        regime: &RegimeInfo,
        priors: &ModelWeights,
        horizon: usize,
    ) -> Result<EnsembleResult> {
        if horizon == 0 {
            return Err(ForecastError::InvalidHorizon(horizon));
        }
        let mut by_kind: BTreeMap<ModelKind, &ForecastResult> = BTreeMap::new();
        for f in forecasts {
            if !f.is_well_formed(horizon) {
                return Err(ForecastError::Ensemble(format!(
                    "{} forecast has {} predictions for horizon {horizon}",
                    f.model,
                    f.predictions.len()
                )));
            }
            by_kind.insert(f.model, f);
        }
        if by_kind.is_empty() {
            return Err(ForecastError::Ensemble("no model forecasts".into()));
        }

        let present: Vec<&ForecastResult> = by_kind.values().copied().collect();
        let (prior, boost_regime) = if self.config.regime_aware {
            (
                normalized(&present.iter().map(|f| priors.get(f.model)).collect::<Vec<_>>()),
                regime.regime,
            )
        } else {
            (vec![1.0 / present.len() as f64; present.len()], Regime::Unknown)
        };
        let (prior_share, confidence_share) = if regime.confidence > CLEAR_REGIME_CONFIDENCE {
            (0.7, 0.3)
        } else {
            (0.4, 0.6)
        };

        let mut weights = Array2::<f64>::zeros((horizon, ModelKind::COUNT));
        let mut predictions = Vec::with_capacity(horizon);
        let mut confidences = Vec::with_capacity(horizon);

        for day in 0..horizon {
            let boosted: Vec<f64> = present
                .iter()
                .map(|f| f.confidences[day] * confidence_boost(boost_regime, f.model, day, horizon))
                .collect();
            let conf_weights = normalized(&boosted);
            let blended: Vec<f64> = prior
                .iter()
                .zip(&conf_weights)
                .map(|(p, c)| prior_share * p + confidence_share * c)
                .collect();
            let day_weights = normalized(&blended);

            let mut prediction = 0.0;
            for (f, w) in present.iter().zip(&day_weights) {
                weights[[day, f.model.index()]] = *w;
                prediction += w * f.predictions[day];
            }
            let max_raw = present
                .iter()
                .map(|f| f.confidences[day])
                .fold(0.0, f64::max);
            let confidence = 0.7 * max_raw + 0.3 * regime.confidence;

            if !prediction.is_finite() || !confidence.is_finite() {
                return Err(ForecastError::Ensemble(format!("non-finite blend on day {day}")));
            }
            predictions.push(prediction.max(0.0));
            confidences.push(confidence.clamp(0.0, 1.0));
        }

        debug!(
            models = present.len(),
            regime = %regime.regime,
            day1 = %format!("{:.4}", predictions[0]),
            "Ensemble combined"
        );
        Ok(EnsembleResult {
            predictions,
            confidences,
            weights,
            tier: EnsembleTier::Weighted,
            warnings: Vec::new(),
        })
    }

    fn two_model_average(&self, forecasts: &[ForecastResult], horizon: usize) -> Result<EnsembleResult> {
        let find = |kind: ModelKind| {
            forecasts
                .iter()
                .find(|f| f.model == kind && f.is_well_formed(horizon))
                .ok_or_else(|| {
                    ForecastError::Ensemble(format!("no usable {kind} forecast for the average"))
                })
        };
        let linear = find(ModelKind::Linear)?;
        let ts = find(ModelKind::TimeSeries)?;

        let mut weights = Array2::<f64>::zeros((horizon, ModelKind::COUNT));
        for day in 0..horizon {
            weights[[day, ModelKind::Linear.index()]] = 0.5;
            weights[[day, ModelKind::TimeSeries.index()]] = 0.5;
        }
        Ok(EnsembleResult {
            predictions: (0..horizon)
                .map(|i| ((linear.predictions[i] + ts.predictions[i]) / 2.0).max(0.0))
                .collect(),
            confidences: decayed(TWO_MODEL_CONFIDENCE, horizon, self.models.decay_rate),
            weights,
            tier: EnsembleTier::TwoModelAverage,
            warnings: Vec::new(),
        })
    }

    /// Last rung; cannot fail. The whole weight goes to the linear column.
    fn trend(&self, series: &OhlcvSeries, horizon: usize) -> EnsembleResult {
        let mut weights = Array2::<f64>::zeros((horizon, ModelKind::COUNT));
        for day in 0..horizon {
            weights[[day, ModelKind::Linear.index()]] = 1.0;
        }
        EnsembleResult {
            predictions: non_negative(trend_extrapolation(&series.closes(), TREND_LOOKBACK, horizon)),
            confidences: decayed(TREND_CONFIDENCE, horizon, self.models.decay_rate),
            weights,
            tier: EnsembleTier::TrendExtrapolation,
            warnings: Vec::new(),
        }
    }
}
