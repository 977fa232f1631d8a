//! Prediction Service - End-to-end forecasting pipeline
//!
//! Flow per request:
//! 1. Trim the series to the configured training period
//! 2. Classify the market regime
//! 3. Run every configured model, substituting a flat stand-in for any that
//!    fails or returns a malformed path
//! 4. Blend the forecasts with the regime-aware ensemble
//! 5. Derive dates, bands, metrics, signal and trajectory for display
//!
//! Each request is independent; nothing is cached between calls.

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::data::synthetic::business_days_after;
use crate::ensemble::{EnsembleCombiner, EnsembleResult};
use crate::error::{ForecastError, Result};
use crate::forecast::{build_models, sanitize, ForecastModel};
use crate::regime::{ModelWeights, RegimeClassifier, RegimeInfo};
use crate::types::{DegradationWarning, ForecastResult, ModelKind, OhlcvSeries};

pub mod analysis;

pub use analysis::{
    confidence_bands, ConfidenceBand, ForecastMetrics, HorizonOutlook, Signal, TrajectoryAnalysis,
    TrajectoryPattern,
};

/// History window used for fitting, counted back from the last bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum TrainingPeriod {
    #[default]
    #[serde(rename = "full")]
    #[value(name = "full")]
    Full,
    #[serde(rename = "1y")]
    #[value(name = "1y")]
    OneYear,
    #[serde(rename = "6m")]
    #[value(name = "6m")]
    SixMonths,
    #[serde(rename = "3m")]
    #[value(name = "3m")]
    ThreeMonths,
}

impl TrainingPeriod {
    /// Calendar days kept, `None` for the full history
    pub fn days(&self) -> Option<i64> {
        match self {
            TrainingPeriod::Full => None,
            TrainingPeriod::OneYear => Some(365),
            TrainingPeriod::SixMonths => Some(180),
            TrainingPeriod::ThreeMonths => Some(90),
        }
    }

    pub fn apply(&self, series: &OhlcvSeries) -> OhlcvSeries {
        match self.days() {
            None => series.clone(),
            Some(days) => {
                let start = series.last_date() - chrono::Duration::days(days);
                // The last bar always survives, so `since` is never empty here
                series.since(start).unwrap_or_else(|| series.clone())
            }
        }
    }
}

impl fmt::Display for TrainingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingPeriod::Full => write!(f, "full"),
            TrainingPeriod::OneYear => write!(f, "1y"),
            TrainingPeriod::SixMonths => write!(f, "6m"),
            TrainingPeriod::ThreeMonths => write!(f, "3m"),
        }
    }
}

/// Everything a caller needs to display one forecast request
#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    pub last_date: NaiveDate,
    pub last_close: f64,
    pub horizon: usize,
    pub training_period: TrainingPeriod,
    pub bars_used: usize,
    pub forecast_dates: Vec<NaiveDate>,
    pub regime: RegimeInfo,
    pub regime_description: String,
    pub preferred_models: Vec<ModelKind>,
    pub forecasts: Vec<ForecastResult>,
    pub ensemble: EnsembleResult,
    pub bands: Vec<ConfidenceBand>,
    pub metrics: ForecastMetrics,
    pub signal: Signal,
    pub trajectory: Option<TrajectoryAnalysis>,
    pub warnings: Vec<DegradationWarning>,
}

impl PredictionReport {
    pub fn forecast(&self, kind: ModelKind) -> Option<&ForecastResult> {
        self.forecasts.iter().find(|f| f.model == kind)
    }

    /// True when any model or the ensemble used a fallback tier
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

pub struct PredictionService {
    config: AppConfig,
    classifier: RegimeClassifier,
    combiner: EnsembleCombiner,
    models: Vec<Box<dyn ForecastModel>>,
}

impl PredictionService {
    /// Service running the models named in `config.prediction.models`
    pub fn new(config: AppConfig) -> Self {
        let models = build_models(&config.prediction.models, &config);
        Self::with_models(config, models)
    }

    /// Service running a caller-supplied model set
    pub fn with_models(config: AppConfig, models: Vec<Box<dyn ForecastModel>>) -> Self {
        Self {
            classifier: RegimeClassifier::new(config.regime.clone()),
            combiner: EnsembleCombiner::new(config.ensemble.clone(), config.models.clone()),
            models,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn model_kinds(&self) -> Vec<ModelKind> {
        self.models.iter().map(|m| m.kind()).collect()
    }

    /// Forecast with the configured horizon
    pub fn predict(&self, series: &OhlcvSeries) -> Result<PredictionReport> {
        self.predict_with_horizon(series, self.config.prediction.horizon)
    }

    pub fn predict_with_horizon(
        &self,
        series: &OhlcvSeries,
        horizon: usize,
    ) -> Result<PredictionReport> {
        if horizon == 0 {
            return Err(ForecastError::InvalidHorizon(horizon));
        }
        let started = Instant::now();
        let period = self.config.prediction.training_period;
        let training = period.apply(series);
        let last_close = training.last_close();

        let regime = self.classifier.classify(&training);
        info!(
            bars = training.len(),
            period = %period,
            regime = %regime.regime,
            confidence = %format!("{:.2}", regime.confidence),
            "Regime classified"
        );

        let mut warnings = Vec::new();
        let forecasts: Vec<ForecastResult> = self
            .models
            .iter()
            .map(|model| self.run_model(model.as_ref(), &training, horizon, &mut warnings))
            .collect();

        let priors = if self.config.ensemble.regime_aware {
            regime.regime.recommended_settings().weights
        } else {
            ModelWeights::uniform()
        };
        let ensemble = self
            .combiner
            .combine(&forecasts, &regime, &priors, &training, horizon);
        warnings.extend(ensemble.warnings.iter().cloned());

        let forecast_dates = business_days_after(training.last_date(), horizon);
        let bands = confidence_bands(&forecast_dates, &ensemble.predictions, &ensemble.confidences);
        let metrics = ForecastMetrics::compute(last_close, &ensemble.predictions, &ensemble.confidences);
        let signal = Signal::from_forecast(
            metrics.price_change_pct,
            metrics.average_confidence,
            regime.regime,
        );
        let trajectory = TrajectoryAnalysis::analyze(last_close, &ensemble.predictions, regime.regime);

        info!(
            horizon,
            models = forecasts.len(),
            tier = %ensemble.tier,
            end_price = %format!("{:.2}", metrics.end_price),
            change_pct = %format!("{:.2}", metrics.price_change_pct),
            signal = %signal,
            warnings = warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Prediction complete"
        );

        Ok(PredictionReport {
            last_date: training.last_date(),
            last_close,
            horizon,
            training_period: period,
            bars_used: training.len(),
            forecast_dates,
            regime_description: regime.regime.description().to_string(),
            preferred_models: regime.regime.preferred_models().to_vec(),
            regime,
            forecasts,
            ensemble,
            bands,
            metrics,
            signal,
            trajectory,
            warnings,
        })
    }

    /// Run one model; failures and malformed output become a substitute
    fn run_model(
        &self,
        model: &dyn ForecastModel,
        series: &OhlcvSeries,
        horizon: usize,
        warnings: &mut Vec<DegradationWarning>,
    ) -> ForecastResult {
        let kind = model.kind();
        let last_close = series.last_close();
        let result = match model.forecast(series, horizon) {
            Ok(result) if result.model == kind && result.is_well_formed(horizon) => result,
            Ok(result) => {
                let message = format!(
                    "malformed output ({} predictions, {} confidences for horizon {horizon})",
                    result.predictions.len(),
                    result.confidences.len()
                );
                warn!(model = %kind, "{message}, substituting last price");
                warnings.push(DegradationWarning::new(kind.short_name(), "substitute", message));
                return ForecastResult::substitute(kind, last_close, horizon);
            }
            Err(e) => {
                warn!(model = %kind, error = %e, "Model failed, substituting last price");
                warnings.push(DegradationWarning::new(kind.short_name(), "substitute", e.to_string()));
                return ForecastResult::substitute(kind, last_close, horizon);
            }
        };

        if result.tier.is_degraded() {
            warnings.push(DegradationWarning::new(
                kind.short_name(),
                format!("{:?}", result.tier).to_lowercase(),
                format!("{kind} used its {:?} path", result.tier).to_lowercase(),
            ));
        }
        let result = sanitize(result, last_close, &self.config.models);
        if result.rescaled {
            warnings.push(DegradationWarning::new(
                kind.short_name(),
                "rescaled",
                "mean prediction exceeded the outlier ratio; output rescaled and confidence halved",
            ));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic;
    use crate::forecast::QuadraticModel;
    use crate::types::ForecastTier;

    #[test]
    fn test_training_period_trims_history() {
        let series = synthetic::uptrend(400, 1);
        // 400 business days span well over a year
        let year = TrainingPeriod::OneYear.apply(&series);
        assert!(year.len() < series.len());
        assert!(year.len() >= 250);
        assert_eq!(year.last_date(), series.last_date());
        assert_eq!(TrainingPeriod::Full.apply(&series).len(), 400);
        assert_eq!(TrainingPeriod::ThreeMonths.to_string(), "3m");
    }

    #[test]
    fn test_training_period_names() {
        let parsed: TrainingPeriod = serde_json::from_str("\"6m\"").unwrap();
        assert_eq!(parsed, TrainingPeriod::SixMonths);
        assert_eq!(TrainingPeriod::from_str("1y", true).unwrap(), TrainingPeriod::OneYear);
    }

    #[test]
    fn test_zero_horizon_is_rejected() {
        let service = PredictionService::new(AppConfig::default());
        let err = service
            .predict_with_horizon(&synthetic::uptrend(100, 1), 0)
            .unwrap_err();
        assert_eq!(err, ForecastError::InvalidHorizon(0));
    }

    #[test]
    fn test_quadratic_only_service() {
        let service =
            PredictionService::with_models(AppConfig::default(), vec![Box::new(QuadraticModel)]);
        let series = synthetic::uptrend(120, 4);
        let report = service.predict_with_horizon(&series, 10).unwrap();
        assert_eq!(report.forecasts.len(), 1);
        assert_eq!(report.forecast_dates.len(), 10);
        assert_eq!(report.bands.len(), 10);
        assert!(report.forecast_dates[0] > series.last_date());
        assert_eq!(report.forecast(ModelKind::Quadratic).unwrap().tier, ForecastTier::Primary);
        for day in 0..10 {
            assert!((report.ensemble.weight(day, ModelKind::Quadratic) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_failed_model_is_substituted_with_warning() {
        let service =
            PredictionService::with_models(AppConfig::default(), vec![Box::new(QuadraticModel)]);
        let series = synthetic::uptrend(2, 4);
        let report = service.predict_with_horizon(&series, 5).unwrap();
        let quad = report.forecast(ModelKind::Quadratic).unwrap();
        assert_eq!(quad.tier, ForecastTier::Substitute);
        assert_eq!(quad.predictions, vec![series.last_close(); 5]);
        assert!(report.is_degraded());
        assert_eq!(report.warnings[0].source, "quadratic");
    }
}
