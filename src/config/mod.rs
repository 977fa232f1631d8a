//! Configuration management for StockSense
//!
//! Loads from optional `config/default` / `config/local` files plus
//! `STOCKSENSE__*` environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::prediction::TrainingPeriod;
use crate::types::ModelKind;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub features: FeatureConfig,
    pub regime: RegimeConfig,
    pub models: ModelsConfig,
    pub ensemble: EnsembleConfig,
    pub prediction: PredictionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Rolling window sizes
    pub windows: Vec<usize>,
    /// Add day-of-week / month cyclical encodings
    pub calendar_features: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            windows: vec![5, 10, 20, 30],
            calendar_features: true,
        }
    }
}

impl FeatureConfig {
    pub fn max_window(&self) -> usize {
        self.windows.iter().copied().max().unwrap_or(0)
    }

    /// Minimum series length accepted by the feature builder
    pub fn min_rows(&self) -> usize {
        self.max_window() + 10
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Long SMA window
    pub long_window: usize,
    /// Short SMA window
    pub short_window: usize,
    /// ATR window
    pub atr_window: usize,
    /// Trend-strength threshold (percent units)
    pub threshold: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            long_window: 50,
            short_window: 10,
            atr_window: 14,
            threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Per-day exponential confidence decay rate
    pub decay_rate: f64,
    /// Folds for time-series cross-validation
    pub cv_folds: usize,
    /// Low-frequency components kept by the spectral filter
    pub harmonics: usize,
    /// Remove the endpoint line before the spectral low-pass
    pub spectral_detrend: bool,
    /// Upper bound on the spectral extrapolation polynomial degree
    pub max_poly_degree: usize,
    /// ARIMA order search bounds
    pub arima_max_p: usize,
    pub arima_max_q: usize,
    /// Wall-clock budget for the ARIMA order search. Off by default: with a
    /// budget the chosen order depends on machine load, so repeated runs on
    /// the same input may differ. The (p, q) grid bounds the search either way.
    pub arima_budget_ms: Option<u64>,
    /// Lagged closes used by the time-series regression
    pub lag_count: usize,
    /// Mean prediction / last price ratio above which output is rescaled
    pub outlier_ratio: f64,
    /// Daily deltas used by the linear trend fallback
    pub trend_lookback: usize,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.05,
            cv_folds: 5,
            harmonics: 10,
            spectral_detrend: false,
            max_poly_degree: 5,
            arima_max_p: 2,
            arima_max_q: 2,
            arima_budget_ms: None,
            lag_count: 5,
            outlier_ratio: 5.0,
            trend_lookback: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Use regime priors and regime-dependent confidence boosts
    pub regime_aware: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self { regime_aware: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Forecast horizon in days
    pub horizon: usize,
    /// History window used for fitting
    pub training_period: TrainingPeriod,
    /// Models to run
    pub models: Vec<ModelKind>,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            horizon: 30,
            training_period: TrainingPeriod::Full,
            models: ModelKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON log lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Features defaults
            .set_default("features.windows", vec![5, 10, 20, 30])?
            .set_default("features.calendar_features", true)?
            // Regime defaults
            .set_default("regime.long_window", 50)?
            .set_default("regime.short_window", 10)?
            .set_default("regime.atr_window", 14)?
            .set_default("regime.threshold", 0.05)?
            // Model defaults
            .set_default("models.decay_rate", 0.05)?
            .set_default("models.cv_folds", 5)?
            .set_default("models.harmonics", 10)?
            .set_default("models.spectral_detrend", false)?
            .set_default("models.max_poly_degree", 5)?
            .set_default("models.arima_max_p", 2)?
            .set_default("models.arima_max_q", 2)?
            .set_default("models.lag_count", 5)?
            .set_default("models.outlier_ratio", 5.0)?
            .set_default("models.trend_lookback", 30)?
            // Ensemble defaults
            .set_default("ensemble.regime_aware", true)?
            // Prediction defaults
            .set_default("prediction.horizon", 30)?
            .set_default("prediction.training_period", "full")?
            .set_default(
                "prediction.models",
                vec!["linear", "quadratic", "spectral", "autoregressive", "time_series"],
            )?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (STOCKSENSE__*)
            .add_source(Environment::with_prefix("STOCKSENSE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.features.windows.is_empty() || self.features.windows.contains(&0) {
            bail!("features.windows must be a non-empty list of positive window sizes");
        }
        if self.regime.short_window == 0 || self.regime.short_window >= self.regime.long_window {
            bail!(
                "regime.short_window ({}) must be positive and below regime.long_window ({})",
                self.regime.short_window,
                self.regime.long_window
            );
        }
        if self.regime.atr_window == 0 {
            bail!("regime.atr_window must be positive");
        }
        if self.regime.threshold <= 0.0 {
            bail!("regime.threshold must be positive");
        }
        if self.models.cv_folds < 2 {
            bail!("models.cv_folds must be at least 2");
        }
        if self.models.decay_rate < 0.0 {
            bail!("models.decay_rate must not be negative");
        }
        if self.models.outlier_ratio <= 1.0 {
            bail!("models.outlier_ratio must exceed 1.0");
        }
        if self.models.trend_lookback == 0 || self.models.lag_count == 0 {
            bail!("models.trend_lookback and models.lag_count must be positive");
        }
        if self.prediction.horizon == 0 {
            bail!("prediction.horizon must be positive");
        }
        if self.prediction.models.is_empty() {
            bail!("prediction.models must name at least one model");
        }
        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "horizon={} period={} models={:?} windows={:?} regime=({}/{}/{} th={}) regime_aware={}",
            self.prediction.horizon,
            self.prediction.training_period,
            self.prediction
                .models
                .iter()
                .map(|m| m.short_name())
                .collect::<Vec<_>>(),
            self.features.windows,
            self.regime.short_window,
            self.regime.long_window,
            self.regime.atr_window,
            self.regime.threshold,
            self.ensemble.regime_aware
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
