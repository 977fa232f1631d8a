//! Core types used throughout StockSense
//!
//! Defines the OHLCV input series, the forecast model catalogue and the
//! per-model forecast output shared by every component.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ForecastError, Result};

/// Daily OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// High minus low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    fn validate(&self, index: usize) -> Result<()> {
        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        for (name, value) in prices {
            if !value.is_finite() || value <= 0.0 {
                return Err(ForecastError::InvalidBar {
                    index,
                    reason: format!("{name} must be a positive finite price, got {value}"),
                });
            }
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(ForecastError::InvalidBar {
                index,
                reason: format!("volume must be non-negative, got {}", self.volume),
            });
        }
        if self.high < self.low {
            return Err(ForecastError::InvalidBar {
                index,
                reason: format!("high {} is below low {}", self.high, self.low),
            });
        }
        Ok(())
    }
}

/// Validated, date-ordered OHLCV series.
///
/// Dates are strictly increasing, prices are positive and volume is
/// non-negative. The core only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OhlcvSeries {
    bars: Vec<Bar>,
}

impl OhlcvSeries {
    pub fn new(bars: Vec<Bar>) -> Result<Self> {
        if bars.is_empty() {
            return Err(ForecastError::EmptySeries);
        }
        for (i, bar) in bars.iter().enumerate() {
            bar.validate(i)?;
            if i > 0 && bar.date <= bars[i - 1].date {
                return Err(ForecastError::UnorderedDates { index: i });
            }
        }
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last_close(&self) -> f64 {
        // Non-empty by construction
        self.bars[self.bars.len() - 1].close
    }

    pub fn last_date(&self) -> NaiveDate {
        self.bars[self.bars.len() - 1].date
    }

    /// Bars dated on or after `start`. Returns `None` when nothing remains.
    pub fn since(&self, start: NaiveDate) -> Option<Self> {
        let bars: Vec<Bar> = self
            .bars
            .iter()
            .filter(|b| b.date >= start)
            .copied()
            .collect();
        if bars.is_empty() {
            None
        } else {
            Some(Self { bars })
        }
    }
}

/// The five forecast model variants
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Linear,
    Quadratic,
    Spectral,
    Autoregressive,
    TimeSeries,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::Linear,
        ModelKind::Quadratic,
        ModelKind::Spectral,
        ModelKind::Autoregressive,
        ModelKind::TimeSeries,
    ];

    pub const COUNT: usize = 5;

    /// Column of this model in the ensemble weight matrix
    pub fn index(&self) -> usize {
        match self {
            ModelKind::Linear => 0,
            ModelKind::Quadratic => 1,
            ModelKind::Spectral => 2,
            ModelKind::Autoregressive => 3,
            ModelKind::TimeSeries => 4,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::Quadratic => "quadratic",
            ModelKind::Spectral => "spectral",
            ModelKind::Autoregressive => "arima",
            ModelKind::TimeSeries => "time_series",
        }
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    /// Parse from short or display name
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "linear" | "linear_regression" => Ok(ModelKind::Linear),
            "quadratic" | "quadratic_regression" => Ok(ModelKind::Quadratic),
            "spectral" | "fourier" | "fourier_transform" => Ok(ModelKind::Spectral),
            "arima" | "autoregressive" => Ok(ModelKind::Autoregressive),
            "time_series" | "timeseries" => Ok(ModelKind::TimeSeries),
            _ => Err(ForecastError::UnknownModel(s.to_string())),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Linear => write!(f, "Linear Regression"),
            ModelKind::Quadratic => write!(f, "Quadratic Regression"),
            ModelKind::Spectral => write!(f, "Fourier Transform"),
            ModelKind::Autoregressive => write!(f, "ARIMA"),
            ModelKind::TimeSeries => write!(f, "Time Series"),
        }
    }
}

/// Which rung of a fallback ladder produced a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastTier {
    /// The model's own algorithm
    Primary,
    /// The model's simpler fallback (trend extrapolation, smoothing, single branch)
    Fallback,
    /// Flat last-price prediction after every fit attempt failed
    Flat,
    /// Stand-in inserted by the orchestrator because the model errored
    Substitute,
}

impl ForecastTier {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, ForecastTier::Primary)
    }
}

/// Day-by-day forecast from a single model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub model: ModelKind,
    pub predictions: Vec<f64>,
    pub confidences: Vec<f64>,
    pub tier: ForecastTier,
    /// Output was scaled down by the outlier guard
    pub rescaled: bool,
}

impl ForecastResult {
    pub fn new(
        model: ModelKind,
        predictions: Vec<f64>,
        confidences: Vec<f64>,
        tier: ForecastTier,
    ) -> Self {
        Self {
            model,
            predictions,
            confidences,
            tier,
            rescaled: false,
        }
    }

    /// Constant last-price stand-in for a model that failed outright
    pub fn substitute(model: ModelKind, last_price: f64, horizon: usize) -> Self {
        Self::new(
            model,
            vec![last_price; horizon],
            vec![SUBSTITUTE_CONFIDENCE; horizon],
            ForecastTier::Substitute,
        )
    }

    pub fn horizon(&self) -> usize {
        self.predictions.len()
    }

    pub fn mean_prediction(&self) -> f64 {
        if self.predictions.is_empty() {
            return 0.0;
        }
        self.predictions.iter().sum::<f64>() / self.predictions.len() as f64
    }

    pub fn is_well_formed(&self, horizon: usize) -> bool {
        self.predictions.len() == horizon
            && self.confidences.len() == horizon
            && self.predictions.iter().all(|p| p.is_finite())
            && self.confidences.iter().all(|c| c.is_finite())
    }
}

/// Confidence assigned to a substituted model
pub const SUBSTITUTE_CONFIDENCE: f64 = 0.2;

/// Non-fatal notice that a fallback tier was used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationWarning {
    /// Model name, or "ensemble"
    pub source: String,
    pub tier: String,
    pub message: String,
}

impl DegradationWarning {
    pub fn new(source: impl Into<String>, tier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            tier: tier.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DegradationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}", self.source, self.tier, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(n as i64)
    }

    #[test]
    fn test_series_validation() {
        let ok = OhlcvSeries::new(vec![
            Bar::new(day(0), 10.0, 11.0, 9.0, 10.5, 1000.0),
            Bar::new(day(1), 10.5, 11.5, 10.0, 11.0, 0.0),
        ]);
        assert!(ok.is_ok());
        assert_eq!(ok.unwrap().last_close(), 11.0);

        assert_eq!(OhlcvSeries::new(vec![]), Err(ForecastError::EmptySeries));

        let dup = OhlcvSeries::new(vec![
            Bar::new(day(0), 10.0, 11.0, 9.0, 10.5, 1000.0),
            Bar::new(day(0), 10.5, 11.5, 10.0, 11.0, 1000.0),
        ]);
        assert_eq!(dup, Err(ForecastError::UnorderedDates { index: 1 }));

        let negative = OhlcvSeries::new(vec![Bar::new(day(0), 10.0, 11.0, 9.0, -1.0, 1.0)]);
        assert!(matches!(negative, Err(ForecastError::InvalidBar { index: 0, .. })));
    }

    #[test]
    fn test_model_kind_names() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.short_name().parse::<ModelKind>(), Ok(kind));
            assert_eq!(kind.to_string().parse::<ModelKind>(), Ok(kind));
        }
        assert_eq!("Fourier".parse::<ModelKind>(), Ok(ModelKind::Spectral));
        assert_eq!(
            "lstm".parse::<ModelKind>(),
            Err(ForecastError::UnknownModel("lstm".into()))
        );

        let indices: Vec<usize> = ModelKind::ALL.iter().map(|k| k.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_since_trims_series() {
        let series = OhlcvSeries::new(
            (0..10)
                .map(|i| Bar::new(day(i), 10.0, 11.0, 9.0, 10.0, 1.0))
                .collect(),
        )
        .unwrap();
        assert_eq!(series.since(day(7)).unwrap().len(), 3);
        assert!(series.since(day(20)).is_none());
    }
}
