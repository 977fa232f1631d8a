//! Error taxonomy for the forecasting core

use thiserror::Error;

use crate::types::ModelKind;

/// Errors raised by the forecasting core.
///
/// Only structural input problems reach the caller of
/// [`PredictionService`](crate::prediction::PredictionService). `ModelFit`
/// is absorbed by each model's own fallback ladder.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ForecastError {
    #[error("OHLCV series is empty")]
    EmptySeries,

    #[error("invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: String },

    #[error("bar dates must be strictly increasing (violated at index {index})")]
    UnorderedDates { index: usize },

    #[error("forecast horizon must be positive, got {0}")]
    InvalidHorizon(usize),

    #[error("insufficient data: need at least {required} rows, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("{model} failed to fit: {reason}")]
    ModelFit { model: ModelKind, reason: String },

    #[error("ensemble combination failed: {0}")]
    Ensemble(String),

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read market data: {0}")]
    Io(String),
}

impl ForecastError {
    pub fn fit(model: ModelKind, reason: impl Into<String>) -> Self {
        ForecastError::ModelFit {
            model,
            reason: reason.into(),
        }
    }

    /// True for errors a model is expected to recover from on its own.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ForecastError::ModelFit { .. } | ForecastError::InsufficientData { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ForecastError::InsufficientData {
            required: 40,
            available: 12,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data: need at least 40 rows, got 12"
        );

        let err = ForecastError::fit(ModelKind::Autoregressive, "singular matrix");
        assert_eq!(err.to_string(), "ARIMA failed to fit: singular matrix");
        assert!(err.is_recoverable());
        assert!(!ForecastError::EmptySeries.is_recoverable());
    }
}
