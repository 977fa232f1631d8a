//! StockSense Library
//!
//! Regime-aware multi-model stock price forecasting

pub mod config;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod forecast;
pub mod prediction;
pub mod regime;
pub mod types;

pub use error::{ForecastError, Result};
pub use prediction::{PredictionReport, PredictionService};
