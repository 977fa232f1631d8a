//! Market Regime Classifier
//!
//! Labels the current market state from the ratio of a short and a long SMA
//! (trend strength, in percent) and the ATR as a percentage of price:
//! - TrendingUp / TrendingDown when trend strength crosses +/- threshold
//! - RangeBound otherwise
//! - Unknown when there is too little history
//!
//! Elevated volatility lowers confidence. Each regime also carries the
//! per-model weight priors used by the ensemble.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::RegimeConfig;
use crate::features::rolling;
use crate::types::{ModelKind, OhlcvSeries};

/// Bars averaged for the regime-change comparison
const CHANGE_WINDOW: usize = 10;
/// ATR% above this multiple of its long-window mean counts as elevated volatility
const VOLATILITY_SPIKE_RATIO: f64 = 1.5;
const VOLATILITY_PENALTY: f64 = 0.8;
const VOLATILITY_CONFIDENCE_FLOOR: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    TrendingUp,
    TrendingDown,
    RangeBound,
    Unknown,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::TrendingUp => write!(f, "Trending Up"),
            Regime::TrendingDown => write!(f, "Trending Down"),
            Regime::RangeBound => write!(f, "Range-Bound"),
            Regime::Unknown => write!(f, "Unknown"),
        }
    }
}

impl Regime {
    /// Bucket a trend-strength value. Values exactly at the threshold count as trending.
    pub fn bucket(trend_strength: f64, threshold: f64) -> Self {
        if trend_strength >= threshold {
            Regime::TrendingUp
        } else if trend_strength <= -threshold {
            Regime::TrendingDown
        } else {
            Regime::RangeBound
        }
    }

    /// Models that suit this regime
    pub fn preferred_models(&self) -> &'static [ModelKind] {
        match self {
            Regime::TrendingUp => &[
                ModelKind::Linear,
                ModelKind::TimeSeries,
                ModelKind::Autoregressive,
            ],
            Regime::TrendingDown => &[
                ModelKind::Linear,
                ModelKind::Quadratic,
                ModelKind::Autoregressive,
            ],
            Regime::RangeBound => &[ModelKind::Spectral, ModelKind::Quadratic],
            Regime::Unknown => &ModelKind::ALL,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Regime::TrendingUp => {
                "Prices make higher highs and higher lows under steady buying pressure. \
                 Pullbacks tend to be shallow and trend-following models (linear, time series, \
                 ARIMA) carry the most weight."
            }
            Regime::TrendingDown => {
                "Prices make lower highs and lower lows under selling pressure. Declines often \
                 accelerate, so linear, quadratic and ARIMA models carry the most weight."
            }
            Regime::RangeBound => {
                "Prices oscillate between support and resistance with no directional bias. \
                 Cyclical (Fourier) and curved (quadratic) models carry the most weight; a \
                 breakout from the range often signals a regime change."
            }
            Regime::Unknown => {
                "Not enough history to classify the market. All models are weighted equally \
                 until a clear regime emerges."
            }
        }
    }

    /// Suggested horizon and ensemble weight priors
    pub fn recommended_settings(&self) -> RecommendedSettings {
        use ModelKind::*;
        match self {
            Regime::TrendingUp => RecommendedSettings {
                horizon: 30,
                weights: ModelWeights::from_pairs(&[
                    (Linear, 0.35),
                    (TimeSeries, 0.35),
                    (Autoregressive, 0.20),
                    (Quadratic, 0.05),
                    (Spectral, 0.05),
                ]),
            },
            Regime::TrendingDown => RecommendedSettings {
                horizon: 20,
                weights: ModelWeights::from_pairs(&[
                    (Linear, 0.30),
                    (Quadratic, 0.30),
                    (Autoregressive, 0.25),
                    (TimeSeries, 0.10),
                    (Spectral, 0.05),
                ]),
            },
            Regime::RangeBound => RecommendedSettings {
                horizon: 15,
                weights: ModelWeights::from_pairs(&[
                    (Spectral, 0.40),
                    (Quadratic, 0.30),
                    (Autoregressive, 0.15),
                    (TimeSeries, 0.10),
                    (Linear, 0.05),
                ]),
            },
            Regime::Unknown => RecommendedSettings {
                horizon: 20,
                weights: ModelWeights::uniform(),
            },
        }
    }
}

/// One weight per model, indexed by [`ModelKind::index`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights([f64; ModelKind::COUNT]);

impl ModelWeights {
    pub fn uniform() -> Self {
        Self([1.0 / ModelKind::COUNT as f64; ModelKind::COUNT])
    }

    /// Unlisted models get zero weight
    pub fn from_pairs(pairs: &[(ModelKind, f64)]) -> Self {
        let mut w = [0.0; ModelKind::COUNT];
        for (kind, weight) in pairs {
            w[kind.index()] = *weight;
        }
        Self(w)
    }

    pub fn get(&self, kind: ModelKind) -> f64 {
        self.0[kind.index()]
    }

    pub fn as_array(&self) -> &[f64; ModelKind::COUNT] {
        &self.0
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecommendedSettings {
    pub horizon: usize,
    pub weights: ModelWeights,
}

/// Per-bar classifier inputs, kept for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimePoint {
    pub date: NaiveDate,
    pub close: f64,
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
    pub trend_strength: Option<f64>,
    pub atr_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeInfo {
    pub regime: Regime,
    pub confidence: f64,
    /// Bars in the last long window sharing the current bucket
    pub duration: usize,
    pub regime_change: bool,
    pub annotated_series: Vec<RegimePoint>,
}

impl RegimeInfo {
    pub fn unknown(annotated_series: Vec<RegimePoint>) -> Self {
        Self {
            regime: Regime::Unknown,
            confidence: 0.0,
            duration: 0,
            regime_change: false,
            annotated_series,
        }
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn finite_mean(values: &[f64]) -> Option<f64> {
    let vals: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if vals.is_empty() {
        None
    } else {
        Some(rolling::mean(&vals))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    /// Minimum history for a classification other than Unknown
    pub fn min_rows(&self) -> usize {
        self.config.long_window.max(self.config.atr_window) + 10
    }

    /// Classify the latest bar. Never fails; edge cases yield Unknown.
    pub fn classify(&self, series: &OhlcvSeries) -> RegimeInfo {
        let cfg = &self.config;
        let bars = series.bars();
        let closes = series.closes();
        let n = closes.len();

        let sma_short = rolling::rolling_mean(&closes, cfg.short_window);
        let sma_long = rolling::rolling_mean(&closes, cfg.long_window);
        let trend: Vec<f64> = sma_short
            .iter()
            .zip(&sma_long)
            .map(|(s, l)| (s / l - 1.0) * 100.0)
            .collect();
        let atr = rolling::atr(bars, cfg.atr_window);
        let atr_pct: Vec<f64> = atr.iter().zip(&closes).map(|(a, c)| a / c * 100.0).collect();

        let annotated: Vec<RegimePoint> = (0..n)
            .map(|i| RegimePoint {
                date: bars[i].date,
                close: closes[i],
                sma_short: finite(sma_short[i]),
                sma_long: finite(sma_long[i]),
                trend_strength: finite(trend[i]),
                atr_pct: finite(atr_pct[i]),
            })
            .collect();

        if n < self.min_rows() {
            debug!(rows = n, required = self.min_rows(), "Too little history for regime");
            return RegimeInfo::unknown(annotated);
        }

        let th = cfg.threshold;
        let current = trend[n - 1];
        if !current.is_finite() {
            return RegimeInfo::unknown(annotated);
        }

        let regime = Regime::bucket(current, th);
        let mut confidence = match regime {
            Regime::RangeBound => 1.0 - current.abs() / th,
            _ => (current.abs() / (3.0 * th)).min(1.0),
        };

        let regime_change = if n >= cfg.long_window + 20 {
            let recent = finite_mean(&trend[n - CHANGE_WINDOW..]);
            let prior = finite_mean(&trend[n - 21..n - 11]);
            match (recent, prior) {
                (Some(r), Some(p)) => Regime::bucket(r, th) != Regime::bucket(p, th),
                _ => false,
            }
        } else {
            false
        };

        let long_start = n.saturating_sub(cfg.long_window);
        if let (Some(cur_atr), Some(avg_atr)) =
            (finite(atr_pct[n - 1]), finite_mean(&atr_pct[long_start..]))
        {
            if avg_atr > 0.0 && cur_atr / avg_atr > VOLATILITY_SPIKE_RATIO {
                confidence = (confidence * VOLATILITY_PENALTY).max(VOLATILITY_CONFIDENCE_FLOOR);
            }
        }

        let duration = trend[long_start..]
            .iter()
            .filter(|t| t.is_finite() && Regime::bucket(**t, th) == regime)
            .count();

        let info = RegimeInfo {
            regime,
            confidence: confidence.clamp(0.0, 1.0),
            duration,
            regime_change,
            annotated_series: annotated,
        };

        debug!(
            regime = %info.regime,
            confidence = %format!("{:.3}", info.confidence),
            trend_strength = %format!("{:.4}", current),
            duration = info.duration,
            regime_change = info.regime_change,
            "Classified market regime"
        );

        info
    }
}
