//! Forecast interpretation: trading signal, confidence bands, summary
//! metrics and trajectory pattern.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::rolling;
use crate::regime::Regime;

/// Relative half-width of a band at zero confidence
const BAND_WIDTH: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::StrongBuy => write!(f, "Strong Buy"),
            Signal::Buy => write!(f, "Buy"),
            Signal::Hold => write!(f, "Hold"),
            Signal::Sell => write!(f, "Sell"),
            Signal::StrongSell => write!(f, "Strong Sell"),
        }
    }
}

impl Signal {
    /// Regime-adjusted signal from the horizon price change (percent) and
    /// average confidence. Rules are checked strongest-buy first.
    pub fn from_forecast(change_pct: f64, avg_confidence: f64, regime: Regime) -> Self {
        let (d, c) = (change_pct, avg_confidence);
        match regime {
            Regime::TrendingUp => {
                if d > 3.0 && c > 0.5 {
                    Signal::StrongBuy
                } else if d > 0.0 && c > 0.4 {
                    Signal::Buy
                } else if d < -5.0 && c > 0.6 {
                    Signal::StrongSell
                } else if d < 0.0 && c > 0.5 {
                    Signal::Sell
                } else {
                    Signal::Hold
                }
            }
            Regime::TrendingDown => {
                if d > 7.0 && c > 0.7 {
                    Signal::StrongBuy
                } else if d > 2.0 && c > 0.6 {
                    Signal::Buy
                } else if d < -3.0 && c > 0.5 {
                    Signal::StrongSell
                } else if d < 0.0 && c > 0.4 {
                    Signal::Sell
                } else {
                    Signal::Hold
                }
            }
            // Mean reversion: only small moves count as plain buy/sell
            Regime::RangeBound => {
                if d > 5.0 && c > 0.6 {
                    Signal::StrongBuy
                } else if d > 0.0 && d < 3.0 && c > 0.5 {
                    Signal::Buy
                } else if d < -5.0 && c > 0.6 {
                    Signal::StrongSell
                } else if d < 0.0 && d > -3.0 && c > 0.5 {
                    Signal::Sell
                } else {
                    Signal::Hold
                }
            }
            Regime::Unknown => {
                if d > 5.0 && c > 0.6 {
                    Signal::StrongBuy
                } else if d > 0.0 && c > 0.5 {
                    Signal::Buy
                } else if d < -5.0 && c > 0.6 {
                    Signal::StrongSell
                } else if d < 0.0 && c > 0.5 {
                    Signal::Sell
                } else {
                    Signal::Hold
                }
            }
        }
    }

    /// Confidence-free signal for a single horizon window
    pub fn from_change(change_pct: f64, strong_threshold: f64) -> Self {
        if change_pct > strong_threshold {
            Signal::StrongBuy
        } else if change_pct > 0.0 {
            Signal::Buy
        } else if change_pct < -strong_threshold {
            Signal::StrongSell
        } else if change_pct < 0.0 {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceBand {
    pub date: NaiveDate,
    pub prediction: f64,
    pub lower: f64,
    pub upper: f64,
}

/// `pred ± pred * (1 - conf) * 0.2` per day
pub fn confidence_bands(
    dates: &[NaiveDate],
    predictions: &[f64],
    confidences: &[f64],
) -> Vec<ConfidenceBand> {
    dates
        .iter()
        .zip(predictions)
        .zip(confidences)
        .map(|((date, &p), &c)| {
            let half = p * (1.0 - c) * BAND_WIDTH;
            ConfidenceBand {
                date: *date,
                prediction: p,
                lower: (p - half).max(0.0),
                upper: p + half,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastMetrics {
    pub current_price: f64,
    pub end_price: f64,
    pub price_change_pct: f64,
    pub average_confidence: f64,
    /// Last minus first confidence
    pub confidence_trend: f64,
    /// Population std of day-over-day predicted returns, in percent
    pub predicted_volatility_pct: f64,
}

impl ForecastMetrics {
    pub fn compute(current_price: f64, predictions: &[f64], confidences: &[f64]) -> Self {
        let end_price = predictions.last().copied().unwrap_or(current_price);
        let price_change_pct = pct_change(current_price, end_price);
        let average_confidence = if confidences.is_empty() {
            0.0
        } else {
            rolling::mean(confidences)
        };
        let confidence_trend = match (confidences.first(), confidences.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        let returns: Vec<f64> = predictions
            .windows(2)
            .filter(|w| w[0] > 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .collect();
        let predicted_volatility_pct = if returns.is_empty() {
            0.0
        } else {
            rolling::population_std(&returns) * 100.0
        };

        Self {
            current_price,
            end_price,
            price_change_pct,
            average_confidence,
            confidence_trend,
            predicted_volatility_pct,
        }
    }
}

fn pct_change(from: f64, to: f64) -> f64 {
    if from > 0.0 {
        (to / from - 1.0) * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryPattern {
    AcceleratingUptrend,
    DeceleratingUptrend,
    VariableUptrend,
    AcceleratingDowntrend,
    DeceleratingDowntrend,
    VariableDowntrend,
    PeakFormation,
    BottomingPattern,
    Mixed,
}

impl TrajectoryPattern {
    /// Classify from short/medium/long percent changes versus the current price
    pub fn classify(short: f64, medium: f64, long: f64) -> Self {
        use TrajectoryPattern::*;
        if short > 0.0 && medium > 0.0 && long > 0.0 {
            if short < medium && medium < long {
                AcceleratingUptrend
            } else if short > medium && medium > long {
                DeceleratingUptrend
            } else {
                VariableUptrend
            }
        } else if short < 0.0 && medium < 0.0 && long < 0.0 {
            if short > medium && medium > long {
                AcceleratingDowntrend
            } else if short < medium && medium < long {
                DeceleratingDowntrend
            } else {
                VariableDowntrend
            }
        } else if short > 0.0 && long < 0.0 {
            PeakFormation
        } else if short < 0.0 && long > 0.0 {
            BottomingPattern
        } else {
            Mixed
        }
    }

    pub fn description(&self) -> &'static str {
        use TrajectoryPattern::*;
        match self {
            AcceleratingUptrend => "Price is predicted to rise at an increasing rate.",
            DeceleratingUptrend => "Price is predicted to rise but at a decreasing rate.",
            VariableUptrend => "Price is predicted to rise with variable momentum.",
            AcceleratingDowntrend => "Price is predicted to fall at an increasing rate.",
            DeceleratingDowntrend => "Price is predicted to fall but at a decreasing rate.",
            VariableDowntrend => "Price is predicted to fall with variable momentum.",
            PeakFormation => {
                "Price is predicted to rise in the short term but decline over the long term."
            }
            BottomingPattern => {
                "Price is predicted to decline in the short term but recover over the long term."
            }
            Mixed => "No clear trajectory pattern detected in the predictions.",
        }
    }

    pub fn is_uptrend(&self) -> bool {
        use TrajectoryPattern::*;
        matches!(self, AcceleratingUptrend | DeceleratingUptrend | VariableUptrend)
    }

    pub fn is_downtrend(&self) -> bool {
        use TrajectoryPattern::*;
        matches!(self, AcceleratingDowntrend | DeceleratingDowntrend | VariableDowntrend)
    }

    /// Whether the pattern agrees with the detected regime
    pub fn aligns_with(&self, regime: Regime) -> bool {
        (self.is_uptrend() && regime == Regime::TrendingUp)
            || (self.is_downtrend() && regime == Regime::TrendingDown)
            || (*self == TrajectoryPattern::Mixed && regime == Regime::RangeBound)
    }
}

impl fmt::Display for TrajectoryPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TrajectoryPattern::*;
        let name = match self {
            AcceleratingUptrend => "Accelerating Uptrend",
            DeceleratingUptrend => "Decelerating Uptrend",
            VariableUptrend => "Variable Uptrend",
            AcceleratingDowntrend => "Accelerating Downtrend",
            DeceleratingDowntrend => "Decelerating Downtrend",
            VariableDowntrend => "Variable Downtrend",
            PeakFormation => "Peak Formation",
            BottomingPattern => "Bottoming Pattern",
            Mixed => "Mixed Pattern",
        };
        write!(f, "{name}")
    }
}

/// Predicted price and change at one point of the horizon
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HorizonOutlook {
    pub days: usize,
    pub price: f64,
    pub change_pct: f64,
    pub signal: Signal,
}

impl HorizonOutlook {
    fn at(current_price: f64, predictions: &[f64], days: usize, strong_threshold: f64) -> Self {
        let price = predictions[days - 1];
        let change_pct = pct_change(current_price, price);
        Self {
            days,
            price,
            change_pct,
            signal: Signal::from_change(change_pct, strong_threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryAnalysis {
    pub short_term: HorizonOutlook,
    pub medium_term: HorizonOutlook,
    pub long_term: HorizonOutlook,
    pub pattern: TrajectoryPattern,
    pub description: String,
    pub aligned_with_regime: bool,
}

impl TrajectoryAnalysis {
    /// Returns `None` for an empty prediction path
    pub fn analyze(current_price: f64, predictions: &[f64], regime: Regime) -> Option<Self> {
        let h = predictions.len();
        if h == 0 {
            return None;
        }
        let short = (h / 3).clamp(1, 10);
        let medium = (h / 2).clamp(1, 20);

        let short_term = HorizonOutlook::at(current_price, predictions, short, 3.0);
        let medium_term = HorizonOutlook::at(current_price, predictions, medium, 5.0);
        let long_term = HorizonOutlook::at(current_price, predictions, h, 7.0);
        let pattern = TrajectoryPattern::classify(
            short_term.change_pct,
            medium_term.change_pct,
            long_term.change_pct,
        );

        Some(Self {
            short_term,
            medium_term,
            long_term,
            pattern,
            description: pattern.description().to_string(),
            aligned_with_regime: pattern.aligns_with(regime),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_rules_by_regime() {
        assert_eq!(Signal::from_forecast(4.0, 0.6, Regime::TrendingUp), Signal::StrongBuy);
        assert_eq!(Signal::from_forecast(1.0, 0.45, Regime::TrendingUp), Signal::Buy);
        assert_eq!(Signal::from_forecast(1.0, 0.45, Regime::Unknown), Signal::Hold);
        assert_eq!(Signal::from_forecast(-4.0, 0.55, Regime::TrendingDown), Signal::StrongSell);
        assert_eq!(Signal::from_forecast(-1.0, 0.45, Regime::TrendingDown), Signal::Sell);
        // Range-bound: a 4% rise is too large for a plain buy and too small for a strong one
        assert_eq!(Signal::from_forecast(4.0, 0.9, Regime::RangeBound), Signal::Hold);
        assert_eq!(Signal::from_forecast(-2.0, 0.6, Regime::RangeBound), Signal::Sell);
        assert_eq!(Signal::from_forecast(-6.0, 0.7, Regime::Unknown), Signal::StrongSell);
        assert_eq!(Signal::StrongBuy.to_string(), "Strong Buy");
    }

    #[test]
    fn test_confidence_bands() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let bands = confidence_bands(&[d, d], &[100.0, 50.0], &[1.0, 0.5]);
        assert_eq!(bands[0].lower, 100.0);
        assert_eq!(bands[0].upper, 100.0);
        assert!((bands[1].lower - 45.0).abs() < 1e-12);
        assert!((bands[1].upper - 55.0).abs() < 1e-12);
    }

    #[test]
    fn test_metrics() {
        let m = ForecastMetrics::compute(100.0, &[101.0, 102.01, 103.0301], &[0.6, 0.5, 0.4]);
        assert!((m.price_change_pct - 3.0301).abs() < 1e-9);
        assert!((m.average_confidence - 0.5).abs() < 1e-12);
        assert!((m.confidence_trend + 0.2).abs() < 1e-12);
        // constant 1% daily growth has no return dispersion
        assert!(m.predicted_volatility_pct.abs() < 1e-9);

        let single = ForecastMetrics::compute(100.0, &[90.0], &[0.3]);
        assert_eq!(single.predicted_volatility_pct, 0.0);
        assert!((single.price_change_pct + 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_trajectory_patterns() {
        use TrajectoryPattern::*;
        assert_eq!(TrajectoryPattern::classify(1.0, 2.0, 3.0), AcceleratingUptrend);
        assert_eq!(TrajectoryPattern::classify(3.0, 2.0, 1.0), DeceleratingUptrend);
        assert_eq!(TrajectoryPattern::classify(1.0, 3.0, 2.0), VariableUptrend);
        assert_eq!(TrajectoryPattern::classify(-1.0, -2.0, -3.0), AcceleratingDowntrend);
        assert_eq!(TrajectoryPattern::classify(-3.0, -2.0, -1.0), DeceleratingDowntrend);
        assert_eq!(TrajectoryPattern::classify(1.0, -1.0, -2.0), PeakFormation);
        assert_eq!(TrajectoryPattern::classify(-1.0, 1.0, 2.0), BottomingPattern);
        assert_eq!(TrajectoryPattern::classify(0.0, 0.0, 0.0), Mixed);
    }

    #[test]
    fn test_trajectory_windows() {
        let preds: Vec<f64> = (1..=30).map(|i| 100.0 + i as f64).collect();
        let t = TrajectoryAnalysis::analyze(100.0, &preds, Regime::TrendingUp).unwrap();
        assert_eq!(t.short_term.days, 10);
        assert_eq!(t.medium_term.days, 15);
        assert_eq!(t.long_term.days, 30);
        assert_eq!(t.pattern, TrajectoryPattern::AcceleratingUptrend);
        assert!(t.aligned_with_regime);
        assert_eq!(t.long_term.signal, Signal::StrongBuy);

        let short = TrajectoryAnalysis::analyze(100.0, &[99.0, 98.0], Regime::TrendingUp).unwrap();
        assert_eq!(short.short_term.days, 1);
        assert_eq!(short.medium_term.days, 1);
        assert!(!short.aligned_with_regime);

        let long: Vec<f64> = (1..=90).map(|i| 100.0 + i as f64 * 0.1).collect();
        let capped = TrajectoryAnalysis::analyze(100.0, &long, Regime::TrendingUp).unwrap();
        assert_eq!(capped.short_term.days, 10);
        assert_eq!(capped.medium_term.days, 20);
        assert_eq!(capped.long_term.days, 90);

        assert!(TrajectoryAnalysis::analyze(100.0, &[], Regime::Unknown).is_none());
    }
}
