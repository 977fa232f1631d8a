//! ARIMA-style autoregressive forecaster
//!
//! - ADF test decides whether to difference once
//! - (p, q) grid over 0..=max selected by AIC, optionally cut short by a
//!   wall-clock budget
//! - AR by OLS, ARMA by the two-step Hannan-Rissanen regression
//! - Native multi-step forecast, integrated back to price level
//!
//! Falls back to Holt linear smoothing, then to a flat last price.

use nalgebra::{DMatrix, DVector};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::numeric::{adf_test, difference, integrate, lstsq};
use super::{decayed, non_negative, ForecastModel, FALLBACK_CONFIDENCE, FLAT_CONFIDENCE};
use crate::config::ModelsConfig;
use crate::error::{ForecastError, Result};
use crate::types::{ForecastResult, ForecastTier, ModelKind, OhlcvSeries};

/// Shortest series the order search runs on
const MIN_OBSERVATIONS: usize = 20;
const HOLT_ALPHA: f64 = 0.3;
const HOLT_BETA: f64 = 0.1;

/// A fitted ARMA model on the (possibly differenced) series
#[derive(Debug, Clone)]
pub struct ArmaFit {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub constant: f64,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    /// One-step in-sample errors
    pub residuals: Vec<f64>,
    pub sigma2: f64,
    pub aic: f64,
}

impl ArmaFit {
    /// Fit ARMA(p, q) to `w` by conditional least squares
    pub fn fit(w: &[f64], p: usize, d: usize, q: usize) -> Option<Self> {
        let n = w.len();
        if n < p + q + 10 {
            return None;
        }

        let (constant, ar, ma) = if q == 0 {
            let beta = regress(w, p, &[], 0, p)?;
            (beta[0], beta.iter().skip(1).copied().collect::<Vec<_>>(), Vec::new())
        } else {
            // Step 1: long AR for innovation estimates
            let m = (p + q).max(10).min(n / 4);
            if m == 0 {
                return None;
            }
            let long_ar = regress(w, m, &[], 0, m)?;
            let mut innovations = vec![0.0; n];
            for t in m..n {
                let fitted = long_ar[0] + (1..=m).map(|i| long_ar[i] * w[t - i]).sum::<f64>();
                innovations[t] = w[t] - fitted;
            }
            // Step 2: regress on own lags and lagged innovations
            let start = m + q.max(p);
            if n < start + p + q + 3 {
                return None;
            }
            let beta = regress(w, p, &innovations, q, start)?;
            (
                beta[0],
                beta.iter().skip(1).take(p).copied().collect(),
                beta.iter().skip(1 + p).copied().collect(),
            )
        };

        // Invertibility guard; the residual recursion diverges otherwise
        if ma.iter().map(|c| c.abs()).sum::<f64>() >= 1.0 {
            return None;
        }

        let residuals = recursive_residuals(w, constant, &ar, &ma);
        let used = &residuals[p..];
        if used.is_empty() || used.iter().any(|r| !r.is_finite()) {
            return None;
        }
        let n_used = used.len() as f64;
        let sigma2 = used.iter().map(|r| r * r).sum::<f64>() / n_used;
        let k = (p + q + 1) as f64;
        let log_likelihood =
            -0.5 * n_used * (1.0 + (2.0 * std::f64::consts::PI * sigma2.max(1e-300)).ln());
        let aic = -2.0 * log_likelihood + 2.0 * k;

        Some(Self {
            p,
            d,
            q,
            constant,
            ar,
            ma,
            residuals: used.to_vec(),
            sigma2,
            aic,
        })
    }

    /// Forecast `h` steps of the differenced series, future shocks set to zero
    pub fn forecast_differenced(&self, w: &[f64], h: usize) -> Vec<f64> {
        let mut values = w.to_vec();
        let mut shocks = recursive_residuals(w, self.constant, &self.ar, &self.ma);
        let mut out = Vec::with_capacity(h);
        for _ in 0..h {
            let t = values.len();
            let mut next = self.constant;
            for (i, phi) in self.ar.iter().enumerate() {
                next += phi * values[t - 1 - i];
            }
            for (j, theta) in self.ma.iter().enumerate() {
                next += theta * shocks[t - 1 - j];
            }
            values.push(next);
            shocks.push(0.0);
            out.push(next);
        }
        out
    }

    pub fn rmse(&self) -> f64 {
        self.sigma2.sqrt()
    }
}

/// OLS of `w[t]` on `[1, w[t-1..=t-p], e[t-1..=t-q]]` for `t` in `start..`
fn regress(w: &[f64], p: usize, e: &[f64], q: usize, start: usize) -> Option<DVector<f64>> {
    let n = w.len();
    if start >= n {
        return None;
    }
    let rows = n - start;
    let cols = 1 + p + q;
    if rows <= cols {
        return None;
    }
    let x = DMatrix::from_fn(rows, cols, |r, c| {
        let t = start + r;
        if c == 0 {
            1.0
        } else if c <= p {
            w[t - c]
        } else {
            e[t - (c - p)]
        }
    });
    let y = DVector::from_iterator(rows, w[start..].iter().copied());
    lstsq(&x, &y)
}

/// Conditional one-step errors; the first `p` are zero
fn recursive_residuals(w: &[f64], constant: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let p = ar.len();
    let mut eps = vec![0.0; w.len()];
    for t in p..w.len() {
        let mut fitted = constant;
        for (i, phi) in ar.iter().enumerate() {
            fitted += phi * w[t - 1 - i];
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                fitted += theta * eps[t - 1 - j];
            }
        }
        eps[t] = w[t] - fitted;
    }
    eps
}

/// Holt's linear trend smoothing
pub fn holt_forecast(closes: &[f64], horizon: usize) -> Option<Vec<f64>> {
    if closes.len() < 3 {
        return None;
    }
    let mut level = closes[0];
    let mut trend = closes[1] - closes[0];
    for &y in &closes[1..] {
        let prev_level = level;
        level = HOLT_ALPHA * y + (1.0 - HOLT_ALPHA) * (level + trend);
        trend = HOLT_BETA * (level - prev_level) + (1.0 - HOLT_BETA) * trend;
    }
    let out: Vec<f64> = (0..horizon)
        .map(|i| level + trend * (i + 1) as f64)
        .collect();
    out.iter().all(|v| v.is_finite()).then_some(out)
}

pub struct ArimaModel {
    config: ModelsConfig,
}

impl ArimaModel {
    pub fn new(config: ModelsConfig) -> Self {
        Self { config }
    }

    /// Pick the differencing order and the lowest-AIC (p, q)
    pub fn select(&self, closes: &[f64]) -> Result<ArmaFit> {
        if closes.len() < MIN_OBSERVATIONS {
            return Err(ForecastError::fit(
                ModelKind::Autoregressive,
                format!("need {MIN_OBSERVATIONS} closes, got {}", closes.len()),
            ));
        }
        let d = match adf_test(closes) {
            Some(adf) if adf.is_stationary() => 0,
            _ => 1,
        };
        let w = difference(closes, d);

        let budget = self.config.arima_budget_ms.map(Duration::from_millis);
        let started = Instant::now();
        let mut best: Option<ArmaFit> = None;
        'search: for p in 0..=self.config.arima_max_p {
            for q in 0..=self.config.arima_max_q {
                let exhausted = budget.is_some_and(|b| started.elapsed() > b);
                if best.is_some() && exhausted {
                    debug!(p, q, "ARIMA order search budget exhausted");
                    break 'search;
                }
                if let Some(fit) = ArmaFit::fit(&w, p, d, q) {
                    if best.as_ref().map_or(true, |b| fit.aic < b.aic) {
                        best = Some(fit);
                    }
                }
            }
        }

        best.ok_or_else(|| ForecastError::fit(ModelKind::Autoregressive, "no ARMA order converged"))
    }

    fn primary(&self, closes: &[f64], horizon: usize) -> Result<ForecastResult> {
        let fit = self.select(closes)?;
        let w = difference(closes, fit.d);
        let steps = fit.forecast_differenced(&w, horizon);
        let last = closes[closes.len() - 1];
        let predictions = if fit.d == 0 { steps } else { integrate(&steps, last) };
        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(ForecastError::fit(ModelKind::Autoregressive, "forecast diverged"));
        }

        let max_price = closes.iter().copied().fold(f64::MIN, f64::max);
        let base = (1.0 - fit.rmse() / max_price).clamp(0.0, 1.0);
        debug!(
            order = %format!("({},{},{})", fit.p, fit.d, fit.q),
            aic = %format!("{:.2}", fit.aic),
            rmse = %format!("{:.4}", fit.rmse()),
            "ARIMA model fitted"
        );
        Ok(ForecastResult::new(
            ModelKind::Autoregressive,
            non_negative(predictions),
            decayed(base, horizon, self.config.decay_rate),
            ForecastTier::Primary,
        ))
    }
}

impl ForecastModel for ArimaModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Autoregressive
    }

    fn forecast(&self, series: &OhlcvSeries, horizon: usize) -> Result<ForecastResult> {
        let closes = series.closes();
        let err = match self.primary(&closes, horizon) {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if let Some(predictions) = holt_forecast(&closes, horizon) {
            warn!(error = %err, "ARIMA falling back to exponential smoothing");
            return Ok(ForecastResult::new(
                ModelKind::Autoregressive,
                non_negative(predictions),
                decayed(FALLBACK_CONFIDENCE, horizon, self.config.decay_rate),
                ForecastTier::Fallback,
            ));
        }

        warn!(error = %err, "ARIMA falling back to flat forecast");
        Ok(ForecastResult::new(
            ModelKind::Autoregressive,
            vec![series.last_close(); horizon],
            vec![FLAT_CONFIDENCE; horizon],
            ForecastTier::Flat,
        ))
    }
}
