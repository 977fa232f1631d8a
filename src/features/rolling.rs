//! Rolling-window statistics over price/volume columns
//!
//! Every function returns a vector aligned with its input; positions without
//! enough history hold `NaN` and are dropped later by the feature builder.

use crate::types::Bar;

fn rolling_apply<F>(values: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for end in window..=values.len() {
        out[end - 1] = f(&values[end - window..end]);
    }
    out
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Population standard deviation
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, mean)
}

pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, sample_std)
}

pub fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| {
        w.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

pub fn rolling_median(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| {
        let mut sorted = w.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    })
}

/// Adjusted Fisher-Pearson skewness; flat windows score 0
pub fn rolling_skew(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| {
        let n = w.len() as f64;
        if w.len() < 3 {
            return f64::NAN;
        }
        let m = mean(w);
        let m2 = w.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
        let m3 = w.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n;
        if m2 <= f64::EPSILON * m.abs().max(1.0) {
            return 0.0;
        }
        (n * (n - 1.0)).sqrt() / (n - 2.0) * m3 / m2.powf(1.5)
    })
}

/// Fraction of positive values in each window
pub fn rolling_positive_ratio(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| {
        if w.iter().any(|v| v.is_nan()) {
            return f64::NAN;
        }
        w.iter().filter(|v| **v > 0.0).count() as f64 / w.len() as f64
    })
}

/// EMA with span `period`, seeded with the first value (no bias adjustment)
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };
    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut current = first;
    out.push(current);
    for &v in values.iter().skip(1) {
        current = (v - current) * multiplier + current;
        out.push(current);
    }
    out
}

/// `x[t] - x[t - lag]`
pub fn diff(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i >= lag {
                values[i] - values[i - lag]
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// `x[t] / x[t - lag] - 1`
pub fn pct_change(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i >= lag {
                values[i] / values[i - lag] - 1.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// True range against the previous close; undefined for the first bar
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; bars.len()];
    for i in 1..bars.len() {
        let curr = &bars[i];
        let prev_close = bars[i - 1].close;
        tr[i] = (curr.high - curr.low)
            .max((curr.high - prev_close).abs())
            .max((curr.low - prev_close).abs());
    }
    tr
}

/// Average True Range: rolling mean of the true range
pub fn atr(bars: &[Bar], window: usize) -> Vec<f64> {
    let tr = true_range(bars);
    rolling_apply(&tr, window, |w| {
        if w.iter().any(|v| v.is_nan()) {
            f64::NAN
        } else {
            mean(w)
        }
    })
}
