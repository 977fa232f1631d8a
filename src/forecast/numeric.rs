//! Least squares, polynomial fitting and stationarity testing

use nalgebra::{DMatrix, DVector};

/// Least-squares solution of `x * beta = y` via SVD.
/// Returns `None` for empty or degenerate systems.
pub fn lstsq(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() == 0 || x.ncols() == 0 || x.nrows() != y.len() {
        return None;
    }
    let svd = x.clone().svd(true, true);
    let beta = svd.solve(y, 1e-12).ok()?;
    beta.iter().all(|b| b.is_finite()).then_some(beta)
}

/// Polynomial coefficients, lowest order first
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Option<Vec<f64>> {
    if x.len() != y.len() || x.len() <= degree {
        return None;
    }
    let design = DMatrix::from_fn(x.len(), degree + 1, |i, j| x[i].powi(j as i32));
    let target = DVector::from_column_slice(y);
    lstsq(&design, &target).map(|beta| beta.iter().copied().collect())
}

pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Coefficient of determination. A constant target scores 1.0 when matched
/// exactly and 0.0 otherwise.
pub fn r_squared(actual: &[f64], fitted: &[f64]) -> f64 {
    let n = actual.len().min(fitted.len());
    if n == 0 {
        return 0.0;
    }
    let mean = actual[..n].iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = actual[..n].iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual[..n]
        .iter()
        .zip(&fitted[..n])
        .map(|(a, f)| (a - f).powi(2))
        .sum();
    let scale = mean.abs().max(1.0).powi(2) * n as f64;
    if ss_tot <= 1e-18 * scale {
        return if ss_res <= 1e-18 * scale { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// `d`-th order differences
pub fn difference(data: &[f64], d: usize) -> Vec<f64> {
    let mut result = data.to_vec();
    for _ in 0..d {
        if result.len() < 2 {
            return Vec::new();
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Undo one differencing step, starting from `start`
pub fn integrate(diff: &[f64], start: f64) -> Vec<f64> {
    diff.iter()
        .scan(start, |level, d| {
            *level += d;
            Some(*level)
        })
        .collect()
}

/// Augmented Dickey-Fuller test result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdfResult {
    pub statistic: f64,
    pub p_value: f64,
    pub lags: usize,
}

impl AdfResult {
    /// Unit root rejected at the 5% level
    pub fn is_stationary(&self) -> bool {
        self.p_value < 0.05
    }
}

/// ADF regression with constant:
/// `dy_t = a + b*y_{t-1} + sum(g_i * dy_{t-i}) + e_t`.
///
/// Lag order defaults to `2 * n^(1/3)`, capped at `n / 4`.
/// Returns `None` when the regression cannot be estimated.
pub fn adf_test(data: &[f64]) -> Option<AdfResult> {
    let n = data.len();
    if n < 10 {
        return None;
    }
    let diff = difference(data, 1);
    let lags = (((n as f64).powf(1.0 / 3.0) * 2.0) as usize).min(n / 4).max(1);
    let effective_n = diff.len().checked_sub(lags)?;
    let k = 2 + lags;
    if effective_n < k + 3 {
        return None;
    }

    let x = DMatrix::from_fn(effective_n, k, |r, c| {
        let t = r + lags;
        match c {
            0 => 1.0,
            1 => data[t],
            _ => diff[t - (c - 1)],
        }
    });
    let y = DVector::from_iterator(effective_n, diff[lags..].iter().copied());

    let xtx_inv = (x.transpose() * &x).try_inverse()?;
    let beta = &xtx_inv * (x.transpose() * &y);
    let residuals = &y - &x * &beta;
    let mse = residuals.norm_squared() / (effective_n - k) as f64;
    let se = (mse * xtx_inv[(1, 1)]).sqrt();
    if !se.is_finite() || se <= 0.0 {
        return None;
    }
    let statistic = beta[1] / se;
    Some(AdfResult {
        statistic,
        p_value: adf_p_value(statistic, n),
        lags,
    })
}

/// Approximate p-value interpolated between finite-sample critical values
fn adf_p_value(t_stat: f64, n: usize) -> f64 {
    let n = n as f64;
    let cv_1 = -3.43 - 6.0 / n;
    let cv_5 = -2.86 - 4.0 / n;
    let cv_10 = -2.57 - 3.0 / n;

    let p = if t_stat < cv_1 {
        0.01 * (cv_1 - t_stat).exp().recip()
    } else if t_stat < cv_5 {
        0.01 + 0.04 * (t_stat - cv_1) / (cv_5 - cv_1)
    } else if t_stat < cv_10 {
        0.05 + 0.05 * (t_stat - cv_5) / (cv_10 - cv_5)
    } else {
        0.10 + 0.90 * (1.0 - (-0.5 * (t_stat - cv_10)).exp())
    };
    p.clamp(0.0, 1.0)
}
