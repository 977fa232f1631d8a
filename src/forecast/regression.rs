//! Regularized regression candidates and time-ordered cross-validation
//!
//! Candidates are fitted with SmartCore. Selection uses an expanding-window
//! split: each fold trains on everything before its test block, so no fold
//! ever sees the future. Inputs are standardized here, so SmartCore's own
//! normalization is turned off.

use ndarray::{Array2, ArrayView1, Axis};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::lasso::{Lasso, LassoParameters};
use smartcore::linear::linear_regression::{
    LinearRegression, LinearRegressionParameters, LinearRegressionSolverName,
};
use smartcore::linear::ridge_regression::{
    RidgeRegression, RidgeRegressionParameters, RidgeRegressionSolverName,
};
use std::fmt;
use std::ops::Range;
use tracing::debug;

use super::numeric::r_squared;
use crate::error::{ForecastError, Result};
use crate::features::Standardizer;
use crate::types::ModelKind;

/// Regression variant to fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Regressor {
    Ols,
    Ridge { alpha: f64 },
    Lasso { alpha: f64 },
}

impl fmt::Display for Regressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regressor::Ols => write!(f, "ols"),
            Regressor::Ridge { alpha } => write!(f, "ridge(alpha={alpha})"),
            Regressor::Lasso { alpha } => write!(f, "lasso(alpha={alpha})"),
        }
    }
}

enum Fitted {
    Ols(LinearRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>),
    Ridge(RidgeRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>),
    Lasso(Lasso<f64, f64, DenseMatrix<f64>, Vec<f64>>),
}

fn to_dense(x: &Array2<f64>, model: ModelKind) -> Result<DenseMatrix<f64>> {
    let rows: Vec<Vec<f64>> = x.outer_iter().map(|r| r.to_vec()).collect();
    DenseMatrix::from_2d_array(&rows.iter().map(|r| r.as_slice()).collect::<Vec<_>>())
        .map_err(|e| ForecastError::fit(model, format!("matrix conversion failed: {e:?}")))
}

impl Regressor {
    fn fit_raw(&self, x: &Array2<f64>, y: &[f64], model: ModelKind) -> Result<Fitted> {
        let dense = to_dense(x, model)?;
        let y = y.to_vec();
        let fail = |e: smartcore::error::Failed| {
            ForecastError::fit(model, format!("{self} training failed: {e:?}"))
        };
        match *self {
            // SmartCore's SVD solver indexes past the end on wide matrices
            Regressor::Ols if x.nrows() <= x.ncols() => Err(ForecastError::fit(
                model,
                format!("ols needs more rows than columns, got {}x{}", x.nrows(), x.ncols()),
            )),
            Regressor::Ols => LinearRegression::fit(
                &dense,
                &y,
                LinearRegressionParameters::default().with_solver(LinearRegressionSolverName::SVD),
            )
            .map(Fitted::Ols)
            .map_err(fail),
            Regressor::Ridge { alpha } => RidgeRegression::fit(
                &dense,
                &y,
                RidgeRegressionParameters::default()
                    .with_alpha(alpha)
                    .with_normalize(false)
                    .with_solver(RidgeRegressionSolverName::SVD),
            )
            .map(Fitted::Ridge)
            .map_err(fail),
            Regressor::Lasso { alpha } => Lasso::fit(
                &dense,
                &y,
                LassoParameters::default()
                    .with_alpha(alpha)
                    .with_normalize(false),
            )
            .map(Fitted::Lasso)
            .map_err(fail),
        }
    }
}

impl Fitted {
    fn predict(&self, x: &Array2<f64>, model: ModelKind) -> Result<Vec<f64>> {
        let dense = to_dense(x, model)?;
        let out = match self {
            Fitted::Ols(m) => m.predict(&dense),
            Fitted::Ridge(m) => m.predict(&dense),
            Fitted::Lasso(m) => m.predict(&dense),
        }
        .map_err(|e| ForecastError::fit(model, format!("prediction failed: {e:?}")))?;
        if out.iter().all(|v| v.is_finite()) {
            Ok(out)
        } else {
            Err(ForecastError::fit(model, "non-finite prediction"))
        }
    }
}

/// Expanding-window splits: fold `i` tests on the `i`-th of `folds` equal
/// blocks at the end of the data and trains on everything before it.
pub fn time_series_splits(n_samples: usize, folds: usize) -> Vec<(Range<usize>, Range<usize>)> {
    if folds == 0 {
        return Vec::new();
    }
    let test_size = n_samples / (folds + 1);
    if test_size == 0 {
        return Vec::new();
    }
    (0..folds)
        .map(|i| {
            let train_end = n_samples - (folds - i) * test_size;
            (0..train_end, train_end..train_end + test_size)
        })
        .collect()
}

/// A regressor refit on all rows, with its scaler and CV score
pub struct RegressionFit {
    pub regressor: Regressor,
    pub cv_score: f64,
    scaler: Standardizer,
    fitted: Fitted,
    model: ModelKind,
}

impl fmt::Debug for RegressionFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegressionFit")
            .field("regressor", &self.regressor)
            .field("cv_score", &self.cv_score)
            .field("model", &self.model)
            .finish()
    }
}

impl RegressionFit {
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> Result<f64> {
        let scaled = self.scaler.transform_row(row).insert_axis(Axis(0));
        let out = self.fitted.predict(&scaled, self.model)?;
        out.first()
            .copied()
            .ok_or_else(|| ForecastError::fit(self.model, "empty prediction"))
    }
}

fn cv_score(
    candidate: Regressor,
    x: &Array2<f64>,
    y: &[f64],
    folds: usize,
    model: ModelKind,
) -> Option<f64> {
    let mut scores = Vec::new();
    for (train, test) in time_series_splits(x.nrows(), folds) {
        if train.len() < 2 || test.is_empty() {
            continue;
        }
        let x_train = x.slice(ndarray::s![train.clone(), ..]).to_owned();
        let x_test = x.slice(ndarray::s![test.clone(), ..]).to_owned();
        let scaler = Standardizer::fit(&x_train);
        let fold = candidate
            .fit_raw(&scaler.transform(&x_train), &y[train], model)
            .and_then(|fitted| fitted.predict(&scaler.transform(&x_test), model));
        match fold {
            Ok(pred) => scores.push(r_squared(&y[test], &pred)),
            Err(e) => debug!(%candidate, error = %e, "CV fold failed"),
        }
    }
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

/// Pick the candidate with the best mean held-out R² and refit it on all rows
pub fn select_and_fit(
    candidates: &[Regressor],
    x: &Array2<f64>,
    y: &[f64],
    folds: usize,
    model: ModelKind,
) -> Result<RegressionFit> {
    if x.nrows() != y.len() || x.nrows() < folds + 2 {
        return Err(ForecastError::fit(
            model,
            format!("{} training rows are too few for {folds}-fold CV", x.nrows()),
        ));
    }

    let mut best: Option<(Regressor, f64)> = None;
    for &candidate in candidates {
        if let Some(score) = cv_score(candidate, x, y, folds, model) {
            debug!(model = %model, %candidate, score = %format!("{score:.4}"), "CV score");
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }
    }
    let (regressor, cv_score) =
        best.ok_or_else(|| ForecastError::fit(model, "no regression candidate could be validated"))?;

    let scaler = Standardizer::fit(x);
    let fitted = regressor.fit_raw(&scaler.transform(x), y, model)?;
    Ok(RegressionFit {
        regressor,
        cv_score,
        scaler,
        fitted,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_preserve_order() {
        let splits = time_series_splits(12, 5);
        assert_eq!(splits.len(), 5);
        assert_eq!(splits[0], (0..2, 2..4));
        assert_eq!(splits[4], (0..10, 10..12));
        for (train, test) in &splits {
            assert_eq!(train.end, test.start);
        }
        assert!(time_series_splits(4, 5).is_empty());
    }

    #[test]
    fn test_select_recovers_linear_relation() {
        let n = 60;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                ((i * 7) % 11) as f64
            }
        });
        let y: Vec<f64> = (0..n)
            .map(|i| 3.0 + 2.0 * x[[i, 0]] - 0.5 * x[[i, 1]])
            .collect();

        let fit = select_and_fit(
            &[Regressor::Ols, Regressor::Ridge { alpha: 1.0 }],
            &x,
            &y,
            5,
            ModelKind::Linear,
        )
        .unwrap();
        assert!(fit.cv_score > 0.99, "{fit:?}");
        let pred = fit.predict_row(x.row(10)).unwrap();
        assert!((pred - y[10]).abs() < 0.5);
    }

    #[test]
    fn test_ols_on_wide_matrix_is_fit_error() {
        let x = Array2::from_shape_fn((6, 10), |(i, j)| ((i * 3 + j * 5) % 7) as f64);
        let y = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let err = Regressor::Ols
            .fit_raw(&x, &y, ModelKind::Linear)
            .err()
            .unwrap();
        assert!(matches!(err, ForecastError::ModelFit { .. }));
    }

    #[test]
    fn test_wide_early_folds_are_skipped() {
        // first folds train on fewer rows than there are columns
        let n = 90;
        let cols = 20;
        let x = Array2::from_shape_fn((n, cols), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                (i as f64 * (j as f64 + 0.37)).sin()
            }
        });
        let y: Vec<f64> = (0..n).map(|i| 5.0 + 0.5 * x[[i, 0]]).collect();

        let fit = select_and_fit(&[Regressor::Ols], &x, &y, 5, ModelKind::Linear).unwrap();
        assert_eq!(fit.regressor, Regressor::Ols);
        assert!(fit.cv_score > 0.99, "{fit:?}");
    }

    #[test]
    fn test_too_few_rows_is_fit_error() {
        let x = Array2::<f64>::zeros((4, 2));
        let err = select_and_fit(&[Regressor::Ols], &x, &[1.0; 4], 5, ModelKind::Linear).unwrap_err();
        assert!(matches!(err, ForecastError::ModelFit { .. }));
    }
}
