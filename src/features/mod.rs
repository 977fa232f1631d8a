//! Feature Builder - Technical features from daily OHLCV bars
//!
//! Computes a row-aligned feature matrix for the regression models:
//! - Returns / log returns
//! - SMA, EMA and rolling std/min/max/median/skew per window
//! - Momentum and rate of change
//! - Volume ratios and daily-range statistics
//! - Up-day ratios and OHLC cross ratios
//! - Cyclical day-of-week / month encodings
//!
//! Rows with any undefined value are dropped, so the matrix is shorter than
//! the input series. Index it from its own end, never by series position.

use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, Array2, ArrayView1};
use std::f64::consts::PI;
use tracing::debug;

use crate::config::FeatureConfig;
use crate::error::{ForecastError, Result};
use crate::types::OhlcvSeries;

pub mod rolling;

/// Engineered features, one row per surviving date
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    names: Vec<String>,
    dates: Vec<NaiveDate>,
    /// Position of each row in the source series
    source_index: Vec<usize>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn source_index(&self) -> &[usize] {
        &self.source_index
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    /// Row `offset` positions back from the newest (0 = last row)
    pub fn row_from_end(&self, offset: usize) -> Option<ArrayView1<'_, f64>> {
        let n = self.n_rows();
        if offset >= n {
            return None;
        }
        Some(self.values.row(n - 1 - offset))
    }

    pub fn last_row(&self) -> Option<ArrayView1<'_, f64>> {
        self.row_from_end(0)
    }

    /// Column by feature name
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(self.values.column(idx))
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.values.outer_iter().map(|r| r.to_vec()).collect()
    }
}

/// Builds [`FeatureMatrix`] values from a series. Stateless; every call
/// recomputes from scratch.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new(FeatureConfig::default())
    }
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn min_rows(&self) -> usize {
        self.config.min_rows()
    }

    pub fn build(&self, series: &OhlcvSeries) -> Result<FeatureMatrix> {
        let required = self.min_rows();
        if series.len() < required {
            return Err(ForecastError::InsufficientData {
                required,
                available: series.len(),
            });
        }

        let bars = series.bars();
        let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let open: Vec<f64> = bars.iter().map(|b| b.open).collect();
        let high: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let low: Vec<f64> = bars.iter().map(|b| b.low).collect();
        let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let mut columns: Vec<(String, Vec<f64>)> = Vec::new();

        let returns = rolling::pct_change(&close, 1);
        let log_returns: Vec<f64> = (0..close.len())
            .map(|i| {
                if i == 0 {
                    f64::NAN
                } else {
                    (close[i] / close[i - 1]).ln()
                }
            })
            .collect();
        let daily_range: Vec<f64> = bars.iter().map(|b| b.range()).collect();
        let up_day = returns.clone();

        columns.push(("returns".into(), returns));
        columns.push(("log_returns".into(), log_returns));
        // Zero-volume days make this undefined; it is mapped to 0 below
        columns.push(("volume_change".into(), rolling::pct_change(&volume, 1)));
        columns.push(("daily_range".into(), daily_range.clone()));
        columns.push((
            "range_pct".into(),
            (0..close.len()).map(|i| daily_range[i] / close[i] * 100.0).collect(),
        ));
        columns.push((
            "close_open_ratio".into(),
            (0..close.len()).map(|i| close[i] / open[i]).collect(),
        ));
        columns.push((
            "high_close_ratio".into(),
            (0..close.len()).map(|i| high[i] / close[i]).collect(),
        ));
        columns.push((
            "low_close_ratio".into(),
            (0..close.len()).map(|i| low[i] / close[i]).collect(),
        ));
        columns.push((
            "close_location".into(),
            (0..close.len())
                .map(|i| {
                    if daily_range[i] > 0.0 {
                        (close[i] - low[i]) / daily_range[i]
                    } else {
                        0.5
                    }
                })
                .collect(),
        ));

        for &w in &self.config.windows {
            let sma = rolling::rolling_mean(&close, w);
            let volume_sma = rolling::rolling_mean(&volume, w);
            columns.push((format!("sma_{w}"), sma));
            columns.push((format!("ema_{w}"), rolling::ema(&close, w)));
            columns.push((format!("std_{w}"), rolling::rolling_std(&close, w)));
            columns.push((format!("min_{w}"), rolling::rolling_min(&close, w)));
            columns.push((format!("max_{w}"), rolling::rolling_max(&close, w)));
            columns.push((format!("median_{w}"), rolling::rolling_median(&close, w)));
            columns.push((format!("skew_{w}"), rolling::rolling_skew(&close, w)));
            columns.push((format!("momentum_{w}"), rolling::diff(&close, w)));
            columns.push((
                format!("roc_{w}"),
                rolling::pct_change(&close, w).iter().map(|v| v * 100.0).collect(),
            ));
            columns.push((
                format!("volume_ratio_{w}"),
                (0..volume.len())
                    .map(|i| {
                        if volume_sma[i] > 0.0 {
                            volume[i] / volume_sma[i]
                        } else if volume_sma[i].is_nan() {
                            f64::NAN
                        } else {
                            1.0
                        }
                    })
                    .collect(),
            ));
            columns.push((format!("volume_sma_{w}"), volume_sma));
            columns.push((format!("range_sma_{w}"), rolling::rolling_mean(&daily_range, w)));
            columns.push((
                format!("up_ratio_{w}"),
                rolling::rolling_positive_ratio(&up_day, w),
            ));
        }

        if self.config.calendar_features {
            let weekday: Vec<f64> = bars
                .iter()
                .map(|b| b.date.weekday().num_days_from_monday() as f64)
                .collect();
            let month: Vec<f64> = bars.iter().map(|b| b.date.month0() as f64).collect();
            columns.push((
                "dow_sin".into(),
                weekday.iter().map(|d| (2.0 * PI * d / 7.0).sin()).collect(),
            ));
            columns.push((
                "dow_cos".into(),
                weekday.iter().map(|d| (2.0 * PI * d / 7.0).cos()).collect(),
            ));
            columns.push((
                "month_sin".into(),
                month.iter().map(|m| (2.0 * PI * m / 12.0).sin()).collect(),
            ));
            columns.push((
                "month_cos".into(),
                month.iter().map(|m| (2.0 * PI * m / 12.0).cos()).collect(),
            ));
        }

        // volume_change is the one column allowed to be infinite mid-series
        for (name, values) in columns.iter_mut() {
            if name == "volume_change" {
                for (i, v) in values.iter_mut().enumerate() {
                    if i > 0 && !v.is_finite() {
                        *v = 0.0;
                    }
                }
            }
        }

        let kept: Vec<usize> = (0..close.len())
            .filter(|&i| columns.iter().all(|(_, col)| col[i].is_finite()))
            .collect();

        if kept.is_empty() {
            return Err(ForecastError::InsufficientData {
                required,
                available: series.len(),
            });
        }

        let mut values = Array2::<f64>::zeros((kept.len(), columns.len()));
        for (c, (_, col)) in columns.iter().enumerate() {
            for (r, &i) in kept.iter().enumerate() {
                values[[r, c]] = col[i];
            }
        }

        debug!(
            rows = kept.len(),
            features = columns.len(),
            dropped = close.len() - kept.len(),
            "Built feature matrix"
        );

        Ok(FeatureMatrix {
            names: columns.into_iter().map(|(name, _)| name).collect(),
            dates: kept.iter().map(|&i| bars[i].date).collect(),
            source_index: kept,
            values,
        })
    }
}

/// Column-wise standardization fitted on a training block.
/// Zero-variance columns map to 0.
#[derive(Debug, Clone)]
pub struct Standardizer {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Standardizer {
    pub fn fit(x: &Array2<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let mean = x.sum_axis(ndarray::Axis(0)) / n;
        let mut scale = Array1::<f64>::zeros(x.ncols());
        for (c, col) in x.columns().into_iter().enumerate() {
            let var = col.iter().map(|v| (v - mean[c]).powi(2)).sum::<f64>() / n;
            scale[c] = var.sqrt();
        }
        Self { mean, scale }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for mut row in out.rows_mut() {
            self.transform_row_in_place(&mut row);
        }
        out
    }

    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut out = row.to_owned();
        let mut view = out.view_mut();
        self.transform_row_in_place(&mut view);
        out
    }

    fn transform_row_in_place(&self, row: &mut ndarray::ArrayViewMut1<'_, f64>) {
        for (c, v) in row.iter_mut().enumerate() {
            *v = if self.scale[c] > 1e-12 {
                (*v - self.mean[c]) / self.scale[c]
            } else {
                0.0
            };
        }
    }
}
