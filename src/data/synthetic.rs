//! Seeded synthetic OHLCV series
//!
//! Business-day series starting 2023-01-02 with a known shape, used by the
//! `--demo` CLI mode, tests and benchmarks.

use chrono::{Datelike, NaiveDate, Weekday};
use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::types::{Bar, OhlcvSeries};

const BASE_PRICE: f64 = 100.0;
const DRIFT: f64 = 0.5;
const NOISE_STD: f64 = 0.5;
const WICK_STD: f64 = 0.3;
const CYCLE_DAYS: f64 = 50.0;
const CYCLE_AMPLITUDE: f64 = 0.03;
const CYCLE_NOISE_STD: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Uptrend,
    Downtrend,
    Range,
}

impl Scenario {
    pub fn generate(&self, n: usize, seed: u64) -> OhlcvSeries {
        match self {
            Scenario::Uptrend => uptrend(n, seed),
            Scenario::Downtrend => downtrend(n, seed),
            Scenario::Range => range_bound(n, seed),
        }
    }
}

/// Next Monday-to-Friday date after `date`
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + chrono::Duration::days(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next += chrono::Duration::days(1);
    }
    next
}

/// `n` consecutive business days after `date`
pub fn business_days_after(date: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut current = date;
    for _ in 0..n {
        current = next_business_day(current);
        out.push(current);
    }
    out
}

fn start_date() -> NaiveDate {
    // Monday
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap_or_default()
}

fn gaussian(rng: &mut StdRng, std: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    z * std
}

/// Wrap a close path in bars with noisy wicks and volume
fn bars_from_closes(closes: &[f64], rng: &mut StdRng) -> OhlcvSeries {
    let mut date = start_date();
    let mut bars = Vec::with_capacity(closes.len());
    for (i, &close) in closes.iter().enumerate() {
        let open = if i == 0 { close } else { closes[i - 1] };
        let high = open.max(close) + gaussian(rng, WICK_STD).abs();
        let low = (open.min(close) - gaussian(rng, WICK_STD).abs()).max(close * 0.5);
        let volume = rng.gen_range(100_000.0..200_000.0);
        bars.push(Bar::new(date, open, high, low, close, volume));
        date = next_business_day(date);
    }
    // Closes stay positive and dates strictly increase
    OhlcvSeries::new(bars).unwrap_or_else(|e| unreachable!("synthetic series invalid: {e}"))
}

fn noisy_line(n: usize, seed: u64, start: f64, slope: f64) -> (Vec<f64>, StdRng) {
    let mut rng = StdRng::seed_from_u64(seed);
    let closes = (0..n)
        .map(|t| (start + slope * t as f64 + gaussian(&mut rng, NOISE_STD)).max(1.0))
        .collect();
    (closes, rng)
}

/// `100 + 0.5 t` plus Gaussian noise
pub fn uptrend(n: usize, seed: u64) -> OhlcvSeries {
    let (closes, mut rng) = noisy_line(n, seed, BASE_PRICE, DRIFT);
    bars_from_closes(&closes, &mut rng)
}

/// Mirror of [`uptrend`], ending near 100
pub fn downtrend(n: usize, seed: u64) -> OhlcvSeries {
    let (closes, mut rng) = noisy_line(n, seed, BASE_PRICE + DRIFT * n as f64, -DRIFT);
    bars_from_closes(&closes, &mut rng)
}

/// Small sine around 100 with light Gaussian noise and tight wicks.
/// Stays inside the default range-bound band.
pub fn range_bound(n: usize, seed: u64) -> OhlcvSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut date = start_date();
    let mut bars = Vec::with_capacity(n);
    for t in 0..n {
        let close = BASE_PRICE
            + CYCLE_AMPLITUDE * (2.0 * PI * t as f64 / CYCLE_DAYS).sin()
            + gaussian(&mut rng, CYCLE_NOISE_STD);
        let volume = rng.gen_range(100_000.0..200_000.0);
        bars.push(Bar::new(date, close, close + 0.01, close - 0.01, close, volume));
        date = next_business_day(date);
    }
    OhlcvSeries::new(bars).unwrap_or_else(|e| unreachable!("synthetic series invalid: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_days_skip_weekends() {
        let friday = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let days = business_days_after(friday, 3);
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            ]
        );
    }

    #[test]
    fn test_generators_are_deterministic() {
        assert_eq!(uptrend(50, 7), uptrend(50, 7));
        assert_ne!(uptrend(50, 7).closes(), uptrend(50, 8).closes());
    }

    #[test]
    fn test_shapes() {
        let up = uptrend(200, 1).closes();
        assert!(up[199] - up[0] > 90.0);
        let down = downtrend(200, 1).closes();
        assert!(down[0] - down[199] > 90.0);
        assert!(down.iter().all(|c| *c > 0.0));
        let range = range_bound(100, 1).closes();
        assert!(range.iter().all(|c| (c - 100.0).abs() < 0.1));
        // noisy, not a pure sine
        let pure = |t: usize| 100.0 + 0.03 * (2.0 * PI * t as f64 / 50.0).sin();
        assert!(range.iter().enumerate().any(|(t, c)| (c - pure(t)).abs() > 1e-3));
    }
}
