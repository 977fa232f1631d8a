//! Market data input
//!
//! CSV loading of daily OHLCV bars, plus seeded synthetic series for demos
//! and tests.

use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{ForecastError, Result};
use crate::types::{Bar, OhlcvSeries};

pub mod synthetic;

/// One CSV row as written by common market-data exports.
/// Fields stay textual so "null" placeholders can be skipped per row.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "Date", alias = "date")]
    date: String,
    #[serde(rename = "Open", alias = "open")]
    open: String,
    #[serde(rename = "High", alias = "high")]
    high: String,
    #[serde(rename = "Low", alias = "low")]
    low: String,
    #[serde(rename = "Close", alias = "close")]
    close: String,
    #[serde(rename = "Volume", alias = "volume")]
    volume: String,
}

impl CsvRecord {
    fn to_bar(&self) -> Option<Bar> {
        // Accept "2024-01-02" as well as "2024-01-02 00:00:00-05:00"
        let date = NaiveDate::parse_from_str(self.date.get(..10)?, "%Y-%m-%d").ok()?;
        let num = |s: &str| s.trim().parse::<f64>().ok().filter(|v| v.is_finite());
        Some(Bar::new(
            date,
            num(&self.open)?,
            num(&self.high)?,
            num(&self.low)?,
            num(&self.close)?,
            num(&self.volume)?,
        ))
    }
}

/// Load a daily OHLCV series from a CSV file with
/// `Date,Open,High,Low,Close,Volume` headers. Extra columns are ignored.
pub fn load_csv(path: impl AsRef<Path>) -> Result<OhlcvSeries> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| ForecastError::Io(format!("{}: {e}", path.display())))?;
    let series = read_csv(file)?;
    info!(
        path = %path.display(),
        bars = series.len(),
        first = %series.bars()[0].date,
        last = %series.last_date(),
        "Loaded OHLCV series"
    );
    Ok(series)
}

/// Parse OHLCV CSV from any reader.
///
/// Rows with unparseable fields are skipped with a warning. Rows are sorted
/// by date and a repeated date keeps its last row.
pub fn read_csv<R: Read>(reader: R) -> Result<OhlcvSeries> {
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    let mut skipped = 0usize;

    for (line, record) in reader.deserialize::<CsvRecord>().enumerate() {
        let record = record.map_err(|e| ForecastError::Io(e.to_string()))?;
        match record.to_bar() {
            Some(bar) => bars.push(bar),
            None => {
                skipped += 1;
                warn!(row = line + 1, date = %record.date, "Skipping unparseable CSV row");
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, "CSV rows skipped");
    }

    bars.sort_by_key(|b| b.date);
    let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match deduped.last_mut() {
            Some(prev) if prev.date == bar.date => *prev = bar,
            _ => deduped.push(bar),
        }
    }
    OhlcvSeries::new(deduped)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Date,Open,High,Low,Close,Adj Close,Volume
2024-01-03,11.0,12.0,10.5,11.5,11.5,1200
2024-01-02,10.0,11.0,9.5,10.5,10.5,1000
2024-01-04,null,null,null,null,null,null
2024-01-05 00:00:00-05:00,11.5,12.5,11.0,12.0,12.0,900
";

    #[test]
    fn test_read_csv_sorts_and_skips_null_rows() {
        let series = read_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.closes(), vec![10.5, 11.5, 12.0]);
        assert_eq!(
            series.last_date(),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
        );
    }

    #[test]
    fn test_duplicate_dates_keep_last_row() {
        let csv = "Date,Open,High,Low,Close,Volume\n\
                   2024-01-02,10,11,9,10,1\n\
                   2024-01-02,10,11,9,10.8,1\n";
        let series = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(series.closes(), vec![10.8]);
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        let only_nulls = "Date,Open,High,Low,Close,Volume\n2024-01-02,null,null,null,null,null\n";
        assert_eq!(read_csv(only_nulls.as_bytes()), Err(ForecastError::EmptySeries));

        let negative = "Date,Open,High,Low,Close,Volume\n2024-01-02,10,11,9,-1,5\n";
        assert!(matches!(
            read_csv(negative.as_bytes()),
            Err(ForecastError::InvalidBar { index: 0, .. })
        ));

        assert!(matches!(load_csv("/nonexistent/prices.csv"), Err(ForecastError::Io(_))));
    }
}
