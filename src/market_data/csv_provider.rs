use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Interval, MarketDataProvider, Period};
use crate::types::{Candle, PriceHistory};

/// Fewer bars than this after filtering is reported as no history
pub const MIN_HISTORY_BARS: usize = 20;

#[derive(Debug, Deserialize)]
struct BarRecord {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Reads daily bars from `<data_dir>/<SYMBOL>_<EXCHANGE>.csv`
#[derive(Debug, Clone)]
pub struct CsvHistoryProvider {
    data_dir: PathBuf,
}

impl CsvHistoryProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path_for(&self, symbol: &str, exchange: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}.csv", symbol.to_uppercase(), exchange.to_uppercase()))
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("bad timestamp '{}'", raw))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| anyhow!("bad timestamp '{}'", raw))
}

/// Parses bar rows, dropping rows with missing or non-finite values, sorted
/// ascending with later duplicates winning. A row with the wrong number of
/// fields still fails the file.
pub fn parse_bars(content: &str) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let mut candles = Vec::new();
    let mut dropped = 0usize;

    for result in reader.deserialize() {
        let record: BarRecord = match result {
            Ok(record) => record,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Deserialize { .. }) => {
                debug!("Skipping bar row: {}", e);
                dropped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let timestamp = match parse_timestamp(&record.timestamp) {
            Ok(timestamp) => timestamp,
            Err(e) => {
                debug!("Skipping bar row: {}", e);
                dropped += 1;
                continue;
            }
        };
        let candle = Candle::new(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        );
        if candle.is_finite() {
            candles.push(candle);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        warn!("Dropped {} bars with missing values", dropped);
    }

    candles.sort_by_key(|c| c.timestamp);
    let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match deduped.last_mut() {
            Some(last) if last.timestamp == candle.timestamp => *last = candle,
            _ => deduped.push(candle),
        }
    }
    Ok(deduped)
}

/// Keeps the bars inside `period`, measured back from the last bar
pub fn filter_period(candles: Vec<Candle>, period: Period) -> Vec<Candle> {
    let Some(end) = candles.last().map(|c| c.timestamp) else {
        return candles;
    };
    let start = period.start_from(end);
    candles.into_iter().filter(|c| c.timestamp > start).collect()
}

/// Aggregates daily bars into ISO-week bars stamped with the week's first bar
pub fn resample_weekly(candles: &[Candle]) -> Vec<Candle> {
    let mut weeks: Vec<Candle> = Vec::new();
    let mut current_week = None;

    for candle in candles {
        let week = candle.timestamp.iso_week();
        let key = (week.year(), week.week());
        match weeks.last_mut() {
            Some(bar) if current_week == Some(key) => {
                bar.high = bar.high.max(candle.high);
                bar.low = bar.low.min(candle.low);
                bar.close = candle.close;
                bar.volume += candle.volume;
            }
            _ => {
                weeks.push(*candle);
                current_week = Some(key);
            }
        }
    }
    weeks
}

#[async_trait]
impl MarketDataProvider for CsvHistoryProvider {
    async fn get_history(
        &self,
        symbol: &str,
        exchange: &str,
        period: Period,
        interval: Interval,
    ) -> Result<Option<PriceHistory>> {
        let path = self.path_for(symbol, exchange);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No data file for {}:{} at {}", symbol, exchange, path.display());
                return Ok(None);
            }
            Err(e) => return Err(anyhow!("reading {}: {}", path.display(), e)),
        };

        let bars = parse_bars(&content).with_context(|| format!("parsing {}", path.display()))?;
        let bars = filter_period(bars, period);
        let bars = match interval {
            Interval::Daily => bars,
            Interval::Weekly => resample_weekly(&bars),
        };

        if bars.len() < MIN_HISTORY_BARS {
            warn!(
                "Insufficient data for {}:{}: {} bars (need {})",
                symbol,
                exchange,
                bars.len(),
                MIN_HISTORY_BARS
            );
            return Ok(None);
        }

        debug!("Loaded {} bars for {}:{} ({}, {})", bars.len(), symbol, exchange, period, interval);
        Ok(Some(PriceHistory::new(bars)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::fmt::Write as _;

    fn write_daily_file(dir: &Path, name: &str, days: usize) {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut csv = String::from("timestamp,open,high,low,close,volume\n");
        for i in 0..days {
            let day = (start + Duration::days(i as i64)).format("%Y-%m-%d");
            let close = 100.0 + i as f64;
            writeln!(csv, "{},{},{},{},{},{}", day, close, close + 1.0, close - 1.0, close, 1000).unwrap();
        }
        std::fs::write(dir.join(name), csv).unwrap();
    }

    #[test]
    fn test_parse_drops_bad_rows_and_sorts() {
        let content = "timestamp,open,high,low,close,volume\n\
                       2024-01-03,1,2,0.5,1.5,100\n\
                       2024-01-01,1,2,0.5,1.2,100\n\
                       2024-01-02,1,2,0.5,NaN,100\n\
                       2024-01-01,1,2,0.5,1.3,100\n";
        let bars = parse_bars(content).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 1.3);
        assert_eq!(bars[1].close, 1.5);
    }

    #[test]
    fn test_parse_skips_rows_with_empty_cells() {
        let content = "timestamp,open,high,low,close,volume\n\
                       2024-01-01,1,2,0.5,1.2,100\n\
                       2024-01-02,1,2,0.5,,100\n\
                       ,1,2,0.5,1.4,100\n\
                       2024-01-04,1,2,0.5,1.5,\n\
                       2024-01-05,1,2,0.5,1.6,100\n";
        let bars = parse_bars(content).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 1.2);
        assert_eq!(bars[1].close, 1.6);
    }

    #[test]
    fn test_parse_rejects_ragged_rows() {
        let content = "timestamp,open,high,low,close,volume\n\
                       2024-01-01,1,2,0.5\n";
        assert!(parse_bars(content).is_err());
    }

    #[test]
    fn test_parse_accepts_rfc3339() {
        let ts = parse_timestamp("2024-03-01T15:30:00+05:30").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        assert!(parse_timestamp("March 1st").is_err());
    }

    #[test]
    fn test_weekly_resample() {
        // 2024-01-01 is a Monday
        let content: String = std::iter::once("timestamp,open,high,low,close,volume".to_string())
            .chain((0..10).map(|i| format!("2024-01-{:02},{},{},{},{},10", i + 1, i, i + 5, i, i + 1)))
            .collect::<Vec<_>>()
            .join("\n");
        let weeks = resample_weekly(&parse_bars(&content).unwrap());
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].open, 0.0);
        assert_eq!(weeks[0].close, 7.0);
        assert_eq!(weeks[0].high, 11.0);
        assert_eq!(weeks[0].volume, 70.0);
        assert_eq!(weeks[1].volume, 30.0);
    }

    #[tokio::test]
    async fn test_provider_filters_by_period() {
        let dir = tempfile::tempdir().unwrap();
        write_daily_file(dir.path(), "INFY_NSE.csv", 400);
        let provider = CsvHistoryProvider::new(dir.path());

        let history = provider
            .get_history("infy", "nse", Period::ThreeMonths, Interval::Daily)
            .await
            .unwrap()
            .unwrap();
        assert!(history.len() >= 89 && history.len() <= 92);

        let full = provider
            .get_history("INFY", "NSE", Period::TwoYears, Interval::Daily)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(full.len(), 400);
    }

    #[tokio::test]
    async fn test_provider_short_or_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        write_daily_file(dir.path(), "TINY_NSE.csv", 19);
        let provider = CsvHistoryProvider::new(dir.path());

        assert!(provider
            .get_history("TINY", "NSE", Period::OneYear, Interval::Daily)
            .await
            .unwrap()
            .is_none());
        assert!(provider
            .get_history("NOPE", "NSE", Period::OneYear, Interval::Daily)
            .await
            .unwrap()
            .is_none());
    }
}
