pub mod cache;
pub mod clock;
pub mod csv_provider;

pub use cache::CachedProvider;
pub use clock::{Clock, ManualClock, SystemClock};
pub use csv_provider::CsvHistoryProvider;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::types::PriceHistory;

/// How far back a history request reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::FiveDays => "5d",
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::TwoYears => "2y",
        }
    }

    /// Earliest timestamp covered when the window ends at `end` (exclusive)
    pub fn start_from(&self, end: DateTime<Utc>) -> DateTime<Utc> {
        let months = |n: u32| end.checked_sub_months(Months::new(n)).unwrap_or(DateTime::<Utc>::MIN_UTC);
        match self {
            Period::OneDay => end - Duration::days(1),
            Period::FiveDays => end - Duration::days(5),
            Period::OneMonth => months(1),
            Period::ThreeMonths => months(3),
            Period::SixMonths => months(6),
            Period::OneYear => months(12),
            Period::TwoYears => months(24),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1d" => Ok(Period::OneDay),
            "5d" => Ok(Period::FiveDays),
            "1mo" => Ok(Period::OneMonth),
            "3mo" => Ok(Period::ThreeMonths),
            "6mo" => Ok(Period::SixMonths),
            "1y" => Ok(Period::OneYear),
            "2y" => Ok(Period::TwoYears),
            _ => Err(anyhow!("Unknown period: {}", s)),
        }
    }
}

/// Bar size of a history request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1wk")]
    Weekly,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "1d",
            Interval::Weekly => "1wk",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1d" => Ok(Interval::Daily),
            "1wk" => Ok(Interval::Weekly),
            _ => Err(anyhow!("Unknown interval: {}", s)),
        }
    }
}

/// Source of genuine OHLCV history.
///
/// `Ok(None)` means the provider has no usable history for the instrument;
/// `Err` is a transport or parsing failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_history(
        &self,
        symbol: &str,
        exchange: &str,
        period: Period,
        interval: Interval,
    ) -> Result<Option<PriceHistory>>;
}

#[async_trait]
impl<P: MarketDataProvider + ?Sized> MarketDataProvider for Arc<P> {
    async fn get_history(
        &self,
        symbol: &str,
        exchange: &str,
        period: Period,
        interval: Interval,
    ) -> Result<Option<PriceHistory>> {
        (**self).get_history(symbol, exchange, period, interval).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_period_parsing() {
        assert_eq!("6mo".parse::<Period>().unwrap(), Period::SixMonths);
        assert_eq!(Period::ThreeMonths.to_string(), "3mo");
        assert!("7mo".parse::<Period>().is_err());
        assert_eq!("1wk".parse::<Interval>().unwrap(), Interval::Weekly);
        assert_eq!(serde_json::to_string(&Period::TwoYears).unwrap(), "\"2y\"");
    }

    #[test]
    fn test_period_start() {
        let end = Utc.with_ymd_and_hms(2024, 8, 31, 0, 0, 0).unwrap();
        assert_eq!(
            Period::SixMonths.start_from(end),
            Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap()
        );
        assert_eq!(Period::FiveDays.start_from(end), end - Duration::days(5));
    }
}
