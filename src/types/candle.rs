use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { timestamp, open, high, low, close, volume }
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }

    /// True range against the previous close (plain range for the first bar)
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let hl = self.range();
        match prev_close {
            Some(prev) => hl.max((self.high - prev).abs()).max((self.low - prev).abs()),
            None => hl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    #[error("bar {index} at {timestamp} is not after the previous bar")]
    OutOfOrder { index: usize, timestamp: DateTime<Utc> },
}

/// Ordered OHLCV series: ascending timestamps, no duplicates.
/// Read-only once built; windows are borrowed slices of the same bars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    candles: Vec<Candle>,
}

impl PriceHistory {
    pub fn new(candles: Vec<Candle>) -> Result<Self, HistoryError> {
        for (index, pair) in candles.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(HistoryError::OutOfOrder {
                    index: index + 1,
                    timestamp: pair[1].timestamp,
                });
            }
        }
        Ok(Self { candles })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Bars `0..=index`, the only bars visible at decision time `index`
    pub fn up_to(&self, index: usize) -> &[Candle] {
        let end = (index + 1).min(self.candles.len());
        &self.candles[..end]
    }
}

pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

pub fn volumes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.volume).collect()
}
