use crate::types::Candle;

/// Wilder ATR: SMA of the first `period` true ranges, smoothed afterwards
#[derive(Debug, Clone)]
pub struct ATR {
    period: usize,
    prev_close: Option<f64>,
    true_ranges: Vec<f64>,
    value: Option<f64>,
}

impl ATR {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            true_ranges: Vec::with_capacity(period),
            value: None,
        }
    }

    pub fn update(&mut self, candle: &Candle) -> Option<f64> {
        let tr = candle.true_range(self.prev_close);
        self.prev_close = Some(candle.close);

        match self.value {
            Some(prev_atr) => {
                let period = self.period as f64;
                self.value = Some((prev_atr * (period - 1.0) + tr) / period);
            }
            None => {
                self.true_ranges.push(tr);
                if self.true_ranges.len() == self.period {
                    self.value = Some(self.true_ranges.iter().sum::<f64>() / self.period as f64);
                    self.true_ranges.clear();
                }
            }
        }

        self.value
    }

    /// ATR as a percentage of `price`
    pub fn percent_of(&self, price: f64) -> Option<f64> {
        self.value.map(|atr| atr / price * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(high: f64, low: f64, close: f64) -> Candle {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        Candle::new(ts, close, high, low, close, 1000.0)
    }

    #[test]
    fn test_atr_constant_range() {
        let mut atr = ATR::new(3);
        assert_eq!(atr.update(&bar(11.0, 9.0, 10.0)), None);
        assert_eq!(atr.update(&bar(11.0, 9.0, 10.0)), None);
        assert_eq!(atr.update(&bar(11.0, 9.0, 10.0)), Some(2.0));
        assert_eq!(atr.update(&bar(11.0, 9.0, 10.0)), Some(2.0));
        assert_eq!(atr.percent_of(10.0), Some(20.0));
    }

    #[test]
    fn test_atr_gap_counts_previous_close() {
        let mut atr = ATR::new(1);
        atr.update(&bar(11.0, 9.0, 10.0));
        // gap up: |high - prev_close| = 10
        assert_eq!(atr.update(&bar(20.0, 19.0, 19.5)), Some(10.0));
    }
}
