use super::ema::EMA;

#[derive(Debug, Clone)]
pub struct MACD {
    fast_ema: EMA,
    slow_ema: EMA,
    signal_ema: EMA,
}

impl MACD {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast_ema: EMA::new(fast_period),
            slow_ema: EMA::new(slow_period),
            signal_ema: EMA::new(signal_period),
        }
    }

    pub fn default_params() -> Self {
        Self::new(12, 26, 9)
    }

    pub fn update(&mut self, price: f64) -> Option<MACDOutput> {
        let fast = self.fast_ema.update(price);
        let slow = self.slow_ema.update(price);

        if let (Some(f), Some(s)) = (fast, slow) {
            let macd_line = f - s;
            if let Some(signal) = self.signal_ema.update(macd_line) {
                return Some(MACDOutput {
                    macd_line,
                    signal_line: signal,
                    histogram: macd_line - signal,
                });
            }
        }

        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MACDOutput {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
}

/// MACD(12, 26, 9) at the final bar of `closes`
pub fn macd_last(closes: &[f64]) -> Option<MACDOutput> {
    let mut macd = MACD::default_params();
    let mut last = None;
    for &close in closes {
        last = macd.update(close);
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_ready_after_slow_plus_signal() {
        let closes: Vec<f64> = (0..33).map(|v| 100.0 + v as f64).collect();
        assert!(macd_last(&closes).is_none());
        let closes: Vec<f64> = (0..34).map(|v| 100.0 + v as f64).collect();
        assert!(macd_last(&closes).is_some());
    }

    #[test]
    fn test_macd_flat_is_zero() {
        let out = macd_last(&[50.0; 60]).unwrap();
        assert_eq!(out.macd_line, 0.0);
        assert_eq!(out.signal_line, 0.0);
        assert_eq!(out.histogram, 0.0);
    }

    #[test]
    fn test_macd_uptrend_is_positive() {
        let closes: Vec<f64> = (0..60).map(|v| 100.0 + v as f64).collect();
        let out = macd_last(&closes).unwrap();
        assert!(out.macd_line > 0.0);
        assert!((out.histogram - (out.macd_line - out.signal_line)).abs() < 1e-12);
    }
}
