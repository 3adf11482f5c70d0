/// Wilder RSI. The first average is the plain mean of `period` changes.
#[derive(Debug, Clone)]
pub struct RSI {
    period: usize,
    avg_gain: Option<f64>,
    avg_loss: Option<f64>,
    prev_price: Option<f64>,
    gains: Vec<f64>,
    losses: Vec<f64>,
    value: Option<f64>,
}

impl RSI {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            avg_gain: None,
            avg_loss: None,
            prev_price: None,
            gains: Vec::with_capacity(period),
            losses: Vec::with_capacity(period),
            value: None,
        }
    }

    pub fn update(&mut self, price: f64) -> Option<f64> {
        if let Some(prev) = self.prev_price {
            let change = price - prev;
            let gain = if change > 0.0 { change } else { 0.0 };
            let loss = if change < 0.0 { -change } else { 0.0 };

            if self.gains.len() < self.period {
                self.gains.push(gain);
                self.losses.push(loss);

                if self.gains.len() == self.period {
                    let period = self.period as f64;
                    self.avg_gain = Some(self.gains.iter().sum::<f64>() / period);
                    self.avg_loss = Some(self.losses.iter().sum::<f64>() / period);
                    self.value = self.calculate_rsi();
                }
            } else if let (Some(avg_gain), Some(avg_loss)) = (self.avg_gain, self.avg_loss) {
                let period = self.period as f64;
                self.avg_gain = Some((avg_gain * (period - 1.0) + gain) / period);
                self.avg_loss = Some((avg_loss * (period - 1.0) + loss) / period);
                self.value = self.calculate_rsi();
            }
        }

        self.prev_price = Some(price);
        self.value
    }

    fn calculate_rsi(&self) -> Option<f64> {
        match (self.avg_gain, self.avg_loss) {
            (Some(avg_gain), Some(avg_loss)) => {
                if avg_loss == 0.0 && avg_gain == 0.0 {
                    // no movement at all
                    Some(50.0)
                } else if avg_loss == 0.0 {
                    Some(100.0)
                } else {
                    let rs = avg_gain / avg_loss;
                    Some(100.0 - (100.0 / (1.0 + rs)))
                }
            }
            _ => None,
        }
    }
}

/// RSI of the final bar of `closes`, `None` until `period + 1` closes exist
pub fn rsi_last(closes: &[f64], period: usize) -> Option<f64> {
    let mut rsi = RSI::new(period);
    let mut last = None;
    for &close in closes {
        last = rsi.update(close);
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_needs_period_plus_one_prices() {
        let closes: Vec<f64> = (0..14).map(|v| v as f64).collect();
        assert_eq!(rsi_last(&closes, 14), None);
        let closes: Vec<f64> = (0..15).map(|v| v as f64).collect();
        assert_eq!(rsi_last(&closes, 14), Some(100.0));
    }

    #[test]
    fn test_rsi_flat_is_neutral() {
        assert_eq!(rsi_last(&[10.0; 30], 14), Some(50.0));
    }

    #[test]
    fn test_rsi_falling_is_zero() {
        let closes: Vec<f64> = (0..30).map(|v| 100.0 - v as f64).collect();
        assert_eq!(rsi_last(&closes, 14), Some(0.0));
    }

    #[test]
    fn test_rsi_mixed_stays_in_range() {
        let closes = [
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ];
        let value = rsi_last(&closes, 14).unwrap();
        assert!(value > 50.0 && value < 80.0, "rsi {}", value);
    }
}
