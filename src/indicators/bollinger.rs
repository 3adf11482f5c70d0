use super::{sma, stddev};

#[derive(Debug, Clone)]
pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: f64,
    prices: Vec<f64>,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev_multiplier: f64) -> Self {
        Self {
            period,
            std_dev_multiplier,
            prices: Vec::with_capacity(period),
        }
    }

    /// Bands are raw arithmetic: `percent_b` and `width` are non-finite when
    /// the band has zero width or the middle band is zero.
    pub fn update(&mut self, price: f64) -> Option<BollingerOutput> {
        self.prices.push(price);
        if self.prices.len() > self.period {
            self.prices.remove(0);
        }

        if self.prices.len() < self.period {
            return None;
        }

        let middle = sma(&self.prices, self.period)?;
        let deviation = stddev(&self.prices, self.period)? * self.std_dev_multiplier;
        let upper = middle + deviation;
        let lower = middle - deviation;

        Some(BollingerOutput {
            upper,
            middle,
            lower,
            percent_b: (price - lower) / (upper - lower),
            width: (upper - lower) / middle,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerOutput {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// 0 at the lower band, 1 at the upper band
    pub percent_b: f64,
    /// Band width relative to the middle band
    pub width: f64,
}

impl BollingerOutput {
    /// %B guarded against a collapsed band
    pub fn position_or(&self, neutral: f64) -> f64 {
        if self.upper > self.lower {
            self.percent_b
        } else {
            neutral
        }
    }
}

pub fn bollinger_last(closes: &[f64], period: usize, std_dev_multiplier: f64) -> Option<BollingerOutput> {
    let mut bands = BollingerBands::new(period, std_dev_multiplier);
    let mut last = None;
    for &close in closes {
        last = bands.update(close);
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_band_collapses() {
        let out = bollinger_last(&[10.0; 25], 20, 2.0).unwrap();
        assert_eq!(out.upper, out.lower);
        assert!(out.percent_b.is_nan());
        assert_eq!(out.width, 0.0);
        assert_eq!(out.position_or(0.5), 0.5);
    }

    #[test]
    fn test_percent_b_of_linear_decline() {
        let closes: Vec<f64> = (0..20).map(|v| 120.0 - 0.5 * v as f64).collect();
        let out = bollinger_last(&closes, 20, 2.0).unwrap();
        assert!(out.percent_b > 0.0 && out.percent_b < 0.2, "%B {}", out.percent_b);
        assert!(out.width > 0.0);
    }

    #[test]
    fn test_not_ready_before_period() {
        assert!(bollinger_last(&[1.0; 19], 20, 2.0).is_none());
    }
}
