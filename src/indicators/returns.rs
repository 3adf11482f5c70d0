use super::sample_stddev;

/// Fractional close-to-close changes (`close[t] / close[t-1] - 1`)
pub fn pct_changes(closes: &[f64]) -> Vec<f64> {
    closes.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Sample standard deviation of the last `period` fractional changes
pub fn return_volatility(closes: &[f64], period: usize) -> Option<f64> {
    let changes = pct_changes(closes);
    sample_stddev(&changes, period)
}

/// Percent change from the close `lookback - 1` bars back to the last close
pub fn momentum_pct(closes: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || closes.len() < lookback {
        return None;
    }
    let last = *closes.last()?;
    let base = closes[closes.len() - lookback];
    Some((last / base - 1.0) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_momentum_uses_fifth_bar_from_end() {
        let closes = [90.0, 100.0, 101.0, 102.0, 103.0, 110.0];
        let m = momentum_pct(&closes, 5).unwrap();
        assert!((m - 10.0).abs() < 1e-9);
        assert_eq!(momentum_pct(&closes[..4], 5), None);
    }

    #[test]
    fn test_volatility_of_constant_growth_is_zero() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 * 2f64.powi(i)).collect();
        let vol = return_volatility(&closes, 20).unwrap();
        assert!(vol.abs() < 1e-12);
    }

    #[test]
    fn test_volatility_needs_enough_changes() {
        assert_eq!(return_volatility(&[1.0; 20], 20), None);
        assert_eq!(return_volatility(&[1.0; 21], 20), Some(0.0));
    }
}
