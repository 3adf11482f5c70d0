use crate::types::{PriceHistory, TradeLabel};

/// Bars looked ahead when labelling a sample
pub const LABEL_HORIZON: usize = 5;

/// Forward return (percent) above which a bar is labelled BUY, and below whose
/// negation it is labelled SELL
pub const LABEL_THRESHOLD_PCT: f64 = 3.0;

/// Percent return from `close[i]` to `close[i + LABEL_HORIZON]`
pub fn forward_return_pct(history: &PriceHistory, i: usize) -> Option<f64> {
    let candles = history.candles();
    let now = candles.get(i)?.close;
    let later = candles.get(i + LABEL_HORIZON)?.close;
    Some((later - now) / now * 100.0)
}

/// Supervised label for bar `i`, or `None` when fewer than five bars follow it
pub fn label_at(history: &PriceHistory, i: usize) -> Option<TradeLabel> {
    forward_return_pct(history, i).map(label_for_return)
}

pub fn label_for_return(return_pct: f64) -> TradeLabel {
    if return_pct > LABEL_THRESHOLD_PCT {
        TradeLabel::Buy
    } else if return_pct < -LABEL_THRESHOLD_PCT {
        TradeLabel::Sell
    } else {
        TradeLabel::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::history_from_closes;

    fn series_ending_at(last: f64) -> PriceHistory {
        history_from_closes(&[100.0, 100.0, 100.0, 100.0, 100.0, last], &[1000.0; 6])
    }

    #[test]
    fn test_labels_at_thresholds() {
        assert_eq!(label_at(&series_ending_at(104.0), 0), Some(TradeLabel::Buy));
        assert_eq!(label_at(&series_ending_at(96.0), 0), Some(TradeLabel::Sell));
        assert_eq!(label_at(&series_ending_at(101.0), 0), Some(TradeLabel::Hold));
    }

    #[test]
    fn test_exact_threshold_is_hold() {
        assert_eq!(label_for_return(3.0), TradeLabel::Hold);
        assert_eq!(label_for_return(-3.0), TradeLabel::Hold);
        assert_eq!(label_for_return(3.0001), TradeLabel::Buy);
    }

    #[test]
    fn test_no_label_without_horizon() {
        let history = series_ending_at(104.0);
        assert_eq!(label_at(&history, 1), None);
        assert_eq!(label_at(&history, 10), None);
    }
}
