use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use super::Strategy;
use crate::error::SignalError;
use crate::indicators::{bollinger_last, macd_last, rsi_last, volume_profile};
use crate::types::{closes, volumes, Candle, TradeLabel};

/// Bars needed before the voter casts any votes
pub const MIN_SIGNAL_BARS: usize = 50;

const NEUTRAL_STRENGTH: f64 = 0.5;
const MAX_STRENGTH: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MacdRelation {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BandRelation {
    Oversold,
    Overbought,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolumeRelation {
    High,
    Low,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorReadout {
    pub rsi: f64,
    pub macd: MacdRelation,
    pub bollinger: BandRelation,
    pub volume: VolumeRelation,
}

impl Default for IndicatorReadout {
    fn default() -> Self {
        Self {
            rsi: 50.0,
            macd: MacdRelation::Neutral,
            bollinger: BandRelation::Neutral,
            volume: VolumeRelation::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub signal: TradeLabel,
    pub strength: f64,
    pub indicators: IndicatorReadout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SignalResult {
    pub fn neutral() -> Self {
        Self {
            signal: TradeLabel::Hold,
            strength: NEUTRAL_STRENGTH,
            indicators: IndicatorReadout::default(),
            error: None,
        }
    }

    fn degraded(err: &SignalError) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::neutral()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

impl fmt::Display for SignalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2})", self.signal, self.strength)
    }
}

/// Unclamped indicator values at the last bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub rsi: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub bb_position: f64,
    pub volume_ratio: f64,
}

impl Readings {
    pub fn from_candles(candles: &[Candle]) -> Result<Self, SignalError> {
        let closes = closes(candles);
        let volumes = volumes(candles);

        let rsi = rsi_last(&closes, 14).ok_or(SignalError::NonFinite { indicator: "RSI" })?;
        let macd = macd_last(&closes).ok_or(SignalError::NonFinite { indicator: "MACD" })?;
        let bb_position = bollinger_last(&closes, 20, 2.0)
            .map(|b| b.position_or(0.5))
            .ok_or(SignalError::NonFinite { indicator: "Bollinger" })?;
        let current_volume = volumes.last().copied().unwrap_or(0.0);
        let volume_ratio = volume_profile(&volumes, 20)
            .relative_volume(current_volume)
            .unwrap_or(1.0);

        let readings = Self {
            rsi,
            macd_line: macd.macd_line,
            macd_signal: macd.signal_line,
            bb_position,
            volume_ratio,
        };
        readings.check_finite()?;
        Ok(readings)
    }

    fn check_finite(&self) -> Result<(), SignalError> {
        let checks = [
            ("RSI", self.rsi),
            ("MACD", self.macd_line),
            ("MACD signal", self.macd_signal),
            ("Bollinger", self.bb_position),
            ("volume ratio", self.volume_ratio),
        ];
        match checks.iter().find(|(_, v)| !v.is_finite()) {
            Some((indicator, _)) => Err(SignalError::NonFinite { indicator: *indicator }),
            None => Ok(()),
        }
    }

    /// Returns (buy votes, sell votes)
    pub fn tally(&self) -> (u32, u32) {
        let mut buy = 0;
        let mut sell = 0;

        if self.rsi < 30.0 {
            buy += 2;
        } else if self.rsi > 70.0 {
            sell += 2;
        }

        if self.macd_line > self.macd_signal {
            buy += 1;
        } else if self.macd_line < self.macd_signal {
            sell += 1;
        }

        if self.bb_position < 0.2 {
            buy += 1;
        } else if self.bb_position > 0.8 {
            sell += 1;
        }

        // volume confirms the leading side, ties stay tied
        if self.volume_ratio > 1.5 {
            if buy > sell {
                buy += 1;
            } else if sell > buy {
                sell += 1;
            }
        }

        (buy, sell)
    }

    pub fn readout(&self) -> IndicatorReadout {
        let macd = if self.macd_line > self.macd_signal {
            MacdRelation::Bullish
        } else if self.macd_line < self.macd_signal {
            MacdRelation::Bearish
        } else {
            MacdRelation::Neutral
        };
        let bollinger = if self.bb_position < 0.2 {
            BandRelation::Oversold
        } else if self.bb_position > 0.8 {
            BandRelation::Overbought
        } else {
            BandRelation::Neutral
        };
        let volume = if self.volume_ratio > 1.5 {
            VolumeRelation::High
        } else if self.volume_ratio < 0.7 {
            VolumeRelation::Low
        } else {
            VolumeRelation::Normal
        };

        IndicatorReadout {
            rsi: self.rsi,
            macd,
            bollinger,
            volume,
        }
    }
}

/// BUY or SELL needs a lead of at least two votes
pub fn decide(buy: u32, sell: u32) -> (TradeLabel, f64) {
    if buy > sell + 1 {
        let strength = (NEUTRAL_STRENGTH + 0.1 * (buy - sell) as f64).min(MAX_STRENGTH);
        (TradeLabel::Buy, strength)
    } else if sell > buy + 1 {
        let strength = (NEUTRAL_STRENGTH + 0.1 * (sell - buy) as f64).min(MAX_STRENGTH);
        (TradeLabel::Sell, strength)
    } else {
        (TradeLabel::Hold, NEUTRAL_STRENGTH)
    }
}

/// Majority vote over RSI, MACD, Bollinger and volume
#[derive(Debug, Clone, Default)]
pub struct IndicatorVoter;

impl IndicatorVoter {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for IndicatorVoter {
    fn name(&self) -> &str {
        "IndicatorVoter"
    }

    fn min_candles_required(&self) -> usize {
        MIN_SIGNAL_BARS
    }

    fn analyze(&self, candles: &[Candle]) -> SignalResult {
        if candles.len() < self.min_candles_required() {
            debug!("Only {} bars, voter stays neutral", candles.len());
            return SignalResult::neutral();
        }

        let readings = match Readings::from_candles(candles) {
            Ok(readings) => readings,
            Err(e) => {
                warn!("Error generating signals: {}", e);
                return SignalResult::degraded(&e);
            }
        };

        let (buy, sell) = readings.tally();
        let (signal, strength) = decide(buy, sell);
        debug!("Votes buy={} sell={} -> {} ({:.2})", buy, sell, signal, strength);

        SignalResult {
            signal,
            strength,
            indicators: readings.readout(),
            error: None,
        }
    }
}

pub fn generate_signal(candles: &[Candle]) -> SignalResult {
    IndicatorVoter::new().analyze(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::{flat_history, history_from_closes};

    fn readings(rsi: f64, macd_line: f64, bb_position: f64, volume_ratio: f64) -> Readings {
        Readings {
            rsi,
            macd_line,
            macd_signal: 0.0,
            bb_position,
            volume_ratio,
        }
    }

    /// Steady decline that decelerates, ending on a volume spike
    fn capitulation_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..40).map(|i| 200.0 - 2.0 * i as f64).collect();
        closes.extend((1..=20).map(|k| 122.0 - 0.5 * k as f64));
        closes
    }

    fn spike_volumes(n: usize) -> Vec<f64> {
        let mut volumes = vec![1000.0; n];
        volumes[n - 1] = 5000.0;
        volumes
    }

    #[test]
    fn test_short_window_is_neutral() {
        let result = generate_signal(flat_history(49).candles());
        assert_eq!(result, SignalResult::neutral());
        assert!(!result.is_degraded());
    }

    #[test]
    fn test_flat_series_holds() {
        let result = generate_signal(flat_history(60).candles());
        assert_eq!(result.signal, TradeLabel::Hold);
        assert_eq!(result.strength, 0.5);
        assert_eq!(result.indicators.rsi, 50.0);
        assert_eq!(result.indicators.macd, MacdRelation::Neutral);
        assert_eq!(result.indicators.bollinger, BandRelation::Neutral);
        assert_eq!(result.indicators.volume, VolumeRelation::Normal);
    }

    #[test]
    fn test_capitulation_is_a_strong_buy() {
        let history = history_from_closes(&capitulation_closes(), &spike_volumes(60));
        let result = generate_signal(history.candles());
        assert_eq!(result.signal, TradeLabel::Buy);
        assert!((result.strength - 0.9).abs() < 1e-12);
        assert_eq!(result.indicators.rsi, 0.0);
        assert_eq!(result.indicators.macd, MacdRelation::Bullish);
        assert_eq!(result.indicators.bollinger, BandRelation::Oversold);
        assert_eq!(result.indicators.volume, VolumeRelation::High);
    }

    #[test]
    fn test_blow_off_top_is_a_strong_sell() {
        let closes: Vec<f64> = capitulation_closes().iter().map(|c| 300.0 - c).collect();
        let history = history_from_closes(&closes, &spike_volumes(60));
        let result = generate_signal(history.candles());
        assert_eq!(result.signal, TradeLabel::Sell);
        assert!((result.strength - 0.9).abs() < 1e-12);
        assert_eq!(result.indicators.macd, MacdRelation::Bearish);
        assert_eq!(result.indicators.bollinger, BandRelation::Overbought);
    }

    #[test]
    fn test_tally_weights() {
        assert_eq!(readings(25.0, 1.0, 0.1, 1.0).tally(), (4, 0));
        assert_eq!(readings(75.0, -1.0, 0.9, 1.0).tally(), (0, 4));
        assert_eq!(readings(25.0, -1.0, 0.5, 1.0).tally(), (2, 1));
        // volume boosts only a strict leader
        assert_eq!(readings(25.0, -1.0, 0.5, 2.0).tally(), (3, 1));
        assert_eq!(readings(50.0, 1.0, 0.9, 2.0).tally(), (1, 1));
        assert_eq!(readings(50.0, 0.0, 0.5, 2.0).tally(), (0, 0));
    }

    #[test]
    fn test_decide_needs_two_vote_lead() {
        assert_eq!(decide(2, 1), (TradeLabel::Hold, 0.5));
        assert_eq!(decide(1, 2), (TradeLabel::Hold, 0.5));
        assert_eq!(decide(0, 0), (TradeLabel::Hold, 0.5));

        let (label, strength) = decide(3, 1);
        assert_eq!(label, TradeLabel::Buy);
        assert!((strength - 0.7).abs() < 1e-12);

        let (label, strength) = decide(0, 3);
        assert_eq!(label, TradeLabel::Sell);
        assert!((strength - 0.8).abs() < 1e-12);

        assert_eq!(decide(5, 0).1, 0.9);
    }

    #[test]
    fn test_readout_thresholds() {
        let readout = readings(40.0, 0.0, 0.2, 0.7).readout();
        assert_eq!(readout.macd, MacdRelation::Neutral);
        assert_eq!(readout.bollinger, BandRelation::Neutral);
        assert_eq!(readout.volume, VolumeRelation::Normal);

        let readout = readings(40.0, 0.1, 0.19, 0.69).readout();
        assert_eq!(readout.macd, MacdRelation::Bullish);
        assert_eq!(readout.bollinger, BandRelation::Oversold);
        assert_eq!(readout.volume, VolumeRelation::Low);
    }

    #[test]
    fn test_non_finite_input_degrades_to_hold() {
        let mut closes = vec![100.0; 60];
        closes[55] = f64::NAN;
        let history = history_from_closes(&closes, &vec![1000.0; 60]);
        let result = generate_signal(history.candles());
        assert_eq!(result.signal, TradeLabel::Hold);
        assert_eq!(result.strength, 0.5);
        assert!(result.is_degraded());
    }

    #[test]
    fn test_serializes_uppercase_relations() {
        let json = serde_json::to_value(SignalResult::neutral()).unwrap();
        assert_eq!(json["signal"], "HOLD");
        assert_eq!(json["indicators"]["macd"], "NEUTRAL");
        assert_eq!(json["indicators"]["volume"], "NORMAL");
        assert!(json.get("error").is_none());
    }
}
