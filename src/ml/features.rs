use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::indicators::{
    bollinger_last, macd_last, momentum_pct, return_volatility, rsi_last, sma, volume_profile, ATR,
};
use crate::types::{closes, volumes, Candle};

/// Bars required before any indicator is computed (50-bar SMA plus headroom)
pub const MIN_FEATURE_BARS: usize = 50;

/// Semantic slot of each feature-vector element, in vector order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureSlot {
    Rsi14,
    MacdLine,
    MacdSignal,
    MacdHistogram,
    PriceVsSma20,
    PriceVsSma50,
    BollingerPosition,
    BollingerWidth,
    VolumeRatio,
    Volatility20,
    Momentum5,
    AtrPct14,
}

impl FeatureSlot {
    pub const ALL: [FeatureSlot; FeatureVector::LEN] = [
        FeatureSlot::Rsi14,
        FeatureSlot::MacdLine,
        FeatureSlot::MacdSignal,
        FeatureSlot::MacdHistogram,
        FeatureSlot::PriceVsSma20,
        FeatureSlot::PriceVsSma50,
        FeatureSlot::BollingerPosition,
        FeatureSlot::BollingerWidth,
        FeatureSlot::VolumeRatio,
        FeatureSlot::Volatility20,
        FeatureSlot::Momentum5,
        FeatureSlot::AtrPct14,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            FeatureSlot::Rsi14 => "rsi_14",
            FeatureSlot::MacdLine => "macd_line",
            FeatureSlot::MacdSignal => "macd_signal",
            FeatureSlot::MacdHistogram => "macd_histogram",
            FeatureSlot::PriceVsSma20 => "price_vs_sma20_pct",
            FeatureSlot::PriceVsSma50 => "price_vs_sma50_pct",
            FeatureSlot::BollingerPosition => "bb_position",
            FeatureSlot::BollingerWidth => "bb_width",
            FeatureSlot::VolumeRatio => "volume_ratio",
            FeatureSlot::Volatility20 => "volatility_20",
            FeatureSlot::Momentum5 => "momentum_5_pct",
            FeatureSlot::AtrPct14 => "atr_pct_14",
        }
    }

    /// Inclusive clamp range, applied last
    pub fn range(self) -> (f64, f64) {
        match self {
            FeatureSlot::Rsi14 => (0.0, 100.0),
            FeatureSlot::PriceVsSma20 | FeatureSlot::PriceVsSma50 | FeatureSlot::Momentum5 => (-50.0, 50.0),
            FeatureSlot::VolumeRatio => (0.1, 10.0),
            _ => (-10.0, 10.0),
        }
    }

    /// Substitute used when the sub-calculation has nothing to report
    pub fn neutral(self) -> f64 {
        match self {
            FeatureSlot::Rsi14 => 50.0,
            FeatureSlot::BollingerPosition => 0.5,
            FeatureSlot::BollingerWidth => 0.1,
            FeatureSlot::VolumeRatio => 1.0,
            FeatureSlot::Volatility20 => 0.1,
            FeatureSlot::AtrPct14 => 1.0,
            _ => 0.0,
        }
    }
}

/// Fixed-length, bounded summary of market state at one bar.
/// Every element is finite and inside its slot's range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FeatureVector::LEN]);

impl FeatureVector {
    pub const LEN: usize = 12;

    pub fn zeros() -> Self {
        Self([0.0; Self::LEN])
    }

    /// Coerces non-finite values to 0.0, then clamps each slot
    pub fn from_raw(raw: [f64; Self::LEN]) -> Self {
        let mut values = [0.0; Self::LEN];
        for slot in FeatureSlot::ALL {
            let value = raw[slot.index()];
            let value = if value.is_finite() { value } else { 0.0 };
            let (lo, hi) = slot.range();
            values[slot.index()] = value.clamp(lo, hi);
        }
        Self(values)
    }

    pub fn get(&self, slot: FeatureSlot) -> f64 {
        self.0[slot.index()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn to_array(&self) -> [f64; Self::LEN] {
        self.0
    }

    pub fn len(&self) -> usize {
        Self::LEN
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zeros()
    }
}

/// Turns a price window into a feature vector.
/// Windows shorter than [`MIN_FEATURE_BARS`] yield all zeros.
pub fn extract_features(candles: &[Candle]) -> FeatureVector {
    if candles.len() < MIN_FEATURE_BARS {
        warn!("Insufficient data for feature calculation ({} bars)", candles.len());
        return FeatureVector::zeros();
    }

    let features = FeatureVector::from_raw(raw_features(candles));
    debug!("Generated feature vector: {} features", features.len());
    features
}

fn raw_features(candles: &[Candle]) -> [f64; FeatureVector::LEN] {
    let closes = closes(candles);
    let volumes = volumes(candles);
    let price = closes.last().copied().unwrap_or(0.0);

    let mut raw = [0.0; FeatureVector::LEN];
    let mut set = |slot: FeatureSlot, value: Option<f64>| {
        raw[slot.index()] = value.unwrap_or_else(|| slot.neutral());
    };

    set(FeatureSlot::Rsi14, rsi_last(&closes, 14));

    let macd = macd_last(&closes);
    set(FeatureSlot::MacdLine, macd.map(|m| m.macd_line));
    set(FeatureSlot::MacdSignal, macd.map(|m| m.signal_line));
    set(FeatureSlot::MacdHistogram, macd.map(|m| m.histogram));

    set(FeatureSlot::PriceVsSma20, sma(&closes, 20).map(|avg| (price / avg - 1.0) * 100.0));
    set(FeatureSlot::PriceVsSma50, sma(&closes, 50).map(|avg| (price / avg - 1.0) * 100.0));

    let bands = bollinger_last(&closes, 20, 2.0);
    set(FeatureSlot::BollingerPosition, bands.map(|b| b.percent_b));
    set(FeatureSlot::BollingerWidth, bands.map(|b| b.width));

    let current_volume = volumes.last().copied().unwrap_or(0.0);
    set(FeatureSlot::VolumeRatio, volume_profile(&volumes, 20).raw_ratio(current_volume));

    set(FeatureSlot::Volatility20, return_volatility(&closes, 20));
    set(FeatureSlot::Momentum5, momentum_pct(&closes, 5));

    let mut atr = ATR::new(14);
    for candle in candles {
        atr.update(candle);
    }
    set(FeatureSlot::AtrPct14, atr.percent_of(price));

    raw
}
