pub mod voter;

pub use voter::*;

use crate::types::Candle;

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;
    fn min_candles_required(&self) -> usize;
    /// Never fails: a short window or a bad reading yields a neutral HOLD
    fn analyze(&self, candles: &[Candle]) -> SignalResult;
}
