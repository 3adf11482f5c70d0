use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recommendation emitted by both the voter and the classifier.
/// `Ord` follows the string form, which is the classifier's class order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeLabel {
    Buy,
    Hold,
    Sell,
}

impl TradeLabel {
    pub const ALL: [TradeLabel; 3] = [TradeLabel::Buy, TradeLabel::Hold, TradeLabel::Sell];

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeLabel::Buy => "BUY",
            TradeLabel::Hold => "HOLD",
            TradeLabel::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TradeLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(TradeLabel::Buy),
            "HOLD" => Ok(TradeLabel::Hold),
            "SELL" => Ok(TradeLabel::Sell),
            _ => Err(anyhow::anyhow!("Unknown trade label: {}", s)),
        }
    }
}

/// A listed instrument: ticker plus the venue it trades on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub exchange: String,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.exchange)
    }
}

impl FromStr for Instrument {
    type Err = anyhow::Error;

    /// Parses `SYMBOL:EXCHANGE`
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.split_once(':') {
            Some((symbol, exchange)) if !symbol.is_empty() && !exchange.is_empty() => {
                Ok(Self::new(symbol.to_uppercase(), exchange.to_uppercase()))
            }
            _ => Err(anyhow::anyhow!("Expected SYMBOL:EXCHANGE, got {}", s)),
        }
    }
}
