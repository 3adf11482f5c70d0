//! BUY/SELL/HOLD recommendations from price history: a rule-based indicator
//! voter and a supervised classifier trained on labelled indicator snapshots.

pub mod config;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod ml;
pub mod strategies;
pub mod types;

pub use config::AppConfig;
pub use error::{ArtifactError, InferenceError, SignalError, TrainingError};
pub use ml::{FeatureVector, Prediction, TradingClassifier};
pub use strategies::{generate_signal, SignalResult};
pub use types::{Candle, Instrument, PriceHistory, TradeLabel};
