use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::dataset::TrainingSetBuilder;
use super::features::{extract_features, MIN_FEATURE_BARS};
use super::model::{FallbackReason, Prediction, TradingClassifier, TrainingMetrics};
use crate::error::TrainingError;
use crate::market_data::{Interval, MarketDataProvider, Period};
use crate::types::Instrument;

/// A held position to score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionQuery {
    pub symbol: String,
    pub exchange: String,
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub unrealized_pnl_pct: f64,
}

impl PositionQuery {
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            current_price: 0.0,
            unrealized_pnl_pct: 0.0,
        }
    }
}

impl From<Instrument> for PositionQuery {
    fn from(instrument: Instrument) -> Self {
        Self::new(instrument.symbol, instrument.exchange)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionPrediction {
    pub symbol: String,
    pub exchange: String,
    #[serde(flatten)]
    pub prediction: Prediction,
    pub current_price: f64,
    pub unrealized_pnl_pct: f64,
}

impl PositionPrediction {
    fn new(position: &PositionQuery, prediction: Prediction) -> Self {
        Self {
            symbol: position.symbol.clone(),
            exchange: position.exchange.clone(),
            prediction,
            current_price: position.current_price,
            unrealized_pnl_pct: position.unrealized_pnl_pct,
        }
    }
}

/// Scores each position independently. A failed or short history fetch
/// yields a fallback entry for that position only; entries with an empty
/// symbol or exchange are skipped.
pub async fn predict_batch<P: MarketDataProvider + ?Sized>(
    classifier: &TradingClassifier,
    provider: &P,
    positions: &[PositionQuery],
    period: Period,
    interval: Interval,
) -> Vec<PositionPrediction> {
    let mut predictions = Vec::with_capacity(positions.len());

    for position in positions {
        if position.symbol.is_empty() || position.exchange.is_empty() {
            warn!("Skipping position with missing symbol or exchange");
            continue;
        }

        let prediction = match provider
            .get_history(&position.symbol, &position.exchange, period, interval)
            .await
        {
            Ok(Some(history)) if history.len() >= MIN_FEATURE_BARS => {
                let features = extract_features(history.candles());
                classifier.predict_vector(&features)
            }
            Ok(_) => {
                warn!("Insufficient data for {}:{}", position.symbol, position.exchange);
                Prediction::fallback(FallbackReason::InsufficientHistory)
            }
            Err(e) => {
                error!("Error predicting for {}: {}", position.symbol, e);
                Prediction::fallback(FallbackReason::HistoryUnavailable(e.to_string()))
            }
        };

        predictions.push(PositionPrediction::new(position, prediction));
    }

    info!("Generated {} position predictions", predictions.len());
    predictions
}

/// Builds a training set from market data, then trains on the blocking pool.
/// The classifier is handed back whatever the outcome.
pub async fn train_from_market<P: MarketDataProvider>(
    mut classifier: TradingClassifier,
    builder: &TrainingSetBuilder<P>,
    instruments: &[Instrument],
) -> (TradingClassifier, Result<TrainingMetrics, TrainingError>) {
    info!("Starting neural network training from market data...");
    let samples = match builder.build(instruments).await {
        Ok(samples) => samples,
        Err(e) => {
            error!("Error training model: {}", e);
            return (classifier, Err(e));
        }
    };

    let handle = tokio::task::spawn_blocking(move || {
        let result = classifier.train(&samples);
        (classifier, result)
    });
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingSettings;
    use crate::ml::dataset::test_support::synthetic_samples;
    use crate::ml::persistence::MemoryArtifactStore;
    use crate::market_data::MockMarketDataProvider;
    use crate::types::test_support::{flat_history, history_from_closes};
    use std::sync::Arc;

    fn quick_settings() -> TrainingSettings {
        TrainingSettings {
            epochs: 3,
            ..TrainingSettings::default()
        }
    }

    fn wavy_history(n: usize) -> crate::types::PriceHistory {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + (i as f64 * 0.3).sin() * 4.0).collect();
        let volumes: Vec<f64> = (0..n).map(|i| 1000.0 + (i % 5) as f64 * 50.0).collect();
        history_from_closes(&closes, &volumes)
    }

    #[tokio::test]
    async fn test_batch_isolates_failing_positions() {
        let mut classifier = TradingClassifier::open(Arc::new(MemoryArtifactStore::new()), quick_settings());
        classifier.train(&synthetic_samples(120, 21)).unwrap();

        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_history().returning(|symbol, _, _, _| match symbol {
            "AAPL" => Ok(Some(wavy_history(63))),
            "SHORT" => Ok(Some(flat_history(49))),
            "GONE" => Ok(None),
            _ => Err(anyhow::anyhow!("rate limited")),
        });

        let mut aapl = PositionQuery::new("AAPL", "NASDAQ");
        aapl.current_price = 189.5;
        aapl.unrealized_pnl_pct = 4.2;
        let positions = vec![
            PositionQuery::new("BROKEN", "NSE"),
            aapl,
            PositionQuery::new("", "NSE"),
            PositionQuery::new("SHORT", "NSE"),
            PositionQuery::new("GONE", "NSE"),
        ];

        let results = predict_batch(&classifier, &mock, &positions, Period::ThreeMonths, Interval::Daily).await;
        assert_eq!(results.len(), 4);

        assert_eq!(results[0].symbol, "BROKEN");
        assert!(matches!(results[0].prediction.fallback, Some(FallbackReason::HistoryUnavailable(_))));
        assert_eq!(results[0].prediction.confidence, 0.33);

        let expected = classifier.predict_vector(&extract_features(wavy_history(63).candles()));
        assert_eq!(results[1].symbol, "AAPL");
        assert!(!results[1].prediction.is_fallback());
        assert!(results[1].prediction.same_outcome(&expected));
        assert_eq!(results[1].current_price, 189.5);
        assert_eq!(results[1].unrealized_pnl_pct, 4.2);

        assert_eq!(results[2].prediction.fallback, Some(FallbackReason::InsufficientHistory));
        assert_eq!(results[3].prediction.fallback, Some(FallbackReason::InsufficientHistory));
        assert_eq!(results[3].prediction.label, crate::types::TradeLabel::Hold);
    }

    #[tokio::test]
    async fn test_batch_with_untrained_classifier_is_neutral() {
        let classifier = TradingClassifier::open(Arc::new(MemoryArtifactStore::new()), quick_settings());
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_history()
            .returning(|_, _, _, _| Ok(Some(flat_history(60))));

        let results = predict_batch(
            &classifier,
            &mock,
            &[PositionQuery::new("TCS", "NSE")],
            Period::ThreeMonths,
            Interval::Daily,
        )
        .await;
        assert_eq!(results[0].prediction.fallback, Some(FallbackReason::NotTrained));
    }

    #[test]
    fn test_position_prediction_serializes_flat() {
        let position = PositionQuery::new("INFY", "NSE");
        let entry = PositionPrediction::new(&position, Prediction::fallback(FallbackReason::InsufficientHistory));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["symbol"], "INFY");
        assert_eq!(json["label"], "HOLD");
        assert_eq!(json["probabilities"]["HOLD"], 0.34);
        assert_eq!(json["fallback"], "insufficient_history");
    }

    #[tokio::test]
    async fn test_train_from_market_without_data_keeps_classifier() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_history().returning(|_, _, _, _| Ok(None));
        let builder = TrainingSetBuilder::new(mock);
        let classifier = TradingClassifier::open(Arc::new(MemoryArtifactStore::new()), quick_settings());

        let (classifier, result) = train_from_market(classifier, &builder, &[Instrument::new("X", "NSE")]).await;
        assert!(matches!(result, Err(TrainingError::NoSamples { .. })));
        assert!(!classifier.is_trained());
    }

    #[tokio::test]
    async fn test_train_from_market_trains_on_fetched_history() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_history()
            .returning(|_, _, _, _| Ok(Some(wavy_history(130))));
        let builder = TrainingSetBuilder::new(mock).with_max_instruments(2);
        let store = Arc::new(MemoryArtifactStore::new());
        let classifier = TradingClassifier::open(store.clone(), quick_settings());

        let instruments = [Instrument::new("A", "NSE"), Instrument::new("B", "NSE")];
        let (classifier, result) = train_from_market(classifier, &builder, &instruments).await;
        let metrics = result.unwrap();
        // 2 x (130 - 55) samples
        assert_eq!(metrics.train_samples + metrics.test_samples, 150);
        assert!(classifier.is_trained());
        assert_eq!(store.len(), 3);
    }
}
