use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::features::{extract_features, FeatureVector, MIN_FEATURE_BARS};
use super::labels::{label_at, LABEL_HORIZON};
use crate::error::TrainingError;
use crate::market_data::{Interval, MarketDataProvider, Period};
use crate::types::{Instrument, PriceHistory, TradeLabel};

/// Shortest history an instrument must have to contribute samples
pub const MIN_TRAINING_HISTORY: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: FeatureVector,
    pub label: TradeLabel,
}

/// Samples for bars `50..=len-6`: features over bars up to and including
/// `i`, label from the close five bars later
pub fn samples_from_history(history: &PriceHistory) -> Vec<TrainingSample> {
    if history.len() < MIN_TRAINING_HISTORY {
        return Vec::new();
    }

    (MIN_FEATURE_BARS..history.len() - LABEL_HORIZON)
        .filter_map(|i| {
            let label = label_at(history, i)?;
            Some(TrainingSample {
                features: extract_features(history.up_to(i)),
                label,
            })
        })
        .collect()
}

/// Collects labelled samples across instruments from a market-data provider
pub struct TrainingSetBuilder<P> {
    provider: P,
    period: Period,
    interval: Interval,
    max_instruments: usize,
    max_samples: usize,
}

impl<P: MarketDataProvider> TrainingSetBuilder<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            period: Period::SixMonths,
            interval: Interval::Daily,
            max_instruments: 15,
            max_samples: 20_000,
        }
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = period;
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_instruments(mut self, max_instruments: usize) -> Self {
        self.max_instruments = max_instruments;
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Fetches each candidate in order until `max_instruments` have
    /// contributed or `max_samples` is reached. Instruments that fail to
    /// fetch or have too little history are skipped.
    pub async fn build(&self, instruments: &[Instrument]) -> Result<Vec<TrainingSample>, TrainingError> {
        info!("Preparing training data from {} candidate instruments", instruments.len());
        let mut samples = Vec::new();
        let mut processed = 0;

        for instrument in instruments {
            if processed >= self.max_instruments || samples.len() >= self.max_samples {
                break;
            }

            info!("Processing {}...", instrument);
            let history = match self
                .provider
                .get_history(&instrument.symbol, &instrument.exchange, self.period, self.interval)
                .await
            {
                Ok(Some(history)) if history.len() >= MIN_TRAINING_HISTORY => history,
                Ok(_) => {
                    warn!("Insufficient data for {}, skipping", instrument);
                    continue;
                }
                Err(e) => {
                    warn!("Error processing {}: {}", instrument, e);
                    continue;
                }
            };

            let generated = samples_from_history(&history);
            info!("Generated {} samples from {}", generated.len(), instrument);
            samples.extend(generated);
            processed += 1;
        }

        samples.truncate(self.max_samples);
        if samples.is_empty() {
            return Err(TrainingError::NoSamples {
                instruments: instruments.len(),
            });
        }

        info!("Prepared {} training samples from {} instruments", samples.len(), processed);
        Ok(samples)
    }
}
