use ::config::{Config, Environment, File};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::market_data::{Interval, Period};
use crate::ml::FitOptions;
use crate::types::Instrument;

pub const ENV_PREFIX: &str = "TRADING_SIGNALS";
pub const DEFAULT_CONFIG_FILE: &str = "trading_signals.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataSettings,
    pub model: ModelSettings,
    pub training: TrainingSettings,
    pub instruments: Vec<Instrument>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataSettings::default(),
            model: ModelSettings::default(),
            training: TrainingSettings::default(),
            instruments: vec![
                Instrument::new("AAPL", "NASDAQ"),
                Instrument::new("MSFT", "NASDAQ"),
                Instrument::new("GOOGL", "NASDAQ"),
                Instrument::new("TSLA", "NASDAQ"),
                Instrument::new("RELIANCE", "NSE"),
                Instrument::new("TCS", "NSE"),
            ],
        }
    }
}

impl AppConfig {
    /// The optional TOML file, overlaid by `TRADING_SIGNALS__SECTION__KEY`
    /// environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let required = path.is_some();
        debug!("Loading configuration from {} (required: {})", file.display(), required);

        // missing keys fall back to the serde defaults below
        let settings = Config::builder()
            .add_source(File::from(file).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config
            .validate()
            .map_err(|errors| anyhow!("Invalid configuration: {}", errors.join(", ")))?;
        info!(
            "Configuration loaded: data_dir={}, model_dir={}, {} instruments",
            config.data.data_dir.display(),
            config.model.model_dir.display(),
            config.instruments.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.data.cache_ttl_secs == 0 {
            errors.push("cache_ttl_secs must be > 0".to_string());
        }

        let t = &self.training;
        if t.min_samples < 100 {
            errors.push("min_samples must be >= 100".to_string());
        }
        if t.max_samples < t.min_samples {
            errors.push("max_samples must be >= min_samples".to_string());
        }
        if t.max_instruments == 0 {
            errors.push("max_instruments must be > 0".to_string());
        }
        if t.epochs == 0 {
            errors.push("epochs must be > 0".to_string());
        }
        if t.batch_size == 0 {
            errors.push("batch_size must be > 0".to_string());
        }
        if t.learning_rate <= 0.0 || !t.learning_rate.is_finite() {
            errors.push("learning_rate must be > 0".to_string());
        }
        if t.test_fraction <= 0.0 || t.test_fraction >= 1.0 {
            errors.push("test_fraction must be between 0 and 1".to_string());
        }
        if t.lr_factor <= 0.0 || t.lr_factor >= 1.0 {
            errors.push("lr_factor must be between 0 and 1".to_string());
        }

        for inst in &self.instruments {
            if inst.symbol.trim().is_empty() || inst.exchange.trim().is_empty() {
                errors.push(format!("instrument '{}' needs both symbol and exchange", inst));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub data_dir: PathBuf,
    pub cache_ttl_secs: u64,
    pub training_period: Period,
    pub prediction_period: Period,
    pub interval: Interval,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            cache_ttl_secs: 300,
            training_period: Period::SixMonths,
            prediction_period: Period::ThreeMonths,
            interval: Interval::Daily,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model_dir: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub max_instruments: usize,
    pub max_samples: usize,
    pub min_samples: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub test_fraction: f64,
    pub seed: u64,
    pub early_stopping_patience: usize,
    pub lr_patience: usize,
    pub lr_factor: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            max_instruments: 15,
            max_samples: 20_000,
            min_samples: 100,
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.001,
            test_fraction: 0.2,
            seed: 42,
            early_stopping_patience: 10,
            lr_patience: 5,
            lr_factor: 0.2,
        }
    }
}

impl TrainingSettings {
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            early_stopping_patience: self.early_stopping_patience,
            lr_patience: self.lr_patience,
            lr_factor: self.lr_factor,
            min_learning_rate: 0.0,
            seed: self.seed,
        }
    }
}
