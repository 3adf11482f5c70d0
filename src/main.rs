use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use trading_signals::config::AppConfig;
use trading_signals::market_data::{CachedProvider, CsvHistoryProvider, MarketDataProvider};
use trading_signals::ml::{
    extract_features, predict_batch, train_from_market, FeatureSlot, FileArtifactStore, PositionQuery,
    TradingClassifier, TrainingSetBuilder,
};
use trading_signals::strategies::generate_signal;
use trading_signals::types::Instrument;

#[derive(Parser)]
#[command(name = "trading-signals")]
#[command(version = "0.1.0")]
#[command(about = "Indicator voting and BUY/SELL/HOLD classification over price history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to trading_signals.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the 12-slot feature vector for an instrument
    Features {
        /// Instrument as SYMBOL:EXCHANGE
        instrument: String,
    },
    /// Run the rule-based indicator voter for an instrument
    Signal {
        /// Instrument as SYMBOL:EXCHANGE
        instrument: String,
    },
    /// Train the classifier from the configured instruments
    Train {
        /// Override the configured candidates (SYMBOL:EXCHANGE, repeatable)
        #[arg(short, long)]
        instrument: Vec<String>,
    },
    /// Predict BUY/SELL/HOLD for a batch of positions
    Predict {
        /// Positions as SYMBOL:EXCHANGE
        #[arg(required = true)]
        positions: Vec<String>,
    },
    /// Show the state of the persisted model
    Info,
}

#[derive(Serialize)]
struct FeatureEntry {
    slot: &'static str,
    value: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    // RUST_LOG wins over --verbose
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::load(cli.config.as_deref())?;
    let provider = Arc::new(CachedProvider::new(
        CsvHistoryProvider::new(&config.data.data_dir),
        chrono::Duration::seconds(config.data.cache_ttl_secs as i64),
    ));

    match cli.command {
        Commands::Features { instrument } => {
            show_features(&config, provider.as_ref(), &instrument.parse::<Instrument>()?).await?;
        }
        Commands::Signal { instrument } => {
            show_signal(&config, provider.as_ref(), &instrument.parse::<Instrument>()?).await?;
        }
        Commands::Train { instrument } => {
            let instruments = if instrument.is_empty() {
                config.instruments.clone()
            } else {
                instrument.iter().map(|s| s.parse::<Instrument>()).collect::<Result<Vec<Instrument>>>()?
            };
            train(&config, provider, &instruments).await?;
        }
        Commands::Predict { positions } => {
            let positions = positions
                .iter()
                .map(|s| s.parse::<Instrument>().map(PositionQuery::from))
                .collect::<Result<Vec<_>>>()?;
            let classifier = open_classifier(&config);
            let predictions = predict_batch(
                &classifier,
                provider.as_ref(),
                &positions,
                config.data.prediction_period,
                config.data.interval,
            )
            .await;
            print_json(&predictions)?;
        }
        Commands::Info => {
            print_json(&open_classifier(&config).info())?;
        }
    }

    Ok(())
}

fn open_classifier(config: &AppConfig) -> TradingClassifier {
    let store = Arc::new(FileArtifactStore::new(&config.model.model_dir));
    TradingClassifier::open(store, config.training.clone())
}

async fn fetch_candles<P: MarketDataProvider + ?Sized>(
    config: &AppConfig,
    provider: &P,
    instrument: &Instrument,
) -> Result<Vec<trading_signals::types::Candle>> {
    let history = provider
        .get_history(
            &instrument.symbol,
            &instrument.exchange,
            config.data.prediction_period,
            config.data.interval,
        )
        .await
        .with_context(|| format!("fetching history for {}", instrument))?
        .ok_or_else(|| anyhow!("No history available for {}", instrument))?;
    Ok(history.candles().to_vec())
}

async fn show_features<P: MarketDataProvider + ?Sized>(
    config: &AppConfig,
    provider: &P,
    instrument: &Instrument,
) -> Result<()> {
    let candles = fetch_candles(config, provider, instrument).await?;
    let features = extract_features(&candles);
    let entries: Vec<FeatureEntry> = FeatureSlot::ALL
        .iter()
        .map(|slot| FeatureEntry {
            slot: slot.name(),
            value: features.get(*slot),
        })
        .collect();
    print_json(&entries)
}

async fn show_signal<P: MarketDataProvider + ?Sized>(
    config: &AppConfig,
    provider: &P,
    instrument: &Instrument,
) -> Result<()> {
    let candles = fetch_candles(config, provider, instrument).await?;
    let signal = generate_signal(&candles);
    info!("{}: {}", instrument, signal);
    print_json(&signal)
}

async fn train<P: MarketDataProvider + 'static>(
    config: &AppConfig,
    provider: Arc<P>,
    instruments: &[Instrument],
) -> Result<()> {
    let settings = &config.training;
    let builder = TrainingSetBuilder::new(provider)
        .with_period(config.data.training_period)
        .with_interval(config.data.interval)
        .with_max_instruments(settings.max_instruments)
        .with_max_samples(settings.max_samples);

    let classifier = open_classifier(config);
    let (_classifier, result) = train_from_market(classifier, &builder, instruments).await;
    match result {
        Ok(metrics) => print_json(&metrics),
        Err(e) => {
            error!("Training failed: {}", e);
            Err(e.into())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
