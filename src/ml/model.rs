use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Span};

use super::codec::LabelCodec;
use super::dataset::TrainingSample;
use super::features::FeatureVector;
use super::network::{accuracy, argmax, cross_entropy, one_hot, MlpClassifier};
use super::persistence::{read_envelope, write_envelope, ArtifactKey, ArtifactStore, ModelVersion};
use super::scaler::StandardScaler;
use crate::config::TrainingSettings;
use crate::error::{ArtifactError, InferenceError, TrainingError};
use crate::types::TradeLabel;

/// Hard floor on training-set size, whatever the configuration says
pub const MIN_TRAINING_SAMPLES: usize = 100;

/// Confidence reported by every fallback prediction
pub const FALLBACK_CONFIDENCE: f64 = 0.33;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierState {
    Uninitialized,
    Untrained,
    Trained,
}

impl fmt::Display for ClassifierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassifierState::Uninitialized => "uninitialized",
            ClassifierState::Untrained => "untrained",
            ClassifierState::Trained => "trained",
        };
        f.write_str(s)
    }
}

/// Why a prediction is the neutral fallback rather than a model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    NotTrained,
    InferenceFailed(String),
    InsufficientHistory,
    HistoryUnavailable(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NotTrained => write!(f, "Model is not trained"),
            FallbackReason::InferenceFailed(reason) => write!(f, "Prediction failed: {}", reason),
            FallbackReason::InsufficientHistory => write!(f, "Insufficient data"),
            FallbackReason::HistoryUnavailable(reason) => write!(f, "History unavailable: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: TradeLabel,
    pub confidence: f64,
    pub probabilities: BTreeMap<TradeLabel, f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,
}

impl Prediction {
    /// HOLD at 0.33 with a near-uniform distribution
    pub fn fallback(reason: FallbackReason) -> Self {
        let probabilities = BTreeMap::from([
            (TradeLabel::Buy, 0.33),
            (TradeLabel::Sell, 0.33),
            (TradeLabel::Hold, 0.34),
        ]);
        Self {
            label: TradeLabel::Hold,
            confidence: FALLBACK_CONFIDENCE,
            probabilities,
            timestamp: Utc::now(),
            fallback: Some(reason),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Same label, confidence and distribution; timestamps are ignored
    pub fn same_outcome(&self, other: &Prediction) -> bool {
        self.label == other.label
            && self.confidence == other.confidence
            && self.probabilities == other.probabilities
            && self.fallback == other.fallback
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub accuracy: f64,
    /// Element-wise over the one-hot outputs at a 0.5 threshold
    pub precision: f64,
    pub recall: f64,
    pub test_loss: f64,
    pub classification_report: BTreeMap<TradeLabel, ClassMetrics>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub epochs_trained: usize,
    pub final_train_accuracy: f64,
    pub final_val_accuracy: f64,
    pub version: ModelVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub state: ClassifierState,
    pub is_trained: bool,
    pub classes: Vec<TradeLabel>,
    pub version: Option<ModelVersion>,
    pub input_dim: Option<usize>,
    pub total_params: Option<usize>,
    pub layers: Option<usize>,
}

/// Network, scaler and codec that were fitted together
#[derive(Debug, Clone)]
struct FittedModel {
    network: MlpClassifier,
    scaler: StandardScaler,
    codec: LabelCodec,
    version: ModelVersion,
}

impl FittedModel {
    fn infer(&self, features: &[f64]) -> Result<Prediction, InferenceError> {
        let row = self.scaler.transform_row(ArrayView1::from(features))?;
        let probs = self.network.predict_proba(&row.insert_axis(Axis(0)));
        let probs = probs.row(0);
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(InferenceError::NonFinite);
        }

        let best = argmax(probs);
        let label = self.codec.decode(best).ok_or(InferenceError::DimensionMismatch {
            expected: self.codec.len(),
            got: probs.len(),
        })?;
        let probabilities = self
            .codec
            .classes()
            .iter()
            .zip(probs.iter())
            .map(|(label, p)| (*label, *p))
            .collect();

        Ok(Prediction {
            label,
            confidence: probs[best],
            probabilities,
            timestamp: Utc::now(),
            fallback: None,
        })
    }

    fn save(&self, store: &dyn ArtifactStore) -> anyhow::Result<()> {
        write_envelope(store, ArtifactKey::Model, &self.version, &self.network)?;
        write_envelope(store, ArtifactKey::Scaler, &self.version, &self.scaler)?;
        write_envelope(store, ArtifactKey::LabelCodec, &self.version, &self.codec)?;
        Ok(())
    }

    fn load(store: &dyn ArtifactStore) -> Result<Self, ArtifactError> {
        let network = read_envelope::<MlpClassifier>(store, ArtifactKey::Model)?;
        let scaler = read_envelope::<StandardScaler>(store, ArtifactKey::Scaler)?;
        let codec = read_envelope::<LabelCodec>(store, ArtifactKey::LabelCodec)?;

        if network.version != scaler.version || network.version != codec.version {
            return Err(ArtifactError::VersionMismatch(format!(
                "model {}, scaler {}, label codec {}",
                network.version, scaler.version, codec.version
            )));
        }
        network
            .payload
            .validate(FeatureVector::LEN, TradeLabel::ALL.len())
            .map_err(|reason| ArtifactError::Corrupt {
                key: ArtifactKey::Model,
                reason,
            })?;
        if !scaler.payload.is_consistent(FeatureVector::LEN) {
            return Err(ArtifactError::Corrupt {
                key: ArtifactKey::Scaler,
                reason: format!("expected {} finite columns", FeatureVector::LEN),
            });
        }
        if !codec.payload.is_consistent() {
            return Err(ArtifactError::Corrupt {
                key: ArtifactKey::LabelCodec,
                reason: "expected each label exactly once".to_string(),
            });
        }

        Ok(Self {
            network: network.payload,
            scaler: scaler.payload,
            codec: codec.payload,
            version: network.version,
        })
    }
}

/// BUY/SELL/HOLD classifier over feature vectors, backed by an artifact store.
///
/// `predict` never fails: an untrained model or an inference error yields
/// [`Prediction::fallback`]. `train` replaces the live model only on success.
/// Callers must serialize `train` calls against one store.
pub struct TradingClassifier {
    store: Arc<dyn ArtifactStore>,
    settings: TrainingSettings,
    span: Span,
    state: ClassifierState,
    fitted: Option<FittedModel>,
}

impl TradingClassifier {
    pub fn new(store: Arc<dyn ArtifactStore>, settings: TrainingSettings) -> Self {
        Self {
            store,
            settings,
            span: info_span!("classifier"),
            state: ClassifierState::Uninitialized,
            fitted: None,
        }
    }

    /// Span every operation logs under
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Builds a classifier and attempts to load a persisted model
    pub fn open(store: Arc<dyn ArtifactStore>, settings: TrainingSettings) -> Self {
        let mut classifier = Self::new(store, settings);
        classifier.load();
        classifier
    }

    pub fn state(&self) -> ClassifierState {
        self.state
    }

    pub fn is_trained(&self) -> bool {
        self.state == ClassifierState::Trained
    }

    pub fn version(&self) -> Option<&ModelVersion> {
        self.fitted.as_ref().map(|f| &f.version)
    }

    pub fn settings(&self) -> &TrainingSettings {
        &self.settings
    }

    /// Reloads the persisted artifact. Anything short of three consistent
    /// pieces leaves the classifier untrained.
    pub fn load(&mut self) -> bool {
        let span = self.span.clone();
        let _enter = span.enter();

        match FittedModel::load(self.store.as_ref()) {
            Ok(fitted) => {
                info!("Model v{} loaded successfully", fitted.version);
                self.fitted = Some(fitted);
                self.state = ClassifierState::Trained;
                true
            }
            Err(e) => {
                match e {
                    ArtifactError::Missing(key) => info!("No existing model found ({} missing)", key),
                    other => warn!("Could not load existing model: {}", other),
                }
                self.fitted = None;
                self.state = ClassifierState::Untrained;
                false
            }
        }
    }

    pub fn train(&mut self, samples: &[TrainingSample]) -> Result<TrainingMetrics, TrainingError> {
        let span = self.span.clone();
        let _enter = span.enter();

        let required = self.settings.min_samples.max(MIN_TRAINING_SAMPLES);
        if samples.len() < required {
            error!("Insufficient training data: {} samples (need at least {})", samples.len(), required);
            return Err(TrainingError::InsufficientSamples {
                samples: samples.len(),
                required,
            });
        }
        info!("Starting neural network training on {} samples", samples.len());

        let labels: Vec<TradeLabel> = samples.iter().map(|s| s.label).collect();
        let codec = LabelCodec::standard();
        let classes = labels
            .iter()
            .map(|label| {
                codec
                    .encode(*label)
                    .ok_or_else(|| TrainingError::InvalidData(format!("label {} has no class index", label)))
            })
            .collect::<Result<Vec<usize>, _>>()?;

        let mut x = Array2::zeros((samples.len(), FeatureVector::LEN));
        for (mut row, sample) in x.rows_mut().into_iter().zip(samples) {
            row.assign(&ArrayView1::from(sample.features.as_slice()));
        }
        let scaler = StandardScaler::fit(&x);
        let x = scaler.transform(&x);
        let y = one_hot(&classes, codec.len());

        let (train_idx, test_idx) =
            stratified_split(&classes, codec.len(), self.settings.test_fraction, self.settings.seed);
        info!("Training samples: {}, Test samples: {}", train_idx.len(), test_idx.len());
        let x_train = x.select(Axis(0), &train_idx);
        let y_train = y.select(Axis(0), &train_idx);
        let x_test = x.select(Axis(0), &test_idx);
        let y_test = y.select(Axis(0), &test_idx);

        let mut network = MlpClassifier::new(FeatureVector::LEN, codec.len(), self.settings.seed);
        info!("Training for up to {} epochs...", self.settings.epochs);
        let history = network.fit(&x_train, &y_train, &x_test, &y_test, &self.settings.fit_options())?;

        let probs = network.predict_proba(&x_test);
        let test_loss = cross_entropy(&probs, &y_test);
        if !test_loss.is_finite() {
            return Err(TrainingError::Diverged("non-finite held-out loss".to_string()));
        }
        let (precision, recall) = thresholded_precision_recall(&probs, &y_test);

        let fitted = FittedModel {
            network,
            scaler,
            codec,
            version: ModelVersion::next(self.version()),
        };
        fitted.save(self.store.as_ref()).map_err(TrainingError::Persist)?;

        let metrics = TrainingMetrics {
            accuracy: accuracy(&probs, &y_test),
            precision,
            recall,
            test_loss,
            classification_report: classification_report(&probs, &y_test, &fitted.codec),
            train_samples: train_idx.len(),
            test_samples: test_idx.len(),
            epochs_trained: history.epochs_run,
            final_train_accuracy: history.final_train_accuracy,
            final_val_accuracy: history.final_val_accuracy,
            version: fitted.version.clone(),
        };

        self.fitted = Some(fitted);
        self.state = ClassifierState::Trained;
        info!("Training completed! Test accuracy: {:.4} (model v{})", metrics.accuracy, metrics.version);
        Ok(metrics)
    }

    /// Total: falls back to HOLD instead of failing
    pub fn predict(&self, features: &[f64]) -> Prediction {
        let span = self.span.clone();
        let _enter = span.enter();

        let fitted = match (&self.state, &self.fitted) {
            (ClassifierState::Trained, Some(fitted)) => fitted,
            _ => return Prediction::fallback(FallbackReason::NotTrained),
        };

        match fitted.infer(features) {
            Ok(prediction) => prediction,
            Err(e) => {
                error!("Error making prediction: {}", e);
                Prediction::fallback(FallbackReason::InferenceFailed(e.to_string()))
            }
        }
    }

    pub fn predict_vector(&self, features: &FeatureVector) -> Prediction {
        self.predict(features.as_slice())
    }

    pub fn info(&self) -> ModelInfo {
        match (&self.state, &self.fitted) {
            (ClassifierState::Trained, Some(fitted)) => ModelInfo {
                state: self.state,
                is_trained: true,
                classes: fitted.codec.classes().to_vec(),
                version: Some(fitted.version.clone()),
                input_dim: Some(fitted.network.input_dim()),
                total_params: Some(fitted.network.param_count()),
                layers: Some(fitted.network.layer_count()),
            },
            _ => ModelInfo {
                state: self.state,
                is_trained: false,
                classes: vec![TradeLabel::Buy, TradeLabel::Sell, TradeLabel::Hold],
                version: None,
                input_dim: None,
                total_params: None,
                layers: None,
            },
        }
    }
}

/// Per class, a seeded shuffle sends `round(n * test_fraction)` rows to the
/// held-out side
fn stratified_split(classes: &[usize], n_classes: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in 0..n_classes {
        let mut members: Vec<usize> = classes
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);
        let n_test = ((members.len() as f64 * test_fraction).round() as usize).min(members.len());
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

fn thresholded_precision_recall(probs: &Array2<f64>, y: &Array2<f64>) -> (f64, f64) {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (p, t) in probs.iter().zip(y.iter()) {
        match (*p > 0.5, *t > 0.5) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
    }
    (ratio(tp, tp + fp), ratio(tp, tp + fn_))
}

fn classification_report(probs: &Array2<f64>, y: &Array2<f64>, codec: &LabelCodec) -> BTreeMap<TradeLabel, ClassMetrics> {
    let predicted: Vec<usize> = probs.rows().into_iter().map(argmax).collect();
    let actual: Vec<usize> = y.rows().into_iter().map(argmax).collect();

    codec
        .classes()
        .iter()
        .enumerate()
        .map(|(class, label)| {
            let pairs = || predicted.iter().zip(&actual);
            let tp = pairs().filter(|(p, a)| **p == class && **a == class).count();
            let predicted_pos = predicted.iter().filter(|p| **p == class).count();
            let support = actual.iter().filter(|a| **a == class).count();
            let precision = ratio(tp, predicted_pos);
            let recall = ratio(tp, support);
            let f1_score = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            (
                *label,
                ClassMetrics {
                    precision,
                    recall,
                    f1_score,
                    support,
                },
            )
        })
        .collect()
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
