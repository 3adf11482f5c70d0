pub mod codec;
pub mod dataset;
pub mod features;
pub mod labels;
pub mod model;
pub mod network;
pub mod persistence;
pub mod pipeline;
pub mod scaler;

pub use codec::LabelCodec;
pub use dataset::{samples_from_history, TrainingSample, TrainingSetBuilder};
pub use features::{extract_features, FeatureSlot, FeatureVector, MIN_FEATURE_BARS};
pub use labels::{label_at, LABEL_HORIZON, LABEL_THRESHOLD_PCT};
pub use model::{ClassifierState, FallbackReason, ModelInfo, Prediction, TradingClassifier, TrainingMetrics};
pub use network::{FitHistory, FitOptions, MlpClassifier};
pub use persistence::{ArtifactKey, ArtifactStore, FileArtifactStore, MemoryArtifactStore, ModelVersion};
pub use pipeline::{predict_batch, train_from_market, PositionPrediction, PositionQuery};
pub use scaler::StandardScaler;
