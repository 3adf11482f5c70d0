use thiserror::Error;

use crate::ml::persistence::ArtifactKey;

/// An indicator produced a value the voter cannot reason about
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("{indicator} produced a non-finite value")]
    NonFinite { indicator: &'static str },
}

/// Fatal training failures. Nothing is persisted when one of these is returned.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("insufficient training data: {samples} samples (need at least {required})")]
    InsufficientSamples { samples: usize, required: usize },

    #[error("no training samples could be generated from {instruments} instruments")]
    NoSamples { instruments: usize },

    #[error("invalid training data: {0}")]
    InvalidData(String),

    #[error("training diverged: {0}")]
    Diverged(String),

    #[error("failed to persist model artifact: {0}")]
    Persist(#[source] anyhow::Error),
}

impl TrainingError {
    /// Both "no samples" and "too few samples" are data insufficiency
    pub fn is_data_insufficiency(&self) -> bool {
        matches!(self, TrainingError::InsufficientSamples { .. } | TrainingError::NoSamples { .. })
    }
}

/// Why a persisted artifact could not be loaded
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact piece {0} is missing")]
    Missing(ArtifactKey),

    #[error("artifact piece {key} is unreadable: {reason}")]
    Corrupt { key: ArtifactKey, reason: String },

    #[error("artifact pieces belong to different versions ({0})")]
    VersionMismatch(String),

    #[error("artifact store error: {0}")]
    Store(#[source] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("feature {index} is not a finite number")]
    NonFiniteInput { index: usize },

    #[error("model produced a non-finite probability")]
    NonFinite,
}
