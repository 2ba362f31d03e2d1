use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImpactError>;

#[derive(Debug, Error)]
pub enum ImpactError {
    #[error("Unknown sentiment label \"{label}\" (expected positive, negative or neutral)")]
    UnknownSentimentLabel { label: String },

    #[error("Impact model is not ready: train it or load a persisted model first")]
    ModelNotReady,

    #[error("Persisted impact model is corrupt or incompatible: {reason}")]
    CorruptOrIncompatibleModel { reason: String },

    #[error("No usable training examples were provided")]
    EmptyDataset,

    #[error("Feature vector has {actual} value(s) but the model was fitted on {expected}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ImpactError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptOrIncompatibleModel {
            reason: reason.into(),
        }
    }
}
