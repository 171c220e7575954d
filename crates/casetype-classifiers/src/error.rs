use thiserror::Error;

/// Failures raised by the train/serve pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or missing numeric/categorical input.
    #[error("invalid feature `{field}`: {reason}")]
    FeatureValidation { field: String, reason: String },

    /// Label absent from the codec vocabulary (training-time only).
    #[error("unknown label `{0}`")]
    UnknownLabel(String),

    #[error("class index {index} out of range for {num_classes} classes")]
    IndexOutOfRange { index: usize, num_classes: usize },

    /// Version mismatch, truncation or structural inconsistency in a persisted artifact.
    #[error("corrupt model artifact: {0}")]
    ArtifactCorrupt(String),

    /// Feature names and importance weights disagree in length.
    #[error("feature layout mismatch: {names} feature names but {weights} importance weights")]
    LayoutMismatch { names: usize, weights: usize },

    #[error("missing required field `{0}`")]
    MissingField(String),

    /// No model loaded, or the last load failed.
    #[error("model not loaded: {0}")]
    ModelUnavailable(String),

    #[error("no valid records to train on")]
    EmptyTrainingSet,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// HTTP-style status class the transport layer should report.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::MissingField(_) | PipelineError::FeatureValidation { .. } => 400,
            _ => 500,
        }
    }

    pub(crate) fn feature(field: &str, reason: impl Into<String>) -> Self {
        PipelineError::FeatureValidation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
