//! Error types for Visionagent

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("inference error: {stream} - {message}")]
    Inference { stream: String, message: String },

    #[error("inference timeout: {stream} exceeded {timeout_ms}ms")]
    InferenceTimeout { stream: String, timeout_ms: u64 },

    #[error("explainability unavailable: {0}")]
    ExplainabilityUnavailable(String),

    #[error("no lesion found in segmentation mask")]
    NoLesionFound,

    #[error("config error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn inference(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Inference {
            stream: stream.into(),
            message: message.into(),
        }
    }

    pub fn timeout(stream: impl Into<String>, timeout_ms: u64) -> Self {
        Self::InferenceTimeout {
            stream: stream.into(),
            timeout_ms,
        }
    }

    pub fn explainability(reason: impl Into<String>) -> Self {
        Self::ExplainabilityUnavailable(reason.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Fatal errors abort the call; the rest degrade into the payload.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ExplainabilityUnavailable(_) | Self::NoLesionFound
        )
    }
}
