use thiserror::Error;

use crate::capability::Capability;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Another pipeline run is active; the action was rejected, not queued.
    #[error("A pipeline run is already in progress")]
    Busy,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0} capability is unavailable")]
    CapabilityUnavailable(Capability),

    #[error("Provisioning {capability} failed: {cause}")]
    ProvisioningFailed { capability: Capability, cause: String },

    #[error("Language detection failed: {0}")]
    DetectionFailed(String),

    #[error("Translation failed: {0}")]
    TranslationFailed(String),

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn provisioning(capability: Capability, cause: impl std::fmt::Display) -> Self {
        Error::ProvisioningFailed {
            capability,
            cause: cause.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
