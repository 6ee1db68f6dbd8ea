use crate::vision::ElementKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PilotError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Frame capture failed: {0}")]
    CaptureFailed(String),

    #[error("Policy failed: {0}")]
    PolicyFailed(String),

    #[error("Policy did not answer within {0} ms")]
    PolicyTimeout(u64),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Target advancement failed: {0}")]
    AdvancementFailed(String),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    AnyhowError(String),
}

pub type Result<T> = std::result::Result<T, PilotError>;

// headless_chrome reports everything as anyhow::Error
impl From<anyhow::Error> for PilotError {
    fn from(err: anyhow::Error) -> Self {
        PilotError::AnyhowError(err.to_string())
    }
}

/// Errors surfaced by an execution environment primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The primitive was attempted and rejected; the page may be partially changed.
    #[error("Primitive rejected: {0}")]
    Rejected(String),

    /// The session itself is unusable (crashed tab, lost connection, ...).
    #[error("Environment fault: {0}")]
    Fault(String),
}

impl EnvironmentError {
    pub fn from_any_error<E: std::fmt::Display>(err: E) -> Self {
        EnvironmentError::Fault(err.to_string())
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, EnvironmentError::Fault(_))
    }
}

/// A single detector family failed; the other families are unaffected.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{family} detection failed: {reason}")]
pub struct DetectionFailure {
    pub family: ElementKind,
    pub reason: String,
}

impl DetectionFailure {
    pub fn new(family: ElementKind, reason: impl Into<String>) -> Self {
        Self {
            family,
            reason: reason.into(),
        }
    }
}
