//! Error types and handling
//!
//! Common error types used across the application. Component-level errors
//! convert into [`AppError`], whose variants follow the session's failure
//! taxonomy: fatal errors abort session start, non-fatal ones are absorbed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::subflow::CaptureError;
use crate::capture::traits::DeviceError;
use crate::config::ConfigError;
use crate::persistence::client::PersistenceError;
use crate::script::store::ScriptError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Script unavailable: {0}")]
    ScriptUnavailable(#[from] ScriptError),

    #[error("Narration failure: {0}")]
    NarrationFailure(String),

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(#[from] DeviceError),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] PersistenceError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

impl AppError {
    /// Whether this error must block the session from beginning.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::ScriptUnavailable(_) | AppError::DeviceUnavailable(_) | AppError::Config(_)
        )
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::ScriptUnavailable(_) => "SCRIPT_UNAVAILABLE",
            AppError::NarrationFailure(_) => "NARRATION_FAILURE",
            AppError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            AppError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::InvalidState(_) => "INVALID_STATE",
        }
    }
}

/// Error response surfaced to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub fatal: bool,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
            fatal: error.is_fatal(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
