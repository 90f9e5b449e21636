//! Error types for PhishNet

use thiserror::Error;

/// Main error type for PhishNet
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid campaign state: {0}")]
    InvalidState(String),

    #[error("No failed targets to relaunch")]
    NoFailedTargets,

    #[error("A dispatch pass is already running for this campaign")]
    DispatchInProgress,

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Tracking reference could not be resolved")]
    UnknownTarget,

    #[error("Collaborator timed out: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for PhishNet
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::InvalidState(_) => 409,
            Error::NoFailedTargets => 400,
            Error::DispatchInProgress => 409,
            Error::Delivery(_) => 502,
            Error::UnknownTarget => 404,
            Error::Timeout(_) => 504,
            Error::Validation(_) => 422,
            Error::NotFound(_) => 404,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::NoFailedTargets => "NO_FAILED_TARGETS",
            Error::DispatchInProgress => "DISPATCH_IN_PROGRESS",
            Error::Delivery(_) => "DELIVERY_ERROR",
            Error::UnknownTarget => "UNKNOWN_TARGET",
            Error::Timeout(_) => "COLLABORATOR_TIMEOUT",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}
