//! # AppError
//!
//! Centralized error handling for the Marvin services.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type surfaced by services to the API layer.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Character, Image)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., unknown log level, bad size)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Infrastructure failure (e.g., DB down, storage timeout)
    #[error("internal service error: {0}")]
    Internal(String),

    /// Daily post/generation limit exceeded
    #[error("too many requests: {0}")]
    RateLimitExceeded(String),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{err:#}"))
    }
}

/// A specialized Result type for Marvin service logic.
pub type Result<T> = std::result::Result<T, AppError>;
