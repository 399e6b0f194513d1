//! Error types for Almanac services
//!
//! Provides:
//! - A shared application error enum with conversions from library errors
//! - A transient/permanent split for delivery failures (see `transport`)
//! - Severity helpers for log-level selection

use thiserror::Error;

use crate::transport::SendError;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Event store errors
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    // External service errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Catalog error: {message}")]
    Catalog { message: String },

    #[error("Delivery failed: {0}")]
    Delivery(#[from] SendError),

    // Input errors
    #[error("Invalid event: {message}")]
    InvalidEvent { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Check whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::HttpClient(_) | AppError::Catalog { .. } => true,
            AppError::Delivery(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_transience() {
        let transient = AppError::Delivery(SendError::Transient("timeout".into()));
        assert!(transient.is_transient());

        let permanent = AppError::Delivery(SendError::Permanent("bad markup".into()));
        assert!(!permanent.is_transient());
    }

    #[test]
    fn test_invalid_event_is_not_transient() {
        let err = AppError::InvalidEvent {
            message: "missing title".into(),
        };
        assert!(!err.is_transient());
    }
}
