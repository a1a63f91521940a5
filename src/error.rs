//! Error types for the resilience engine.
//!
//! Breaker rejections and wrapped-operation failures use the generic
//! [`CircuitBreakerError`](crate::resilience::CircuitBreakerError) so callers keep their own
//! error type. Everything else surfaces as [`ResilienceError`].

use crate::config::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResilienceError {
    /// A coordinator operation was invoked before `initialize()` (or after `shutdown()`).
    #[error("Resilience coordinator is not initialized; call initialize() before {operation}")]
    NotInitialized { operation: &'static str },

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Service already registered: {0}")]
    DuplicateService(String),

    #[error("Invalid health check: {0}")]
    InvalidHealthCheck(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Alert delivery failed: {0}")]
    AlertDelivery(String),

    #[error("Remediation failed for {service}: {message}")]
    Remediation { service: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResilienceError {
    pub fn not_initialized(operation: &'static str) -> Self {
        Self::NotInitialized { operation }
    }

    /// Misuse errors are programming mistakes, not runtime conditions worth retrying.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized { .. }
                | Self::DuplicateService(_)
                | Self::UnknownService(_)
                | Self::InvalidHealthCheck(_)
        )
    }
}

impl From<serde_json::Error> for ResilienceError {
    fn from(error: serde_json::Error) -> Self {
        ResilienceError::Internal(format!("JSON serialization error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, ResilienceError>;
