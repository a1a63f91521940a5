//! # Circuit Breaker Configuration
//!
//! Runtime configuration for a single breaker. The serialised, file-backed form lives in
//! [`crate::config::CircuitBreakerComponentConfig`] and converts into this type.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive counted failures before opening the circuit
    pub failure_threshold: u32,

    /// Minimum time spent open before a half-open trial is allowed
    pub recovery_timeout: Duration,

    /// Number of consecutive half-open successes needed to close the circuit
    pub success_threshold: u32,

    /// Upper bound on a single protected call; expiry counts as a failure
    pub call_timeout: Option<Duration>,
}

impl CircuitBreakerConfig {
    /// Create configuration for database operations
    pub fn for_database() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
            call_timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Create configuration for cache operations
    pub fn for_cache() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(15),
            success_threshold: 2,
            call_timeout: Some(Duration::from_secs(2)),
        }
    }

    /// Create configuration for external API calls
    pub fn for_external_api() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(45),
            success_threshold: 2,
            call_timeout: Some(Duration::from_secs(30)),
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.recovery_timeout.is_zero() {
            return Err("recovery_timeout must be greater than 0".to_string());
        }

        if self.recovery_timeout > Duration::from_secs(3600) {
            return Err("recovery_timeout should not exceed 3600 seconds".to_string());
        }

        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".to_string());
        }

        if self.success_threshold > 50 {
            return Err("success_threshold should not exceed 50".to_string());
        }

        if matches!(self.call_timeout, Some(t) if t.is_zero()) {
            return Err("call_timeout must be greater than 0 when set".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
            call_timeout: None,
        }
    }
}
