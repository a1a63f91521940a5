//! # Resilience Configuration System
//!
//! Typed configuration for the coordinator, the health monitor and the circuit breakers.
//! Every struct deserialises with `#[serde(default)]`, so an empty source yields the
//! documented defaults and a file only needs to spell out what it changes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilience_core::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Layer config/resilience.toml (if present) and RESILIENCE_* environment variables
//! let config = ConfigLoader::new()
//!     .with_file("config/resilience.toml")
//!     .load()?;
//!
//! let database = config.circuit_breakers.config_for_component("database");
//! assert!(database.failure_threshold > 0);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{dependencies, DEFAULT_ALERT_SOURCE, MAX_INCIDENTS};
use crate::health::{HealthCheck, HealthProbe};
use crate::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Convert a validated seconds value into a `Duration`
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Dispatch a remediation strategy when a service turns unhealthy
    pub auto_remediation: bool,

    /// Alert delivery settings
    pub alerts: AlertsConfig,

    /// Health monitoring configuration
    pub health: HealthConfig,

    /// Circuit breaker configuration for resilience patterns
    pub circuit_breakers: CircuitBreakersConfig,

    /// Retry settings used by the backoff remediation strategy
    pub remediation: RemediationConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            auto_remediation: true,
            alerts: AlertsConfig::default(),
            health: HealthConfig::default(),
            circuit_breakers: CircuitBreakersConfig::default(),
            remediation: RemediationConfig::default(),
        }
    }
}

impl ResilienceConfig {
    /// Validate configuration for consistency and required fields
    pub fn validate(&self) -> ConfigResult<()> {
        self.alerts.validate()?;
        self.health.validate()?;
        self.circuit_breakers.validate()?;
        self.remediation.validate()?;
        Ok(())
    }
}

/// Alert delivery settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Webhook receiving alert payloads; alerts are only logged when unset
    pub webhook_url: Option<String>,

    /// `source` field of every alert payload
    pub source: String,

    /// Request timeout for webhook delivery
    pub timeout_seconds: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            source: DEFAULT_ALERT_SOURCE.to_string(),
            timeout_seconds: 10,
        }
    }
}

impl AlertsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if let Some(url) = &self.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigurationError::invalid_value(
                    "alerts.webhook_url",
                    url,
                    "webhook URL must use http or https",
                ));
            }
        }

        if self.source.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "alerts.source",
                "alert configuration",
            ));
        }

        if self.timeout_seconds == 0 || self.timeout_seconds > 300 {
            return Err(ConfigurationError::invalid_value(
                "alerts.timeout_seconds",
                self.timeout_seconds,
                "timeout must be between 1 and 300 seconds",
            ));
        }

        Ok(())
    }
}

/// Health monitoring configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Incident log capacity; the oldest entry is evicted once full
    pub max_incidents: usize,

    /// Per-service check settings keyed by service name
    pub checks: HashMap<String, HealthCheckConfig>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_incidents: MAX_INCIDENTS,
            checks: default_health_checks(),
        }
    }
}

fn default_health_checks() -> HashMap<String, HealthCheckConfig> {
    let mut checks = HashMap::new();
    checks.insert(
        dependencies::DATABASE.to_string(),
        HealthCheckConfig {
            critical: true,
            ..HealthCheckConfig::default()
        },
    );
    checks.insert(
        dependencies::CACHE.to_string(),
        HealthCheckConfig {
            timeout_seconds: 3.0,
            ..HealthCheckConfig::default()
        },
    );
    checks.insert(
        dependencies::EXPRESSION_EVALUATOR.to_string(),
        HealthCheckConfig {
            interval_seconds: 60.0,
            timeout_seconds: 10.0,
            ..HealthCheckConfig::default()
        },
    );
    checks.insert(
        dependencies::PROOF_GENERATOR.to_string(),
        HealthCheckConfig {
            interval_seconds: 60.0,
            timeout_seconds: 30.0,
            dependencies: vec![dependencies::EXPRESSION_EVALUATOR.to_string()],
            ..HealthCheckConfig::default()
        },
    );
    checks.insert(
        dependencies::METRICS_BACKEND.to_string(),
        HealthCheckConfig {
            interval_seconds: 60.0,
            ..HealthCheckConfig::default()
        },
    );
    checks
}

impl HealthConfig {
    /// Check settings for a service, falling back to the defaults
    pub fn check_for(&self, service: &str) -> HealthCheckConfig {
        self.checks.get(service).cloned().unwrap_or_default()
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_incidents == 0 {
            return Err(ConfigurationError::invalid_value(
                "health.max_incidents",
                "0",
                "incident log capacity must be greater than 0",
            ));
        }

        for (name, check) in &self.checks {
            check.validate(name)?;
            for dependency in &check.dependencies {
                if !self.checks.contains_key(dependency) {
                    return Err(ConfigurationError::unknown_dependency(name, dependency));
                }
                if dependency == name {
                    return Err(ConfigurationError::invalid_value(
                        format!("health.checks.{name}.dependencies"),
                        dependency,
                        "a service cannot depend on itself",
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Serialised settings for one health check
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub interval_seconds: f64,
    pub timeout_seconds: f64,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub critical: bool,
    pub dependencies: Vec<String>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 30.0,
            timeout_seconds: 5.0,
            failure_threshold: 3,
            success_threshold: 2,
            critical: false,
            dependencies: Vec::new(),
        }
    }
}

impl HealthCheckConfig {
    /// Build the runtime check for `name`, delegating to `probe`
    pub fn to_health_check(&self, name: &str, probe: Arc<dyn HealthProbe>) -> HealthCheck {
        HealthCheck::new(name, probe)
            .with_interval(seconds(self.interval_seconds))
            .with_timeout(seconds(self.timeout_seconds))
            .with_failure_threshold(self.failure_threshold)
            .with_success_threshold(self.success_threshold)
            .with_critical(self.critical)
            .with_dependencies(self.dependencies.clone())
    }

    fn validate(&self, name: &str) -> ConfigResult<()> {
        let field = |suffix: &str| format!("health.checks.{name}.{suffix}");

        if !(self.interval_seconds > 0.0 && self.interval_seconds <= 3600.0) {
            return Err(ConfigurationError::invalid_value(
                field("interval_seconds"),
                self.interval_seconds,
                "interval must be greater than 0 and at most 3600 seconds",
            ));
        }

        if !(self.timeout_seconds > 0.0 && self.timeout_seconds <= 300.0) {
            return Err(ConfigurationError::invalid_value(
                field("timeout_seconds"),
                self.timeout_seconds,
                "timeout must be greater than 0 and at most 300 seconds",
            ));
        }

        if self.failure_threshold == 0 || self.failure_threshold > 100 {
            return Err(ConfigurationError::invalid_value(
                field("failure_threshold"),
                self.failure_threshold,
                "threshold must be between 1 and 100",
            ));
        }

        if self.success_threshold == 0 || self.success_threshold > 100 {
            return Err(ConfigurationError::invalid_value(
                field("success_threshold"),
                self.success_threshold,
                "threshold must be between 1 and 100",
            ));
        }

        Ok(())
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakersConfig {
    /// Default configuration for new circuit breakers
    pub default_config: CircuitBreakerComponentConfig,

    /// Specific configurations for named components
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,

    /// Breakers created when the coordinator initializes
    pub default_breakers: Vec<String>,
}

impl Default for CircuitBreakersConfig {
    fn default() -> Self {
        let mut component_configs = HashMap::new();
        component_configs.insert(
            dependencies::DATABASE.to_string(),
            CircuitBreakerComponentConfig::from(&CircuitBreakerConfig::for_database()),
        );
        component_configs.insert(
            dependencies::CACHE.to_string(),
            CircuitBreakerComponentConfig::from(&CircuitBreakerConfig::for_cache()),
        );
        component_configs.insert(
            dependencies::EXTERNAL_API.to_string(),
            CircuitBreakerComponentConfig::from(&CircuitBreakerConfig::for_external_api()),
        );

        Self {
            default_config: CircuitBreakerComponentConfig::default(),
            component_configs,
            default_breakers: dependencies::DEFAULT_CIRCUIT_BREAKERS
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

impl CircuitBreakersConfig {
    /// Get configuration for a specific component
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerConfig {
        self.component_configs
            .get(component_name)
            .unwrap_or(&self.default_config)
            .to_resilience_config()
    }

    fn validate(&self) -> ConfigResult<()> {
        self.default_config
            .to_resilience_config()
            .validate()
            .map_err(|e| {
                ConfigurationError::invalid_value("circuit_breakers.default_config", "", e)
            })?;

        for (name, component) in &self.component_configs {
            component.to_resilience_config().validate().map_err(|e| {
                ConfigurationError::invalid_value(
                    format!("circuit_breakers.component_configs.{name}"),
                    "",
                    e,
                )
            })?;
        }

        if let Some(empty) = self.default_breakers.iter().find(|n| n.trim().is_empty()) {
            return Err(ConfigurationError::invalid_value(
                "circuit_breakers.default_breakers",
                empty,
                "breaker names must not be empty",
            ));
        }

        Ok(())
    }
}

/// Circuit breaker configuration for a specific component
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerComponentConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time to wait in open state before attempting recovery (in seconds)
    pub recovery_timeout_seconds: f64,

    /// Number of successful calls in half-open state to close circuit
    pub success_threshold: u32,

    /// Per-call timeout; calls are unbounded when unset
    pub call_timeout_seconds: Option<f64>,
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for CircuitBreakerComponentConfig {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            recovery_timeout_seconds: config.recovery_timeout.as_secs_f64(),
            success_threshold: config.success_threshold,
            call_timeout_seconds: config.call_timeout.map(|t| t.as_secs_f64()),
        }
    }
}

impl CircuitBreakerComponentConfig {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: seconds(self.recovery_timeout_seconds),
            success_threshold: self.success_threshold,
            call_timeout: self.call_timeout_seconds.map(seconds),
        }
    }
}

/// Retry settings for the backoff remediation strategy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RemediationConfig {
    /// Check rounds attempted before giving up
    pub max_attempts: u32,

    /// Delay before the first re-test; doubles on every attempt
    pub base_delay_ms: u64,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RemediationConfig {
    /// Delay before re-test `attempt` (zero-based), doubling each time
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err(ConfigurationError::invalid_value(
                "remediation.max_attempts",
                self.max_attempts,
                "attempts must be between 1 and 10",
            ));
        }

        if self.base_delay_ms > 60_000 {
            return Err(ConfigurationError::invalid_value(
                "remediation.base_delay_ms",
                self.base_delay_ms,
                "base delay should not exceed 60000 ms",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ResilienceConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.auto_remediation);
        assert_eq!(config.health.max_incidents, 1000);
        assert_eq!(config.alerts.source, "resilience_coordinator");
        assert!(config.health.checks["database"].critical);
        assert_eq!(
            config.health.checks["proof_generator"].dependencies,
            vec!["expression_evaluator".to_string()]
        );
    }

    #[test]
    fn test_component_config_lookup() {
        let breakers = CircuitBreakersConfig::default();
        assert_eq!(
            breakers.config_for_component("database"),
            CircuitBreakerConfig::for_database()
        );
        assert_eq!(
            breakers.config_for_component("unknown_component"),
            CircuitBreakerConfig::default()
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = ResilienceConfig::default();
        config.circuit_breakers.default_config.failure_threshold = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));

        let mut config = ResilienceConfig::default();
        config.alerts.webhook_url = Some("ftp://alerts.internal".to_string());
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        if let Some(cache) = config.health.checks.get_mut("cache") {
            cache.timeout_seconds = -1.0;
        }
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.remediation.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let mut config = ResilienceConfig::default();
        if let Some(cache) = config.health.checks.get_mut("cache") {
            cache.dependencies.push("message_bus".to_string());
        }

        match config.validate() {
            Err(ConfigurationError::UnknownDependency {
                service,
                dependency,
            }) => {
                assert_eq!(service, "cache");
                assert_eq!(dependency, "message_bus");
            }
            other => panic!("expected unknown dependency error, got {other:?}"),
        }
    }

    #[test]
    fn test_backoff_delays_double() {
        let remediation = RemediationConfig {
            max_attempts: 3,
            base_delay_ms: 100,
        };
        assert_eq!(remediation.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(remediation.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(remediation.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_component_config_round_trips_presets() {
        let preset = CircuitBreakerConfig::for_cache();
        let component = CircuitBreakerComponentConfig::from(&preset);
        assert_eq!(component.call_timeout_seconds, Some(2.0));
        assert_eq!(component.to_resilience_config(), preset);
    }
}
