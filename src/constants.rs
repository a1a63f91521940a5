//! # System Constants
//!
//! Well-known dependency names, metric names and operational caps shared by the
//! breaker, monitor and coordinator.

use std::time::Duration;

/// Dependencies the coordinator knows how to probe and protect out of the box.
pub mod dependencies {
    pub const DATABASE: &str = "database";
    pub const CACHE: &str = "cache";
    pub const EXPRESSION_EVALUATOR: &str = "expression_evaluator";
    pub const PROOF_GENERATOR: &str = "proof_generator";
    pub const METRICS_BACKEND: &str = "metrics_backend";
    pub const EXTERNAL_API: &str = "external_api";

    /// Breakers created during coordinator initialization.
    pub const DEFAULT_CIRCUIT_BREAKERS: &[&str] = &[
        DATABASE,
        CACHE,
        EXPRESSION_EVALUATOR,
        PROOF_GENERATOR,
        METRICS_BACKEND,
        EXTERNAL_API,
    ];
}

/// Metric names passed to the metrics sink
pub mod metric_names {
    pub const BREAKER_CALLS: &str = "circuit_breaker_calls_total";
    pub const BREAKER_CALL_DURATION: &str = "circuit_breaker_call_duration_seconds";
    pub const BREAKER_STATE_CHANGES: &str = "circuit_breaker_state_changes_total";
    pub const BREAKER_STATE: &str = "circuit_breaker_state";

    pub const HEALTH_CHECKS: &str = "health_checks_total";
    pub const HEALTH_CHECK_DURATION: &str = "health_check_duration_seconds";
    pub const SERVICE_HEALTH_STATUS: &str = "service_health_status";
    pub const SERVICE_UPTIME: &str = "service_uptime_percentage";
}

/// Maximum number of incidents retained before the oldest is evicted
pub const MAX_INCIDENTS: usize = 1000;

/// Error message recorded when a declared dependency is unhealthy
pub const DEPENDENCIES_NOT_HEALTHY: &str = "dependencies not healthy";

/// Error message recorded when a probe reports `false` without raising
pub const PROBE_REPORTED_UNHEALTHY: &str = "health check reported unhealthy";

/// Window used for the rolling incident count in the overall health report
pub const INCIDENT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// `source` field of outgoing alert payloads unless configured otherwise
pub const DEFAULT_ALERT_SOURCE: &str = "resilience_coordinator";
