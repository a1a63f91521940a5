//! # Health Status Types
//!
//! Shared types for the health monitoring subsystem: per-service status and state,
//! transitions and incidents, and the aggregated report.

use crate::health::HealthProbe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Health of a single monitored service
///
/// `Unknown` means no verdict has been reached yet, either because no check has completed
/// or because the success streak is still below the threshold after maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
    Maintenance,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
            Self::Maintenance => "maintenance",
        }
    }

    /// Statuses that are recorded as incidents when entered
    #[must_use]
    pub const fn is_incident(&self) -> bool {
        matches!(self, Self::Degraded | Self::Unhealthy)
    }

    /// Numeric form for the status gauge
    pub(crate) fn gauge_value(self) -> f64 {
        match self {
            Self::Healthy => 1.0,
            Self::Degraded => 0.5,
            Self::Unhealthy => 0.0,
            Self::Unknown => -1.0,
            Self::Maintenance => -2.0,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable configuration of one monitored service
#[derive(Clone)]
pub struct HealthCheck {
    pub name: String,
    pub probe: Arc<dyn HealthProbe>,
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive failed rounds before the service is marked unhealthy
    pub failure_threshold: u32,
    /// Consecutive successful rounds before the service is marked healthy
    pub success_threshold: u32,
    /// An unhealthy critical service makes the whole system unhealthy
    pub critical: bool,
    /// Services that must not be unhealthy for this check to run
    pub dependencies: Vec<String>,
}

impl HealthCheck {
    pub fn new(name: impl Into<String>, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            name: name.into(),
            probe,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            failure_threshold: 3,
            success_threshold: 2,
            critical: false,
            dependencies: Vec::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        self.dependencies.push(service.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("health check name must not be empty".to_string());
        }
        if self.interval.is_zero() {
            return Err(format!("{}: interval must be greater than 0", self.name));
        }
        if self.timeout.is_zero() {
            return Err(format!("{}: timeout must be greater than 0", self.name));
        }
        if self.failure_threshold == 0 || self.success_threshold == 0 {
            return Err(format!("{}: thresholds must be greater than 0", self.name));
        }
        if self.dependencies.iter().any(|d| d == &self.name) {
            return Err(format!("{}: a service cannot depend on itself", self.name));
        }
        Ok(())
    }
}

impl fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCheck")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("critical", &self.critical)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Mutable state of one monitored service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub name: String,
    pub status: HealthStatus,
    pub critical: bool,
    pub last_check: Option<DateTime<Utc>>,
    /// Duration of the most recent round in seconds
    pub response_time: f64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_checks: u64,
    pub total_failures: u64,
    /// `(total_checks - total_failures) / total_checks` scaled to 0-100, not left as a
    /// fraction; 100 before the first round
    pub uptime_percentage: f64,
    /// Reason for the most recent failed round; cleared by a successful round
    pub error_message: Option<String>,
}

impl ServiceHealth {
    pub fn new(name: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unknown,
            critical,
            last_check: None,
            response_time: 0.0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_checks: 0,
            total_failures: 0,
            uptime_percentage: 100.0,
            error_message: None,
        }
    }

    /// Whether the most recent completed round passed
    pub fn last_round_passed(&self) -> bool {
        self.last_check.is_some()
            && self.consecutive_failures == 0
            && self.consecutive_successes > 0
    }

    pub(crate) fn recompute_uptime(&mut self) {
        if self.total_checks > 0 {
            let passed = self.total_checks.saturating_sub(self.total_failures);
            self.uptime_percentage = passed as f64 / self.total_checks as f64 * 100.0;
        }
    }
}

/// A status change observed by a check round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthTransition {
    pub service: String,
    pub old_status: HealthStatus,
    pub new_status: HealthStatus,
    pub error_message: Option<String>,
    pub critical: bool,
    pub timestamp: DateTime<Utc>,
}

/// Audit record of a service entering a degraded or unhealthy state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub old_status: HealthStatus,
    pub new_status: HealthStatus,
    pub error_message: Option<String>,
    pub critical: bool,
}

impl From<&HealthTransition> for Incident {
    fn from(transition: &HealthTransition) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: transition.timestamp,
            service: transition.service.clone(),
            old_status: transition.old_status,
            new_status: transition.new_status,
            error_message: transition.error_message.clone(),
            critical: transition.critical,
        }
    }
}

/// Aggregated system verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of services in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub maintenance: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: HealthStatus) {
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Degraded => self.degraded += 1,
            HealthStatus::Unhealthy => self.unhealthy += 1,
            HealthStatus::Unknown => self.unknown += 1,
            HealthStatus::Maintenance => self.maintenance += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.healthy + self.degraded + self.unhealthy + self.unknown + self.maintenance
    }
}

/// Rolling metrics across every monitored service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    /// Mean of the per-service uptime percentages (100 with no services)
    pub average_uptime_percentage: f64,
    pub total_checks: u64,
    pub total_failures: u64,
    /// Fraction of all rounds that passed (0.0 before any round)
    pub success_rate: f64,
    pub incidents_last_24h: usize,
}

/// Result of `HealthMonitor::get_overall_health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallHealth {
    pub status: OverallStatus,
    pub timestamp: DateTime<Utc>,
    pub total_services: usize,
    pub counts: StatusCounts,
    pub services: HashMap<String, ServiceHealth>,
    pub metrics: HealthMetrics,
}
