//! # Health Monitoring
//!
//! Periodic, dependency-aware health checks with failure/success hysteresis, an incident
//! log and system-wide aggregation.
//!
//! ## Status rules
//!
//! - A service becomes HEALTHY after `success_threshold` consecutive successful rounds
//! - It becomes UNHEALTHY after `failure_threshold` consecutive failed rounds, and
//!   DEGRADED once more than one failure in a row has been seen
//! - Otherwise a round leaves the status unchanged
//! - A round fails without probing when any declared dependency is UNHEALTHY

pub mod incidents;
pub mod monitor;
pub mod probe;
pub mod types;

pub use incidents::IncidentLog;
pub use monitor::{HealthMonitor, HealthMonitorBuilder};
pub use probe::{AlertHandler, FnAlertHandler, FnProbe, HealthProbe, RemediationHook};
pub use types::{
    HealthCheck, HealthMetrics, HealthStatus, HealthTransition, Incident, OverallHealth,
    OverallStatus, ServiceHealth, StatusCounts,
};
