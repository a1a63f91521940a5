#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Resilience Core
//!
//! Fault isolation and dependency health for async Rust services.
//!
//! ## Overview
//!
//! Three cooperating components keep a service responsive while its dependencies fail:
//!
//! - **Circuit breakers** stop calling a dependency once it has failed repeatedly, then
//!   probe for recovery through a half-open trial state
//! - **Health monitoring** checks every dependency on its own schedule, applies
//!   failure/success hysteresis, honours dependency chains and keeps an incident log
//! - **Coordination** turns health transitions into alerts and best-effort remediation,
//!   and reports breaker and health state in one place
//!
//! ## Module Organization
//!
//! - [`resilience`] - Circuit breakers, their configuration and the registry
//! - [`health`] - Health checks, the monitor and incident history
//! - [`coordinator`] - Application-level context, alerts and remediation
//! - [`config`] - Typed configuration and the layered loader
//! - [`metrics`] - Metrics sink contract and built-in sinks
//! - [`error`] - Structured error handling
//! - [`logging`] - `tracing` subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilience_core::{ConfigLoader, ResilienceCoordinator};
//! use resilience_core::health::FnProbe;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! resilience_core::logging::init_structured_logging();
//!
//! let config = ConfigLoader::new().with_file("config/resilience.toml").load()?;
//! let coordinator = ResilienceCoordinator::builder()
//!     .config(config)
//!     .probe("database", Arc::new(FnProbe::new(|| async { Ok(true) })))
//!     .build()?;
//!
//! coordinator.initialize().await?;
//! let health = coordinator.get_system_health()?;
//! println!("system is {}", health.health.status);
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod resilience;

pub use config::{ConfigLoader, ConfigurationError, ResilienceConfig};
pub use coordinator::{AlertPayload, AlertSink, ResilienceCoordinator, WebhookAlertSink};
pub use error::{ResilienceError, Result};
pub use health::{HealthCheck, HealthMonitor, HealthProbe, HealthStatus, OverallStatus};
pub use metrics::{MetricsSink, NoopMetricsSink, TracingMetricsSink};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerRegistry,
    CircuitState,
};
