//! # Resilience Module
//!
//! Fault isolation for calls into dependencies that may fail or hang.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: Prevent cascade failures by failing fast once a dependency
//!   has crossed its failure threshold, then probing recovery through a half-open state
//! - **Registry**: Process-wide name to breaker directory with idempotent get-or-create
//! - **Stats**: Read-only snapshots with zero-guarded success, failure and rejection rates
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilience_core::resilience::{CircuitBreakerConfig, CircuitBreakerRegistry};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = CircuitBreakerRegistry::new();
//! let breaker = registry.create(
//!     "database",
//!     CircuitBreakerConfig::default()
//!         .with_failure_threshold(5)
//!         .with_recovery_timeout(Duration::from_secs(30)),
//! );
//!
//! let rows = breaker
//!     .call(|| async { Ok::<u64, std::io::Error>(42) })
//!     .await?;
//! assert_eq!(rows, 42);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod registry;
pub mod stats;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerError, CircuitState, CountAllFailures, FailureClassifier,
    StateChangeListener,
};
pub use config::CircuitBreakerConfig;
pub use registry::CircuitBreakerRegistry;
pub use stats::{CircuitBreakerStats, RegistryStats};
