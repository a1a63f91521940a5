//! # Resilience Coordination
//!
//! Ties the health monitor and the circuit breaker registry together for one application:
//! alert delivery, best-effort remediation and combined health reporting.
//!
//! ```rust,no_run
//! use resilience_core::coordinator::ResilienceCoordinator;
//! use resilience_core::health::FnProbe;
//! use std::sync::Arc;
//!
//! # async fn example() -> resilience_core::Result<()> {
//! let coordinator = ResilienceCoordinator::builder()
//!     .probe("database", Arc::new(FnProbe::new(|| async { Ok(true) })))
//!     .build()?;
//! coordinator.initialize().await?;
//!
//! let breaker = coordinator.with_circuit_breaker("database", None)?;
//! let rows: Result<u64, _> = breaker
//!     .call(|| async { Ok::<_, std::io::Error>(42) })
//!     .await;
//! assert_eq!(rows.ok(), Some(42));
//!
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod alerts;
#[allow(clippy::module_inception)]
pub mod coordinator;
pub mod remediation;

pub use alerts::{AlertLevel, AlertPayload, AlertSink, WebhookAlertSink};
pub use coordinator::{
    BreakerSummary, CoordinatorCounters, CoordinatorStats, ResilienceCoordinator,
    ResilienceCoordinatorBuilder, SystemHealth,
};
pub use remediation::{
    BackoffRetestStrategy, Reconnect, ReconnectStrategy, RemediationContext, RemediationStrategy,
};
