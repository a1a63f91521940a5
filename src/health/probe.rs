//! Collaborator contracts for the health monitor: the probe that checks a dependency,
//! the handler notified of status changes, and the remediation hook.
//!
//! All three are async. Synchronous callers wrap trivially with the `Fn*` adapters:
//!
//! ```rust
//! use resilience_core::health::{FnProbe, HealthProbe};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let probe = FnProbe::new(|| async { Ok(true) });
//! assert!(probe.check().await?);
//! # Ok(())
//! # }
//! ```

use crate::health::HealthTransition;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;

/// Checks one dependency. `Ok(true)` is healthy; `Ok(false)` and `Err(_)` are failures,
/// with the error text kept as the service's `error_message`.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> anyhow::Result<bool>;
}

/// Probe backed by an async closure
pub struct FnProbe<F> {
    check: F,
}

impl<F, Fut> FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send,
{
    pub fn new(check: F) -> Self {
        Self { check }
    }
}

#[async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send,
{
    async fn check(&self) -> anyhow::Result<bool> {
        (self.check)().await
    }
}

impl<F> fmt::Debug for FnProbe<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnProbe")
    }
}

/// Receives every status change. Errors are logged by the monitor and never propagate.
///
/// Handlers run while the round for that service is still in progress, so they must not
/// run a check round for the same service inline; spawn it instead.
#[async_trait]
pub trait AlertHandler: Send + Sync {
    async fn on_transition(&self, transition: &HealthTransition) -> anyhow::Result<()>;
}

/// Alert handler backed by an async closure
pub struct FnAlertHandler<F> {
    handler: F,
}

impl<F, Fut> FnAlertHandler<F>
where
    F: Fn(HealthTransition) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F, Fut> AlertHandler for FnAlertHandler<F>
where
    F: Fn(HealthTransition) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn on_transition(&self, transition: &HealthTransition) -> anyhow::Result<()> {
        (self.handler)(transition.clone()).await
    }
}

impl<F> fmt::Debug for FnAlertHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnAlertHandler")
    }
}

/// Best-effort recovery action run when a service turns unhealthy and the monitor
/// has auto-remediation enabled
#[async_trait]
pub trait RemediationHook: Send + Sync {
    async fn remediate(&self, service: &str) -> anyhow::Result<()>;
}
