//! # Remediation Strategies
//!
//! Best-effort recovery actions run when a service turns unhealthy. A strategy reports
//! `Ok(true)` when the service passed a check round afterwards; errors and `Ok(false)` are
//! logged by the coordinator and never propagate.
//!
//! The coordinator picks the strategy registered under the service's name and falls back
//! to [`BackoffRetestStrategy`].

use crate::config::RemediationConfig;
use crate::health::HealthMonitor;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything a strategy may touch while remediating one service
pub struct RemediationContext<'a> {
    pub service: &'a str,
    pub monitor: &'a HealthMonitor,
    pub settings: &'a RemediationConfig,
}

#[async_trait]
pub trait RemediationStrategy: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    async fn remediate(&self, ctx: &RemediationContext<'_>) -> anyhow::Result<bool>;
}

/// Something that can drop and re-establish its connection, such as a database pool
#[async_trait]
pub trait Reconnect: Send + Sync {
    async fn reconnect(&self) -> anyhow::Result<()>;
}

/// Reconnect the target, then re-test the service once
pub struct ReconnectStrategy {
    target: Arc<dyn Reconnect>,
}

impl ReconnectStrategy {
    pub fn new(target: Arc<dyn Reconnect>) -> Self {
        Self { target }
    }
}

impl fmt::Debug for ReconnectStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReconnectStrategy")
    }
}

#[async_trait]
impl RemediationStrategy for ReconnectStrategy {
    fn name(&self) -> &str {
        "reconnect"
    }

    async fn remediate(&self, ctx: &RemediationContext<'_>) -> anyhow::Result<bool> {
        self.target.reconnect().await?;
        info!(service = ctx.service, "Reconnected; re-testing service");

        let health = ctx.monitor.run_check_round(ctx.service).await?;
        Ok(health.last_round_passed())
    }
}

/// Re-test the service up to `max_attempts` times with exponential backoff between
/// rounds, stopping at the first round that passes
#[derive(Debug, Default, Clone, Copy)]
pub struct BackoffRetestStrategy;

#[async_trait]
impl RemediationStrategy for BackoffRetestStrategy {
    fn name(&self) -> &str {
        "backoff_retest"
    }

    async fn remediate(&self, ctx: &RemediationContext<'_>) -> anyhow::Result<bool> {
        for attempt in 0..ctx.settings.max_attempts {
            let delay = ctx.settings.delay_for_attempt(attempt);
            tokio::time::sleep(delay).await;

            let health = ctx.monitor.run_check_round(ctx.service).await?;
            if health.last_round_passed() {
                return Ok(true);
            }
            debug!(
                service = ctx.service,
                attempt = attempt + 1,
                max_attempts = ctx.settings.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error_message = health.error_message.as_deref().unwrap_or(""),
                "Re-test failed"
            );
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{FnProbe, HealthCheck};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct FlakyConnection {
        reconnects: AtomicUsize,
        up: Arc<AtomicBool>,
        fail_reconnect: bool,
    }

    #[async_trait]
    impl Reconnect for FlakyConnection {
        async fn reconnect(&self) -> anyhow::Result<()> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            if self.fail_reconnect {
                anyhow::bail!("authentication failed");
            }
            self.up.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn monitor_with(up: Arc<AtomicBool>) -> Arc<HealthMonitor> {
        let monitor = HealthMonitor::new();
        let probe = FnProbe::new(move || {
            let up = Arc::clone(&up);
            async move { Ok(up.load(Ordering::SeqCst)) }
        });
        monitor
            .register_check(HealthCheck::new("database", Arc::new(probe)))
            .unwrap();
        monitor
    }

    #[tokio::test]
    async fn test_reconnect_then_passing_round() {
        let up = Arc::new(AtomicBool::new(false));
        let monitor = monitor_with(Arc::clone(&up));
        let connection = Arc::new(FlakyConnection {
            reconnects: AtomicUsize::new(0),
            up,
            fail_reconnect: false,
        });
        let strategy = ReconnectStrategy::new(Arc::clone(&connection) as Arc<dyn Reconnect>);
        let settings = RemediationConfig::default();

        let ctx = RemediationContext {
            service: "database",
            monitor: &monitor,
            settings: &settings,
        };
        assert!(strategy.remediate(&ctx).await.unwrap());
        assert_eq!(connection.reconnects.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.get_service_health("database").unwrap().total_checks, 1);
    }

    #[tokio::test]
    async fn test_reconnect_failure_propagates_to_caller() {
        let up = Arc::new(AtomicBool::new(false));
        let monitor = monitor_with(Arc::clone(&up));
        let strategy = ReconnectStrategy::new(Arc::new(FlakyConnection {
            reconnects: AtomicUsize::new(0),
            up,
            fail_reconnect: true,
        }));
        let settings = RemediationConfig::default();

        let ctx = RemediationContext {
            service: "database",
            monitor: &monitor,
            settings: &settings,
        };
        let err = strategy.remediate(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "authentication failed");
        // No round runs when the reconnect itself fails
        assert_eq!(monitor.get_service_health("database").unwrap().total_checks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_gives_up_after_max_attempts() {
        let monitor = monitor_with(Arc::new(AtomicBool::new(false)));
        let settings = RemediationConfig {
            max_attempts: 3,
            base_delay_ms: 1000,
        };
        let ctx = RemediationContext {
            service: "database",
            monitor: &monitor,
            settings: &settings,
        };

        let started = tokio::time::Instant::now();
        assert!(!BackoffRetestStrategy.remediate(&ctx).await.unwrap());
        // 1s + 2s + 4s of backoff
        assert_eq!(started.elapsed(), Duration::from_secs(7));
        assert_eq!(monitor.get_service_health("database").unwrap().total_checks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_stops_at_first_passing_round() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let monitor = HealthMonitor::new();
        let probe = FnProbe::new(move || {
            let counter = Arc::clone(&counter);
            // Fails once, then recovers
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) >= 1) }
        });
        monitor
            .register_check(HealthCheck::new("cache", Arc::new(probe)))
            .unwrap();

        let settings = RemediationConfig {
            max_attempts: 5,
            base_delay_ms: 100,
        };
        let ctx = RemediationContext {
            service: "cache",
            monitor: &monitor,
            settings: &settings,
        };

        assert!(BackoffRetestStrategy.remediate(&ctx).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_service_is_an_error() {
        let monitor = HealthMonitor::new();
        let settings = RemediationConfig {
            max_attempts: 1,
            base_delay_ms: 0,
        };
        let ctx = RemediationContext {
            service: "missing",
            monitor: &monitor,
            settings: &settings,
        };
        assert!(BackoffRetestStrategy.remediate(&ctx).await.is_err());
    }
}
