//! # Resilience Coordinator
//!
//! Application-level context that owns the health monitor and the circuit breaker
//! registry, reacts to health transitions with alerts and remediation, and exposes a
//! combined view of system health.
//!
//! ## Lifecycle
//!
//! 1. Build with [`ResilienceCoordinator::builder`], supplying probes, alert sink and
//!    remediation targets
//! 2. [`initialize`](ResilienceCoordinator::initialize) registers the health checks,
//!    starts monitoring and creates the default breakers
//! 3. Use [`with_circuit_breaker`](ResilienceCoordinator::with_circuit_breaker) and the
//!    query surface
//! 4. [`shutdown`](ResilienceCoordinator::shutdown) stops monitoring and closes every breaker
//!
//! Operations other than `initialize` and `shutdown` fail with
//! [`ResilienceError::NotInitialized`] outside that window.

use crate::config::{RemediationConfig, ResilienceConfig};
use crate::constants::INCIDENT_WINDOW;
use crate::coordinator::alerts::{AlertLevel, AlertPayload, AlertSink, WebhookAlertSink};
use crate::coordinator::remediation::{
    BackoffRetestStrategy, Reconnect, ReconnectStrategy, RemediationContext, RemediationStrategy,
};
use crate::error::{ResilienceError, Result};
use crate::health::{
    AlertHandler, HealthMonitor, HealthProbe, HealthStatus, HealthTransition, OverallHealth,
};
use crate::metrics::{MetricsEmitter, MetricsSink};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats,
    CircuitState, StateChangeListener,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Coordinator-level counters
#[derive(Debug, Default)]
struct Counters {
    auto_remediations: AtomicU64,
    successful_remediations: AtomicU64,
    circuit_breaker_trips: AtomicU64,
    health_incidents: AtomicU64,
    alerts_sent: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CoordinatorCounters {
        CoordinatorCounters {
            auto_remediations: self.auto_remediations.load(Ordering::Relaxed),
            successful_remediations: self.successful_remediations.load(Ordering::Relaxed),
            circuit_breaker_trips: self.circuit_breaker_trips.load(Ordering::Relaxed),
            health_incidents: self.health_incidents.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
        }
    }
}

impl StateChangeListener for Counters {
    fn on_state_change(&self, _breaker: &str, _from: CircuitState, to: CircuitState) {
        if to == CircuitState::Open {
            self.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of the coordinator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorCounters {
    /// Remediation attempts, automatic and manual
    pub auto_remediations: u64,
    pub successful_remediations: u64,
    /// Transitions of any registry breaker into OPEN
    pub circuit_breaker_trips: u64,
    /// Alerts for transitions into DEGRADED or UNHEALTHY
    pub health_incidents: u64,
    /// Successful alert deliveries
    pub alerts_sent: u64,
}

/// Breaker view embedded in [`SystemHealth`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSummary {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_rate: f64,
}

/// Result of [`ResilienceCoordinator::get_system_health`]
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    #[serde(flatten)]
    pub health: OverallHealth,
    pub circuit_breakers: BTreeMap<String, BreakerSummary>,
    pub coordinator: CoordinatorCounters,
}

/// Result of [`ResilienceCoordinator::get_stats`]
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStats {
    pub collected_at: DateTime<Utc>,
    #[serde(flatten)]
    pub counters: CoordinatorCounters,
    pub circuit_breakers: HashMap<String, CircuitBreakerStats>,
    pub monitored_services: usize,
    pub total_incidents: usize,
    pub incidents_last_24h: usize,
}

/// State shared with the monitor through its alert handler
struct CoordinatorShared {
    alert_sink: Option<Arc<dyn AlertSink>>,
    alert_source: String,
    auto_remediation: bool,
    remediation_settings: RemediationConfig,
    strategies: HashMap<String, Arc<dyn RemediationStrategy>>,
    fallback: Arc<dyn RemediationStrategy>,
    counters: Arc<Counters>,
    /// The monitor owns this handler, so only a weak link back
    monitor: RwLock<Weak<HealthMonitor>>,
    /// Spawned remediation runs; aborted on shutdown
    remediations: Mutex<Vec<JoinHandle<()>>>,
    self_ref: Weak<CoordinatorShared>,
}

impl CoordinatorShared {
    fn strategy_for(&self, service: &str) -> Arc<dyn RemediationStrategy> {
        self.strategies
            .get(service)
            .map(Arc::clone)
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Run the service's strategy. Strategy errors and panics are logged and reported as
    /// `false`.
    async fn remediate(&self, monitor: &HealthMonitor, service: &str) -> bool {
        self.counters.auto_remediations.fetch_add(1, Ordering::Relaxed);

        let strategy = self.strategy_for(service);
        info!(service, strategy = strategy.name(), "Starting remediation");

        let ctx = RemediationContext {
            service,
            monitor,
            settings: &self.remediation_settings,
        };
        let recovered = match AssertUnwindSafe(strategy.remediate(&ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(recovered)) => recovered,
            Ok(Err(e)) => {
                error!(service, strategy = strategy.name(), error = %e, "Remediation failed");
                false
            }
            Err(_) => {
                error!(service, strategy = strategy.name(), "Remediation panicked");
                false
            }
        };

        if recovered {
            self.counters
                .successful_remediations
                .fetch_add(1, Ordering::Relaxed);
            info!(service, strategy = strategy.name(), "Remediation succeeded");
        } else {
            warn!(service, strategy = strategy.name(), "Remediation did not recover service");
        }
        recovered
    }

    fn spawn_remediation(&self, service: String) {
        let Some(shared) = self.self_ref.upgrade() else {
            return;
        };
        let task = Arc::clone(&shared);
        let handle = tokio::spawn(async move {
            let Some(monitor) = task.monitor.read().upgrade() else {
                debug!(service = %service, "Monitor gone; skipping remediation");
                return;
            };
            task.remediate(&monitor, &service).await;
        });

        let mut remediations = shared.remediations.lock();
        remediations.retain(|handle| !handle.is_finished());
        remediations.push(handle);
    }

    /// Abort every spawned remediation and wait for the tasks to wind down
    async fn cancel_remediations(&self) {
        let handles = std::mem::take(&mut *self.remediations.lock());
        if handles.is_empty() {
            return;
        }

        let count = handles.len();
        for handle in &handles {
            handle.abort();
        }
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    warn!(error = %e, "Remediation task ended abnormally");
                }
            }
        }
        debug!(remediations = count, "Cancelled in-flight remediations");
    }

    async fn deliver(&self, transition: &HealthTransition) {
        let Some(sink) = &self.alert_sink else {
            return;
        };

        let payload = AlertPayload::from_transition(transition, &self.alert_source);
        match sink.send_alert(&payload).await {
            Ok(()) => {
                self.counters.alerts_sent.fetch_add(1, Ordering::Relaxed);
                debug!(service = %payload.service, alert_level = %payload.alert_level, "Alert delivered");
            }
            Err(e) => error!(
                service = %payload.service,
                error = %format!("{e:#}"),
                "Alert delivery failed"
            ),
        }
    }
}

#[async_trait]
impl AlertHandler for CoordinatorShared {
    async fn on_transition(&self, transition: &HealthTransition) -> anyhow::Result<()> {
        let service = transition.service.as_str();
        let error_message = transition.error_message.as_deref().unwrap_or("");
        let level = AlertLevel::for_transition(transition);

        match (level, transition.new_status.is_incident()) {
            (AlertLevel::Critical, _) => error!(
                service,
                old_status = %transition.old_status,
                new_status = %transition.new_status,
                error_message,
                alert_level = %level,
                "Health alert"
            ),
            (AlertLevel::Warning, true) => warn!(
                service,
                old_status = %transition.old_status,
                new_status = %transition.new_status,
                error_message,
                alert_level = %level,
                "Health alert"
            ),
            (AlertLevel::Warning, false) => info!(
                service,
                old_status = %transition.old_status,
                new_status = %transition.new_status,
                alert_level = %level,
                "Health alert"
            ),
        }

        if transition.new_status.is_incident() {
            self.counters.health_incidents.fetch_add(1, Ordering::Relaxed);
        }

        self.deliver(transition).await;

        if self.auto_remediation && transition.new_status == HealthStatus::Unhealthy {
            self.spawn_remediation(transition.service.clone());
        }
        Ok(())
    }
}

/// Builder for [`ResilienceCoordinator`]
pub struct ResilienceCoordinatorBuilder {
    config: ResilienceConfig,
    alert_sink: Option<Arc<dyn AlertSink>>,
    metrics: MetricsEmitter,
    probes: HashMap<String, Arc<dyn HealthProbe>>,
    strategies: HashMap<String, Arc<dyn RemediationStrategy>>,
}

impl Default for ResilienceCoordinatorBuilder {
    fn default() -> Self {
        Self {
            config: ResilienceConfig::default(),
            alert_sink: None,
            metrics: MetricsEmitter::noop(),
            probes: HashMap::new(),
            strategies: HashMap::new(),
        }
    }
}

impl ResilienceCoordinatorBuilder {
    pub fn config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the webhook sink derived from `alerts.webhook_url`
    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = Some(sink);
        self
    }

    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = MetricsEmitter::new(sink);
        self
    }

    /// Probe for one dependency. Its check settings come from `health.checks`, falling
    /// back to the defaults.
    pub fn probe(mut self, service: impl Into<String>, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.insert(service.into(), probe);
        self
    }

    /// Remediate `service` by reconnecting `target` and re-testing once
    pub fn reconnect(self, service: impl Into<String>, target: Arc<dyn Reconnect>) -> Self {
        self.remediation(service, Arc::new(ReconnectStrategy::new(target)))
    }

    /// Custom remediation for `service`
    pub fn remediation(
        mut self,
        service: impl Into<String>,
        strategy: Arc<dyn RemediationStrategy>,
    ) -> Self {
        self.strategies.insert(service.into(), strategy);
        self
    }

    /// Validate the configuration and assemble the coordinator
    pub fn build(self) -> Result<ResilienceCoordinator> {
        self.config.validate()?;

        let alert_sink = match self.alert_sink {
            Some(sink) => Some(sink),
            None => WebhookAlertSink::from_config(&self.config.alerts)?
                .map(|sink| Arc::new(sink) as Arc<dyn AlertSink>),
        };

        let counters = Arc::new(Counters::default());

        let breakers = &self.config.circuit_breakers;
        let mut registry = CircuitBreakerRegistry::new()
            .with_default_config(breakers.default_config.to_resilience_config())
            .with_metrics(self.metrics.clone())
            .with_listener(Arc::clone(&counters) as Arc<dyn StateChangeListener>);
        for name in breakers.component_configs.keys() {
            registry = registry.with_component_config(name.clone(), breakers.config_for_component(name));
        }

        let shared = Arc::new_cyclic(|self_ref| CoordinatorShared {
            alert_sink,
            alert_source: self.config.alerts.source.clone(),
            auto_remediation: self.config.auto_remediation,
            remediation_settings: self.config.remediation.clone(),
            strategies: self.strategies,
            fallback: Arc::new(BackoffRetestStrategy),
            counters: Arc::clone(&counters),
            monitor: RwLock::new(Weak::new()),
            remediations: Mutex::new(Vec::new()),
            self_ref: self_ref.clone(),
        });

        Ok(ResilienceCoordinator {
            config: self.config,
            registry: Arc::new(registry),
            metrics: self.metrics,
            probes: self.probes,
            shared,
            counters,
            monitor: Mutex::new(None),
        })
    }
}

/// Owns the health monitor and breaker registry for one application
pub struct ResilienceCoordinator {
    config: ResilienceConfig,
    registry: Arc<CircuitBreakerRegistry>,
    metrics: MetricsEmitter,
    probes: HashMap<String, Arc<dyn HealthProbe>>,
    shared: Arc<CoordinatorShared>,
    counters: Arc<Counters>,
    /// `Some` while initialized
    monitor: Mutex<Option<Arc<HealthMonitor>>>,
}

impl ResilienceCoordinator {
    pub fn builder() -> ResilienceCoordinatorBuilder {
        ResilienceCoordinatorBuilder::default()
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// The running monitor, if initialized
    pub fn monitor(&self) -> Option<Arc<HealthMonitor>> {
        self.monitor.lock().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.monitor.lock().is_some()
    }

    /// Register the health checks, start monitoring and create the default breakers.
    ///
    /// A second call while initialized logs a warning and does nothing. Must run inside a
    /// Tokio runtime.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        let mut slot = self.monitor.lock();
        if slot.is_some() {
            warn!("Resilience coordinator already initialized");
            return Ok(());
        }

        let monitor = HealthMonitor::builder()
            .alert_handler(Arc::clone(&self.shared) as Arc<dyn AlertHandler>)
            .metrics(self.metrics.clone())
            .max_incidents(self.config.health.max_incidents)
            .build();

        let mut services: Vec<&String> = self.probes.keys().collect();
        services.sort();
        for service in services {
            let probe = Arc::clone(&self.probes[service.as_str()]);
            let check = self
                .config
                .health
                .check_for(service)
                .to_health_check(service, probe);
            monitor.register_check(check)?;
        }

        let mut unprobed: Vec<&String> = self
            .config
            .health
            .checks
            .keys()
            .filter(|name| !self.probes.contains_key(name.as_str()))
            .collect();
        unprobed.sort();
        if !unprobed.is_empty() {
            debug!(services = ?unprobed, "No probe supplied; health checks not registered");
        }

        *self.shared.monitor.write() = Arc::downgrade(&monitor);
        monitor.start_monitoring();

        for name in &self.config.circuit_breakers.default_breakers {
            self.registry.get_or_create(name);
        }

        info!(
            health_checks = monitor.service_names().len(),
            circuit_breakers = self.registry.len(),
            auto_remediation = self.config.auto_remediation,
            alerting = self.shared.alert_sink.is_some(),
            "Resilience coordinator initialized"
        );

        *slot = Some(monitor);
        Ok(())
    }

    /// Stop monitoring, close every breaker and return to the uninitialized state.
    /// Idempotent.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let Some(monitor) = self.monitor.lock().take() else {
            debug!("Resilience coordinator not initialized; nothing to shut down");
            return;
        };

        monitor.stop_monitoring().await;
        *self.shared.monitor.write() = Weak::new();
        self.shared.cancel_remediations().await;
        self.registry.reset_all();

        info!("Resilience coordinator shut down");
    }

    /// Breaker for `name`, created on first use.
    ///
    /// `config` only applies when the breaker does not exist yet; otherwise the component
    /// configuration is used.
    pub fn with_circuit_breaker(
        &self,
        name: &str,
        config: Option<CircuitBreakerConfig>,
    ) -> Result<Arc<CircuitBreaker>> {
        self.require_monitor("with_circuit_breaker")?;
        Ok(match config {
            Some(config) => self.registry.create(name, config),
            None => self.registry.get_or_create(name),
        })
    }

    /// Run the remediation strategy for `service` now.
    ///
    /// Returns whether the service passed a check round afterwards. Strategy failures are
    /// logged and reported as `false`.
    pub async fn trigger_service_remediation(&self, service: &str) -> Result<bool> {
        let monitor = self.require_monitor("trigger_service_remediation")?;
        if monitor.get_service_health(service).is_none() {
            return Err(ResilienceError::UnknownService(service.to_string()));
        }
        Ok(self.shared.remediate(&monitor, service).await)
    }

    /// Monitor aggregation merged with every breaker's summary and the counters
    pub fn get_system_health(&self) -> Result<SystemHealth> {
        let monitor = self.require_monitor("get_system_health")?;

        let circuit_breakers = self
            .registry
            .get_all_stats()
            .circuit_breakers
            .into_iter()
            .map(|(name, stats)| {
                let summary = BreakerSummary {
                    state: stats.state,
                    failure_count: stats.failure_count,
                    success_rate: stats.success_rate,
                };
                (name, summary)
            })
            .collect();

        Ok(SystemHealth {
            health: monitor.get_overall_health(),
            circuit_breakers,
            coordinator: self.counters.snapshot(),
        })
    }

    /// Counters, full breaker statistics and incident counts
    pub fn get_stats(&self) -> Result<CoordinatorStats> {
        let monitor = self.require_monitor("get_stats")?;

        Ok(CoordinatorStats {
            collected_at: Utc::now(),
            counters: self.counters.snapshot(),
            circuit_breakers: self.registry.get_all_stats().circuit_breakers,
            monitored_services: monitor.service_names().len(),
            total_incidents: monitor.incident_count(),
            incidents_last_24h: monitor
                .get_incident_history(None, INCIDENT_WINDOW.as_secs_f64() / 3600.0)
                .len(),
        })
    }

    fn require_monitor(&self, operation: &'static str) -> Result<Arc<HealthMonitor>> {
        self.monitor()
            .ok_or_else(|| ResilienceError::not_initialized(operation))
    }
}

impl fmt::Debug for ResilienceCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceCoordinator")
            .field("initialized", &self.is_initialized())
            .field("probes", &self.probes.keys().collect::<Vec<_>>())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
