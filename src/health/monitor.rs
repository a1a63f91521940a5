//! # Health Monitor
//!
//! Runs one independent scheduling loop per registered service: sleep for the service's
//! interval, run one check round, repeat until monitoring stops.
//!
//! A round applies failure/success hysteresis to the probe result, fails fast when a
//! declared dependency is unhealthy, and reports status changes to the incident log, the
//! alert handler and (optionally) a remediation hook.
//!
//! Rounds for one service are serialised, so `ServiceHealth` has a single writer at a
//! time. Readers take cheap snapshots.

use crate::constants::{
    metric_names, DEPENDENCIES_NOT_HEALTHY, INCIDENT_WINDOW, MAX_INCIDENTS,
    PROBE_REPORTED_UNHEALTHY,
};
use crate::error::{ResilienceError, Result};
use crate::health::incidents::IncidentLog;
use crate::health::{
    AlertHandler, HealthCheck, HealthMetrics, HealthStatus, HealthTransition, Incident,
    OverallHealth, OverallStatus, RemediationHook, ServiceHealth, StatusCounts,
};
use crate::metrics::MetricsEmitter;
use crate::resilience::stats::ratio;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A registered service: its immutable check plus its mutable health
struct MonitoredService {
    check: HealthCheck,
    health: RwLock<ServiceHealth>,
    /// Held for the duration of a round
    round: tokio::sync::Mutex<()>,
}

impl MonitoredService {
    fn new(check: HealthCheck) -> Self {
        let health = ServiceHealth::new(check.name.clone(), check.critical);
        Self {
            check,
            health: RwLock::new(health),
            round: tokio::sync::Mutex::new(()),
        }
    }

    fn snapshot(&self) -> ServiceHealth {
        self.health.read().clone()
    }
}

/// Running loops and the signal that stops them
#[derive(Default)]
struct TaskTable {
    shutdown: Option<watch::Sender<bool>>,
    handles: HashMap<String, JoinHandle<()>>,
}

/// Builder for [`HealthMonitor`]
pub struct HealthMonitorBuilder {
    alert_handler: Option<Arc<dyn AlertHandler>>,
    remediation: Option<Arc<dyn RemediationHook>>,
    auto_remediation: bool,
    metrics: MetricsEmitter,
    max_incidents: usize,
}

impl Default for HealthMonitorBuilder {
    fn default() -> Self {
        Self {
            alert_handler: None,
            remediation: None,
            auto_remediation: false,
            metrics: MetricsEmitter::noop(),
            max_incidents: MAX_INCIDENTS,
        }
    }
}

impl HealthMonitorBuilder {
    pub fn alert_handler(mut self, handler: Arc<dyn AlertHandler>) -> Self {
        self.alert_handler = Some(handler);
        self
    }

    /// Run `hook` whenever a service turns unhealthy
    pub fn auto_remediation(mut self, hook: Arc<dyn RemediationHook>) -> Self {
        self.remediation = Some(hook);
        self.auto_remediation = true;
        self
    }

    pub fn metrics(mut self, metrics: MetricsEmitter) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn max_incidents(mut self, max_incidents: usize) -> Self {
        self.max_incidents = max_incidents;
        self
    }

    pub fn build(self) -> Arc<HealthMonitor> {
        Arc::new_cyclic(|self_ref| HealthMonitor {
            services: DashMap::new(),
            incidents: IncidentLog::new(self.max_incidents),
            alert_handler: self.alert_handler,
            remediation: self.remediation,
            auto_remediation: self.auto_remediation,
            metrics: self.metrics,
            tasks: Mutex::new(TaskTable::default()),
            self_ref: self_ref.clone(),
        })
    }
}

/// Dependency-aware health monitor with one scheduling loop per service
pub struct HealthMonitor {
    services: DashMap<String, Arc<MonitoredService>>,
    incidents: IncidentLog,
    alert_handler: Option<Arc<dyn AlertHandler>>,
    remediation: Option<Arc<dyn RemediationHook>>,
    auto_remediation: bool,
    metrics: MetricsEmitter,
    tasks: Mutex<TaskTable>,
    /// Loops hold this rather than a strong reference, so dropping the monitor ends them
    self_ref: Weak<HealthMonitor>,
}

impl HealthMonitor {
    pub fn builder() -> HealthMonitorBuilder {
        HealthMonitorBuilder::default()
    }

    /// Monitor without alerting or remediation
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    /// Register a service. If monitoring is running its loop starts immediately.
    pub fn register_check(&self, check: HealthCheck) -> Result<()> {
        check.validate().map_err(ResilienceError::InvalidHealthCheck)?;

        let name = check.name.clone();
        // Held across the insert so a concurrent start_monitoring cannot spawn this loop too
        let mut tasks = self.tasks.lock();
        let service = match self.services.entry(name.clone()) {
            Entry::Occupied(_) => return Err(ResilienceError::DuplicateService(name)),
            Entry::Vacant(vacant) => {
                let service = Arc::new(MonitoredService::new(check));
                vacant.insert(Arc::clone(&service));
                service
            }
        };

        info!(
            service = %name,
            interval_seconds = service.check.interval.as_secs_f64(),
            timeout_seconds = service.check.timeout.as_secs_f64(),
            critical = service.check.critical,
            dependencies = ?service.check.dependencies,
            "Registered health check"
        );

        let running = tasks.shutdown.as_ref().map(watch::Sender::subscribe);
        if let Some(shutdown) = running {
            let handle = self.spawn_loop(service, shutdown);
            tasks.handles.insert(name, handle);
        }

        Ok(())
    }

    /// Remove a service and stop its loop. Returns false if it was not registered.
    pub fn unregister_check(&self, name: &str) -> bool {
        if let Some(handle) = self.tasks.lock().handles.remove(name) {
            handle.abort();
        }

        let removed = self.services.remove(name).is_some();
        if removed {
            info!(service = %name, "Unregistered health check");
        }
        removed
    }

    /// Start one loop per registered service. Calling it again while running is a no-op.
    pub fn start_monitoring(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.shutdown.is_some() {
            debug!("Health monitoring already running");
            return;
        }

        let (shutdown, _) = watch::channel(false);
        for service in self.all_services() {
            let name = service.check.name.clone();
            let handle = self.spawn_loop(service, shutdown.subscribe());
            tasks.handles.insert(name, handle);
        }
        tasks.shutdown = Some(shutdown);

        info!(services = tasks.handles.len(), "Health monitoring started");
    }

    pub fn is_monitoring(&self) -> bool {
        self.tasks.lock().shutdown.is_some()
    }

    /// Cancel every loop, wait for them to finish and clear the task table.
    ///
    /// A round in flight is abandoned and its result discarded. Idempotent.
    pub async fn stop_monitoring(&self) {
        let (shutdown, handles) = {
            let mut tasks = self.tasks.lock();
            (tasks.shutdown.take(), std::mem::take(&mut tasks.handles))
        };

        let Some(shutdown) = shutdown else {
            debug!("Health monitoring not running");
            return;
        };

        let _ = shutdown.send(true);
        let count = handles.len();
        for result in futures::future::join_all(handles.into_values()).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    warn!(error = %e, "Monitoring loop ended abnormally");
                }
            }
        }

        info!(services = count, "Health monitoring stopped");
    }

    fn spawn_loop(
        &self,
        service: Arc<MonitoredService>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let monitor = self.self_ref.clone();
        tokio::spawn(async move {
            let interval = service.check.interval;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let Some(monitor) = monitor.upgrade() else {
                    break;
                };

                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = monitor.check_service(&service) => {}
                }
            }
            debug!(service = %service.check.name, "Monitoring loop exited");
        })
    }

    /// Run one check round for `name` immediately and return the resulting health
    pub async fn run_check_round(&self, name: &str) -> Result<ServiceHealth> {
        let service = self.service(name)?;
        self.check_service(&service).await;
        Ok(service.snapshot())
    }

    /// Put a service into or out of maintenance.
    ///
    /// While in maintenance its rounds are skipped. Leaving maintenance resets the status
    /// to unknown, clears the streak counters and runs a round immediately.
    pub async fn set_service_maintenance(&self, name: &str, enabled: bool) -> Result<()> {
        let service = self.service(name)?;

        if enabled {
            let previous = {
                let mut health = service.health.write();
                std::mem::replace(&mut health.status, HealthStatus::Maintenance)
            };
            if previous != HealthStatus::Maintenance {
                info!(service = %name, from_status = %previous, "Service entered maintenance");
                self.report_status(name, HealthStatus::Maintenance);
            }
            return Ok(());
        }

        let left = {
            let mut health = service.health.write();
            if health.status == HealthStatus::Maintenance {
                health.status = HealthStatus::Unknown;
                health.consecutive_failures = 0;
                health.consecutive_successes = 0;
                health.error_message = None;
                true
            } else {
                false
            }
        };

        if left {
            info!(service = %name, "Service left maintenance; running immediate check");
            self.check_service(&service).await;
        }
        Ok(())
    }

    async fn check_service(&self, service: &MonitoredService) {
        let _round = service.round.lock().await;
        let check = &service.check;

        let in_maintenance = service.health.read().status == HealthStatus::Maintenance;
        if in_maintenance {
            debug!(service = %check.name, "Skipping check round (maintenance)");
            return;
        }

        let started = Instant::now();
        let outcome = if self.dependencies_unhealthy(&check.dependencies) {
            Err(DEPENDENCIES_NOT_HEALTHY.to_string())
        } else {
            match tokio::time::timeout(check.timeout, check.probe.check()).await {
                Ok(Ok(true)) => Ok(()),
                Ok(Ok(false)) => Err(PROBE_REPORTED_UNHEALTHY.to_string()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!(
                    "health check timed out after {:.1}s",
                    check.timeout.as_secs_f64()
                )),
            }
        };
        let elapsed = started.elapsed();
        let passed = outcome.is_ok();

        let (transition, snapshot) = {
            let mut health = service.health.write();
            // Maintenance was switched on while the probe ran
            if health.status == HealthStatus::Maintenance {
                return;
            }

            health.total_checks += 1;
            health.last_check = Some(Utc::now());
            health.response_time = elapsed.as_secs_f64();

            match outcome {
                Ok(()) => {
                    health.consecutive_successes += 1;
                    health.consecutive_failures = 0;
                    health.error_message = None;
                }
                Err(message) => {
                    health.consecutive_failures += 1;
                    health.consecutive_successes = 0;
                    health.total_failures += 1;
                    health.error_message = Some(message);
                }
            }

            let old_status = health.status;
            let new_status = next_status(&health, check, passed);
            health.status = new_status;
            health.recompute_uptime();

            let transition = (old_status != new_status).then(|| HealthTransition {
                service: check.name.clone(),
                old_status,
                new_status,
                error_message: health.error_message.clone(),
                critical: check.critical,
                timestamp: Utc::now(),
            });
            (transition, health.clone())
        };

        debug!(
            service = %check.name,
            passed,
            status = %snapshot.status,
            consecutive_failures = snapshot.consecutive_failures,
            consecutive_successes = snapshot.consecutive_successes,
            response_time_seconds = snapshot.response_time,
            "Health check round complete"
        );

        let labels = [
            ("service", check.name.as_str()),
            ("result", if passed { "success" } else { "failure" }),
        ];
        self.metrics.counter(metric_names::HEALTH_CHECKS, &labels);
        self.metrics.histogram(
            metric_names::HEALTH_CHECK_DURATION,
            elapsed.as_secs_f64(),
            &labels[..1],
        );
        self.report_status(&check.name, snapshot.status);
        self.metrics.gauge(
            metric_names::SERVICE_UPTIME,
            snapshot.uptime_percentage,
            &labels[..1],
        );

        if let Some(transition) = transition {
            self.handle_transition(transition).await;
        }
    }

    fn report_status(&self, service: &str, status: HealthStatus) {
        self.metrics.gauge(
            metric_names::SERVICE_HEALTH_STATUS,
            status.gauge_value(),
            &[("service", service)],
        );
    }

    /// Unknown dependencies are treated as not unhealthy
    fn dependencies_unhealthy(&self, dependencies: &[String]) -> bool {
        dependencies.iter().any(|dependency| {
            self.services
                .get(dependency)
                .map_or(false, |s| s.health.read().status == HealthStatus::Unhealthy)
        })
    }

    async fn handle_transition(&self, transition: HealthTransition) {
        let service = transition.service.as_str();
        let error_message = transition.error_message.as_deref().unwrap_or("");
        match transition.new_status {
            HealthStatus::Unhealthy => error!(
                service,
                from_status = %transition.old_status,
                critical = transition.critical,
                error_message,
                "Service became unhealthy"
            ),
            HealthStatus::Degraded => warn!(
                service,
                from_status = %transition.old_status,
                error_message,
                "Service degraded"
            ),
            _ => info!(
                service,
                from_status = %transition.old_status,
                to_status = %transition.new_status,
                "Service health changed"
            ),
        }

        if let Some(incident) = self.incidents.record(&transition) {
            debug!(service, incident_id = %incident.id, "Recorded incident");
        }

        if let Some(handler) = &self.alert_handler {
            match AssertUnwindSafe(handler.on_transition(&transition))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(service, error = %e, "Alert handler failed"),
                Err(_) => error!(service, "Alert handler panicked"),
            }
        }

        if self.auto_remediation && transition.new_status == HealthStatus::Unhealthy {
            if let Some(hook) = &self.remediation {
                let hook = Arc::clone(hook);
                let service = transition.service.clone();
                tokio::spawn(async move {
                    match hook.remediate(&service).await {
                        Ok(()) => info!(service = %service, "Remediation hook completed"),
                        Err(e) => error!(service = %service, error = %e, "Remediation hook failed"),
                    }
                });
            }
        }
    }

    /// Aggregate every service into one verdict plus rolling metrics
    pub fn get_overall_health(&self) -> OverallHealth {
        let services: HashMap<String, ServiceHealth> = self
            .all_services()
            .iter()
            .map(|service| (service.check.name.clone(), service.snapshot()))
            .collect();

        let mut counts = StatusCounts::default();
        for health in services.values() {
            counts.record(health.status);
        }

        let total = services.len();
        let critical_unhealthy = services
            .values()
            .any(|h| h.critical && h.status == HealthStatus::Unhealthy);

        let status = if critical_unhealthy || counts.unhealthy * 2 > total {
            OverallStatus::Unhealthy
        } else if counts.degraded + counts.unhealthy > 0 {
            OverallStatus::Degraded
        } else if counts.healthy == total {
            OverallStatus::Healthy
        } else {
            OverallStatus::Unknown
        };

        let total_checks: u64 = services.values().map(|h| h.total_checks).sum();
        let total_failures: u64 = services.values().map(|h| h.total_failures).sum();
        let average_uptime_percentage = if total == 0 {
            100.0
        } else {
            services.values().map(|h| h.uptime_percentage).sum::<f64>() / total as f64
        };

        OverallHealth {
            status,
            timestamp: Utc::now(),
            total_services: total,
            counts,
            services,
            metrics: HealthMetrics {
                average_uptime_percentage,
                total_checks,
                total_failures,
                success_rate: ratio(total_checks.saturating_sub(total_failures), total_checks),
                incidents_last_24h: self.incidents.count_within(INCIDENT_WINDOW),
            },
        }
    }

    /// Incidents from the last `hours`, oldest first, optionally for one service
    pub fn get_incident_history(&self, service: Option<&str>, hours: f64) -> Vec<Incident> {
        let window = Duration::try_from_secs_f64(hours.max(0.0) * 3600.0).unwrap_or(Duration::MAX);
        self.incidents.history(service, window)
    }

    pub fn incident_count(&self) -> usize {
        self.incidents.len()
    }

    pub fn get_service_health(&self, name: &str) -> Option<ServiceHealth> {
        self.services.get(name).map(|service| service.snapshot())
    }

    /// Registered service names, sorted
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn service(&self, name: &str) -> Result<Arc<MonitoredService>> {
        self.services
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ResilienceError::UnknownService(name.to_string()))
    }

    fn all_services(&self) -> Vec<Arc<MonitoredService>> {
        self.services
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

/// Status after a round, given the already-updated streak counters.
///
/// A success only promotes once the streak reaches the threshold, and a single isolated
/// failure never demotes.
fn next_status(health: &ServiceHealth, check: &HealthCheck, passed: bool) -> HealthStatus {
    if passed {
        if health.consecutive_successes >= check.success_threshold {
            HealthStatus::Healthy
        } else {
            health.status
        }
    } else if health.consecutive_failures >= check.failure_threshold {
        HealthStatus::Unhealthy
    } else if health.consecutive_failures > 1 {
        HealthStatus::Degraded
    } else {
        health.status
    }
}

impl fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("services", &self.service_names())
            .field("auto_remediation", &self.auto_remediation)
            .field("monitoring", &self.is_monitoring())
            .finish_non_exhaustive()
    }
}
