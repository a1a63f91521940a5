//! # Circuit Breaker Registry
//!
//! Name to breaker directory shared by every caller in the process.
//! Provides idempotent get-or-create, bulk controls and stats aggregation.

use crate::metrics::MetricsEmitter;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, FailureClassifier, RegistryStats,
    StateChangeListener,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry of circuit breakers keyed by component name
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,

    /// Used by `get_or_create` when no component override exists
    default_config: CircuitBreakerConfig,

    /// Per-component overrides used by `get_or_create`
    component_configs: HashMap<String, CircuitBreakerConfig>,

    /// Injected into every breaker this registry creates
    metrics: MetricsEmitter,
    listener: Option<Arc<dyn StateChangeListener>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self {
            breakers: DashMap::new(),
            default_config: CircuitBreakerConfig::default(),
            component_configs: HashMap::new(),
            metrics: MetricsEmitter::noop(),
            listener: None,
        }
    }

    pub fn with_default_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.default_config = config;
        self
    }

    pub fn with_component_config(
        mut self,
        component: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Self {
        self.component_configs.insert(component.into(), config);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsEmitter) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn StateChangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Configuration `get_or_create` would use for a component
    pub fn config_for_component(&self, component: &str) -> CircuitBreakerConfig {
        self.component_configs
            .get(component)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    /// Return the breaker registered under `name`, creating it with `config` if absent.
    ///
    /// When the breaker already exists `config` is ignored and the existing instance is
    /// returned, so concurrent callers always share one breaker per name.
    pub fn create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.create_with(name, config, None)
    }

    /// Like [`create`](Self::create), with a failure classifier for a newly built breaker
    pub fn create_with_classifier(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
        classifier: Arc<dyn FailureClassifier>,
    ) -> Arc<CircuitBreaker> {
        self.create_with(name, config, Some(classifier))
    }

    /// Get or create a breaker using the registry's configuration for `name`
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }
        self.create(name, self.config_for_component(name))
    }

    fn create_with(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
        classifier: Option<Arc<dyn FailureClassifier>>,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }

        // The shard lock held by `entry` makes the check-and-insert atomic
        let mut created = false;
        let breaker = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(self.build(name, config, classifier))
            })
            .value()
            .clone();

        if created {
            info!(
                component = name,
                total_circuit_breakers = self.breakers.len(),
                "Created new circuit breaker"
            );
        }

        breaker
    }

    fn build(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
        classifier: Option<Arc<dyn FailureClassifier>>,
    ) -> CircuitBreaker {
        let mut breaker = CircuitBreaker::new(name, config).with_metrics(self.metrics.clone());
        if let Some(classifier) = classifier {
            breaker = breaker.with_classifier(classifier);
        }
        if let Some(listener) = &self.listener {
            breaker = breaker.with_listener(Arc::clone(listener));
        }
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Get all circuit breaker names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Remove circuit breaker for a component
    pub fn remove(&self, name: &str) -> bool {
        if self.breakers.remove(name).is_some() {
            info!(
                component = name,
                remaining_count = self.breakers.len(),
                "Removed circuit breaker"
            );
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshot every registered breaker
    pub fn get_all_stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::new();
        for breaker in self.all() {
            stats.insert(breaker.get_stats());
        }
        stats
    }

    /// Reset every breaker to closed
    pub fn reset_all(&self) {
        let breakers = self.all();
        info!(count = breakers.len(), "Resetting all circuit breakers");
        for breaker in breakers {
            breaker.reset();
        }
    }

    /// Force open all circuit breakers (emergency stop)
    pub fn force_open_all(&self) {
        warn!("Forcing all circuit breakers open (emergency stop)");
        for breaker in self.all() {
            breaker.force_open();
        }
    }

    /// Get count of circuit breakers by state
    pub fn state_summary(&self) -> HashMap<CircuitState, usize> {
        self.get_all_stats().count_by_state()
    }

    /// Fraction of breakers that are not open
    pub fn health_score(&self) -> f64 {
        self.get_all_stats().health_score()
    }

    /// Clone the breakers out so no map guard is held while touching them
    fn all(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.names())
            .field("default_config", &self.default_config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::RecordingSink;
    use crate::resilience::CircuitBreakerError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[derive(Debug, thiserror::Error)]
    #[error("not found")]
    struct NotFound;

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker.call(|| async { Err::<(), _>(Boom) }).await;
    }

    #[tokio::test]
    async fn test_classifier_decides_which_errors_count() {
        let registry = CircuitBreakerRegistry::new();
        let classifier = |error: &(dyn std::error::Error + 'static)| !error.is::<NotFound>();
        let breaker = registry.create_with_classifier(
            "catalog",
            CircuitBreakerConfig::default().with_failure_threshold(2),
            Arc::new(classifier),
        );

        for _ in 0..5 {
            let result = breaker.call(|| async { Err::<(), _>(NotFound) }).await;
            assert!(matches!(result, Err(CircuitBreakerError::OperationFailed(NotFound))));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.get_stats().failure_count, 0);

        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        // The classifier stays with the registered instance
        let again = registry.get_or_create("catalog");
        assert!(Arc::ptr_eq(&breaker, &again));
    }

    #[test]
    fn test_registry_creation() {
        let registry = CircuitBreakerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.health_score(), 1.0);
    }

    #[test]
    fn test_create_is_idempotent() {
        let registry = CircuitBreakerRegistry::new();

        let first = registry.create("database", CircuitBreakerConfig::for_database());
        let second = registry.create("database", CircuitBreakerConfig::for_cache());

        assert!(Arc::ptr_eq(&first, &second));
        // The first configuration wins
        assert_eq!(second.config(), &CircuitBreakerConfig::for_database());
        assert_eq!(registry.names(), vec!["database".to_string()]);
    }

    #[test]
    fn test_get_or_create_uses_component_overrides() {
        let registry = CircuitBreakerRegistry::new()
            .with_default_config(CircuitBreakerConfig::default().with_failure_threshold(7))
            .with_component_config("cache", CircuitBreakerConfig::for_cache());

        assert_eq!(registry.get_or_create("cache").config().failure_threshold, 3);
        assert_eq!(registry.get_or_create("queue").config().failure_threshold, 7);
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_create_yields_one_instance() {
        let registry = Arc::new(CircuitBreakerRegistry::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry.create("external_api", CircuitBreakerConfig::for_external_api())
                })
            })
            .collect();

        let mut breakers = Vec::new();
        for handle in handles {
            breakers.push(handle.await.unwrap());
        }

        assert_eq!(registry.len(), 1);
        assert!(breakers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_stats_and_bulk_controls() {
        let registry = CircuitBreakerRegistry::new();
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(1)
            .with_recovery_timeout(Duration::from_secs(30));

        let database = registry.create("database", config.clone());
        let _cache = registry.create("cache", config.clone());
        let _queue = registry.create("queue", config);

        fail(&database).await;
        assert_eq!(database.state(), CircuitState::Open);

        let stats = registry.get_all_stats();
        assert_eq!(stats.circuit_breakers.len(), 3);
        assert_eq!(stats.circuit_breakers["database"].total_failures, 1);

        let summary = registry.state_summary();
        assert_eq!(summary.get(&CircuitState::Closed), Some(&2));
        assert_eq!(summary.get(&CircuitState::Open), Some(&1));
        assert!((registry.health_score() - 2.0 / 3.0).abs() < f64::EPSILON);

        registry.force_open_all();
        assert_eq!(registry.health_score(), 0.0);

        registry.reset_all();
        assert_eq!(registry.state_summary().get(&CircuitState::Closed), Some(&3));
        assert_eq!(registry.get_all_stats().circuit_breakers["database"].total_calls, 0);

        assert!(registry.remove("queue"));
        assert!(!registry.remove("queue"));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_registry_injects_listener_and_metrics() {
        struct Trips(AtomicUsize);

        impl StateChangeListener for Trips {
            fn on_state_change(&self, _breaker: &str, _from: CircuitState, to: CircuitState) {
                if to == CircuitState::Open {
                    self.0.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let trips = Arc::new(Trips(AtomicUsize::new(0)));
        let sink = Arc::new(RecordingSink::default());
        let registry = CircuitBreakerRegistry::new()
            .with_listener(trips.clone())
            .with_metrics(MetricsEmitter::new(sink.clone()));

        let breaker = registry.create("database", CircuitBreakerConfig::default().with_failure_threshold(2));
        fail(&breaker).await;
        fail(&breaker).await;

        assert_eq!(trips.0.load(Ordering::SeqCst), 1);
        assert_eq!(
            sink.count_with(crate::constants::metric_names::BREAKER_CALLS, "breaker=database"),
            4
        );
    }
}
