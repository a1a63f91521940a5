//! # Circuit Breaker Implementation
//!
//! Provides fault isolation patterns to prevent cascade failures in distributed systems.
//! This implementation follows the classic circuit breaker pattern with three states:
//! Closed (normal operation), Open (failing fast), and Half-Open (testing recovery).
//!
//! All transitions of one breaker are serialised by a short synchronous critical section.
//! The protected operation itself always runs outside that section, so a slow call never
//! delays admission decisions for other callers.

use crate::constants::metric_names;
use crate::metrics::MetricsEmitter;
use crate::resilience::stats::{ratio, CircuitBreakerStats};
use crate::resilience::CircuitBreakerConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    #[default]
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - trial calls are allowed through
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    fn gauge_value(self) -> f64 {
        f64::from(self as u8)
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open; the operation was not invoked
    #[error("Circuit breaker is open for {component}; next attempt allowed at {next_attempt_at}")]
    CircuitOpen {
        component: String,
        /// Time remaining until a half-open trial is allowed
        retry_after: Duration,
        /// Wall-clock time at which a half-open trial is allowed
        next_attempt_at: DateTime<Utc>,
    },

    /// Operation exceeded the per-call timeout and was abandoned
    #[error("Operation on {component} timed out after {timeout:?}")]
    Timeout { component: String, timeout: Duration },

    /// Operation failed; the error is passed through untouched
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    /// True when the breaker refused the call without running it
    pub fn is_rejection(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen { .. })
    }

    /// Rejections are transient: the same call may succeed once the breaker half-opens
    pub fn is_retryable(&self) -> bool {
        self.is_rejection()
    }

    /// Unwrap the caller's own error, if that is what happened
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            CircuitBreakerError::OperationFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Decides which operation errors count toward the failure threshold.
///
/// Errors that are not countable still propagate to the caller unchanged.
pub trait FailureClassifier: Send + Sync {
    fn is_countable(&self, error: &(dyn StdError + 'static)) -> bool;
}

impl<F> FailureClassifier for F
where
    F: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync,
{
    fn is_countable(&self, error: &(dyn StdError + 'static)) -> bool {
        self(error)
    }
}

/// Counts every operation error as a breaker failure
#[derive(Debug, Default, Clone, Copy)]
pub struct CountAllFailures;

impl FailureClassifier for CountAllFailures {
    fn is_countable(&self, _error: &(dyn StdError + 'static)) -> bool {
        true
    }
}

/// Observer for breaker state transitions, called outside the breaker's lock
pub trait StateChangeListener: Send + Sync {
    fn on_state_change(&self, breaker: &str, from: CircuitState, to: CircuitState);
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
}

enum Outcome {
    Success,
    Failure,
    Timeout,
    IgnoredError,
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Timeout => "timeout",
            Outcome::IgnoredError => "ignored_error",
        }
    }
}

/// Mutable breaker state, only touched while holding the breaker's lock
#[derive(Debug, Default)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    next_attempt_time: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    total_rejected: u64,
    state_changes: u64,
}

impl BreakerInner {
    fn transition_to(
        &mut self,
        to: CircuitState,
        now: Instant,
        recovery_timeout: Duration,
    ) -> Transition {
        let from = self.state;
        match to {
            CircuitState::Closed => {
                self.failure_count = 0;
                self.success_count = 0;
                self.next_attempt_time = None;
            }
            CircuitState::HalfOpen => {
                self.failure_count = 0;
                self.success_count = 0;
                self.next_attempt_time = None;
            }
            CircuitState::Open => {
                self.success_count = 0;
                self.next_attempt_time = Some(now + recovery_timeout);
            }
        }
        self.state = to;
        self.state_changes += 1;
        Transition { from, to }
    }
}

/// Circuit breaker protecting a single named dependency
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    /// State machine and counters
    inner: Mutex<BreakerInner>,

    classifier: Arc<dyn FailureClassifier>,
    metrics: MetricsEmitter,
    listener: Option<Arc<dyn StateChangeListener>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_seconds = config.recovery_timeout.as_secs_f64(),
            success_threshold = config.success_threshold,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner::default()),
            classifier: Arc::new(CountAllFailures),
            metrics: MetricsEmitter::noop(),
            listener: None,
        }
    }

    /// Only errors accepted by `classifier` count toward the failure threshold
    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
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

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Execute an operation with circuit breaker protection, bounded by the configured
    /// per-call timeout
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        self.call_with_timeout(operation, self.config.call_timeout)
            .await
    }

    /// Execute an operation with circuit breaker protection and an explicit timeout
    pub async fn call_with_timeout<F, Fut, T, E>(
        &self,
        operation: F,
        timeout: Option<Duration>,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        if let Err(retry_after) = self.admit() {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
                retry_after,
                next_attempt_at: Utc::now()
                    + chrono::Duration::from_std(retry_after).unwrap_or_else(|_| chrono::Duration::zero()),
            });
        }

        let started = Instant::now();
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, operation()).await,
            None => Ok(operation().await),
        };
        let elapsed = started.elapsed();

        match result {
            Ok(Ok(value)) => {
                self.record_outcome(Outcome::Success, elapsed);
                Ok(value)
            }
            Ok(Err(err)) => {
                let outcome = if self.classifier.is_countable(&err) {
                    Outcome::Failure
                } else {
                    Outcome::IgnoredError
                };
                self.record_outcome(outcome, elapsed);
                Err(CircuitBreakerError::OperationFailed(err))
            }
            Err(_) => {
                self.record_outcome(Outcome::Timeout, elapsed);
                Err(CircuitBreakerError::Timeout {
                    component: self.name.clone(),
                    // `timeout` is always set when the elapsed branch is reachable
                    timeout: timeout.unwrap_or(elapsed),
                })
            }
        }
    }

    /// Execute a synchronous operation with circuit breaker protection
    pub async fn call_sync<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: StdError + 'static,
    {
        self.call_with_timeout(|| async move { operation() }, None)
            .await
    }

    /// Apply the lazy open -> half-open check and decide admission.
    ///
    /// Returns the remaining recovery time when the call is rejected.
    fn admit(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let (decision, transition) = {
            let mut inner = self.inner.lock();
            inner.total_calls += 1;

            match (inner.state, inner.next_attempt_time) {
                (CircuitState::Open, Some(next_attempt)) if now < next_attempt => {
                    inner.total_rejected += 1;
                    (Err(next_attempt - now), None)
                }
                (CircuitState::Open, _) => {
                    let transition =
                        inner.transition_to(CircuitState::HalfOpen, now, self.config.recovery_timeout);
                    (Ok(()), Some(transition))
                }
                _ => (Ok(()), None),
            }
        };

        if let Some(transition) = transition {
            self.announce(transition);
        }

        match decision {
            Ok(()) => {
                self.metrics.counter(
                    metric_names::BREAKER_CALLS,
                    &[("breaker", self.name.as_str()), ("outcome", "accepted")],
                );
                Ok(())
            }
            Err(retry_after) => {
                warn!(
                    component = %self.name,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Call rejected (circuit open)"
                );
                self.metrics.counter(
                    metric_names::BREAKER_CALLS,
                    &[("breaker", self.name.as_str()), ("outcome", "rejected")],
                );
                Err(retry_after)
            }
        }
    }

    fn record_outcome(&self, outcome: Outcome, duration: Duration) {
        let now = Instant::now();
        let transition = {
            let mut inner = self.inner.lock();
            match outcome {
                Outcome::Success => {
                    inner.total_successes += 1;
                    match inner.state {
                        CircuitState::Closed => {
                            inner.failure_count = 0;
                            None
                        }
                        CircuitState::HalfOpen => {
                            inner.success_count += 1;
                            if inner.success_count >= self.config.success_threshold {
                                Some(inner.transition_to(
                                    CircuitState::Closed,
                                    now,
                                    self.config.recovery_timeout,
                                ))
                            } else {
                                None
                            }
                        }
                        // Admitted before another caller tripped the breaker
                        CircuitState::Open => None,
                    }
                }
                Outcome::Failure | Outcome::Timeout => {
                    inner.total_failures += 1;
                    inner.last_failure_time = Some(Utc::now());
                    match inner.state {
                        CircuitState::Closed => {
                            inner.failure_count += 1;
                            if inner.failure_count >= self.config.failure_threshold {
                                Some(inner.transition_to(
                                    CircuitState::Open,
                                    now,
                                    self.config.recovery_timeout,
                                ))
                            } else {
                                None
                            }
                        }
                        CircuitState::HalfOpen => Some(inner.transition_to(
                            CircuitState::Open,
                            now,
                            self.config.recovery_timeout,
                        )),
                        CircuitState::Open => None,
                    }
                }
                Outcome::IgnoredError => None,
            }
        };

        debug!(
            component = %self.name,
            outcome = outcome.label(),
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        self.metrics.counter(
            metric_names::BREAKER_CALLS,
            &[("breaker", self.name.as_str()), ("outcome", outcome.label())],
        );
        self.metrics.histogram(
            metric_names::BREAKER_CALL_DURATION,
            duration.as_secs_f64(),
            &[("breaker", self.name.as_str())],
        );

        if let Some(transition) = transition {
            self.announce(transition);
        }
    }

    /// Log, report and broadcast a transition after the lock has been released
    fn announce(&self, transition: Transition) {
        match transition.to {
            CircuitState::Open => error!(
                component = %self.name,
                from_state = %transition.from,
                failure_threshold = self.config.failure_threshold,
                recovery_timeout_seconds = self.config.recovery_timeout.as_secs_f64(),
                "Circuit breaker opened (failing fast)"
            ),
            CircuitState::HalfOpen => info!(
                component = %self.name,
                success_threshold = self.config.success_threshold,
                "Circuit breaker half-open (testing recovery)"
            ),
            CircuitState::Closed => info!(
                component = %self.name,
                from_state = %transition.from,
                "Circuit breaker closed (recovered)"
            ),
        }

        self.metrics.counter(
            metric_names::BREAKER_STATE_CHANGES,
            &[
                ("breaker", self.name.as_str()),
                ("from", transition.from.as_str()),
                ("to", transition.to.as_str()),
            ],
        );
        self.metrics.gauge(
            metric_names::BREAKER_STATE,
            transition.to.gauge_value(),
            &[("breaker", self.name.as_str())],
        );

        if let Some(listener) = &self.listener {
            listener.on_state_change(&self.name, transition.from, transition.to);
        }
    }

    /// Force the circuit closed and clear every counter
    pub fn reset(&self) {
        let previous = {
            let mut inner = self.inner.lock();
            let previous = inner.state;
            *inner = BreakerInner::default();
            previous
        };

        if previous != CircuitState::Closed {
            warn!(component = %self.name, from_state = %previous, "Circuit breaker reset");
            self.announce(Transition {
                from: previous,
                to: CircuitState::Closed,
            });
        }
    }

    /// Force the circuit open with a fresh recovery window
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let now = Instant::now();
        let transition = {
            let mut inner = self.inner.lock();
            if inner.state == CircuitState::Open {
                inner.next_attempt_time = Some(now + self.config.recovery_timeout);
                None
            } else {
                Some(inner.transition_to(CircuitState::Open, now, self.config.recovery_timeout))
            }
        };

        if let Some(transition) = transition {
            self.announce(transition);
        }
    }

    /// Get a read-only stats snapshot
    pub fn get_stats(&self) -> CircuitBreakerStats {
        let now = Instant::now();
        let inner = self.inner.lock();

        let seconds_until_retry = match (inner.state, inner.next_attempt_time) {
            (CircuitState::Open, Some(next_attempt)) => {
                next_attempt.saturating_duration_since(now).as_secs_f64()
            }
            _ => 0.0,
        };

        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            recovery_timeout_seconds: self.config.recovery_timeout.as_secs_f64(),
            total_calls: inner.total_calls,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_rejected: inner.total_rejected,
            state_changes: inner.state_changes,
            success_rate: ratio(inner.total_successes, inner.total_calls),
            failure_rate: ratio(inner.total_failures, inner.total_calls),
            rejection_rate: ratio(inner.total_rejected, inner.total_calls),
            seconds_until_retry,
            last_failure_time: inner.last_failure_time,
        }
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        let inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            return false;
        }

        if inner.total_calls < 10 {
            // Too few calls to determine health
            return true;
        }

        ratio(inner.total_failures, inner.total_calls) < 0.1
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::RecordingSink;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("connection refused")]
        Infrastructure,
        #[error("invalid input")]
        Business,
    }

    fn config(failure_threshold: u32, recovery_secs: u64, success_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: Duration::from_secs(recovery_secs),
            success_threshold,
            call_timeout: None,
        }
    }

    async fn fail(circuit: &CircuitBreaker) {
        let _ = circuit
            .call(|| async { Err::<(), _>(TestError::Infrastructure) })
            .await;
    }

    async fn succeed(circuit: &CircuitBreaker) -> Result<&'static str, CircuitBreakerError<TestError>> {
        circuit.call(|| async { Ok::<_, TestError>("ok") }).await
    }

    #[tokio::test]
    async fn test_circuit_breaker_normal_operation() {
        let circuit = CircuitBreaker::new("test", config(3, 10, 2));
        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = succeed(&circuit).await;
        assert_eq!(result.unwrap(), "ok");

        let stats = circuit.get_stats();
        assert_eq!(stats.total_calls, 1);
        assert_eq!(stats.total_successes, 1);
        assert_eq!(stats.total_failures, 0);
        assert_eq!(stats.success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_on_failures() {
        let circuit = CircuitBreaker::new("test", config(2, 10, 2));

        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Closed);

        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let invoked = AtomicBool::new(false);
        let result = circuit
            .call(|| async {
                invoked.store(true, Ordering::SeqCst);
                Ok::<_, TestError>("should not execute")
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen { .. })));
        assert!(!invoked.load(Ordering::SeqCst));
        assert_eq!(circuit.get_stats().total_rejected, 1);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let circuit = CircuitBreaker::new("test", config(3, 10, 1));

        fail(&circuit).await;
        fail(&circuit).await;
        assert_eq!(circuit.get_stats().failure_count, 2);

        succeed(&circuit).await.unwrap();
        assert_eq!(circuit.get_stats().failure_count, 0);

        fail(&circuit).await;
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_recovery() {
        let circuit = CircuitBreaker::new("test", config(1, 10, 1));

        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(9)).await;
        let early = succeed(&circuit).await;
        match early {
            Err(CircuitBreakerError::CircuitOpen { retry_after, .. }) => {
                assert_eq!(retry_after, Duration::from_secs(1));
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(succeed(&circuit).await.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);

        let stats = circuit.get_stats();
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.success_count, 0);
        // closed -> open -> half_open -> closed
        assert_eq!(stats.state_changes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_requires_consecutive_successes() {
        let circuit = CircuitBreaker::new("test", config(1, 5, 2));

        fail(&circuit).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        succeed(&circuit).await.unwrap();
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
        assert_eq!(circuit.get_stats().success_count, 1);

        succeed(&circuit).await.unwrap();
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_fresh_window() {
        let circuit = CircuitBreaker::new("test", config(1, 10, 2));

        fail(&circuit).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let stats = circuit.get_stats();
        assert_eq!(stats.seconds_until_retry, 10.0);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(succeed(&circuit).await.unwrap_err().is_rejection());
    }

    #[tokio::test]
    async fn test_classifier_ignores_business_errors() {
        let classifier = |err: &(dyn StdError + 'static)| {
            matches!(err.downcast_ref::<TestError>(), Some(TestError::Infrastructure))
        };
        let circuit = CircuitBreaker::new("test", config(2, 10, 1)).with_classifier(Arc::new(classifier));

        for _ in 0..5 {
            let result = circuit
                .call(|| async { Err::<(), _>(TestError::Business) })
                .await;
            assert!(matches!(
                result,
                Err(CircuitBreakerError::OperationFailed(TestError::Business))
            ));
        }

        assert_eq!(circuit.state(), CircuitState::Closed);
        let stats = circuit.get_stats();
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.total_failures, 0);
        assert_eq!(stats.total_calls, 5);

        fail(&circuit).await;
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let circuit = CircuitBreaker::new("test", config(1, 10, 1));

        let result = circuit
            .call_with_timeout(
                || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, TestError>("late")
                },
                Some(Duration::from_secs(1)),
            )
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Timeout { .. })));
        assert_eq!(circuit.state(), CircuitState::Open);
        assert_eq!(circuit.get_stats().total_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_does_not_block_admission() {
        let circuit = Arc::new(CircuitBreaker::new("test", config(3, 10, 1)));

        let slow_circuit = Arc::clone(&circuit);
        let slow = tokio::spawn(async move {
            slow_circuit
                .call(|| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, TestError>("slow")
                })
                .await
        });
        tokio::task::yield_now().await;

        assert_eq!(succeed(&circuit).await.unwrap(), "ok");
        assert!(!slow.is_finished());

        assert_eq!(slow.await.unwrap().unwrap(), "slow");
    }

    #[tokio::test]
    async fn test_call_sync_operation() {
        let circuit = CircuitBreaker::new("test", config(1, 10, 1));

        let value = circuit.call_sync(|| Ok::<_, TestError>(42)).await.unwrap();
        assert_eq!(value, 42);

        let err = circuit
            .call_sync(|| Err::<u32, _>(TestError::Infrastructure))
            .await
            .unwrap_err();
        assert!(err.into_operation_error().is_some());
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_force_operations_are_idempotent() {
        let circuit = CircuitBreaker::new("test", config(1, 10, 1));

        circuit.force_open();
        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert_eq!(circuit.get_stats().state_changes, 1);

        circuit.reset();
        circuit.reset();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.get_stats().total_calls, 0);
    }

    #[tokio::test]
    async fn test_rates_in_stats() {
        let circuit = CircuitBreaker::new("test", config(2, 10, 1));

        let empty = circuit.get_stats();
        assert_eq!(empty.success_rate, 0.0);
        assert_eq!(empty.rejection_rate, 0.0);

        succeed(&circuit).await.unwrap();
        fail(&circuit).await;
        fail(&circuit).await;
        let _ = succeed(&circuit).await;

        let stats = circuit.get_stats();
        assert_eq!(stats.total_calls, 4);
        assert_eq!(stats.success_rate, 0.25);
        assert_eq!(stats.failure_rate, 0.5);
        assert_eq!(stats.rejection_rate, 0.25);
        assert!(stats.seconds_until_retry > 0.0);
        assert!(stats.last_failure_time.is_some());
    }

    #[derive(Default)]
    struct CountingListener {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    impl StateChangeListener for CountingListener {
        fn on_state_change(&self, _breaker: &str, _from: CircuitState, to: CircuitState) {
            match to {
                CircuitState::Open => self.opened.fetch_add(1, Ordering::SeqCst),
                CircuitState::Closed => self.closed.fetch_add(1, Ordering::SeqCst),
                CircuitState::HalfOpen => 0,
            };
        }
    }

    #[tokio::test]
    async fn test_listener_and_failing_sink_do_not_affect_transitions() {
        let listener = Arc::new(CountingListener::default());
        let sink = Arc::new(RecordingSink::failing());
        let circuit = CircuitBreaker::new("test", config(1, 10, 1))
            .with_listener(listener.clone())
            .with_metrics(MetricsEmitter::new(sink.clone()));

        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);
        let _ = succeed(&circuit).await;

        circuit.reset();

        assert_eq!(listener.opened.load(Ordering::SeqCst), 1);
        assert_eq!(listener.closed.load(Ordering::SeqCst), 1);
        assert_eq!(sink.count_with(metric_names::BREAKER_CALLS, "outcome=rejected"), 1);
        assert_eq!(sink.count_with(metric_names::BREAKER_STATE_CHANGES, "to=open"), 1);
    }
}
