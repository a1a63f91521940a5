//! # Circuit Breaker Stats
//!
//! Read-only snapshots of breaker state plus registry-wide aggregation.

use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Point-in-time view of a single breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,

    /// Consecutive counted failures while closed
    pub failure_count: u32,

    /// Consecutive successes while half-open
    pub success_count: u32,

    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_seconds: f64,

    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejected: u64,
    pub state_changes: u64,

    /// Fractions of `total_calls` (0.0 when no calls were made)
    pub success_rate: f64,
    pub failure_rate: f64,
    pub rejection_rate: f64,

    /// Seconds until a half-open trial is allowed; 0.0 unless open
    pub seconds_until_retry: f64,

    pub last_failure_time: Option<DateTime<Utc>>,
}

impl CircuitBreakerStats {
    /// Closed with a failure rate under 10%, or half-open (recovering)
    pub fn is_healthy(&self) -> bool {
        match self.state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    /// Format stats for logging
    pub fn format_summary(&self) -> String {
        format!(
            "{} [{}] | Calls: {} | Success: {:.1}% | Failures: {} | Rejected: {}",
            self.name,
            self.state,
            self.total_calls,
            self.success_rate * 100.0,
            self.total_failures,
            self.total_rejected
        )
    }
}

/// Zero-guarded ratio helper
pub(crate) fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Stats for every breaker in a registry, keyed by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub circuit_breakers: HashMap<String, CircuitBreakerStats>,
    pub collected_at: Option<DateTime<Utc>>,
}

impl RegistryStats {
    pub fn new() -> Self {
        Self {
            circuit_breakers: HashMap::new(),
            collected_at: Some(Utc::now()),
        }
    }

    pub fn insert(&mut self, stats: CircuitBreakerStats) {
        self.circuit_breakers.insert(stats.name.clone(), stats);
    }

    /// Get count of circuit breakers by state
    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for stats in self.circuit_breakers.values() {
            *counts.entry(stats.state).or_insert(0) += 1;
        }
        counts
    }

    /// Fraction of breakers that are not open (1.0 for an empty registry)
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }

        let not_open = self
            .circuit_breakers
            .values()
            .filter(|stats| stats.state != CircuitState::Open)
            .count();

        not_open as f64 / self.circuit_breakers.len() as f64
    }

    pub fn total_calls(&self) -> u64 {
        self.circuit_breakers.values().map(|s| s.total_calls).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.circuit_breakers.values().map(|s| s.total_failures).sum()
    }

    pub fn system_failure_rate(&self) -> f64 {
        ratio(self.total_failures(), self.total_calls())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(name: &str, state: CircuitState, calls: u64, failures: u64) -> CircuitBreakerStats {
        CircuitBreakerStats {
            name: name.to_string(),
            state,
            failure_count: 0,
            success_count: 0,
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout_seconds: 30.0,
            total_calls: calls,
            total_successes: calls - failures,
            total_failures: failures,
            total_rejected: 0,
            state_changes: 0,
            success_rate: ratio(calls - failures, calls),
            failure_rate: ratio(failures, calls),
            rejection_rate: 0.0,
            seconds_until_retry: 0.0,
            last_failure_time: None,
        }
    }

    #[test]
    fn test_ratio_is_zero_guarded() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(1, 4), 0.25);
    }

    #[test]
    fn test_registry_stats_aggregation() {
        let mut registry_stats = RegistryStats::new();
        registry_stats.insert(stats("database", CircuitState::Closed, 100, 5));
        registry_stats.insert(stats("queue", CircuitState::Open, 50, 25));

        assert_eq!(registry_stats.total_calls(), 150);
        assert_eq!(registry_stats.total_failures(), 30);
        assert_eq!(registry_stats.system_failure_rate(), 0.2);

        let state_counts = registry_stats.count_by_state();
        assert_eq!(state_counts.get(&CircuitState::Closed), Some(&1));
        assert_eq!(state_counts.get(&CircuitState::Open), Some(&1));
        assert_eq!(registry_stats.health_score(), 0.5);
    }

    #[test]
    fn test_stats_health() {
        let mut s = stats("database", CircuitState::Closed, 100, 5);
        assert!(s.is_healthy());

        s.failure_rate = 0.15;
        assert!(!s.is_healthy());

        s.state = CircuitState::Open;
        s.failure_rate = 0.0;
        assert!(!s.is_healthy());

        s.state = CircuitState::HalfOpen;
        assert!(s.is_healthy());
    }
}
