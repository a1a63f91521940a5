//! Bounded, append-only incident log.

use crate::health::{HealthTransition, Incident};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Oldest timestamp inside `window`; `None` when the window reaches past the epoch range
fn cutoff(window: Duration) -> Option<DateTime<Utc>> {
    ChronoDuration::from_std(window)
        .ok()
        .and_then(|window| Utc::now().checked_sub_signed(window))
}

#[derive(Debug)]
pub struct IncidentLog {
    entries: Mutex<VecDeque<Incident>>,
    capacity: usize,
}

impl IncidentLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Record the transition if it enters a degraded or unhealthy state.
    ///
    /// Evicts the oldest entry once the log is full.
    pub fn record(&self, transition: &HealthTransition) -> Option<Incident> {
        if !transition.new_status.is_incident() {
            return None;
        }

        let incident = Incident::from(transition);
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(incident.clone());
        Some(incident)
    }

    /// Incidents newer than `window`, oldest first, optionally for one service
    pub fn history(&self, service: Option<&str>, window: Duration) -> Vec<Incident> {
        let cutoff = cutoff(window);
        self.entries
            .lock()
            .iter()
            .filter(|incident| cutoff.map_or(true, |c| incident.timestamp >= c))
            .filter(|incident| service.map_or(true, |name| incident.service == name))
            .cloned()
            .collect()
    }

    /// Number of incidents newer than `window`
    pub fn count_within(&self, window: Duration) -> usize {
        let cutoff = cutoff(window);
        self.entries
            .lock()
            .iter()
            .filter(|incident| cutoff.map_or(true, |c| incident.timestamp >= c))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
