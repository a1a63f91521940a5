//! # Metrics Sink
//!
//! The engine reports counters, histograms and gauges to an external metrics backend
//! through [`MetricsSink`]. Storage and export are the backend's business; the engine
//! only calls the sink opportunistically and never lets a sink error change breaker or
//! monitor behaviour.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Label set attached to a metric sample
pub type MetricLabels<'a> = &'a [(&'a str, &'a str)];

#[derive(Debug, Error)]
#[error("metrics sink error: {0}")]
pub struct MetricsSinkError(pub String);

/// Contract for an external metrics backend
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &str, labels: MetricLabels<'_>)
        -> Result<(), MetricsSinkError>;

    fn record_histogram(
        &self,
        name: &str,
        value: f64,
        labels: MetricLabels<'_>,
    ) -> Result<(), MetricsSinkError>;

    fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: MetricLabels<'_>,
    ) -> Result<(), MetricsSinkError>;
}

/// Sink that drops every sample
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment_counter(&self, _: &str, _: MetricLabels<'_>) -> Result<(), MetricsSinkError> {
        Ok(())
    }

    fn record_histogram(
        &self,
        _: &str,
        _: f64,
        _: MetricLabels<'_>,
    ) -> Result<(), MetricsSinkError> {
        Ok(())
    }

    fn set_gauge(&self, _: &str, _: f64, _: MetricLabels<'_>) -> Result<(), MetricsSinkError> {
        Ok(())
    }
}

/// Sink that writes each sample as a structured `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

fn format_labels(labels: MetricLabels<'_>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

impl MetricsSink for TracingMetricsSink {
    fn increment_counter(
        &self,
        name: &str,
        labels: MetricLabels<'_>,
    ) -> Result<(), MetricsSinkError> {
        tracing::trace!(metric = name, labels = %format_labels(labels), kind = "counter", "metric");
        Ok(())
    }

    fn record_histogram(
        &self,
        name: &str,
        value: f64,
        labels: MetricLabels<'_>,
    ) -> Result<(), MetricsSinkError> {
        tracing::trace!(metric = name, value, labels = %format_labels(labels), kind = "histogram", "metric");
        Ok(())
    }

    fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: MetricLabels<'_>,
    ) -> Result<(), MetricsSinkError> {
        tracing::trace!(metric = name, value, labels = %format_labels(labels), kind = "gauge", "metric");
        Ok(())
    }
}

/// Fire-and-forget front for a [`MetricsSink`].
///
/// Every sink error is logged at debug level and dropped.
#[derive(Clone)]
pub struct MetricsEmitter {
    sink: Arc<dyn MetricsSink>,
}

impl MetricsEmitter {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopMetricsSink))
    }

    pub fn sink(&self) -> Arc<dyn MetricsSink> {
        Arc::clone(&self.sink)
    }

    pub fn counter(&self, name: &str, labels: MetricLabels<'_>) {
        if let Err(e) = self.sink.increment_counter(name, labels) {
            debug!(metric = name, error = %e, "Dropping counter sample");
        }
    }

    pub fn histogram(&self, name: &str, value: f64, labels: MetricLabels<'_>) {
        if let Err(e) = self.sink.record_histogram(name, value, labels) {
            debug!(metric = name, error = %e, "Dropping histogram sample");
        }
    }

    pub fn gauge(&self, name: &str, value: f64, labels: MetricLabels<'_>) {
        if let Err(e) = self.sink.set_gauge(name, value, labels) {
            debug!(metric = name, error = %e, "Dropping gauge sample");
        }
    }
}

impl Default for MetricsEmitter {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for MetricsEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsEmitter").finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;

    #[test]
    fn test_emitter_swallows_sink_errors() {
        let sink = Arc::new(RecordingSink::failing());
        let emitter = MetricsEmitter::new(sink.clone());

        emitter.counter("calls", &[("breaker", "database")]);
        emitter.histogram("latency", 0.25, &[]);
        emitter.gauge("state", 1.0, &[("breaker", "database")]);

        assert_eq!(sink.samples.lock().len(), 3);
        assert_eq!(sink.count_with("calls", "breaker=database"), 1);
    }

    #[test]
    fn test_label_formatting() {
        assert_eq!(format_labels(&[("a", "1"), ("b", "2")]), "a=1,b=2");
        assert_eq!(format_labels(&[]), "");
    }
}
