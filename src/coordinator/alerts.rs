//! # Alert Delivery
//!
//! Health transitions are turned into [`AlertPayload`]s and handed to an [`AlertSink`].
//! The built-in [`WebhookAlertSink`] POSTs the payload as JSON:
//!
//! ```json
//! {
//!   "timestamp": "2026-01-01T12:00:00Z",
//!   "service": "database",
//!   "old_status": "healthy",
//!   "new_status": "unhealthy",
//!   "error_message": "connection refused",
//!   "alert_level": "critical",
//!   "source": "resilience_coordinator"
//! }
//! ```

use crate::config::AlertsConfig;
use crate::error::{ResilienceError, Result};
use crate::health::{HealthStatus, HealthTransition};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    /// Critical when the service turned unhealthy, or when a critical service moved
    /// anywhere other than healthy
    pub fn for_transition(transition: &HealthTransition) -> Self {
        let not_recovering = transition.new_status != HealthStatus::Healthy;
        if transition.new_status == HealthStatus::Unhealthy
            || (transition.critical && not_recovering)
        {
            Self::Critical
        } else {
            Self::Warning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire format of one alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub old_status: HealthStatus,
    pub new_status: HealthStatus,
    pub error_message: Option<String>,
    pub alert_level: AlertLevel,
    pub source: String,
}

impl AlertPayload {
    pub fn from_transition(transition: &HealthTransition, source: &str) -> Self {
        Self {
            timestamp: transition.timestamp,
            service: transition.service.clone(),
            old_status: transition.old_status,
            new_status: transition.new_status,
            error_message: transition.error_message.clone(),
            alert_level: AlertLevel::for_transition(transition),
            source: source.to_string(),
        }
    }
}

/// Destination for alert payloads
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, alert: &AlertPayload) -> anyhow::Result<()>;
}

/// Delivers alerts with an HTTP POST. Any non-2xx response is a delivery failure.
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResilienceError::AlertDelivery(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Sink for the configured webhook, or `None` when no URL is set
    pub fn from_config(config: &AlertsConfig) -> Result<Option<Self>> {
        config
            .webhook_url
            .as_ref()
            .map(|url| Self::new(url.clone(), config.timeout()))
            .transpose()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send_alert(&self, alert: &AlertPayload) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .with_context(|| format!("failed to POST alert to {}", self.url))?
            .error_for_status()
            .with_context(|| format!("webhook {} rejected alert", self.url))?;
        Ok(())
    }
}
