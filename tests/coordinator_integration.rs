mod common;

use common::{io_error, SwitchProbe};
use mockito::Matcher;
use resilience_core::config::ResilienceConfig;
use resilience_core::coordinator::ResilienceCoordinator;
use resilience_core::health::OverallStatus;
use resilience_core::{CircuitBreakerConfig, CircuitBreakerError, CircuitState, ResilienceError};
use serde_json::json;
use std::io;
use std::sync::Arc;

fn config_without_remediation() -> ResilienceConfig {
    ResilienceConfig {
        auto_remediation: false,
        ..ResilienceConfig::default()
    }
}

#[tokio::test]
async fn test_usage_before_initialize_is_an_error() {
    let coordinator = ResilienceCoordinator::builder().build().unwrap();

    for err in [
        coordinator.with_circuit_breaker("database", None).unwrap_err(),
        coordinator.get_system_health().unwrap_err(),
        coordinator.get_stats().unwrap_err(),
    ] {
        assert!(matches!(err, ResilienceError::NotInitialized { .. }));
        assert!(err.to_string().contains("initialize()"));
    }
}

#[tokio::test]
async fn test_webhook_receives_alerts_for_each_transition() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/hooks/resilience")
        .match_body(Matcher::PartialJson(json!({
            "service": "cache",
            "source": "checkout-service"
        })))
        .with_status(200)
        .expect(2)
        .create_async()
        .await;

    let mut config = config_without_remediation();
    config.alerts.webhook_url = Some(format!("{}/hooks/resilience", server.url()));
    config.alerts.source = "checkout-service".to_string();

    let probe = SwitchProbe::new(false);
    let coordinator = ResilienceCoordinator::builder()
        .config(config)
        .probe("cache", probe.clone())
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();

    let monitor = coordinator.monitor().unwrap();
    for _ in 0..3 {
        monitor.run_check_round("cache").await.unwrap();
    }
    mock.assert_async().await;

    let health = coordinator.get_system_health().unwrap();
    assert_eq!(health.coordinator.alerts_sent, 2);
    assert_eq!(health.coordinator.health_incidents, 2);
    // One unhealthy service out of one is a majority
    assert_eq!(health.health.status, OverallStatus::Unhealthy);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_breakers_survive_shutdown_closed() {
    let coordinator = ResilienceCoordinator::builder()
        .config(config_without_remediation())
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();

    let breaker = coordinator
        .with_circuit_breaker(
            "ledger",
            Some(CircuitBreakerConfig::default().with_failure_threshold(2)),
        )
        .unwrap();
    for _ in 0..2 {
        let result: Result<(), CircuitBreakerError<io::Error>> =
            breaker.call(|| async { Err(io_error("ledger down")) }).await;
        assert!(result.is_err());
    }

    let health = coordinator.get_system_health().unwrap();
    assert_eq!(health.circuit_breakers["ledger"].state, CircuitState::Open);
    assert_eq!(health.circuit_breakers["ledger"].failure_count, 2);
    assert_eq!(health.coordinator.circuit_breaker_trips, 1);

    let stats = coordinator.get_stats().unwrap();
    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["circuit_breaker_trips"], 1);
    assert_eq!(json["circuit_breakers"]["ledger"]["state"], "open");

    coordinator.shutdown().await;
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(!coordinator.is_initialized());

    // The registry keeps its breakers across a restart
    coordinator.initialize().await.unwrap();
    let again = coordinator.with_circuit_breaker("ledger", None).unwrap();
    assert!(Arc::ptr_eq(&breaker, &again));
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_backoff_remediation_recovers_service() {
    let mut config = ResilienceConfig::default();
    config.remediation.max_attempts = 3;
    config.remediation.base_delay_ms = 500;

    let probe = SwitchProbe::new(false);
    let coordinator = ResilienceCoordinator::builder()
        .config(config)
        .probe("metrics_backend", probe.clone())
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();

    // Still failing: every re-test fails
    assert!(!coordinator
        .trigger_service_remediation("metrics_backend")
        .await
        .unwrap());
    assert_eq!(probe.calls(), 3);

    probe.set(true);
    assert!(coordinator
        .trigger_service_remediation("metrics_backend")
        .await
        .unwrap());

    let counters = coordinator.get_stats().unwrap().counters;
    assert_eq!(counters.auto_remediations, 2);
    assert_eq!(counters.successful_remediations, 1);

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_in_flight_remediation() {
    let probe = SwitchProbe::new(false);
    let coordinator = ResilienceCoordinator::builder()
        .probe("cache", probe.clone())
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();

    let monitor = coordinator.monitor().unwrap();
    for _ in 0..3 {
        monitor.run_check_round("cache").await.unwrap();
    }
    drop(monitor);

    // The spawned backoff strategy runs its first re-test after one second
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert_eq!(probe.calls(), 4);

    coordinator.shutdown().await;
    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    assert_eq!(probe.calls(), 4);

    assert!(coordinator.get_stats().is_err());
    coordinator.initialize().await.unwrap();
    let counters = coordinator.get_stats().unwrap().counters;
    assert_eq!(counters.auto_remediations, 1);
    assert_eq!(counters.successful_remediations, 0);
    coordinator.shutdown().await;
}
