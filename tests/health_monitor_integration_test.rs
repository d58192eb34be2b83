mod common;

use autopromptr_core::client::HttpBackendClient;
use autopromptr_core::config::{AutomationConfig, HealthConfig};
use autopromptr_core::health::{BackendHealthMonitor, HealthStatus};
use autopromptr_core::services::BackendRegistry;
use std::sync::Arc;
use std::time::Duration;

fn monitor_for(config: &AutomationConfig) -> BackendHealthMonitor {
    let client = HttpBackendClient::new(Duration::from_secs(2)).unwrap();
    BackendHealthMonitor::new(
        Arc::new(client),
        BackendRegistry::from_config(config),
        HealthConfig {
            probe_timeout_ms: 1_000,
            degraded_threshold_ms: 1_000,
            check_interval_ms: 50,
            feed_circuit_breakers: true,
        },
    )
}

#[tokio::test]
async fn test_probe_round_against_http_backends() {
    let mut python = mockito::Server::new_async().await;
    let mut nodejs = mockito::Server::new_async().await;
    let _healthy = python
        .mock("GET", "/health")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status":"ok","service":"autopromptr-backend-python"}"#)
        .create_async()
        .await;
    let _down = nodejs
        .mock("GET", "/health")
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let mut config = AutomationConfig::default();
    config.backends[0].url = python.url();
    config.backends[1].url = nodejs.url();
    let monitor = monitor_for(&config);

    let results = monitor.probe_all().await;
    assert_eq!(results["python"].status, HealthStatus::Healthy);
    assert_eq!(results["nodejs"].status, HealthStatus::Unhealthy);
    assert!(results["nodejs"]
        .error
        .as_deref()
        .unwrap()
        .contains("503"));

    let report = monitor.system_report();
    assert_eq!(report.overall_status, HealthStatus::Healthy);
    assert_eq!(report.backends.len(), 2);
    assert_eq!(report.backends[0].backend, "python");
    assert_eq!(report.summary.unhealthy, 1);
    assert!(!report.recommendations.is_empty());
}

#[tokio::test]
async fn test_all_backends_down_is_unhealthy() {
    let mut config = AutomationConfig::default();
    config.backends[0].url = "http://127.0.0.1:9".to_string();
    config.backends[1].url = "http://127.0.0.1:9".to_string();
    let monitor = monitor_for(&config);

    monitor.probe_all().await;
    let report = monitor.system_report();

    assert_eq!(report.overall_status, HealthStatus::Unhealthy);
    assert!(report
        .recommendations
        .iter()
        .any(|hint| hint.starts_with("CRITICAL")));
}
