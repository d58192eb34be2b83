//! # Backend Health Monitor
//!
//! Probes every configured backend's `/health` endpoint in parallel, classifies
//! each by latency and availability, and keeps the latest snapshot plus a
//! rolling summary. A background task ([`BackendHealthMonitor::spawn`]) runs
//! the probe cycle on a fixed interval, independent of batch runs.
//!
//! When `feed_circuit_breakers` is enabled each probe goes through the
//! backend's breaker, so a recovering backend can be closed again by a
//! successful probe and an open breaker suppresses the network call.

use super::types::{
    aggregate_status, recommendations, HealthCheckResult, HealthStatus, HealthSummary,
    SystemHealthReport,
};
use crate::client::{BackendClient, ClientError, HealthResponse};
use crate::config::HealthConfig;
use crate::constants::{messages, operations};
use crate::logging::log_backend_operation;
use crate::models::BackendDescriptor;
use crate::resilience::CircuitBreakerError;
use crate::services::BackendRegistry;
use chrono::Utc;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct BackendHealthMonitor {
    client: Arc<dyn BackendClient>,
    registry: BackendRegistry,
    config: HealthConfig,
    snapshot: Arc<RwLock<HashMap<String, HealthCheckResult>>>,
    summary: Arc<Mutex<HealthSummary>>,
}

impl BackendHealthMonitor {
    pub fn new(client: Arc<dyn BackendClient>, registry: BackendRegistry, config: HealthConfig) -> Self {
        Self {
            client,
            registry,
            config,
            snapshot: Arc::new(RwLock::new(HashMap::new())),
            summary: Arc::new(Mutex::new(HealthSummary::default())),
        }
    }

    /// Probe one backend; never fails, errors become an unhealthy result
    pub async fn probe(&self, backend: &BackendDescriptor) -> HealthCheckResult {
        let started = Instant::now();
        let probe_timeout = self.config.probe_timeout();

        let request = async {
            match tokio::time::timeout(probe_timeout, self.client.health(backend)).await {
                Ok(response) => response,
                Err(_) => Err(ClientError::Timeout {
                    timeout_ms: probe_timeout.as_millis() as u64,
                }),
            }
        };

        let outcome: Result<HealthResponse, String> = if self.config.feed_circuit_breakers {
            match self.registry.breaker(&backend.name).call(|| request).await {
                Ok(response) => Ok(response),
                Err(CircuitBreakerError::CircuitOpen { .. }) => Err(messages::CIRCUIT_OPEN.to_string()),
                Err(CircuitBreakerError::OperationFailed(err)) => Err(err.to_string()),
            }
        } else {
            request.await.map_err(|err| err.to_string())
        };

        let elapsed = started.elapsed();
        let (status, error) = match outcome {
            Ok(_) if elapsed < self.config.degraded_threshold() => (HealthStatus::Healthy, None),
            Ok(_) => (HealthStatus::Degraded, None),
            Err(err) => (HealthStatus::Unhealthy, Some(err)),
        };

        let result = HealthCheckResult {
            backend: backend.name.clone(),
            url: backend.base_url.clone(),
            status,
            response_time_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
            error,
        };

        debug!(
            backend = %result.backend,
            status = %result.status,
            response_time_ms = result.response_time_ms,
            error = result.error.as_deref(),
            "🩺 Health probe finished"
        );

        result
    }

    /// Probe every backend concurrently and replace the snapshot
    pub async fn probe_all(&self) -> HashMap<String, HealthCheckResult> {
        let backends = self.registry.descriptors();
        let results = join_all(backends.iter().map(|backend| self.probe(backend))).await;

        self.summary.lock().record_tick(&results);

        let fresh: HashMap<String, HealthCheckResult> = results
            .into_iter()
            .map(|result| (result.backend.clone(), result))
            .collect();
        *self.snapshot.write() = fresh.clone();

        for result in fresh.values() {
            if result.status != HealthStatus::Healthy {
                log_backend_operation(
                    operations::HEALTH_PROBE,
                    &result.backend,
                    &result.status.to_string(),
                    Some(result.response_time_ms),
                    result.error.as_deref(),
                );
            }
        }

        fresh
    }

    /// Latest result per backend
    pub fn snapshot(&self) -> HashMap<String, HealthCheckResult> {
        self.snapshot.read().clone()
    }

    pub fn summary(&self) -> HealthSummary {
        self.summary.lock().clone()
    }

    /// Aggregated status, per-backend results in configuration order, and hints
    pub fn system_report(&self) -> SystemHealthReport {
        let snapshot = self.snapshot.read();
        let backends: Vec<HealthCheckResult> = self
            .registry
            .descriptors()
            .iter()
            .filter_map(|backend| snapshot.get(&backend.name).cloned())
            .collect();
        drop(snapshot);

        SystemHealthReport {
            overall_status: aggregate_status(&backends),
            recommendations: recommendations(&backends),
            backends,
            summary: self.summary(),
            circuit_breakers: self.registry.system_metrics(),
            generated_at: Utc::now(),
        }
    }

    /// Spawn the periodic probe loop; it exits when `shutdown` is cancelled
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let interval_duration = self.config.check_interval();

        info!(
            interval_ms = interval_duration.as_millis() as u64,
            backends = self.registry.len(),
            feed_circuit_breakers = self.config.feed_circuit_breakers,
            "Starting backend health monitor"
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_duration);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Backend health monitor stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let results = self.probe_all().await;
                        let overall = aggregate_status(&results.values().cloned().collect::<Vec<_>>());
                        if overall == HealthStatus::Unhealthy {
                            warn!(backends = results.len(), "🚨 All automation backends unhealthy");
                        }
                    }
                }
            }
        })
    }
}
