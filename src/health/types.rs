//! # Health Status Types
//!
//! Per-backend probe results and the aggregated system report.

use crate::resilience::SystemCircuitBreakerMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Reachable but slower than the degraded threshold
    Degraded,
    /// Non-2xx, network error, timeout, or breaker open
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Latest probe outcome for one backend; replaced on every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub backend: String,
    pub url: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

/// Cumulative probe counts across ticks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub ticks: u64,
    pub total_probes: u64,
    pub healthy: u64,
    pub degraded: u64,
    pub unhealthy: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl HealthSummary {
    pub fn record_tick<'a>(&mut self, results: impl IntoIterator<Item = &'a HealthCheckResult>) {
        self.ticks += 1;
        self.last_tick_at = Some(Utc::now());
        for result in results {
            self.total_probes += 1;
            match result.status {
                HealthStatus::Healthy => self.healthy += 1,
                HealthStatus::Degraded => self.degraded += 1,
                HealthStatus::Unhealthy => self.unhealthy += 1,
            }
        }
    }
}

/// Aggregated view handed to status pages and the `backend-health` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealthReport {
    pub overall_status: HealthStatus,
    pub backends: Vec<HealthCheckResult>,
    pub summary: HealthSummary,
    pub recommendations: Vec<String>,
    pub circuit_breakers: SystemCircuitBreakerMetrics,
    pub generated_at: DateTime<Utc>,
}

/// Healthy if any backend is healthy, else degraded if any is degraded
pub fn aggregate_status(results: &[HealthCheckResult]) -> HealthStatus {
    if results.iter().any(|r| r.status == HealthStatus::Healthy) {
        HealthStatus::Healthy
    } else if results.iter().any(|r| r.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

/// Operator hints derived purely from classification counts
pub fn recommendations(results: &[HealthCheckResult]) -> Vec<String> {
    if results.is_empty() {
        return vec!["No health checks have completed yet".to_string()];
    }

    let down = results
        .iter()
        .filter(|r| r.status == HealthStatus::Unhealthy)
        .count();
    let slow = results
        .iter()
        .filter(|r| r.status == HealthStatus::Degraded)
        .count();

    let mut hints = Vec::new();
    if down == results.len() {
        hints.push("CRITICAL: All backends are unavailable".to_string());
    }
    if down > 0 {
        hints.push(format!("{down} backend(s) are down"));
    }
    if slow > 0 {
        hints.push(format!("{slow} backend(s) experiencing slow response times"));
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, status: HealthStatus) -> HealthCheckResult {
        HealthCheckResult {
            backend: name.to_string(),
            url: format!("http://{name}"),
            status,
            response_time_ms: 10,
            timestamp: Utc::now(),
            error: None,
        }
    }

    #[test]
    fn test_aggregate_status() {
        use HealthStatus::*;
        assert_eq!(
            aggregate_status(&[result("a", Unhealthy), result("b", Healthy)]),
            Healthy
        );
        assert_eq!(
            aggregate_status(&[result("a", Unhealthy), result("b", Degraded)]),
            Degraded
        );
        assert_eq!(
            aggregate_status(&[result("a", Unhealthy), result("b", Unhealthy)]),
            Unhealthy
        );
        assert_eq!(aggregate_status(&[]), Unhealthy);
    }

    #[test]
    fn test_recommendations() {
        use HealthStatus::*;
        let hints = recommendations(&[result("a", Unhealthy), result("b", Degraded)]);
        assert_eq!(
            hints,
            vec![
                "1 backend(s) are down".to_string(),
                "1 backend(s) experiencing slow response times".to_string()
            ]
        );

        let hints = recommendations(&[result("a", Unhealthy), result("b", Unhealthy)]);
        assert_eq!(hints[0], "CRITICAL: All backends are unavailable");
        assert_eq!(hints[1], "2 backend(s) are down");

        assert!(recommendations(&[result("a", Healthy)]).is_empty());
    }

    #[test]
    fn test_summary_accumulates() {
        use HealthStatus::*;
        let mut summary = HealthSummary::default();
        summary.record_tick(&[result("a", Healthy), result("b", Unhealthy)]);
        summary.record_tick(&[result("a", Degraded), result("b", Unhealthy)]);
        assert_eq!(summary.ticks, 2);
        assert_eq!(summary.total_probes, 4);
        assert_eq!(summary.unhealthy, 2);
        assert_eq!(summary.healthy, 1);
        assert_eq!(summary.degraded, 1);
    }
}
