//! # Circuit Breaker Manager
//!
//! One breaker per backend, created on first use and shared by every caller
//! that talks to that backend (prompt dispatch and health probes alike).

use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
    SystemCircuitBreakerMetrics,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Registry of circuit breakers keyed by backend name
#[derive(Debug, Clone)]
pub struct CircuitBreakerManager {
    circuit_breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        info!(
            failure_threshold = config.failure_threshold,
            "Initializing circuit breaker manager"
        );

        Self {
            circuit_breakers: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Get or create circuit breaker for a backend
    pub fn get_circuit_breaker(&self, component_name: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.circuit_breakers.read();
            if let Some(breaker) = breakers.get(component_name) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.circuit_breakers.write();

        // Double-check pattern (another thread might have created it)
        if let Some(breaker) = breakers.get(component_name) {
            return Arc::clone(breaker);
        }

        let breaker = Arc::new(CircuitBreaker::new(
            component_name.to_string(),
            self.config.clone(),
        ));
        breakers.insert(component_name.to_string(), Arc::clone(&breaker));

        info!(
            component = component_name,
            total_circuit_breakers = breakers.len(),
            "Created new circuit breaker"
        );

        breaker
    }

    /// Get all circuit breaker names
    pub fn list_components(&self) -> Vec<String> {
        let mut names: Vec<String> = self.circuit_breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get metrics for a specific circuit breaker
    pub fn component_metrics(&self, component_name: &str) -> Option<CircuitBreakerMetrics> {
        self.circuit_breakers
            .read()
            .get(component_name)
            .map(|breaker| breaker.metrics())
    }

    /// Get system-wide circuit breaker metrics
    pub fn system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();
        for (name, breaker) in self.circuit_breakers.read().iter() {
            system_metrics.add_circuit_breaker(name.clone(), breaker.metrics());
        }
        system_metrics
    }

    /// Get count of circuit breakers by state
    pub fn state_summary(&self) -> HashMap<CircuitState, usize> {
        self.system_metrics().count_by_state()
    }

    /// Check overall system health based on circuit breaker states
    pub fn system_health_score(&self) -> f64 {
        self.system_metrics().health_score()
    }
}
