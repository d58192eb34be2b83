use crate::config::AutomationConfig;
use crate::models::{BackendConfig, BackendDescriptor};
use crate::resilience::{CircuitBreaker, CircuitBreakerManager, SystemCircuitBreakerMetrics};
use std::sync::Arc;

/// Configured backends plus the breaker guarding each one.
///
/// Descriptors are snapshots: the circuit state they carry is read from the
/// breaker at the moment [`descriptors`](Self::descriptors) is called.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    backends: Arc<Vec<BackendConfig>>,
    breakers: CircuitBreakerManager,
}

impl BackendRegistry {
    pub fn new(backends: Vec<BackendConfig>, breakers: CircuitBreakerManager) -> Self {
        // Create breakers eagerly so reports list every backend from the start
        for backend in &backends {
            breakers.get_circuit_breaker(&backend.name);
        }
        Self {
            backends: Arc::new(backends),
            breakers,
        }
    }

    pub fn from_config(config: &AutomationConfig) -> Self {
        Self::new(
            config.backends.clone(),
            CircuitBreakerManager::new(config.circuit_breakers.to_resilience_config()),
        )
    }

    /// Backends in configuration order with their current breaker state
    pub fn descriptors(&self) -> Vec<BackendDescriptor> {
        self.backends
            .iter()
            .map(|config| {
                let mut descriptor = BackendDescriptor::from(config);
                descriptor.circuit = self.breaker(&config.name).snapshot();
                descriptor
            })
            .collect()
    }

    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers.get_circuit_breaker(name)
    }

    pub fn breaker_manager(&self) -> &CircuitBreakerManager {
        &self.breakers
    }

    pub fn system_metrics(&self) -> SystemCircuitBreakerMetrics {
        self.breakers.system_metrics()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
