//! # AutoPromptr Configuration System
//!
//! Typed configuration for the automation engine. Every section has defaults so
//! an empty configuration is a working local development setup; files and
//! environment variables layer on top (see [`ConfigManager`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use autopromptr_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let threshold = manager.config().circuit_breakers.failure_threshold;
//! let concurrency = manager.config().queue.max_concurrency;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{backend_names, defaults};
use crate::models::{BackendConfig, BackendSpecialization};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Automation backends in preference order
    pub backends: Vec<BackendConfig>,

    /// Health probing of backends
    pub health: HealthConfig,

    /// Per-backend circuit breaker thresholds
    pub circuit_breakers: CircuitBreakerSettings,

    /// Bounded-concurrency prompt runner
    pub queue: QueueConfig,

    /// Batch run behaviour
    pub orchestration: OrchestrationConfig,

    /// Agent pool layered over batch runs
    pub agents: AgentsConfig,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            backends: vec![
                BackendConfig {
                    name: backend_names::PYTHON.to_string(),
                    url: defaults::PYTHON_BACKEND_URL.to_string(),
                    specialization: BackendSpecialization::Python,
                },
                BackendConfig {
                    name: backend_names::NODEJS.to_string(),
                    url: defaults::NODEJS_BACKEND_URL.to_string(),
                    specialization: BackendSpecialization::Nodejs,
                },
            ],
            health: HealthConfig::default(),
            circuit_breakers: CircuitBreakerSettings::default(),
            queue: QueueConfig::default(),
            orchestration: OrchestrationConfig::default(),
            agents: AgentsConfig::default(),
        }
    }
}

/// Health monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Hard timeout for a single `/health` probe
    pub probe_timeout_ms: u64,
    /// Responses slower than this are classified degraded
    pub degraded_threshold_ms: u64,
    /// Interval between monitor ticks
    pub check_interval_ms: u64,
    /// Route probes through the backend's circuit breaker
    pub feed_circuit_breakers: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 8_000,
            degraded_threshold_ms: 3_000,
            check_interval_ms: 30_000,
            feed_circuit_breakers: true,
        }
    }
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn degraded_threshold(&self) -> Duration {
        Duration::from_millis(self.degraded_threshold_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

/// Circuit breaker thresholds applied to every backend
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// Initial open-state cool-down
    pub cool_down_ms: u64,
    /// Ceiling for the doubling cool-down after failed trial calls
    pub max_cool_down_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cool_down_ms: 30_000,
            max_cool_down_ms: 1_800_000,
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cool_down: Duration::from_millis(self.cool_down_ms),
            max_cool_down: Duration::from_millis(self.max_cool_down_ms),
        }
    }
}

/// Task queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum prompts in flight at once
    pub max_concurrency: usize,
    /// First retry delay; doubles per attempt
    pub backoff_base_ms: u64,
    /// Retry delay ceiling
    pub max_backoff_ms: u64,
    /// Timeout for one prompt attempt (session launch plus submit)
    pub prompt_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            backoff_base_ms: 1_000,
            max_backoff_ms: 60_000,
            prompt_timeout_ms: 120_000,
        }
    }
}

impl QueueConfig {
    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_millis(self.prompt_timeout_ms)
    }
}

/// Batch orchestration configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub max_prompts_per_batch: usize,
    /// Number of log lines kept for status reports
    pub recent_log_limit: usize,
    /// Ask the backend's `/platform/detect` when the local router only finds generic-web
    pub remote_platform_detection: bool,
    pub browser_type: String,
    pub headless: bool,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_prompts_per_batch: 50,
            recent_log_limit: 20,
            remote_platform_detection: false,
            browser_type: "chromium".to_string(),
            headless: true,
        }
    }
}

/// Agent pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub browser_agents: usize,
    pub decision_history_limit: usize,
    /// Finished tasks of earlier batches are dropped oldest-first beyond this
    pub task_history_limit: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            browser_agents: 2,
            decision_history_limit: 200,
            task_history_limit: 500,
        }
    }
}

impl AutomationConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.backends.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "backends",
                "automation configuration",
            ));
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.name.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "backends[].name",
                    "backend configuration",
                ));
            }
            if !seen.insert(backend.name.as_str()) {
                return Err(ConfigurationError::invalid_value(
                    "backends[].name",
                    backend.name.clone(),
                    "backend names must be unique",
                ));
            }
            match url::Url::parse(&backend.url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => {
                    return Err(ConfigurationError::invalid_value(
                        format!("backends.{}.url", backend.name),
                        backend.url.clone(),
                        "must be an absolute http(s) URL",
                    ))
                }
            }
        }

        if self.health.degraded_threshold_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "health.degraded_threshold_ms",
                "0",
                "threshold must be greater than 0",
            ));
        }

        if self.health.probe_timeout_ms <= self.health.degraded_threshold_ms {
            return Err(ConfigurationError::invalid_value(
                "health.probe_timeout_ms",
                self.health.probe_timeout_ms.to_string(),
                "probe timeout must exceed degraded_threshold_ms",
            ));
        }

        if self.health.check_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "health.check_interval_ms",
                "0",
                "interval must be greater than 0",
            ));
        }

        self.circuit_breakers
            .to_resilience_config()
            .validate()
            .map_err(|reason| {
                ConfigurationError::invalid_value(
                    "circuit_breakers",
                    format!("{:?}", self.circuit_breakers),
                    reason,
                )
            })?;

        if !(1..=defaults::MAX_QUEUE_CONCURRENCY).contains(&self.queue.max_concurrency) {
            return Err(ConfigurationError::invalid_value(
                "queue.max_concurrency",
                self.queue.max_concurrency.to_string(),
                format!(
                    "concurrency must be between 1 and {}",
                    defaults::MAX_QUEUE_CONCURRENCY
                ),
            ));
        }

        if self.queue.max_backoff_ms < self.queue.backoff_base_ms {
            return Err(ConfigurationError::invalid_value(
                "queue.max_backoff_ms",
                self.queue.max_backoff_ms.to_string(),
                "max backoff must be at least backoff_base_ms",
            ));
        }

        if self.queue.prompt_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.prompt_timeout_ms",
                "0",
                "timeout must be greater than 0",
            ));
        }

        if self.orchestration.max_prompts_per_batch == 0 {
            return Err(ConfigurationError::invalid_value(
                "orchestration.max_prompts_per_batch",
                "0",
                "batches must allow at least one prompt",
            ));
        }

        if self.agents.browser_agents == 0 {
            return Err(ConfigurationError::invalid_value(
                "agents.browser_agents",
                "0",
                "at least one browser agent is required",
            ));
        }

        Ok(())
    }
}
