//! # Circuit Breaker Configuration
//!
//! Per-breaker thresholds. System-wide values come from
//! [`crate::config::CircuitBreakerSettings`], converted with `to_resilience_config`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time to wait in open state before allowing a trial call
    pub cool_down: Duration,

    /// Upper bound for the cool-down after repeated failed trials
    pub max_cool_down: Duration,
}

impl CircuitBreakerConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.cool_down.is_zero() {
            return Err("cool_down must be greater than 0".to_string());
        }

        if self.max_cool_down < self.cool_down {
            return Err("max_cool_down must be at least cool_down".to_string());
        }

        if self.max_cool_down > Duration::from_secs(24 * 60 * 60) {
            return Err("max_cool_down should not exceed 24 hours".to_string());
        }

        Ok(())
    }

    /// Cool-down to use after a failed trial call
    pub fn escalate(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_cool_down)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cool_down: Duration::from_secs(30),
            max_cool_down: Duration::from_secs(30 * 60),
        }
    }
}
