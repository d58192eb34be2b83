//! Backend descriptors and breaker snapshots.

use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Specialization tag used to match platforms to backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSpecialization {
    /// Smarter waiting for chat UIs
    Python,
    /// Generic DOM / vision detection
    Nodejs,
    General,
}

impl fmt::Display for BackendSpecialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Nodejs => write!(f, "nodejs"),
            Self::General => write!(f, "general"),
        }
    }
}

/// Static backend entry from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub url: String,
    pub specialization: BackendSpecialization,
}

/// Point-in-time view of a circuit breaker, owned by the breaker itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub status: CircuitState,
    pub consecutive_failures: u32,
    pub last_transition: DateTime<Utc>,
}

impl CircuitBreakerState {
    pub fn closed() -> Self {
        Self {
            status: CircuitState::Closed,
            consecutive_failures: 0,
            last_transition: Utc::now(),
        }
    }
}

/// A backend plus the current state of its breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub name: String,
    pub base_url: String,
    pub specialization: BackendSpecialization,
    pub circuit: CircuitBreakerState,
}

impl BackendDescriptor {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        specialization: BackendSpecialization,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            specialization,
            circuit: CircuitBreakerState::closed(),
        }
    }

    /// Join a route onto the base URL without doubling slashes
    pub fn endpoint(&self, route: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), route)
    }
}

impl From<&BackendConfig> for BackendDescriptor {
    fn from(config: &BackendConfig) -> Self {
        Self::new(config.name.clone(), config.url.clone(), config.specialization)
    }
}
