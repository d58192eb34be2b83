//! # Automation Errors
//!
//! Crate-level error taxonomy for the batch automation engine. Module errors
//! (client, store, state machine, configuration) convert into [`AutomationError`]
//! so orchestration code can propagate everything with `?`.
//!
//! The classification helpers mirror how failures are handled at runtime:
//! - transient per-attempt failures are retried by the task queue
//! - backend unavailability and persistence failures abort the whole batch
//! - concurrency violations are rejected synchronously at call time

use crate::client::ClientError;
use crate::config::ConfigurationError;
use crate::persistence::StoreError;
use crate::platform::PlatformId;
use crate::state_machine::StateMachineError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AutomationError {
    /// Batch failed validation before any work started
    #[error("Batch validation failed: {reason}")]
    Validation { reason: String },

    /// Another batch currently holds the run slot
    #[error("Batch '{running_batch_id}' is already running")]
    BatchAlreadyRunning { running_batch_id: String },

    /// Stop/pause/resume addressed a batch that is not the active run
    #[error("Batch '{batch_id}' is not running")]
    BatchNotRunning { batch_id: String },

    /// Every backend is excluded by its circuit breaker
    #[error("No automation backend available for platform '{platform}'")]
    NoBackendAvailable { platform: PlatformId },

    /// A single backend call failed (network, status, timeout, decode)
    #[error("Backend '{backend}' call failed: {source}")]
    Backend {
        backend: String,
        #[source]
        source: ClientError,
    },

    /// The backend's breaker short-circuited the attempt
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Save/verify against the store failed after its retry
    #[error("Persistence failure during {operation}: {source}")]
    Persistence {
        operation: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    StateTransition(#[from] StateMachineError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Prompt attempt pre-empted by a stop request
    #[error("cancelled")]
    Cancelled,
}

impl AutomationError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn persistence(operation: impl Into<String>, source: StoreError) -> Self {
        Self::Persistence {
            operation: operation.into(),
            source,
        }
    }

    /// Transient per-attempt failure that the task queue should retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::CircuitOpen { .. })
    }

    /// Failure that aborts the whole batch instead of a single prompt
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoBackendAvailable { .. } | Self::Persistence { .. }
        )
    }
}

impl From<ConfigurationError> for AutomationError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type AutomationResult<T> = std::result::Result<T, AutomationError>;
