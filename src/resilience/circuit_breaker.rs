//! # Circuit Breaker Implementation
//!
//! Per-backend fault isolation with three states: Closed (normal operation),
//! Open (failing fast), and GracePeriod (a single trial call decides recovery).
//!
//! All state lives behind one mutex so concurrent outcomes for the same
//! backend never lose updates. Open becomes GracePeriod lazily, the first
//! time the breaker is consulted after its cool-down elapsed.

use crate::models::CircuitBreakerState;
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Cool-down elapsed - exactly one trial call is allowed
    GracePeriod,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::GracePeriod => write!(f, "grace_period"),
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, Clone, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Normal,
    Trial,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_transition: DateTime<Utc>,
    opened_at: Option<Instant>,
    current_cool_down: Duration,
    trial_in_flight: bool,
    metrics: CircuitBreakerMetrics,
}

/// Core circuit breaker guarding one backend
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            cool_down_ms = config.cool_down.as_millis() as u64,
            max_cool_down_ms = config.max_cool_down.as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );

        let inner = BreakerInner {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_transition: Utc::now(),
            opened_at: None,
            current_cool_down: config.cool_down,
            trial_in_flight: false,
            metrics: CircuitBreakerMetrics::new(),
        };

        Self {
            name,
            config,
            inner: Mutex::new(inner),
        }
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, moving Open to GracePeriod if the cool-down has elapsed
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Point-in-time view for backend descriptors
    pub fn snapshot(&self) -> CircuitBreakerState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        CircuitBreakerState {
            status: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_transition: inner.last_transition,
        }
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        let mut snapshot = inner.metrics.clone();
        snapshot.current_state = inner.state;
        snapshot.consecutive_failures = inner.consecutive_failures;
        snapshot.current_cool_down = inner.current_cool_down;
        snapshot.with_derived_rates()
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// A rejected call never runs `operation`. Dropping the returned future
    /// before it resolves records a failure.
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.try_acquire() else {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        };

        let mut guard = CallGuard {
            breaker: self,
            permit,
            started: Instant::now(),
            settled: false,
        };

        let result = operation().await;
        guard.settle(result.is_ok());

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner
            .opened_at
            .map(|opened| opened.elapsed() >= inner.current_cool_down)
            .unwrap_or(true);
        if elapsed {
            inner.state = CircuitState::GracePeriod;
            inner.trial_in_flight = false;
            inner.last_transition = Utc::now();
            info!(
                component = %self.name,
                cool_down_ms = inner.current_cool_down.as_millis() as u64,
                "🟡 Circuit breaker grace period (awaiting trial call)"
            );
        }
    }

    fn try_acquire(&self) -> Option<Permit> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);

        let permit = match inner.state {
            CircuitState::Closed => Some(Permit::Normal),
            CircuitState::GracePeriod if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                debug!(component = %self.name, "🟡 Trial call permitted");
                Some(Permit::Trial)
            }
            CircuitState::GracePeriod | CircuitState::Open => None,
        };

        if permit.is_none() {
            inner.metrics.rejected_count += 1;
            debug!(
                component = %self.name,
                state = %inner.state,
                "⛔ Call short-circuited"
            );
        }

        permit
    }

    fn record_outcome(&self, permit: Permit, success: bool, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.total_duration += duration;

        if success {
            inner.metrics.success_count += 1;
            debug!(
                component = %self.name,
                duration_ms = duration.as_millis() as u64,
                "🟢 Operation succeeded"
            );
        } else {
            inner.metrics.failure_count += 1;
            warn!(
                component = %self.name,
                duration_ms = duration.as_millis() as u64,
                "🔴 Operation failed"
            );
        }

        match (permit, success) {
            (Permit::Trial, true) => self.transition_to_closed(&mut inner),
            (Permit::Trial, false) => {
                inner.consecutive_failures += 1;
                let next = self.config.escalate(inner.current_cool_down);
                inner.current_cool_down = next;
                self.transition_to_open(&mut inner);
            }
            (Permit::Normal, true) => {
                if inner.state == CircuitState::Closed {
                    inner.consecutive_failures = 0;
                }
            }
            (Permit::Normal, false) => {
                inner.consecutive_failures += 1;
                if inner.state == CircuitState::Closed
                    && inner.consecutive_failures >= self.config.failure_threshold
                {
                    self.transition_to_open(&mut inner);
                }
            }
        }
    }

    fn transition_to_closed(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        inner.current_cool_down = self.config.cool_down;
        inner.last_transition = Utc::now();

        info!(
            component = %self.name,
            total_calls = inner.metrics.total_calls,
            "🟢 Circuit breaker closed (recovered)"
        );
    }

    fn transition_to_open(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.trial_in_flight = false;
        inner.last_transition = Utc::now();

        error!(
            component = %self.name,
            consecutive_failures = inner.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            cool_down_ms = inner.current_cool_down.as_millis() as u64,
            "🔴 Circuit breaker opened (failing fast)"
        );
    }
}

/// Records the outcome of a permitted call; an unsettled drop counts as failure
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    permit: Permit,
    started: Instant,
    settled: bool,
}

impl CallGuard<'_> {
    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker
            .record_outcome(self.permit, success, self.started.elapsed());
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(component = %self.breaker.name, "Call cancelled before completion");
            self.breaker
                .record_outcome(self.permit, false, self.started.elapsed());
        }
    }
}
