//! # Resilience Module
//!
//! Per-backend circuit breakers that stop the engine from hammering an
//! automation backend that is down, and let a single trial call decide when
//! it has recovered.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use autopromptr_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 3,
//!     cool_down: Duration::from_secs(30),
//!     max_cool_down: Duration::from_secs(1800),
//! };
//!
//! let circuit_breaker = CircuitBreaker::new("python".to_string(), config);
//!
//! let result = circuit_breaker.call(|| async {
//!     Ok::<&str, std::io::Error>("submitted")
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::CircuitBreakerConfig;
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
