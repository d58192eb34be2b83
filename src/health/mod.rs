//! # Health Module
//!
//! Live picture of every configured automation backend.
//!
//! ```text
//!   ┌──────────────────────┐
//!   │ BackendHealthMonitor │ (background task, fixed interval)
//!   │  - GET /health × N   │──── probes through ───▶ CircuitBreaker (per backend)
//!   └──────────┬───────────┘
//!              │ replaces snapshot
//!              ▼
//!   ┌──────────────────────┐
//!   │ snapshot + summary   │──▶ system_report() ──▶ overall status + recommendations
//!   └──────────────────────┘
//! ```

pub mod monitor;
pub mod types;

pub use monitor::BackendHealthMonitor;
pub use types::{
    aggregate_status, recommendations, HealthCheckResult, HealthStatus, HealthSummary,
    SystemHealthReport,
};
