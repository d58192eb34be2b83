#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # AutoPromptr Core
//!
//! Batch prompt automation engine. Takes a batch of text prompts aimed at a
//! chat-style web application and delivers each one through a pool of
//! browser-automation backends, with health monitoring, per-backend circuit
//! breaking, bounded-concurrency retries, and persisted progress.
//!
//! ## Architecture
//!
//! ```text
//!   AgentOrchestrator ──▶ BatchOrchestrator ──▶ TaskQueue ──▶ PromptDispatcher
//!                              │                                  │
//!                              ▼                                  ▼
//!                         BatchStore                BackendSelector + CircuitBreaker
//!                                                                 │
//!   BackendHealthMonitor ─────────── probes ──────────────▶ BackendClient
//! ```
//!
//! ## Module Organization
//!
//! - [`platform`] - Target platform detection from URLs
//! - [`health`] - Background backend probing and system health reports
//! - [`resilience`] - Per-backend circuit breakers
//! - [`services`] - Backend registry and selection
//! - [`orchestration`] - Batch lifecycle, task queue, prompt dispatch
//! - [`agents`] - Logical agent pool layered on the batch orchestrator
//! - [`persistence`] - Batch and prompt-result storage
//! - [`state_machine`] - Batch status transitions
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use autopromptr_core::client::HttpBackendClient;
//! use autopromptr_core::config::ConfigManager;
//! use autopromptr_core::models::{Batch, TextPrompt};
//! use autopromptr_core::orchestration::BatchOrchestrator;
//! use autopromptr_core::persistence::InMemoryBatchStore;
//! use autopromptr_core::services::BackendRegistry;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config().clone();
//! let client = HttpBackendClient::new(config.queue.prompt_timeout())?;
//! let registry = BackendRegistry::from_config(&config);
//! let orchestrator = BatchOrchestrator::new(
//!     config,
//!     Arc::new(client),
//!     registry,
//!     Arc::new(InMemoryBatchStore::new()),
//! );
//!
//! let batch = Batch::new(
//!     "batch-1",
//!     "Release notes",
//!     "https://claude.ai/new",
//!     vec![TextPrompt::new("p1", "Summarize the changelog", 1)],
//! );
//! let summary = orchestrator.run_batch(batch, None).await?;
//! println!("{} finished as {}", summary.batch_id, summary.status);
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod health;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod platform;
pub mod resilience;
pub mod services;
pub mod state_machine;
pub mod test_helpers;

pub use agents::{AgentOrchestrator, CoordinationReport};
pub use client::{BackendClient, ClientError, HttpBackendClient};
pub use config::{AutomationConfig, ConfigManager};
pub use error::{AutomationError, AutomationResult};
pub use health::{BackendHealthMonitor, HealthStatus, SystemHealthReport};
pub use models::{Batch, BatchProgress, BatchSettings, PromptResult, TextPrompt};
pub use orchestration::{BatchOrchestrator, RunSummary, TaskQueue};
pub use persistence::{BatchStore, InMemoryBatchStore};
pub use platform::{detect_platform, PlatformId};
pub use resilience::{CircuitBreaker, CircuitState};
pub use services::{BackendRegistry, BackendSelector};
pub use state_machine::{BatchEvent, BatchStatus};
