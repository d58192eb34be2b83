//! # Orchestration Layer
//!
//! Drives batches of prompts through the automation backends.
//!
//! ## Components
//!
//! - [`BatchOrchestrator`]: run lifecycle, single run slot, persistence policy,
//!   stop/pause/resume, status reports
//! - [`TaskQueue`]: bounded-concurrency fan-out with per-prompt retries
//! - [`PromptDispatcher`]: per-attempt backend selection, sessions, breaker calls
//! - [`BackoffPolicy`]: exponential retry delays
//! - [`RunTracker`]: live progress and recent log lines

pub mod backoff;
pub mod batch_orchestrator;
pub mod dispatcher;
pub mod run_tracker;
pub mod task_queue;

pub use backoff::BackoffPolicy;
pub use batch_orchestrator::{
    BatchOrchestrator, BatchStatusReport, RunObserver, RunOptions, RunSummary,
};
pub use dispatcher::{LaunchSettings, PromptDispatcher};
pub use run_tracker::{LogLevel, RunLogEntry, RunTracker};
pub use task_queue::{
    PromptWorker, QueueControl, QueueEvent, QueueOutcome, QueueTermination, TaskQueue,
    TaskQueueConfig,
};
