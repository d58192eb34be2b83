//! # Data Model
//!
//! Batches, prompts, results, and backend descriptors shared across the engine.

pub mod backend;
pub mod batch;
pub mod prompt_result;

pub use backend::{BackendConfig, BackendDescriptor, BackendSpecialization, CircuitBreakerState};
pub use batch::{Batch, BatchSettings, DebugLevel, LocalAiAssistant, TextPrompt};
pub use prompt_result::{BatchProgress, PromptResult};
