//! # System Constants
//!
//! Names, defaults, and fixed strings that define the operational boundaries
//! of the batch automation engine.

// Re-export state types for convenience
pub use crate::state_machine::BatchStatus;

/// Names of the two automation backends the engine ships configured for
pub mod backend_names {
    pub const PYTHON: &str = "python";
    pub const NODEJS: &str = "nodejs";
}

/// HTTP routes of the backend contract
pub mod routes {
    pub const HEALTH: &str = "/health";
    pub const BROWSER_LAUNCH: &str = "/browser/launch";
    pub const PROMPT_SUBMIT: &str = "/prompt/submit";
    pub const PLATFORM_DETECT: &str = "/platform/detect";
}

/// Batch lifecycle operation names used in structured logs
pub mod operations {
    pub const RUN_BATCH: &str = "run_batch";
    pub const STOP_BATCH: &str = "stop_batch";
    pub const PAUSE_BATCH: &str = "pause_batch";
    pub const RESUME_BATCH: &str = "resume_batch";
    pub const SAVE_BATCH: &str = "save_batch";
    pub const APPEND_RESULT: &str = "append_prompt_result";
    pub const CLEAR_RESULTS: &str = "clear_prompt_results";
    pub const SUBMIT_PROMPT: &str = "submit_prompt";
    pub const LAUNCH_BROWSER: &str = "launch_browser";
    pub const HEALTH_PROBE: &str = "health_probe";
}

pub mod defaults {
    pub const PYTHON_BACKEND_URL: &str = "http://localhost:5000";
    pub const NODEJS_BACKEND_URL: &str = "http://localhost:3000";
    pub const MAX_QUEUE_CONCURRENCY: usize = 64;
    pub const MAX_PROMPT_RETRIES: u32 = 3;
    pub const AUTOMATION_DELAY_MS: u64 = 2_000;
    pub const ELEMENT_TIMEOUT_MS: u64 = 10_000;
    /// Live trackers kept for status polling; older batches fall back to the store
    pub const MAX_RETAINED_TRACKERS: usize = 32;
}

/// Error strings recorded on prompt results
pub mod messages {
    pub const CANCELLED: &str = "cancelled";
    pub const ABORTED_NO_BACKEND: &str = "aborted: no automation backend available";
    pub const CIRCUIT_OPEN: &str = "circuit open";
}
