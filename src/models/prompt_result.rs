//! # Prompt Results and Progress
//!
//! [`PromptResult`] is the terminal outcome of one prompt's attempt sequence
//! within a run. [`BatchProgress`] is always derived from a result set and is
//! never stored on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal outcome for one prompt, produced exactly once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResult {
    pub prompt_id: String,
    pub success: bool,
    /// Raw payload returned by the backend's `/prompt/submit`
    pub result: Option<Value>,
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub processing_time_ms: u64,
    /// Attempts made, including the final one
    pub attempts: u32,
}

impl PromptResult {
    pub fn succeeded(
        prompt_id: impl Into<String>,
        result: Value,
        processing_time_ms: u64,
        attempts: u32,
    ) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            success: true,
            result: Some(result),
            error: None,
            processed_at: Utc::now(),
            processing_time_ms,
            attempts,
        }
    }

    pub fn failed(
        prompt_id: impl Into<String>,
        error: impl Into<String>,
        processing_time_ms: u64,
        attempts: u32,
    ) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            success: false,
            result: None,
            error: Some(error.into()),
            processed_at: Utc::now(),
            processing_time_ms,
            attempts,
        }
    }
}

/// Progress counters for a batch; `completed` counts successes only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub processing: usize,
    pub pending: usize,
}

impl BatchProgress {
    /// Derive counters from a result set plus the number of prompts in flight
    pub fn from_results(total: usize, results: &[PromptResult], processing: usize) -> Self {
        let completed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - completed;
        let processing = processing.min(total.saturating_sub(results.len()));
        Self {
            total,
            completed,
            failed,
            processing,
            pending: total.saturating_sub(completed + failed + processing),
        }
    }

    /// Prompts with a terminal result
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.finished() as f64 / self.total as f64) * 100.0
    }
}
