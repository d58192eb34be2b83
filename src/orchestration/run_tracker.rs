//! Live bookkeeping for one batch run: terminal results, prompts in flight,
//! and a bounded tail of run log lines for status reports.

use super::task_queue::QueueEvent;
use crate::models::{BatchProgress, PromptResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Default)]
struct TrackerState {
    results: Vec<PromptResult>,
    in_flight: HashSet<String>,
    logs: VecDeque<RunLogEntry>,
}

#[derive(Debug)]
pub struct RunTracker {
    batch_id: String,
    total: usize,
    log_limit: usize,
    state: Mutex<TrackerState>,
}

impl RunTracker {
    pub fn new(batch_id: impl Into<String>, total: usize, log_limit: usize) -> Self {
        Self {
            batch_id: batch_id.into(),
            total,
            log_limit: log_limit.max(1),
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let mut state = self.state.lock();
        if state.logs.len() == self.log_limit {
            state.logs.pop_front();
        }
        state.logs.push_back(RunLogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        });
    }

    /// Fold a queue event into the tracked state
    pub fn observe(&self, event: &QueueEvent) {
        match event {
            QueueEvent::Started { prompt_id } => {
                self.state.lock().in_flight.insert(prompt_id.clone());
                self.log(LogLevel::Info, format!("Processing prompt {prompt_id}"));
            }
            QueueEvent::Retrying {
                prompt_id,
                attempt,
                delay,
                error,
            } => self.log(
                LogLevel::Warn,
                format!(
                    "Prompt {prompt_id} attempt {attempt} failed: {error}; retrying in {}ms",
                    delay.as_millis()
                ),
            ),
            QueueEvent::Finished { result, .. } => self.record_result(result.clone()),
        }
    }

    /// Record a terminal result that did not come through the queue
    pub fn record_result(&self, result: PromptResult) {
        let (level, message) = if result.success {
            (
                LogLevel::Info,
                format!(
                    "Prompt {} completed in {}ms",
                    result.prompt_id, result.processing_time_ms
                ),
            )
        } else {
            (
                LogLevel::Error,
                format!(
                    "Prompt {} failed: {}",
                    result.prompt_id,
                    result.error.as_deref().unwrap_or("unknown error")
                ),
            )
        };
        {
            let mut state = self.state.lock();
            state.in_flight.remove(&result.prompt_id);
            state.results.push(result);
        }
        self.log(level, message);
    }

    pub fn progress(&self) -> BatchProgress {
        let state = self.state.lock();
        BatchProgress::from_results(self.total, &state.results, state.in_flight.len())
    }

    pub fn results(&self) -> Vec<PromptResult> {
        self.state.lock().results.clone()
    }

    pub fn recent_logs(&self) -> Vec<RunLogEntry> {
        self.state.lock().logs.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_progress_follows_events() {
        let tracker = RunTracker::new("b1", 3, 20);
        tracker.observe(&QueueEvent::Started {
            prompt_id: "p1".to_string(),
        });
        tracker.observe(&QueueEvent::Started {
            prompt_id: "p2".to_string(),
        });

        let progress = tracker.progress();
        assert_eq!(progress.processing, 2);
        assert_eq!(progress.pending, 1);

        tracker.observe(&QueueEvent::Finished {
            result: PromptResult::succeeded("p1", json!({}), 5, 1),
            completed: 1,
            total: 3,
        });
        let progress = tracker.progress();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.processing, 1);
        assert_eq!(progress.pending, 1);
    }

    #[test]
    fn test_log_tail_is_bounded() {
        let tracker = RunTracker::new("b1", 1, 3);
        for i in 0..5 {
            tracker.log(LogLevel::Info, format!("line {i}"));
        }
        let logs: Vec<_> = tracker
            .recent_logs()
            .into_iter()
            .map(|entry| entry.message)
            .collect();
        assert_eq!(logs, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_retry_and_failure_lines() {
        let tracker = RunTracker::new("b1", 1, 10);
        tracker.observe(&QueueEvent::Retrying {
            prompt_id: "p1".to_string(),
            attempt: 1,
            delay: Duration::from_millis(1000),
            error: "HTTP 500".to_string(),
        });
        tracker.record_result(PromptResult::failed("p1", "HTTP 500", 10, 2));

        let logs = tracker.recent_logs();
        assert_eq!(logs[0].level, LogLevel::Warn);
        assert!(logs[0].message.contains("retrying in 1000ms"));
        assert_eq!(logs[1].level, LogLevel::Error);
        assert_eq!(tracker.progress().failed, 1);
    }
}
