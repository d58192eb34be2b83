//! Agent pool data types.

use crate::state_machine::BatchStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Delivers prompts through the automation backends
    Browser,
    /// Coordinates a batch and produces its report
    Orchestrator,
}

/// `idle → busy → active`: busy while executing a task, active while
/// supervising a running batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
    Active,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Busy => write!(f, "busy"),
            Self::Active => write!(f, "active"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformance {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    /// Percentage of finished tasks that succeeded
    pub success_rate: f64,
    pub average_task_time_ms: f64,
}

impl AgentPerformance {
    pub fn record(&mut self, success: bool, duration_ms: u64) {
        if success {
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }
        let finished = self.finished();
        self.success_rate = self.tasks_completed as f64 / finished as f64 * 100.0;
        self.average_task_time_ms +=
            (duration_ms as f64 - self.average_task_time_ms) / finished as f64;
    }

    pub fn finished(&self) -> u64 {
        self.tasks_completed + self.tasks_failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    pub id: String,
    pub kind: AgentKind,
    pub status: AgentStatus,
    pub current_task: Option<String>,
    pub performance: AgentPerformance,
    pub last_activity: DateTime<Utc>,
}

impl AgentState {
    pub fn new(id: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: AgentStatus::Idle,
            current_task: None,
            performance: AgentPerformance::default(),
            last_activity: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentTaskKind {
    /// Deliver one prompt
    Submit,
    /// Summarize a batch once its submit tasks are done
    Coordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentTaskStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl AgentTaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTask {
    pub id: String,
    pub kind: AgentTaskKind,
    pub batch_id: String,
    pub prompt_id: Option<String>,
    pub assigned_agent: Option<String>,
    pub status: AgentTaskStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    pub fn submit(batch_id: &str, prompt_id: &str) -> Self {
        Self::new(
            format!("submit-{batch_id}-{prompt_id}"),
            AgentTaskKind::Submit,
            batch_id,
            Some(prompt_id.to_string()),
        )
    }

    pub fn coordinate(batch_id: &str) -> Self {
        Self::new(
            format!("coordinate-{batch_id}"),
            AgentTaskKind::Coordinate,
            batch_id,
            None,
        )
    }

    fn new(id: String, kind: AgentTaskKind, batch_id: &str, prompt_id: Option<String>) -> Self {
        Self {
            id,
            kind,
            batch_id: batch_id.to_string(),
            prompt_id,
            assigned_agent: None,
            status: AgentTaskStatus::Pending,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Why a task went to a given agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDecision {
    pub id: Uuid,
    pub agent_id: Option<String>,
    pub task_id: String,
    pub decision: String,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationReport {
    pub batch_id: String,
    pub batch_status: BatchStatus,
    /// Submit tasks only
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cancelled_tasks: usize,
    pub success_rate: f64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    pub total_agents: usize,
    pub idle_agents: usize,
    pub busy_agents: usize,
    pub active_agents: usize,
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub decisions: usize,
    pub average_success_rate: f64,
}
