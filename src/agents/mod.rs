//! # Agent Layer
//!
//! Logical agents on top of the batch orchestrator: task decomposition,
//! least-recently-used assignment, decision history, and performance stats.

pub mod orchestrator;
pub mod types;

pub use orchestrator::AgentOrchestrator;
pub use types::{
    AgentDecision, AgentKind, AgentPerformance, AgentState, AgentStats, AgentStatus, AgentTask,
    AgentTaskKind, AgentTaskStatus, CoordinationReport,
};
