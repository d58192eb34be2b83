//! # Agent Orchestrator
//!
//! A pool of logical agents layered on [`BatchOrchestrator`]. A batch is
//! decomposed into one submit task per prompt plus a coordinate task. Submit
//! tasks are handed to the least-recently-used idle browser agent as the queue
//! starts each prompt; the coordinate task runs on the orchestrator agent once
//! the batch reaches a terminal status and produces a [`CoordinationReport`].
//!
//! Queue concurrency is pinned to the number of browser agents, so an idle
//! agent is always available when a prompt starts.

use super::types::{
    AgentDecision, AgentKind, AgentState, AgentStats, AgentStatus, AgentTask, AgentTaskKind,
    AgentTaskStatus, CoordinationReport,
};
use crate::config::AgentsConfig;
use crate::error::{AutomationError, AutomationResult};
use crate::models::{Batch, BatchProgress, PromptResult};
use crate::orchestration::{BatchOrchestrator, RunObserver, RunOptions};
use crate::platform::PlatformId;
use crate::state_machine::BatchStatus;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

const ORCHESTRATOR_AGENT_ID: &str = "orchestrator-001";

#[derive(Debug)]
struct AgentPool {
    agents: Vec<AgentState>,
    tasks: Vec<AgentTask>,
    decisions: VecDeque<AgentDecision>,
    decision_limit: usize,
    task_limit: usize,
    current_batch: Option<String>,
}

impl AgentPool {
    fn new(config: &AgentsConfig) -> Self {
        let mut agents: Vec<AgentState> = (1..=config.browser_agents.max(1))
            .map(|n| AgentState::new(format!("browser-agent-{n:03}"), AgentKind::Browser))
            .collect();
        agents.push(AgentState::new(ORCHESTRATOR_AGENT_ID, AgentKind::Orchestrator));

        Self {
            agents,
            tasks: Vec::new(),
            decisions: VecDeque::new(),
            decision_limit: config.decision_history_limit.max(1),
            task_limit: config.task_history_limit.max(1),
            current_batch: None,
        }
    }

    fn agent_mut(&mut self, agent_id: &str) -> Option<&mut AgentState> {
        self.agents.iter_mut().find(|agent| agent.id == agent_id)
    }

    fn task_mut(&mut self, task_id: &str) -> Option<&mut AgentTask> {
        self.tasks.iter_mut().find(|task| task.id == task_id)
    }

    fn decide(
        &mut self,
        agent_id: Option<&str>,
        task_id: &str,
        decision: String,
        reasoning: &str,
    ) {
        debug!(agent = agent_id, task = %task_id, decision = %decision, "🧠 Agent decision");
        if self.decisions.len() == self.decision_limit {
            self.decisions.pop_front();
        }
        self.decisions.push_back(AgentDecision {
            id: Uuid::new_v4(),
            agent_id: agent_id.map(str::to_string),
            task_id: task_id.to_string(),
            decision,
            reasoning: reasoning.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn begin_batch(&mut self, batch: &Batch) {
        // Task ids repeat across runs of the same batch
        self.tasks.retain(|task| task.batch_id != batch.id);

        let prompts = batch.ordered_prompts();
        for prompt in &prompts {
            self.tasks.push(AgentTask::submit(&batch.id, &prompt.id));
        }
        let coordinate = AgentTask::coordinate(&batch.id);
        let coordinate_id = coordinate.id.clone();
        self.tasks.push(coordinate);
        self.prune_tasks(&batch.id);
        self.current_batch = Some(batch.id.clone());

        if let Some(orchestrator) = self.agent_mut(ORCHESTRATOR_AGENT_ID) {
            orchestrator.status = AgentStatus::Active;
            orchestrator.current_task = Some(coordinate_id.clone());
            orchestrator.last_activity = Utc::now();
        }
        self.decide(
            Some(ORCHESTRATOR_AGENT_ID),
            &coordinate_id,
            format!("Decomposed batch {} into {} submit task(s)", batch.id, prompts.len()),
            "one submit task per prompt, coordinated once the batch finishes",
        );
    }

    /// Drop the oldest finished tasks of other batches until under the limit
    fn prune_tasks(&mut self, keep_batch: &str) {
        let excess = self.tasks.len().saturating_sub(self.task_limit);
        if excess == 0 {
            return;
        }
        let mut dropped = 0;
        self.tasks.retain(|task| {
            let drop = dropped < excess && task.batch_id != keep_batch && task.status.is_finished();
            if drop {
                dropped += 1;
            }
            !drop
        });
        debug!(dropped = dropped, retained = self.tasks.len(), "Pruned agent task history");
    }

    /// Hand a started prompt's task to the least-recently-used idle browser agent
    fn assign_submit(&mut self, batch_id: &str, prompt_id: &str) {
        let task_id = AgentTask::submit(batch_id, prompt_id).id;
        let agent_id = self
            .agents
            .iter()
            .filter(|agent| agent.kind == AgentKind::Browser && agent.status == AgentStatus::Idle)
            .min_by_key(|agent| agent.last_activity)
            .map(|agent| agent.id.clone());

        if let Some(task) = self.task_mut(&task_id) {
            task.status = AgentTaskStatus::Executing;
            task.started_at = Some(Utc::now());
            task.assigned_agent = agent_id.clone();
        }

        match agent_id {
            Some(agent_id) => {
                if let Some(agent) = self.agent_mut(&agent_id) {
                    agent.status = AgentStatus::Busy;
                    agent.current_task = Some(task_id.clone());
                    agent.last_activity = Utc::now();
                }
                self.decide(
                    Some(&agent_id),
                    &task_id,
                    format!("Assigned prompt {prompt_id} to {agent_id}"),
                    "least recently used idle browser agent",
                );
            }
            None => {
                warn!(task = %task_id, "No idle browser agent for started prompt");
                self.decide(
                    None,
                    &task_id,
                    format!("Prompt {prompt_id} started without an agent"),
                    "every browser agent was busy",
                );
            }
        }
    }

    fn finish_submit(&mut self, batch_id: &str, result: &PromptResult) {
        let task_id = AgentTask::submit(batch_id, &result.prompt_id).id;
        let mut agent_id = None;
        if let Some(task) = self.task_mut(&task_id) {
            task.status = if result.success {
                AgentTaskStatus::Completed
            } else {
                AgentTaskStatus::Failed
            };
            task.error = result.error.clone();
            task.completed_at = Some(Utc::now());
            agent_id = task.assigned_agent.clone();
        }

        let Some(agent_id) = agent_id else {
            return;
        };
        if let Some(agent) = self.agent_mut(&agent_id) {
            agent.performance.record(result.success, result.processing_time_ms);
            if agent.current_task.as_deref() == Some(task_id.as_str()) {
                agent.status = AgentStatus::Idle;
                agent.current_task = None;
            }
            agent.last_activity = Utc::now();
        }
    }

    /// Close submit tasks the run never finished; returns how many were closed
    fn close_outstanding(&mut self, batch_id: &str, status: AgentTaskStatus, reason: &str) -> usize {
        let mut released = Vec::new();
        for task in self
            .tasks
            .iter_mut()
            .filter(|task| task.batch_id == batch_id && task.kind == AgentTaskKind::Submit)
            .filter(|task| !task.status.is_finished())
        {
            task.status = status;
            task.error = Some(reason.to_string());
            task.completed_at = Some(Utc::now());
            released.push(task.id.clone());
        }
        for agent in self
            .agents
            .iter_mut()
            .filter(|agent| agent.kind == AgentKind::Browser)
        {
            if agent.current_task.as_ref().is_some_and(|t| released.contains(t)) {
                agent.status = AgentStatus::Idle;
                agent.current_task = None;
            }
        }
        released.len()
    }

    fn coordinate(&mut self, batch_id: &str, batch_status: BatchStatus) -> CoordinationReport {
        let started = Instant::now();
        let coordinate_id = AgentTask::coordinate(batch_id).id;

        if let Some(orchestrator) = self.agent_mut(ORCHESTRATOR_AGENT_ID) {
            orchestrator.status = AgentStatus::Busy;
            orchestrator.current_task = Some(coordinate_id.clone());
        }
        if let Some(task) = self.task_mut(&coordinate_id) {
            task.status = AgentTaskStatus::Executing;
            task.started_at = Some(Utc::now());
            task.assigned_agent = Some(ORCHESTRATOR_AGENT_ID.to_string());
        }

        let submits: Vec<&AgentTask> = self
            .tasks
            .iter()
            .filter(|task| task.batch_id == batch_id && task.kind == AgentTaskKind::Submit)
            .collect();
        let count = |status: AgentTaskStatus| submits.iter().filter(|t| t.status == status).count();
        let total = submits.len();
        let completed = count(AgentTaskStatus::Completed);
        let report = CoordinationReport {
            batch_id: batch_id.to_string(),
            batch_status,
            total_tasks: total,
            completed_tasks: completed,
            failed_tasks: count(AgentTaskStatus::Failed),
            cancelled_tasks: count(AgentTaskStatus::Cancelled),
            success_rate: if total == 0 {
                0.0
            } else {
                completed as f64 / total as f64 * 100.0
            },
            generated_at: Utc::now(),
        };

        if let Some(task) = self.task_mut(&coordinate_id) {
            task.status = AgentTaskStatus::Completed;
            task.completed_at = Some(Utc::now());
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if let Some(orchestrator) = self.agent_mut(ORCHESTRATOR_AGENT_ID) {
            orchestrator.performance.record(true, elapsed_ms);
            orchestrator.status = AgentStatus::Idle;
            orchestrator.current_task = None;
            orchestrator.last_activity = Utc::now();
        }
        self.decide(
            Some(ORCHESTRATOR_AGENT_ID),
            &coordinate_id,
            format!(
                "Batch {batch_id} {batch_status}: {completed}/{total} submit task(s) completed"
            ),
            "coordination report from submit task outcomes",
        );
        self.current_batch = None;
        report
    }
}

/// Feeds queue lifecycle callbacks into the agent pool
struct PoolObserver {
    batch_id: String,
    pool: Arc<Mutex<AgentPool>>,
}

impl RunObserver for PoolObserver {
    fn on_prompt_started(&self, batch_id: &str, prompt_id: &str) {
        if batch_id == self.batch_id {
            self.pool.lock().assign_submit(batch_id, prompt_id);
        }
    }

    fn on_prompt_finished(&self, batch_id: &str, result: &PromptResult, _progress: &BatchProgress) {
        if batch_id == self.batch_id {
            self.pool.lock().finish_submit(batch_id, result);
        }
    }
}

#[derive(Clone)]
pub struct AgentOrchestrator {
    batches: BatchOrchestrator,
    browser_agents: usize,
    pool: Arc<Mutex<AgentPool>>,
}

impl std::fmt::Debug for AgentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOrchestrator")
            .field("browser_agents", &self.browser_agents)
            .field("current_batch", &self.pool.lock().current_batch)
            .finish()
    }
}

impl AgentOrchestrator {
    pub fn new(batches: BatchOrchestrator, config: &AgentsConfig) -> Self {
        let pool = AgentPool::new(config);
        info!(
            agents = pool.agents.len(),
            browser_agents = config.browser_agents,
            "🤖 Agent pool initialized"
        );
        Self {
            batches,
            browser_agents: config.browser_agents.max(1),
            pool: Arc::new(Mutex::new(pool)),
        }
    }

    /// Run a batch through the agent pool and return its coordination report
    pub async fn execute_batch(
        &self,
        batch: Batch,
        platform: Option<PlatformId>,
    ) -> AutomationResult<CoordinationReport> {
        if let Some(running) = self.batches.active_batch_id() {
            return Err(AutomationError::BatchAlreadyRunning {
                running_batch_id: running,
            });
        }

        let batch_id = batch.id.clone();
        self.pool.lock().begin_batch(&batch);
        info!(batch_id = %batch_id, name = %batch.name, "🚀 Agents executing batch");

        let observer = Arc::new(PoolObserver {
            batch_id: batch_id.clone(),
            pool: Arc::clone(&self.pool),
        });
        let options = RunOptions {
            concurrency: Some(self.browser_agents),
            observer: Some(observer),
        };
        let outcome = self.batches.run_batch_with(batch, platform, options).await;

        let batch_status = match &outcome {
            Ok(summary) => summary.status,
            Err(_) => self
                .batches
                .get_status(&batch_id)
                .map(|status| status.status)
                .unwrap_or(BatchStatus::Failed),
        };

        let report = {
            let mut pool = self.pool.lock();
            let (status, reason) = if batch_status == BatchStatus::Stopped {
                (AgentTaskStatus::Cancelled, "batch stopped")
            } else {
                (AgentTaskStatus::Failed, "batch aborted")
            };
            let closed = pool.close_outstanding(&batch_id, status, reason);
            if closed > 0 {
                debug!(batch_id = %batch_id, closed = closed, "Closed unfinished submit tasks");
            }
            pool.coordinate(&batch_id, batch_status)
        };

        outcome?;
        info!(
            batch_id = %batch_id,
            success_rate = report.success_rate,
            "📊 Coordination report ready"
        );
        Ok(report)
    }

    /// Cancel outstanding work cooperatively and return every agent to idle
    pub fn stop_all_agents(&self) -> usize {
        let current = self.pool.lock().current_batch.clone();
        if let Some(batch_id) = &current {
            match self.batches.stop_batch(batch_id) {
                Ok(()) | Err(AutomationError::BatchNotRunning { .. }) => {}
                Err(err) => warn!(batch_id = %batch_id, error = %err, "Stop request failed"),
            }
        }

        let mut pool = self.pool.lock();
        let mut cancelled = 0;
        for task in pool
            .tasks
            .iter_mut()
            .filter(|task| task.status == AgentTaskStatus::Pending && task.kind == AgentTaskKind::Submit)
        {
            task.status = AgentTaskStatus::Cancelled;
            task.error = Some("stopped by operator".to_string());
            task.completed_at = Some(Utc::now());
            cancelled += 1;
        }
        for agent in pool.agents.iter_mut() {
            if agent.status != AgentStatus::Idle {
                info!(agent = %agent.id, "🛑 Stopping agent");
            }
            agent.status = AgentStatus::Idle;
            agent.current_task = None;
        }
        cancelled
    }

    pub fn agent_states(&self) -> Vec<AgentState> {
        self.pool.lock().agents.clone()
    }

    pub fn tasks(&self) -> Vec<AgentTask> {
        self.pool.lock().tasks.clone()
    }

    pub fn decision_history(&self) -> Vec<AgentDecision> {
        self.pool.lock().decisions.iter().cloned().collect()
    }

    pub fn stats(&self) -> AgentStats {
        let pool = self.pool.lock();
        let by_status = |status: AgentStatus| pool.agents.iter().filter(|a| a.status == status).count();
        let tasks_with = |status: AgentTaskStatus| pool.tasks.iter().filter(|t| t.status == status).count();
        let rated: Vec<f64> = pool
            .agents
            .iter()
            .filter(|agent| agent.performance.finished() > 0)
            .map(|agent| agent.performance.success_rate)
            .collect();

        AgentStats {
            total_agents: pool.agents.len(),
            idle_agents: by_status(AgentStatus::Idle),
            busy_agents: by_status(AgentStatus::Busy),
            active_agents: by_status(AgentStatus::Active),
            total_tasks: pool.tasks.len(),
            pending_tasks: tasks_with(AgentTaskStatus::Pending),
            completed_tasks: tasks_with(AgentTaskStatus::Completed),
            failed_tasks: tasks_with(AgentTaskStatus::Failed),
            decisions: pool.decisions.len(),
            average_success_rate: if rated.is_empty() {
                0.0
            } else {
                rated.iter().sum::<f64>() / rated.len() as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AutomationConfig;
    use crate::models::{BatchSettings, TextPrompt};
    use crate::persistence::InMemoryBatchStore;
    use crate::services::BackendRegistry;
    use crate::test_helpers::{ScriptedBackendClient, SubmitBehavior};
    use std::time::Duration;

    fn setup(client: Arc<ScriptedBackendClient>, config: AutomationConfig) -> AgentOrchestrator {
        let registry = BackendRegistry::from_config(&config);
        let agents = config.agents.clone();
        let batches = BatchOrchestrator::new(
            config,
            client,
            registry,
            Arc::new(InMemoryBatchStore::new()),
        );
        AgentOrchestrator::new(batches, &agents)
    }

    fn config() -> AutomationConfig {
        let mut config = AutomationConfig::default();
        config.queue.backoff_base_ms = 1;
        config.queue.max_backoff_ms = 2;
        config
    }

    fn batch(prompts: u32) -> Batch {
        let prompts = (1..=prompts)
            .map(|i| TextPrompt::new(format!("p{i}"), format!("prompt {i}"), i))
            .collect();
        Batch::new("b1", "Agent batch", "https://chatgpt.com", prompts).with_settings(
            BatchSettings {
                max_retries: 1,
                automation_delay_ms: 0,
                ..BatchSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn test_execute_batch_assigns_browser_agents() {
        let client = Arc::new(ScriptedBackendClient::new());
        client.set_submit("python", SubmitBehavior::Slow(Duration::from_millis(10)));
        let agents = setup(Arc::clone(&client), config());

        let report = agents.execute_batch(batch(5), None).await.unwrap();

        assert_eq!(report.batch_status, BatchStatus::Completed);
        assert_eq!(report.total_tasks, 5);
        assert_eq!(report.completed_tasks, 5);
        assert_eq!(report.success_rate, 100.0);
        assert!(client.max_in_flight() <= 2);

        let tasks = agents.tasks();
        assert_eq!(tasks.len(), 6);
        assert!(tasks.iter().all(|t| t.status == AgentTaskStatus::Completed));
        assert!(tasks
            .iter()
            .filter(|t| t.kind == AgentTaskKind::Submit)
            .all(|t| t.assigned_agent.as_deref().unwrap().starts_with("browser-agent-")));

        let states = agents.agent_states();
        assert!(states.iter().all(|a| a.status == AgentStatus::Idle));
        let browser_total: u64 = states
            .iter()
            .filter(|a| a.kind == AgentKind::Browser)
            .map(|a| a.performance.tasks_completed)
            .sum();
        assert_eq!(browser_total, 5);

        // decompose + 5 assignments + coordination
        assert_eq!(agents.decision_history().len(), 7);
        let stats = agents.stats();
        assert_eq!(stats.total_agents, 3);
        assert_eq!(stats.completed_tasks, 6);
        assert_eq!(stats.average_success_rate, 100.0);
    }

    #[tokio::test]
    async fn test_aborted_batch_fails_outstanding_tasks() {
        let client = Arc::new(ScriptedBackendClient::new());
        client.set_submit("python", SubmitBehavior::AlwaysFail { status: 500 });
        let mut config = config();
        config.backends.truncate(1);
        config.circuit_breakers.failure_threshold = 2;
        let agents = setup(Arc::clone(&client), config);

        let err = agents.execute_batch(batch(4), None).await.unwrap_err();
        assert!(matches!(err, AutomationError::NoBackendAvailable { .. }));

        let tasks = agents.tasks();
        assert!(tasks
            .iter()
            .filter(|t| t.kind == AgentTaskKind::Submit)
            .all(|t| t.status == AgentTaskStatus::Failed));
        assert!(agents
            .agent_states()
            .iter()
            .all(|a| a.status == AgentStatus::Idle));
    }

    #[tokio::test]
    async fn test_stop_all_agents_cancels_pending() {
        let client = Arc::new(ScriptedBackendClient::new());
        client.set_submit("python", SubmitBehavior::Slow(Duration::from_millis(50)));
        let agents = setup(Arc::clone(&client), config());

        let runner = agents.clone();
        let handle = tokio::spawn(async move { runner.execute_batch(batch(6), None).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cancelled = agents.stop_all_agents();
        assert_eq!(cancelled, 4);

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.batch_status, BatchStatus::Stopped);
        assert_eq!(report.completed_tasks, 2);
        assert_eq!(report.cancelled_tasks, 4);
    }

    #[tokio::test]
    async fn test_decision_history_bounded() {
        let client = Arc::new(ScriptedBackendClient::new());
        let mut config = config();
        config.agents.decision_history_limit = 3;
        let agents = setup(client, config);

        agents.execute_batch(batch(5), None).await.unwrap();
        let history = agents.decision_history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].agent_id.as_deref(), Some(ORCHESTRATOR_AGENT_ID));
    }

    #[tokio::test]
    async fn test_rerun_of_same_batch_replaces_tasks() {
        let client = Arc::new(ScriptedBackendClient::new());
        let agents = setup(Arc::clone(&client), config());

        agents.execute_batch(batch(3), None).await.unwrap();
        let report = agents.execute_batch(batch(3), None).await.unwrap();

        assert_eq!(report.batch_status, BatchStatus::Completed);
        assert_eq!(report.total_tasks, 3);
        assert_eq!(report.completed_tasks, 3);
        assert_eq!(report.success_rate, 100.0);

        let tasks = agents.tasks();
        assert_eq!(tasks.len(), 4);
        assert!(tasks.iter().all(|t| t.status == AgentTaskStatus::Completed));
        assert!(tasks
            .iter()
            .filter(|t| t.kind == AgentTaskKind::Submit)
            .all(|t| t.assigned_agent.is_some() && t.started_at.is_some()));

        let browser_total: u64 = agents
            .agent_states()
            .iter()
            .filter(|a| a.kind == AgentKind::Browser)
            .map(|a| a.performance.tasks_completed)
            .sum();
        assert_eq!(browser_total, 6);
    }

    #[tokio::test]
    async fn test_task_history_bounded_across_batches() {
        let client = Arc::new(ScriptedBackendClient::new());
        let mut config = config();
        config.agents.task_history_limit = 5;
        let agents = setup(client, config);

        agents.execute_batch(batch(3), None).await.unwrap();
        let mut second = batch(3);
        second.id = "b2".to_string();
        agents.execute_batch(second, None).await.unwrap();

        let tasks = agents.tasks();
        assert_eq!(tasks.len(), 5);
        assert_eq!(tasks.iter().filter(|t| t.batch_id == "b2").count(), 4);
        // The surviving b1 task is its newest, the coordinate task
        let kept: Vec<_> = tasks.iter().filter(|t| t.batch_id == "b1").collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].kind, AgentTaskKind::Coordinate);
    }

    #[tokio::test]
    async fn test_rejects_while_batch_running() {
        let client = Arc::new(ScriptedBackendClient::new());
        client.set_submit("python", SubmitBehavior::Slow(Duration::from_millis(50)));
        let agents = setup(Arc::clone(&client), config());

        let runner = agents.clone();
        let handle = tokio::spawn(async move { runner.execute_batch(batch(2), None).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut other = batch(1);
        other.id = "b2".to_string();
        assert!(matches!(
            agents.execute_batch(other, None).await,
            Err(AutomationError::BatchAlreadyRunning { .. })
        ));
        handle.await.unwrap().unwrap();
    }
}
