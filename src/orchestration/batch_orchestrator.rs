//! # Batch Orchestrator
//!
//! Top-level coordinator for batch runs.
//!
//! ## Overview
//!
//! A run validates the batch, claims the single system-wide run slot, resolves
//! the target platform, persists and verifies the batch row, then drives the
//! [`TaskQueue`] with a [`PromptDispatcher`] as its worker. Every status change
//! goes through [`BatchStateMachine`] and is persisted.
//!
//! ## Run lifecycle
//!
//! ```text
//! validate → claim slot → submit (pending) → resolve platform → save + verify
//!          → start (running) → task queue → completed | failed | stopped
//! ```
//!
//! ## Failure policy
//!
//! - Per-prompt failures are retried by the queue and end up in results; the
//!   batch fails with an aggregate "N of M prompts failed" message.
//! - No backend available aborts the run: prompts without a result are
//!   recorded as failed and the error is returned to the caller.
//! - Store operations are retried once; a second failure fails the batch and
//!   is returned to the caller.
//! - Stop is not an error: unstarted prompts stay pending and the run ends
//!   `stopped`.

use super::backoff::BackoffPolicy;
use super::dispatcher::{LaunchSettings, PromptDispatcher};
use super::run_tracker::{LogLevel, RunLogEntry, RunTracker};
use super::task_queue::{QueueControl, QueueEvent, QueueTermination, TaskQueue, TaskQueueConfig};
use crate::client::BackendClient;
use crate::config::AutomationConfig;
use crate::constants::{defaults, messages, operations};
use crate::error::{AutomationError, AutomationResult};
use crate::logging::{log_batch_operation, log_error};
use crate::models::{Batch, BatchProgress, PromptResult};
use crate::persistence::{BatchStore, StoreError, StoreResult};
use crate::platform::{detect_platform, PlatformId};
use crate::services::BackendRegistry;
use crate::state_machine::{BatchEvent, BatchStateMachine, BatchStatus};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callbacks for callers that want push-style progress instead of polling
pub trait RunObserver: Send + Sync {
    fn on_status_changed(&self, _batch_id: &str, _status: BatchStatus) {}

    fn on_prompt_started(&self, _batch_id: &str, _prompt_id: &str) {}

    fn on_prompt_finished(&self, _batch_id: &str, _result: &PromptResult, _progress: &BatchProgress) {}
}

#[derive(Clone, Default)]
pub struct RunOptions {
    /// Overrides `queue.max_concurrency` for this run
    pub concurrency: Option<usize>,
    pub observer: Option<Arc<dyn RunObserver>>,
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("concurrency", &self.concurrency)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Final state of a run that reached a terminal status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub batch_id: String,
    pub status: BatchStatus,
    pub platform: PlatformId,
    pub progress: BatchProgress,
    pub results: Vec<PromptResult>,
    pub error_message: Option<String>,
}

/// Polling view of a batch, live while it runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusReport {
    pub batch_id: String,
    pub status: BatchStatus,
    pub platform: Option<PlatformId>,
    pub progress: BatchProgress,
    pub percentage: f64,
    pub error_message: Option<String>,
    pub recent_logs: Vec<RunLogEntry>,
}

struct ActiveRun {
    batch_id: String,
    batch: Arc<Mutex<Batch>>,
    control: QueueControl,
}

/// Releases the run slot when the run ends, including when its future is dropped
struct RunSlot<'a> {
    active: &'a Mutex<Option<ActiveRun>>,
    batch_id: String,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        let mut active = self.active.lock();
        if active.as_ref().map(|run| run.batch_id.as_str()) == Some(self.batch_id.as_str()) {
            *active = None;
        }
    }
}

struct OrchestratorInner {
    config: AutomationConfig,
    client: Arc<dyn BackendClient>,
    registry: BackendRegistry,
    store: Arc<dyn BatchStore>,
    active: Mutex<Option<ActiveRun>>,
    trackers: DashMap<String, Arc<RunTracker>>,
    /// Tracker insertion order, oldest first
    tracker_order: Mutex<VecDeque<String>>,
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("backends", &self.inner.registry.len())
            .field("active_batch", &self.active_batch_id())
            .finish()
    }
}

impl BatchOrchestrator {
    pub fn new(
        config: AutomationConfig,
        client: Arc<dyn BackendClient>,
        registry: BackendRegistry,
        store: Arc<dyn BatchStore>,
    ) -> Self {
        info!(
            backends = registry.len(),
            max_concurrency = config.queue.max_concurrency,
            "🚀 Batch orchestrator initialized"
        );
        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                client,
                registry,
                store,
                active: Mutex::new(None),
                trackers: DashMap::new(),
                tracker_order: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.inner.registry
    }

    /// Id of the batch currently holding the run slot
    pub fn active_batch_id(&self) -> Option<String> {
        self.inner
            .active
            .lock()
            .as_ref()
            .map(|run| run.batch_id.clone())
    }

    /// Run a batch to a terminal status with default options
    pub async fn run_batch(
        &self,
        batch: Batch,
        platform: Option<PlatformId>,
    ) -> AutomationResult<RunSummary> {
        self.run_batch_with(batch, platform, RunOptions::default())
            .await
    }

    pub async fn run_batch_with(
        &self,
        batch: Batch,
        platform: Option<PlatformId>,
        options: RunOptions,
    ) -> AutomationResult<RunSummary> {
        let inner = &self.inner;
        batch.validate(inner.config.orchestration.max_prompts_per_batch)?;

        let batch_id = batch.id.clone();
        let total = batch.prompts.len();
        let shared = Arc::new(Mutex::new(batch));
        let control = QueueControl::new();
        let _slot = self.claim_slot(&batch_id, Arc::clone(&shared), control.clone())?;

        let tracker = Arc::new(RunTracker::new(
            batch_id.as_str(),
            total,
            inner.config.orchestration.recent_log_limit,
        ));
        self.retain_tracker(&batch_id, Arc::clone(&tracker));
        let observer = options.observer.clone();

        log_batch_operation(operations::RUN_BATCH, &batch_id, None, "starting", None);

        // Submit: pending
        let submitted = self.apply(&shared, BatchEvent::Submit, observer.as_deref())?;
        if let Err(err) = self.save_with_retry(&submitted) {
            return Err(self.fail_run(&shared, &tracker, err, observer.as_deref()));
        }
        // A re-run starts from an empty result set
        if let Err(err) = self.retry_once(operations::CLEAR_RESULTS, &batch_id, || {
            inner.store.clear_prompt_results(&batch_id)
        }) {
            return Err(self.fail_run(&shared, &tracker, err, observer.as_deref()));
        }

        // Platform resolution; local routing is total, remote detection is opt-in
        let (target_url, stored_platform, prompts, settings) = {
            let batch = shared.lock();
            (
                batch.target_url.clone(),
                batch.platform,
                batch.ordered_prompts(),
                batch.settings.clone(),
            )
        };
        let mut resolved = platform
            .or(stored_platform)
            .unwrap_or_else(|| detect_platform(&target_url));

        let mut dispatcher = PromptDispatcher::new(
            batch_id.as_str(),
            target_url.as_str(),
            resolved,
            Arc::clone(&inner.client),
            inner.registry.clone(),
            LaunchSettings::new(&inner.config.orchestration, &settings),
            inner.config.queue.prompt_timeout(),
        );
        if resolved == PlatformId::GenericWeb && inner.config.orchestration.remote_platform_detection {
            if let Some(detected) = dispatcher.detect_remote_platform().await {
                resolved = detected;
                dispatcher.set_platform(detected);
            }
        }
        tracker.log(
            LogLevel::Info,
            format!("Platform resolved: {}", resolved.display_name()),
        );

        let snapshot = {
            let mut batch = shared.lock();
            batch.platform = Some(resolved);
            batch.clone()
        };
        if let Err(err) = self.save_and_verify(&snapshot) {
            return Err(self.fail_run(&shared, &tracker, err, observer.as_deref()));
        }

        // Start: running
        let running = self.apply(&shared, BatchEvent::Start, observer.as_deref())?;
        if let Err(err) = self.save_with_retry(&running) {
            return Err(self.fail_run(&shared, &tracker, err, observer.as_deref()));
        }
        tracker.log(
            LogLevel::Info,
            format!("Batch started with {total} prompt(s)"),
        );

        let concurrency = options
            .concurrency
            .unwrap_or(inner.config.queue.max_concurrency)
            .clamp(1, defaults::MAX_QUEUE_CONCURRENCY);
        let queue = TaskQueue::new(TaskQueueConfig {
            concurrency,
            max_retries: settings.max_retries,
            backoff: BackoffPolicy::from_queue_config(&inner.config.queue),
            dispatch_delay: settings.automation_delay(),
        });

        let append_failure: Mutex<Option<AutomationError>> = Mutex::new(None);
        let on_event = |event: QueueEvent| {
            tracker.observe(&event);
            match &event {
                QueueEvent::Started { prompt_id } => {
                    if let Some(observer) = observer.as_deref() {
                        observer.on_prompt_started(&batch_id, prompt_id);
                    }
                }
                QueueEvent::Finished { result, .. } => {
                    if let Err(err) = self.append_with_retry(&batch_id, result) {
                        let mut failure = append_failure.lock();
                        if failure.is_none() {
                            *failure = Some(err);
                            control.stop();
                        }
                    }
                    if let Some(observer) = observer.as_deref() {
                        observer.on_prompt_finished(&batch_id, result, &tracker.progress());
                    }
                }
                QueueEvent::Retrying { .. } => {}
            }
        };

        let outcome = queue.run(prompts, &dispatcher, &control, &on_event).await;

        if let Some(err) = append_failure.into_inner() {
            return Err(self.fail_run(&shared, &tracker, err, observer.as_deref()));
        }

        let (event, abort) = match outcome.termination {
            QueueTermination::Completed => {
                let failed = outcome.results.iter().filter(|r| !r.success).count();
                if failed == 0 {
                    (BatchEvent::Complete, None)
                } else {
                    (
                        BatchEvent::Fail(format!("{failed} of {total} prompts failed")),
                        None,
                    )
                }
            }
            QueueTermination::Cancelled => {
                tracker.log(
                    LogLevel::Warn,
                    format!(
                        "Batch stopped; {} prompt(s) not processed",
                        outcome.unprocessed.len()
                    ),
                );
                (BatchEvent::Stop, None)
            }
            QueueTermination::Aborted(err) => {
                let reason = match err {
                    AutomationError::NoBackendAvailable { .. } => messages::ABORTED_NO_BACKEND.to_string(),
                    ref other => format!("aborted: {other}"),
                };
                for prompt in &outcome.unprocessed {
                    let result = PromptResult::failed(&prompt.id, reason.as_str(), 0, 0);
                    if let Err(append_err) = self.append_with_retry(&batch_id, &result) {
                        return Err(self.fail_run(&shared, &tracker, append_err, observer.as_deref()));
                    }
                    tracker.record_result(result);
                }
                (BatchEvent::Fail(err.to_string()), Some(err))
            }
        };

        let finished = self.finish(&shared, event, observer.as_deref())?;
        if let Err(err) = self.save_with_retry(&finished) {
            return Err(self.fail_run(&shared, &tracker, err, observer.as_deref()));
        }

        let progress = tracker.progress();
        tracker.log(
            match finished.status {
                BatchStatus::Completed => LogLevel::Info,
                BatchStatus::Stopped => LogLevel::Warn,
                _ => LogLevel::Error,
            },
            format!(
                "Batch {}: {} completed, {} failed, {} pending",
                finished.status, progress.completed, progress.failed, progress.pending
            ),
        );
        log_batch_operation(
            operations::RUN_BATCH,
            &batch_id,
            Some(&finished.name),
            &finished.status.to_string(),
            finished.error_message.as_deref(),
        );

        if let Some(err) = abort {
            return Err(err);
        }

        Ok(RunSummary {
            batch_id,
            status: finished.status,
            platform: resolved,
            progress,
            results: tracker.results(),
            error_message: finished.error_message,
        })
    }

    /// Signal the active run to stop; the run persists `stopped` when it drains
    pub fn stop_batch(&self, batch_id: &str) -> AutomationResult<()> {
        let control = self.active_control(batch_id)?;
        control.stop();
        if let Some(tracker) = self.inner.trackers.get(batch_id) {
            tracker.log(LogLevel::Warn, "Stop requested");
        }
        log_batch_operation(operations::STOP_BATCH, batch_id, None, "requested", None);
        Ok(())
    }

    /// Hold new dispatches; in-flight attempts finish
    pub fn pause_batch(&self, batch_id: &str) -> AutomationResult<()> {
        self.toggle_pause(batch_id, BatchEvent::Pause)
    }

    pub fn resume_batch(&self, batch_id: &str) -> AutomationResult<()> {
        self.toggle_pause(batch_id, BatchEvent::Resume)
    }

    /// Current status, progress, and recent log lines for a batch
    pub fn get_status(&self, batch_id: &str) -> AutomationResult<BatchStatusReport> {
        let live = self
            .inner
            .active
            .lock()
            .as_ref()
            .filter(|run| run.batch_id == batch_id)
            .map(|run| run.batch.lock().clone());

        let batch = match live {
            Some(batch) => batch,
            None => self
                .inner
                .store
                .get_batch(batch_id)
                .map_err(|err| AutomationError::persistence("get_batch", err))?,
        };

        let (progress, recent_logs) = match self.inner.trackers.get(batch_id) {
            Some(tracker) => (tracker.progress(), tracker.recent_logs()),
            None => {
                let results = self
                    .inner
                    .store
                    .prompt_results(batch_id)
                    .map_err(|err| AutomationError::persistence("prompt_results", err))?;
                (
                    BatchProgress::from_results(batch.prompts.len(), &results, 0),
                    Vec::new(),
                )
            }
        };

        Ok(BatchStatusReport {
            batch_id: batch.id,
            status: batch.status,
            platform: batch.platform,
            percentage: progress.percentage(),
            progress,
            error_message: batch.error_message,
            recent_logs,
        })
    }

    /// Register a run's tracker, evicting the oldest beyond the retention bound
    fn retain_tracker(&self, batch_id: &str, tracker: Arc<RunTracker>) {
        let mut order = self.inner.tracker_order.lock();
        order.retain(|id| id != batch_id);
        order.push_back(batch_id.to_string());
        self.inner.trackers.insert(batch_id.to_string(), tracker);

        while order.len() > defaults::MAX_RETAINED_TRACKERS {
            if let Some(evicted) = order.pop_front() {
                self.inner.trackers.remove(&evicted);
                debug!(batch_id = %evicted, "Evicted run tracker");
            }
        }
    }

    fn claim_slot(
        &self,
        batch_id: &str,
        batch: Arc<Mutex<Batch>>,
        control: QueueControl,
    ) -> AutomationResult<RunSlot<'_>> {
        let mut active = self.inner.active.lock();
        if let Some(run) = active.as_ref() {
            warn!(
                requested = %batch_id,
                running = %run.batch_id,
                "🚫 Rejected batch start, another batch is running"
            );
            return Err(AutomationError::BatchAlreadyRunning {
                running_batch_id: run.batch_id.clone(),
            });
        }
        *active = Some(ActiveRun {
            batch_id: batch_id.to_string(),
            batch,
            control,
        });
        Ok(RunSlot {
            active: &self.inner.active,
            batch_id: batch_id.to_string(),
        })
    }

    fn active_control(&self, batch_id: &str) -> AutomationResult<QueueControl> {
        self.inner
            .active
            .lock()
            .as_ref()
            .filter(|run| run.batch_id == batch_id)
            .map(|run| run.control.clone())
            .ok_or_else(|| AutomationError::BatchNotRunning {
                batch_id: batch_id.to_string(),
            })
    }

    fn toggle_pause(&self, batch_id: &str, event: BatchEvent) -> AutomationResult<()> {
        let (batch, control) = self
            .inner
            .active
            .lock()
            .as_ref()
            .filter(|run| run.batch_id == batch_id)
            .map(|run| (Arc::clone(&run.batch), run.control.clone()))
            .ok_or_else(|| AutomationError::BatchNotRunning {
                batch_id: batch_id.to_string(),
            })?;

        let pausing = event == BatchEvent::Pause;
        let operation = if pausing {
            operations::PAUSE_BATCH
        } else {
            operations::RESUME_BATCH
        };

        let snapshot = {
            let mut batch = batch.lock();
            BatchStateMachine::transition(&mut batch, event)?;
            batch.clone()
        };
        self.save_with_retry(&snapshot)?;

        if pausing {
            control.pause();
        } else {
            control.resume();
        }

        if let Some(tracker) = self.inner.trackers.get(batch_id) {
            tracker.log(
                LogLevel::Info,
                if pausing { "Batch paused" } else { "Batch resumed" },
            );
        }
        log_batch_operation(operation, batch_id, None, &snapshot.status.to_string(), None);
        Ok(())
    }

    fn apply(
        &self,
        shared: &Mutex<Batch>,
        event: BatchEvent,
        observer: Option<&dyn RunObserver>,
    ) -> AutomationResult<Batch> {
        let snapshot = {
            let mut batch = shared.lock();
            BatchStateMachine::transition(&mut batch, event)?;
            batch.clone()
        };
        if let Some(observer) = observer {
            observer.on_status_changed(&snapshot.id, snapshot.status);
        }
        Ok(snapshot)
    }

    /// Terminal transition; a paused run that drained is resumed first
    fn finish(
        &self,
        shared: &Mutex<Batch>,
        event: BatchEvent,
        observer: Option<&dyn RunObserver>,
    ) -> AutomationResult<Batch> {
        {
            let mut batch = shared.lock();
            if batch.status == BatchStatus::Paused && event == BatchEvent::Complete {
                BatchStateMachine::transition(&mut batch, BatchEvent::Resume)?;
            }
        }
        self.apply(shared, event, observer)
    }

    /// Mark the batch failed after a fatal error, best-effort persist, return the error
    fn fail_run(
        &self,
        shared: &Mutex<Batch>,
        tracker: &RunTracker,
        err: AutomationError,
        observer: Option<&dyn RunObserver>,
    ) -> AutomationError {
        log_error("batch_orchestrator", operations::RUN_BATCH, &err.to_string(), None);
        tracker.log(LogLevel::Error, err.to_string());

        match self.apply(shared, BatchEvent::Fail(err.to_string()), observer) {
            Ok(failed) => {
                if let Err(save_err) = self.inner.store.save_batch(&failed) {
                    warn!(
                        batch_id = %failed.id,
                        error = %save_err,
                        "Could not persist failed status"
                    );
                }
            }
            Err(transition_err) => {
                warn!(error = %transition_err, "Batch already terminal, keeping status");
            }
        }
        err
    }

    fn save_with_retry(&self, batch: &Batch) -> AutomationResult<()> {
        self.retry_once(operations::SAVE_BATCH, &batch.id, || {
            self.inner.store.save_batch(batch)
        })
    }

    /// Save, then read back and compare; the pair is retried once
    fn save_and_verify(&self, batch: &Batch) -> AutomationResult<()> {
        self.retry_once(operations::SAVE_BATCH, &batch.id, || {
            self.inner.store.save_batch(batch)?;
            let stored = self.inner.store.get_batch(&batch.id)?;
            if stored.status != batch.status || stored.platform != batch.platform {
                return Err(StoreError::Rejected {
                    reason: format!(
                        "read-after-write mismatch: stored status {}, expected {}",
                        stored.status, batch.status
                    ),
                });
            }
            Ok(())
        })
    }

    fn append_with_retry(&self, batch_id: &str, result: &PromptResult) -> AutomationResult<()> {
        self.retry_once(operations::APPEND_RESULT, batch_id, || {
            self.inner.store.append_prompt_result(batch_id, result)
        })
    }

    fn retry_once<F>(&self, operation: &str, batch_id: &str, call: F) -> AutomationResult<()>
    where
        F: Fn() -> StoreResult<()>,
    {
        match call() {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(
                    batch_id = %batch_id,
                    operation = operation,
                    error = %first,
                    "Store operation failed, retrying once"
                );
                call().map_err(|second| {
                    debug!(batch_id = %batch_id, operation = operation, "Store retry failed");
                    AutomationError::persistence(operation, second)
                })
            }
        }
    }
}
