//! # Task Queue
//!
//! Bounded-concurrency runner for one batch's prompts.
//!
//! ## Behavior
//!
//! - Prompts start in ascending `order`, never more than `concurrency` at once;
//!   completion order is unconstrained and results are keyed by prompt id.
//! - A failed attempt is retried up to `max_retries` times, sleeping
//!   `backoff.delay_for(retry)` in between. Exhausted retries become a failed
//!   [`PromptResult`]; a prompt is never dropped.
//! - A batch-fatal error (no backend available, persistence) stops further
//!   dispatch and ends the run as [`QueueTermination::Aborted`].
//! - Stop ([`QueueControl::stop`]) is checked before every dispatch: unstarted
//!   prompts stay unprocessed, in-flight attempts finish, and a pending retry
//!   is pre-empted and recorded as `"cancelled"`.
//! - Pause holds new dispatches until resume; in-flight attempts continue.
//!
//! Every terminal result is reported exactly once through
//! [`QueueEvent::Finished`], with a completed count that never decreases.

use super::backoff::BackoffPolicy;
use crate::constants::messages;
use crate::error::{AutomationError, AutomationResult};
use crate::models::{PromptResult, TextPrompt};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Executes one attempt of one prompt
#[async_trait]
pub trait PromptWorker: Send + Sync {
    /// `attempt` is 1-based
    async fn execute(&self, prompt: &TextPrompt, attempt: u32) -> AutomationResult<Value>;
}

#[async_trait]
impl<F, Fut> PromptWorker for F
where
    F: Fn(TextPrompt, u32) -> Fut + Send + Sync,
    Fut: Future<Output = AutomationResult<Value>> + Send + 'static,
{
    async fn execute(&self, prompt: &TextPrompt, attempt: u32) -> AutomationResult<Value> {
        (self)(prompt.clone(), attempt).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskQueueConfig {
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
    /// Minimum spacing between consecutive dispatches
    pub dispatch_delay: Duration,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            dispatch_delay: Duration::ZERO,
        }
    }
}

/// Stop and pause signals shared between a run and its controller
#[derive(Debug, Clone)]
pub struct QueueControl {
    cancel: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
}

impl Default for QueueControl {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused: Arc::new(paused),
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns false if the queue was already paused
    pub fn pause(&self) -> bool {
        !self.paused.send_replace(true)
    }

    /// Returns false if the queue was not paused
    pub fn resume(&self) -> bool {
        self.paused.send_replace(false)
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    async fn stopped(&self) {
        self.cancel.cancelled().await
    }

    async fn resumed(&self) {
        let mut rx = self.paused.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum QueueEvent {
    Started {
        prompt_id: String,
    },
    Retrying {
        prompt_id: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    Finished {
        result: PromptResult,
        completed: usize,
        total: usize,
    },
}

#[derive(Debug, Clone)]
pub enum QueueTermination {
    /// Every prompt has a terminal result
    Completed,
    Cancelled,
    Aborted(AutomationError),
}

#[derive(Debug, Clone)]
pub struct QueueOutcome {
    /// Terminal results in completion order
    pub results: Vec<PromptResult>,
    /// Prompts without a terminal result, in processing order
    pub unprocessed: Vec<TextPrompt>,
    pub termination: QueueTermination,
}

enum PromptOutcome {
    Terminal(PromptResult),
    Fatal(TextPrompt, AutomationError),
}

#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    config: TaskQueueConfig,
}

impl TaskQueue {
    pub fn new(config: TaskQueueConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TaskQueueConfig {
        &self.config
    }

    /// Process every prompt, reporting each lifecycle step through `on_event`
    pub async fn run<W>(
        &self,
        prompts: Vec<TextPrompt>,
        worker: &W,
        control: &QueueControl,
        on_event: &(dyn Fn(QueueEvent) + Send + Sync),
    ) -> QueueOutcome
    where
        W: PromptWorker + ?Sized,
    {
        let total = prompts.len();
        let concurrency = self.config.concurrency.max(1);
        let mut ordered = prompts;
        ordered.sort_by_key(|prompt| prompt.order);

        let mut pending: VecDeque<TextPrompt> = ordered.into();
        // Shared with in-flight retries so an abort pre-empts their backoff;
        // declared first so it outlives the futures borrowing it
        let retry_guard = control.cancel.child_token();
        let mut in_flight = FuturesUnordered::new();
        let mut results: Vec<PromptResult> = Vec::with_capacity(total);
        let mut unprocessed: Vec<TextPrompt> = Vec::new();
        let mut fatal: Option<AutomationError> = None;
        let mut next_dispatch = Instant::now();

        info!(
            total = total,
            concurrency = concurrency,
            max_retries = self.config.max_retries,
            "📋 Task queue starting"
        );

        loop {
            let can_dispatch = fatal.is_none()
                && !control.is_stopped()
                && !control.is_paused()
                && !pending.is_empty()
                && in_flight.len() < concurrency;

            if can_dispatch && Instant::now() >= next_dispatch {
                if let Some(prompt) = pending.pop_front() {
                    debug!(prompt_id = %prompt.id, order = prompt.order, "Dispatching prompt");
                    on_event(QueueEvent::Started {
                        prompt_id: prompt.id.clone(),
                    });
                    in_flight.push(self.process_prompt(prompt, worker, &retry_guard, on_event));
                    next_dispatch = Instant::now() + self.config.dispatch_delay;
                }
                continue;
            }

            let blocked = fatal.is_some() || control.is_stopped() || pending.is_empty();
            if in_flight.is_empty() && blocked {
                break;
            }

            tokio::select! {
                biased;
                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => match outcome {
                    PromptOutcome::Terminal(result) => {
                        results.push(result.clone());
                        on_event(QueueEvent::Finished {
                            result,
                            completed: results.len(),
                            total,
                        });
                    }
                    PromptOutcome::Fatal(prompt, error) => {
                        if fatal.is_none() {
                            warn!(prompt_id = %prompt.id, error = %error, "🚨 Batch-fatal error, aborting queue");
                            retry_guard.cancel();
                            fatal = Some(error);
                        }
                        unprocessed.push(prompt);
                    }
                },
                _ = control.stopped(), if !control.is_stopped() => {}
                _ = control.resumed(), if control.is_paused() && fatal.is_none() && !control.is_stopped() => {}
                _ = tokio::time::sleep_until(next_dispatch), if can_dispatch => {}
                else => break,
            }
        }

        unprocessed.extend(pending);
        let termination = match fatal {
            Some(error) => QueueTermination::Aborted(error),
            None if control.is_stopped() && !unprocessed.is_empty() => QueueTermination::Cancelled,
            None if control.is_stopped() && results.iter().any(is_cancelled) => {
                QueueTermination::Cancelled
            }
            None => QueueTermination::Completed,
        };

        info!(
            total = total,
            finished = results.len(),
            unprocessed = unprocessed.len(),
            termination = ?termination,
            "📋 Task queue finished"
        );

        QueueOutcome {
            results,
            unprocessed,
            termination,
        }
    }

    async fn process_prompt<W>(
        &self,
        prompt: TextPrompt,
        worker: &W,
        retry_guard: &CancellationToken,
        on_event: &(dyn Fn(QueueEvent) + Send + Sync),
    ) -> PromptOutcome
    where
        W: PromptWorker + ?Sized,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match worker.execute(&prompt, attempt).await {
                Ok(value) => {
                    return PromptOutcome::Terminal(PromptResult::succeeded(
                        &prompt.id,
                        value,
                        elapsed_ms(started),
                        attempt,
                    ))
                }
                Err(error) if error.is_batch_fatal() => return PromptOutcome::Fatal(prompt, error),
                Err(error) => error,
            };

            if attempt > self.config.max_retries {
                return PromptOutcome::Terminal(PromptResult::failed(
                    &prompt.id,
                    error.to_string(),
                    elapsed_ms(started),
                    attempt,
                ));
            }

            let delay = self.config.backoff.delay_for(attempt);
            on_event(QueueEvent::Retrying {
                prompt_id: prompt.id.clone(),
                attempt,
                delay,
                error: error.to_string(),
            });

            tokio::select! {
                biased;
                _ = retry_guard.cancelled() => {
                    return PromptOutcome::Terminal(PromptResult::failed(
                        &prompt.id,
                        messages::CANCELLED,
                        elapsed_ms(started),
                        attempt,
                    ));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn is_cancelled(result: &PromptResult) -> bool {
    result.error.as_deref() == Some(messages::CANCELLED)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformId;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn prompts(n: u32) -> Vec<TextPrompt> {
        (1..=n)
            .rev()
            .map(|i| TextPrompt::new(format!("p{i}"), format!("prompt {i}"), i))
            .collect()
    }

    fn queue(concurrency: usize, max_retries: u32) -> TaskQueue {
        TaskQueue::new(TaskQueueConfig {
            concurrency,
            max_retries,
            backoff: BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(4)),
            dispatch_delay: Duration::ZERO,
        })
    }

    fn transient(prompt: &TextPrompt) -> AutomationError {
        AutomationError::CircuitOpen {
            component: prompt.id.clone(),
        }
    }

    fn ignore(_: QueueEvent) {}

    #[tokio::test]
    async fn test_every_prompt_gets_one_result() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let worker = {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            move |prompt: TextPrompt, _attempt: u32| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(json!({ "id": prompt.id }))
                }
            }
        };

        let progress = Mutex::new(Vec::new());
        let on_event = |event: QueueEvent| {
            if let QueueEvent::Finished { completed, total, .. } = event {
                progress.lock().push((completed, total));
            }
        };

        let outcome = queue(4, 0)
            .run(prompts(20), &worker, &QueueControl::new(), &on_event)
            .await;

        assert!(matches!(outcome.termination, QueueTermination::Completed));
        assert_eq!(outcome.results.len(), 20);
        let ids: HashSet<_> = outcome.results.iter().map(|r| r.prompt_id.clone()).collect();
        assert_eq!(ids.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 4);

        let progress = progress.into_inner();
        assert_eq!(progress.len(), 20);
        assert!(progress.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(progress.last(), Some(&(20, 20)));
    }

    #[tokio::test]
    async fn test_prompts_start_in_order() {
        let started = Mutex::new(Vec::new());
        let on_event = |event: QueueEvent| {
            if let QueueEvent::Started { prompt_id } = event {
                started.lock().push(prompt_id);
            }
        };
        let worker = |_: TextPrompt, _: u32| async { Ok::<_, AutomationError>(json!({})) };

        queue(2, 0)
            .run(prompts(5), &worker, &QueueControl::new(), &on_event)
            .await;

        assert_eq!(started.into_inner(), vec!["p1", "p2", "p3", "p4", "p5"]);
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let worker = {
            let attempts = Arc::clone(&attempts);
            move |prompt: TextPrompt, attempt: u32| {
                attempts.fetch_add(1, Ordering::SeqCst);
                let result = if attempt <= 2 {
                    Err(transient(&prompt))
                } else {
                    Ok(json!({ "attempt": attempt }))
                };
                async move { result }
            }
        };

        let outcome = queue(1, 2)
            .run(prompts(1), &worker, &QueueControl::new(), &ignore)
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(outcome.results[0].success);
        assert_eq!(outcome.results[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_always_failing_worker_exhausts_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let worker = {
            let attempts = Arc::clone(&attempts);
            move |prompt: TextPrompt, _: u32| {
                attempts.fetch_add(1, Ordering::SeqCst);
                let error = transient(&prompt);
                async move { Err::<Value, _>(error) }
            }
        };

        let outcome = queue(1, 3)
            .run(prompts(1), &worker, &QueueControl::new(), &ignore)
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        let result = &outcome.results[0];
        assert!(!result.success);
        assert_eq!(result.attempts, 4);
        assert!(result.error.as_deref().unwrap().contains("Circuit breaker is open"));
        assert!(matches!(outcome.termination, QueueTermination::Completed));
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_queue() {
        let worker = |prompt: TextPrompt, _: u32| async move {
            if prompt.id == "p2" {
                Err(AutomationError::NoBackendAvailable {
                    platform: PlatformId::Claude,
                })
            } else {
                Ok(json!({}))
            }
        };

        let outcome = queue(1, 5)
            .run(prompts(4), &worker, &QueueControl::new(), &ignore)
            .await;

        assert!(matches!(
            outcome.termination,
            QueueTermination::Aborted(AutomationError::NoBackendAvailable { .. })
        ));
        assert_eq!(outcome.results.len(), 1);
        let unprocessed: Vec<_> = outcome.unprocessed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(unprocessed, vec!["p2", "p3", "p4"]);
    }

    #[tokio::test]
    async fn test_stop_leaves_unstarted_prompts() {
        let control = QueueControl::new();
        let stopper = control.clone();
        let on_event = move |event: QueueEvent| {
            if let QueueEvent::Finished { completed: 1, .. } = event {
                stopper.stop();
            }
        };
        let worker = |_: TextPrompt, _: u32| async { Ok::<_, AutomationError>(json!({})) };

        let outcome = queue(1, 0).run(prompts(3), &worker, &control, &on_event).await;

        assert!(matches!(outcome.termination, QueueTermination::Cancelled));
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.unprocessed.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_preempts_pending_retry() {
        let control = QueueControl::new();
        let stopper = control.clone();
        let on_event = move |event: QueueEvent| {
            if let QueueEvent::Retrying { .. } = event {
                stopper.stop();
            }
        };
        let worker = |prompt: TextPrompt, _: u32| {
            let error = transient(&prompt);
            async move { Err::<Value, _>(error) }
        };

        let outcome = TaskQueue::new(TaskQueueConfig {
            concurrency: 1,
            max_retries: 3,
            backoff: BackoffPolicy::new(Duration::from_secs(30), Duration::from_secs(30)),
            dispatch_delay: Duration::ZERO,
        })
        .run(prompts(2), &worker, &control, &on_event)
        .await;

        assert!(matches!(outcome.termination, QueueTermination::Cancelled));
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].error.as_deref(), Some("cancelled"));
        assert_eq!(outcome.results[0].attempts, 1);
        assert_eq!(outcome.unprocessed.len(), 1);
    }

    #[tokio::test]
    async fn test_pause_holds_dispatch_until_resume() {
        let control = QueueControl::new();
        assert!(control.pause());
        assert!(!control.pause());

        let started = Arc::new(AtomicUsize::new(0));
        let on_event = {
            let started = Arc::clone(&started);
            move |event: QueueEvent| {
                if let QueueEvent::Started { .. } = event {
                    started.fetch_add(1, Ordering::SeqCst);
                }
            }
        };
        let worker = |_: TextPrompt, _: u32| async { Ok::<_, AutomationError>(json!({})) };

        let run_control = control.clone();
        let handle = tokio::spawn(async move {
            queue(2, 0)
                .run(prompts(3), &worker, &run_control, &on_event)
                .await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(started.load(Ordering::SeqCst), 0);

        assert!(control.resume());
        let outcome = handle.await.unwrap();
        assert!(matches!(outcome.termination, QueueTermination::Completed));
        assert_eq!(outcome.results.len(), 3);
    }

    #[tokio::test]
    async fn test_dispatch_delay_spaces_starts() {
        let worker = |_: TextPrompt, _: u32| async { Ok::<_, AutomationError>(json!({})) };
        let queue = TaskQueue::new(TaskQueueConfig {
            concurrency: 3,
            max_retries: 0,
            backoff: BackoffPolicy::default(),
            dispatch_delay: Duration::from_millis(20),
        });

        let started = Instant::now();
        queue
            .run(prompts(3), &worker, &QueueControl::new(), &ignore)
            .await;
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_empty_queue_completes() {
        let worker = |_: TextPrompt, _: u32| async { Ok::<_, AutomationError>(json!({})) };
        let outcome = queue(3, 0)
            .run(Vec::new(), &worker, &QueueControl::new(), &ignore)
            .await;
        assert!(outcome.results.is_empty());
        assert!(matches!(outcome.termination, QueueTermination::Completed));
    }
}
