mod common;

use autopromptr_core::error::AutomationError;
use autopromptr_core::models::TextPrompt;
use autopromptr_core::orchestration::{
    BackoffPolicy, QueueControl, QueueEvent, QueueTermination, TaskQueue, TaskQueueConfig,
};
use common::prompts;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn queue(concurrency: usize, max_retries: u32) -> TaskQueue {
    TaskQueue::new(TaskQueueConfig {
        concurrency,
        max_retries,
        backoff: BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(4)),
        dispatch_delay: Duration::ZERO,
    })
}

#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_fifty(concurrency: usize) {
    let gauge = Arc::new(Gauge::default());
    let seen: Arc<Mutex<HashMap<String, usize>>> = Arc::default();

    let worker = {
        let gauge = Arc::clone(&gauge);
        let seen = Arc::clone(&seen);
        move |prompt: TextPrompt, _attempt: u32| {
            let gauge = Arc::clone(&gauge);
            let seen = Arc::clone(&seen);
            async move {
                gauge.enter();
                *seen.lock().entry(prompt.id.clone()).or_default() += 1;
                tokio::time::sleep(Duration::from_millis(5)).await;
                gauge.exit();
                Ok::<_, AutomationError>(json!({ "id": prompt.id }))
            }
        }
    };

    let outcome = queue(concurrency, 0)
        .run(prompts("q", 50), &worker, &QueueControl::new(), &|_| {})
        .await;

    assert!(matches!(outcome.termination, QueueTermination::Completed));
    assert_eq!(outcome.results.len(), 50);
    assert!(outcome.results.iter().all(|r| r.success));
    assert!(outcome.unprocessed.is_empty());

    let seen = seen.lock();
    assert_eq!(seen.len(), 50);
    assert!(seen.values().all(|count| *count == 1));

    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!(peak <= concurrency, "peak {peak} exceeded {concurrency}");
    if concurrency > 1 {
        assert!(peak > 1, "queue never overlapped prompts");
    }
}

#[tokio::test]
async fn test_fifty_prompts_serial() {
    run_fifty(1).await;
}

#[tokio::test]
async fn test_fifty_prompts_concurrency_three() {
    run_fifty(3).await;
}

#[tokio::test]
async fn test_fifty_prompts_concurrency_ten() {
    run_fifty(10).await;
}

#[tokio::test]
async fn test_transient_failures_retry_until_success() {
    let attempts: Arc<Mutex<HashMap<String, u32>>> = Arc::default();
    let worker = {
        let attempts = Arc::clone(&attempts);
        move |prompt: TextPrompt, attempt: u32| {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.lock().insert(prompt.id.clone(), attempt);
                if attempt < 3 {
                    Err::<Value, _>(AutomationError::Validation { reason: "transient".to_string() })
                } else {
                    Ok(json!("ok"))
                }
            }
        }
    };

    let retries = AtomicUsize::new(0);
    let on_event = |event: QueueEvent| {
        if matches!(event, QueueEvent::Retrying { .. }) {
            retries.fetch_add(1, Ordering::SeqCst);
        }
    };

    let outcome = queue(2, 3)
        .run(prompts("r", 4), &worker, &QueueControl::new(), &on_event)
        .await;

    assert!(outcome.results.iter().all(|r| r.success && r.attempts == 3));
    assert_eq!(retries.load(Ordering::SeqCst), 8);
    assert!(attempts.lock().values().all(|attempt| *attempt == 3));
}

#[tokio::test]
async fn test_exhausted_retries_record_failure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let worker = {
        let calls = Arc::clone(&calls);
        move |_prompt: TextPrompt, _attempt: u32| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Value, _>(AutomationError::Validation { reason: "always".to_string() })
            }
        }
    };

    let outcome = queue(1, 2)
        .run(prompts("x", 2), &worker, &QueueControl::new(), &|_| {})
        .await;

    assert!(matches!(outcome.termination, QueueTermination::Completed));
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.results.iter().all(|r| !r.success && r.attempts == 3));
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}
