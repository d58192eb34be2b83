// Fault-injecting batch store for tests
//
// Wraps the in-memory store and fails (or silently drops) a scripted number of
// upcoming writes, so the orchestrator's retry-once persistence policy can be
// exercised without a real database.

use crate::models::{Batch, PromptResult};
use crate::persistence::{BatchStore, InMemoryBatchStore, StoreError, StoreResult};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct FlakyBatchStore {
    inner: InMemoryBatchStore,
    failing_saves: AtomicU32,
    dropped_saves: AtomicU32,
    failing_appends: AtomicU32,
    save_calls: AtomicUsize,
    append_calls: AtomicUsize,
}

impl FlakyBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` saves return `Unavailable`
    pub fn fail_next_saves(&self, n: u32) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    /// The next `n` saves report success but are not persisted
    pub fn drop_next_saves(&self, n: u32) {
        self.dropped_saves.store(n, Ordering::SeqCst);
    }

    /// The next `n` result appends return `Unavailable`
    pub fn fail_next_appends(&self, n: u32) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    fn take(budget: &AtomicU32) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl BatchStore for FlakyBatchStore {
    fn save_batch(&self, batch: &Batch) -> StoreResult<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.failing_saves) {
            return Err(StoreError::Unavailable {
                reason: "scripted save failure".to_string(),
            });
        }
        if Self::take(&self.dropped_saves) {
            return Ok(());
        }
        self.inner.save_batch(batch)
    }

    fn get_batch(&self, batch_id: &str) -> StoreResult<Batch> {
        self.inner.get_batch(batch_id)
    }

    fn append_prompt_result(&self, batch_id: &str, result: &PromptResult) -> StoreResult<()> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.failing_appends) {
            return Err(StoreError::Unavailable {
                reason: "scripted append failure".to_string(),
            });
        }
        self.inner.append_prompt_result(batch_id, result)
    }

    fn prompt_results(&self, batch_id: &str) -> StoreResult<Vec<PromptResult>> {
        self.inner.prompt_results(batch_id)
    }

    fn clear_prompt_results(&self, batch_id: &str) -> StoreResult<()> {
        self.inner.clear_prompt_results(batch_id)
    }
}
