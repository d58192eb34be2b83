use crate::models::{Batch, PromptResult};
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("batch '{batch_id}' not found")]
    NotFound { batch_id: String },

    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("write rejected: {reason}")]
    Rejected { reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Data-access contract for batch rows and their prompt results.
///
/// Calls are synchronous and may fail; the orchestrator retries each one at
/// most once before aborting the run.
pub trait BatchStore: Send + Sync {
    /// Insert or replace the batch row
    fn save_batch(&self, batch: &Batch) -> StoreResult<()>;

    fn get_batch(&self, batch_id: &str) -> StoreResult<Batch>;

    fn append_prompt_result(&self, batch_id: &str, result: &PromptResult) -> StoreResult<()>;

    /// Results appended for a batch, in append order
    fn prompt_results(&self, batch_id: &str) -> StoreResult<Vec<PromptResult>>;

    /// Forget a batch's results; a no-op when there are none
    fn clear_prompt_results(&self, batch_id: &str) -> StoreResult<()>;
}

/// Process-local store backed by concurrent maps
#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    batches: DashMap<String, Batch>,
    results: DashMap<String, Vec<PromptResult>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl BatchStore for InMemoryBatchStore {
    fn save_batch(&self, batch: &Batch) -> StoreResult<()> {
        debug!(batch_id = %batch.id, status = %batch.status, "💾 Saving batch");
        self.batches.insert(batch.id.clone(), batch.clone());
        Ok(())
    }

    fn get_batch(&self, batch_id: &str) -> StoreResult<Batch> {
        self.batches
            .get(batch_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                batch_id: batch_id.to_string(),
            })
    }

    fn append_prompt_result(&self, batch_id: &str, result: &PromptResult) -> StoreResult<()> {
        if !self.batches.contains_key(batch_id) {
            return Err(StoreError::NotFound {
                batch_id: batch_id.to_string(),
            });
        }
        self.results
            .entry(batch_id.to_string())
            .or_default()
            .push(result.clone());
        Ok(())
    }

    fn prompt_results(&self, batch_id: &str) -> StoreResult<Vec<PromptResult>> {
        if !self.batches.contains_key(batch_id) {
            return Err(StoreError::NotFound {
                batch_id: batch_id.to_string(),
            });
        }
        Ok(self
            .results
            .get(batch_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn clear_prompt_results(&self, batch_id: &str) -> StoreResult<()> {
        self.results.remove(batch_id);
        Ok(())
    }
}
