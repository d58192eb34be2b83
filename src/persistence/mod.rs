//! Persistence collaborator: the batch store contract and an in-memory store.

pub mod store;

pub use store::{BatchStore, InMemoryBatchStore, StoreError, StoreResult};
