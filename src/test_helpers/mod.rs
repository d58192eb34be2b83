// Test Helpers Module - scripted collaborators for unit and integration tests
//
// Provides a scripted stand-in for the automation backends and a batch store
// with injectable faults. Both implement the same traits the engine uses in
// production, so tests drive the real orchestration code end to end.

pub mod flaky_store;
pub mod scripted_client;

pub use flaky_store::FlakyBatchStore;
pub use scripted_client::{ProbeBehavior, ScriptedBackendClient, SubmitBehavior};
