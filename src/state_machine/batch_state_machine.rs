use super::{
    errors::{StateMachineError, StateMachineResult},
    events::BatchEvent,
    states::BatchStatus,
};
use crate::models::Batch;
use tracing::debug;

/// Transition table for the batch lifecycle.
///
/// ```text
/// draft ─submit→ pending ─start→ running ─complete→ completed
///                   │               │ ▲
///                   │            pause resume
///                   │               ▼ │
///                   └──fail/stop── paused ──fail/stop→ failed | stopped
/// ```
///
/// Terminal batches may be submitted again for a fresh run.
pub struct BatchStateMachine;

impl BatchStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: BatchStatus,
        event: &BatchEvent,
    ) -> StateMachineResult<BatchStatus> {
        let target = match (current_state, event) {
            (BatchStatus::Draft | BatchStatus::Pending, BatchEvent::Submit) => BatchStatus::Pending,
            (state, BatchEvent::Submit) if state.is_terminal() => BatchStatus::Pending,

            (BatchStatus::Pending, BatchEvent::Start) => BatchStatus::Running,

            (BatchStatus::Running, BatchEvent::Pause) => BatchStatus::Paused,
            (BatchStatus::Paused, BatchEvent::Resume) => BatchStatus::Running,

            (BatchStatus::Running, BatchEvent::Complete) => BatchStatus::Completed,

            (
                BatchStatus::Pending | BatchStatus::Running | BatchStatus::Paused,
                BatchEvent::Fail(_),
            ) => BatchStatus::Failed,

            (
                BatchStatus::Pending | BatchStatus::Running | BatchStatus::Paused,
                BatchEvent::Stop,
            ) => BatchStatus::Stopped,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Apply an event to a batch, updating status and error message
    pub fn transition(batch: &mut Batch, event: BatchEvent) -> StateMachineResult<BatchStatus> {
        let from = batch.status;
        let target = Self::determine_target_state(from, &event)?;

        match &event {
            BatchEvent::Submit => batch.error_message = None,
            BatchEvent::Fail(message) => batch.error_message = Some(message.clone()),
            _ => {}
        }
        batch.status = target;

        debug!(
            batch_id = %batch.id,
            from = %from,
            to = %target,
            event = event.event_type(),
            "🔀 Batch status transition"
        );

        Ok(target)
    }
}
