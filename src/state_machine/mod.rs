// Batch lifecycle state machine.
//
// Status changes on a batch go through `BatchStateMachine::transition`, which
// rejects any event the current status does not accept.

pub mod batch_state_machine;
pub mod errors;
pub mod events;
pub mod states;

pub use batch_state_machine::BatchStateMachine;
pub use errors::{StateMachineError, StateMachineResult};
pub use events::BatchEvent;
pub use states::BatchStatus;
