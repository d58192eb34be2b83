use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateMachineError {
    #[error("Invalid transition from '{from}' on event '{event}'")]
    InvalidTransition { from: String, event: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
