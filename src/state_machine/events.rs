use serde::{Deserialize, Serialize};

/// Events that can trigger batch status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BatchEvent {
    /// Submit the batch for a run (also re-submits a finished batch)
    Submit,
    /// Begin dispatching prompts
    Start,
    Pause,
    Resume,
    /// Every prompt succeeded
    Complete,
    /// Mark batch as failed with error message
    Fail(String),
    /// User-initiated cancellation
    Stop,
}

impl BatchEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Stop => "stop",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}
