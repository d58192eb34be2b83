use thiserror::Error;

/// Failure of a single HTTP call against an automation backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {message}")]
    Decode { message: String },

    #[error("invalid backend URL '{url}'")]
    InvalidUrl { url: String },
}

impl ClientError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
