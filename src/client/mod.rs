//! HTTP contract toward the automation backends.

pub mod error;
pub mod http_client;
pub mod traits;

pub use error::{ClientError, ClientResult};
pub use http_client::HttpBackendClient;
pub use traits::{
    BackendClient, HealthResponse, LaunchOptions, LaunchResponse, PlatformDetectRequest,
    PlatformDetectResponse, PromptSubmission,
};
