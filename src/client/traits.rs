//! # Backend Client Traits
//!
//! The HTTP contract every automation backend exposes. The engine only talks
//! to backends through [`BackendClient`], so tests substitute scripted fakes
//! and production uses [`HttpBackendClient`](super::HttpBackendClient).

use super::error::ClientResult;
use crate::models::{BackendDescriptor, DebugLevel, LocalAiAssistant};
use crate::platform::PlatformId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `GET /health` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// `POST /browser/launch` request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
    pub browser_type: String,
    pub headless: bool,
    pub platform: PlatformId,
    pub target_url: String,
    /// Wait for the page to go idle before typing
    pub wait_for_idle: bool,
    pub element_timeout_ms: u64,
    pub debug_level: DebugLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ai_assistant: Option<LocalAiAssistant>,
}

/// `POST /browser/launch` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResponse {
    pub session_id: String,
}

/// `POST /prompt/submit` request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptSubmission {
    pub session_id: String,
    pub prompt: String,
    pub platform: PlatformId,
}

/// `POST /platform/detect` request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformDetectRequest {
    pub session_id: String,
    pub url: String,
}

/// `POST /platform/detect` response; unknown names are kept as raw strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformDetectResponse {
    pub platform: String,
}

impl PlatformDetectResponse {
    /// Parsed platform, if the backend answered with a known identifier
    pub fn platform_id(&self) -> Option<PlatformId> {
        self.platform.parse().ok()
    }
}

/// Contract toward one automation backend
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn health(&self, backend: &BackendDescriptor) -> ClientResult<HealthResponse>;

    async fn launch_browser(
        &self,
        backend: &BackendDescriptor,
        options: &LaunchOptions,
    ) -> ClientResult<LaunchResponse>;

    /// One call per prompt attempt; the payload is opaque to the engine
    async fn submit_prompt(
        &self,
        backend: &BackendDescriptor,
        submission: &PromptSubmission,
    ) -> ClientResult<Value>;

    async fn detect_platform(
        &self,
        backend: &BackendDescriptor,
        request: &PlatformDetectRequest,
    ) -> ClientResult<PlatformDetectResponse>;
}
