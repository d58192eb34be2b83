//! # Prompt Dispatcher
//!
//! The [`PromptWorker`] the batch orchestrator hands to the task queue. Every
//! attempt picks a backend afresh from live breaker state, then runs session
//! launch (if needed) plus `/prompt/submit` inside that backend's breaker and
//! under the per-attempt timeout.
//!
//! Browser sessions are launched lazily, once per backend per run, and reused
//! by every submission. Each backend has its own session slot, so a slow launch
//! on one backend never holds up attempts on another. A failed attempt discards
//! the backend's session so the next attempt relaunches.

use super::task_queue::PromptWorker;
use crate::client::{
    BackendClient, ClientError, ClientResult, LaunchOptions, PlatformDetectRequest,
    PromptSubmission,
};
use crate::config::OrchestrationConfig;
use crate::constants::operations;
use crate::error::{AutomationError, AutomationResult};
use crate::logging::{log_backend_operation, log_prompt_operation};
use crate::models::{BackendDescriptor, BatchSettings, DebugLevel, LocalAiAssistant, TextPrompt};
use crate::platform::PlatformId;
use crate::resilience::CircuitBreakerError;
use crate::services::{BackendRegistry, BackendSelector};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Browser settings sent with `/browser/launch`: engine-wide browser choice
/// plus the batch's own automation settings
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub browser_type: String,
    pub headless: bool,
    pub wait_for_idle: bool,
    pub element_timeout_ms: u64,
    pub debug_level: DebugLevel,
    pub local_ai_assistant: Option<LocalAiAssistant>,
}

impl LaunchSettings {
    pub fn new(config: &OrchestrationConfig, settings: &BatchSettings) -> Self {
        Self {
            browser_type: config.browser_type.clone(),
            headless: config.headless,
            wait_for_idle: settings.wait_for_idle,
            element_timeout_ms: settings.element_timeout_ms,
            debug_level: settings.debug_level,
            local_ai_assistant: settings.local_ai_assistant.clone(),
        }
    }
}

type SessionSlot = Arc<Mutex<Option<String>>>;

pub struct PromptDispatcher {
    batch_id: String,
    target_url: String,
    platform: PlatformId,
    client: Arc<dyn BackendClient>,
    registry: BackendRegistry,
    selector: BackendSelector,
    launch: LaunchSettings,
    attempt_timeout: Duration,
    sessions: DashMap<String, SessionSlot>,
}

impl std::fmt::Debug for PromptDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptDispatcher")
            .field("batch_id", &self.batch_id)
            .field("platform", &self.platform)
            .field("backends", &self.registry.len())
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl PromptDispatcher {
    pub fn new(
        batch_id: impl Into<String>,
        target_url: impl Into<String>,
        platform: PlatformId,
        client: Arc<dyn BackendClient>,
        registry: BackendRegistry,
        launch: LaunchSettings,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            batch_id: batch_id.into(),
            target_url: target_url.into(),
            platform,
            client,
            registry,
            selector: BackendSelector::new(),
            launch,
            attempt_timeout,
            sessions: DashMap::new(),
        }
    }

    pub fn platform(&self) -> PlatformId {
        self.platform
    }

    pub fn set_platform(&mut self, platform: PlatformId) {
        self.platform = platform;
    }

    /// Ask the selected backend's `/platform/detect`; `None` on any failure
    pub async fn detect_remote_platform(&self) -> Option<PlatformId> {
        let backend = self
            .selector
            .select(self.platform, &self.registry.descriptors())
            .ok()?;

        let breaker = self.registry.breaker(&backend.name);
        let detected = breaker
            .call(|| async {
                let detection = async {
                    let session_id = self.session_for(&backend).await?;
                    let request = PlatformDetectRequest {
                        session_id,
                        url: self.target_url.clone(),
                    };
                    self.client.detect_platform(&backend, &request).await
                };
                tokio::time::timeout(self.attempt_timeout, detection)
                    .await
                    .unwrap_or(Err(ClientError::Timeout {
                        timeout_ms: self.attempt_timeout.as_millis() as u64,
                    }))
            })
            .await;

        match detected {
            Ok(response) => {
                let platform = response.platform_id();
                info!(
                    batch_id = %self.batch_id,
                    backend = %backend.name,
                    answer = %response.platform,
                    recognized = platform.is_some(),
                    "🔍 Backend-assisted platform detection"
                );
                platform
            }
            Err(err) => {
                if matches!(err, CircuitBreakerError::OperationFailed(_)) {
                    self.discard_session(&backend.name).await;
                }
                warn!(
                    batch_id = %self.batch_id,
                    backend = %backend.name,
                    error = %err,
                    "Platform detection failed, keeping local result"
                );
                None
            }
        }
    }

    fn session_slot(&self, backend: &str) -> SessionSlot {
        Arc::clone(self.sessions.entry(backend.to_string()).or_default().value())
    }

    async fn session_for(&self, backend: &BackendDescriptor) -> ClientResult<String> {
        // Serializes launches for this backend only
        let slot = self.session_slot(&backend.name);
        let mut session = slot.lock().await;
        if let Some(session_id) = session.as_ref() {
            return Ok(session_id.clone());
        }

        let options = LaunchOptions {
            browser_type: self.launch.browser_type.clone(),
            headless: self.launch.headless,
            platform: self.platform,
            target_url: self.target_url.clone(),
            wait_for_idle: self.launch.wait_for_idle,
            element_timeout_ms: self.launch.element_timeout_ms,
            debug_level: self.launch.debug_level,
            local_ai_assistant: self.launch.local_ai_assistant.clone(),
        };
        let started = std::time::Instant::now();
        let response = self.client.launch_browser(backend, &options).await?;
        log_backend_operation(
            operations::LAUNCH_BROWSER,
            &backend.name,
            "launched",
            Some(started.elapsed().as_millis() as u64),
            Some(&response.session_id),
        );
        *session = Some(response.session_id.clone());
        Ok(response.session_id)
    }

    async fn discard_session(&self, backend: &str) {
        let slot = self.session_slot(backend);
        *slot.lock().await = None;
    }

    async fn submit_once(&self, backend: &BackendDescriptor, prompt: &TextPrompt) -> ClientResult<Value> {
        let attempt = async {
            let session_id = self.session_for(backend).await?;
            let submission = PromptSubmission {
                session_id,
                prompt: prompt.text.clone(),
                platform: self.platform,
            };
            self.client.submit_prompt(backend, &submission).await
        };

        match tokio::time::timeout(self.attempt_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout {
                timeout_ms: self.attempt_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl PromptWorker for PromptDispatcher {
    async fn execute(&self, prompt: &TextPrompt, attempt: u32) -> AutomationResult<Value> {
        let backend = self
            .selector
            .select(self.platform, &self.registry.descriptors())?;
        let breaker = self.registry.breaker(&backend.name);

        match breaker.call(|| self.submit_once(&backend, prompt)).await {
            Ok(value) => {
                log_prompt_operation(
                    operations::SUBMIT_PROMPT,
                    &self.batch_id,
                    &prompt.id,
                    Some(attempt),
                    "success",
                    Some(&backend.name),
                );
                Ok(value)
            }
            Err(CircuitBreakerError::CircuitOpen { component }) => {
                debug!(prompt_id = %prompt.id, backend = %component, "Attempt short-circuited");
                Err(AutomationError::CircuitOpen { component })
            }
            Err(CircuitBreakerError::OperationFailed(source)) => {
                self.discard_session(&backend.name).await;
                let error = AutomationError::Backend {
                    backend: backend.name.clone(),
                    source,
                };
                log_prompt_operation(
                    operations::SUBMIT_PROMPT,
                    &self.batch_id,
                    &prompt.id,
                    Some(attempt),
                    "failed",
                    Some(&error.to_string()),
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AutomationConfig;
    use crate::resilience::CircuitState;
    use crate::test_helpers::{ScriptedBackendClient, SubmitBehavior};

    fn dispatcher(
        client: Arc<ScriptedBackendClient>,
        platform: PlatformId,
        timeout: Duration,
    ) -> (PromptDispatcher, BackendRegistry) {
        let mut config = AutomationConfig::default();
        config.circuit_breakers.failure_threshold = 2;
        let registry = BackendRegistry::from_config(&config);
        let dispatcher = PromptDispatcher::new(
            "b1",
            "https://claude.ai/new",
            platform,
            client,
            registry.clone(),
            LaunchSettings::new(&config.orchestration, &BatchSettings::default()),
            timeout,
        );
        (dispatcher, registry)
    }

    fn prompt(id: &str) -> TextPrompt {
        TextPrompt::new(id, format!("text of {id}"), 1)
    }

    #[tokio::test]
    async fn test_session_launched_once_and_reused() {
        let client = Arc::new(ScriptedBackendClient::new());
        let (dispatcher, _) = dispatcher(Arc::clone(&client), PlatformId::Claude, Duration::from_secs(5));

        for id in ["p1", "p2", "p3"] {
            dispatcher.execute(&prompt(id), 1).await.unwrap();
        }

        assert_eq!(client.launch_calls("python"), 1);
        assert_eq!(client.submit_calls("python"), 3);
        assert_eq!(client.submit_calls("nodejs"), 0);
    }

    #[tokio::test]
    async fn test_launch_carries_batch_settings() {
        let client = Arc::new(ScriptedBackendClient::new());
        let config = AutomationConfig::default();
        let settings = BatchSettings {
            wait_for_idle: false,
            element_timeout_ms: 4_500,
            debug_level: DebugLevel::Verbose,
            local_ai_assistant: Some(LocalAiAssistant {
                enabled: true,
                assistant_type: "ollama".to_string(),
            }),
            ..BatchSettings::default()
        };
        let dispatcher = PromptDispatcher::new(
            "b1",
            "https://claude.ai/new",
            PlatformId::Claude,
            client.clone(),
            BackendRegistry::from_config(&config),
            LaunchSettings::new(&config.orchestration, &settings),
            Duration::from_secs(5),
        );

        dispatcher.execute(&prompt("p1"), 1).await.unwrap();

        let launched = client.last_launch("python").unwrap();
        assert_eq!(launched.browser_type, config.orchestration.browser_type);
        assert_eq!(launched.platform, PlatformId::Claude);
        assert!(!launched.wait_for_idle);
        assert_eq!(launched.element_timeout_ms, 4_500);
        assert_eq!(launched.debug_level, DebugLevel::Verbose);
        assert_eq!(
            launched.local_ai_assistant.map(|a| a.assistant_type),
            Some("ollama".to_string())
        );
    }

    #[tokio::test]
    async fn test_slow_launch_does_not_block_other_backend() {
        let client = Arc::new(ScriptedBackendClient::new());
        client.delay_launches("python", Duration::from_millis(400));
        let (dispatcher, registry) =
            dispatcher(Arc::clone(&client), PlatformId::Claude, Duration::from_secs(5));

        let p1 = prompt("p1");
        let slow = dispatcher.execute(&p1, 1);
        let fast = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            // Python is mid-launch; open its breaker so the next attempt goes to nodejs
            let python = registry.breaker("python");
            for _ in 0..2 {
                let _ = python
                    .call(|| async { Err::<(), _>(ClientError::network("refused")) })
                    .await;
            }
            let started = tokio::time::Instant::now();
            let result = dispatcher.execute(&prompt("p2"), 1).await;
            (result, started.elapsed())
        };

        let (slow_result, (fast_result, fast_elapsed)) = tokio::join!(slow, fast);
        slow_result.unwrap();
        fast_result.unwrap();
        assert!(fast_elapsed < Duration::from_millis(200), "took {fast_elapsed:?}");
        assert_eq!(client.launch_calls("python"), 1);
        assert_eq!(client.launch_calls("nodejs"), 1);
        assert_eq!(client.submit_calls("nodejs"), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_counts_against_breaker() {
        let client = Arc::new(ScriptedBackendClient::new());
        client.fail_launches("python", true);
        let (dispatcher, registry) =
            dispatcher(Arc::clone(&client), PlatformId::Claude, Duration::from_secs(5));

        let err = dispatcher.execute(&prompt("p1"), 1).await.unwrap_err();
        assert!(matches!(err, AutomationError::Backend { ref backend, .. } if backend == "python"));
        assert_eq!(client.submit_calls("python"), 0);
        assert_eq!(registry.breaker("python").metrics().failure_count, 1);

        client.fail_launches("python", false);
        dispatcher.execute(&prompt("p1"), 2).await.unwrap();
        assert_eq!(client.launch_calls("python"), 2);
        assert_eq!(client.submit_calls("python"), 1);
    }

    #[tokio::test]
    async fn test_failure_discards_session_and_feeds_breaker() {
        let client = Arc::new(ScriptedBackendClient::new());
        client.set_submit("python", SubmitBehavior::AlwaysFail { status: 500 });
        let (dispatcher, registry) =
            dispatcher(Arc::clone(&client), PlatformId::Claude, Duration::from_secs(5));

        let err = dispatcher.execute(&prompt("p1"), 1).await.unwrap_err();
        assert!(matches!(err, AutomationError::Backend { ref backend, .. } if backend == "python"));
        assert!(err.is_retryable());

        dispatcher.execute(&prompt("p1"), 2).await.unwrap_err();
        assert_eq!(client.launch_calls("python"), 2);
        assert_eq!(registry.breaker("python").state(), CircuitState::Open);

        // Python is open; the next attempt fails over to nodejs
        dispatcher.execute(&prompt("p1"), 3).await.unwrap();
        assert_eq!(client.submit_calls("nodejs"), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let client = Arc::new(ScriptedBackendClient::new());
        client.set_submit("nodejs", SubmitBehavior::Hang);
        let (dispatcher, registry) =
            dispatcher(Arc::clone(&client), PlatformId::Gemini, Duration::from_millis(20));

        let err = dispatcher.execute(&prompt("p1"), 1).await.unwrap_err();
        assert!(matches!(
            err,
            AutomationError::Backend {
                source: ClientError::Timeout { timeout_ms: 20 },
                ..
            }
        ));
        assert_eq!(registry.breaker("nodejs").metrics().failure_count, 1);
    }

    #[tokio::test]
    async fn test_no_backend_available_when_all_open() {
        let client = Arc::new(ScriptedBackendClient::new());
        client.set_submit("python", SubmitBehavior::AlwaysFail { status: 502 });
        client.set_submit("nodejs", SubmitBehavior::AlwaysFail { status: 502 });
        let (dispatcher, _) = dispatcher(Arc::clone(&client), PlatformId::ChatGpt, Duration::from_secs(5));

        for attempt in 1..=4 {
            let _ = dispatcher.execute(&prompt("p1"), attempt).await;
        }

        let submits_before = client.submit_calls("python") + client.submit_calls("nodejs");
        let err = dispatcher.execute(&prompt("p1"), 5).await.unwrap_err();
        assert!(matches!(
            err,
            AutomationError::NoBackendAvailable {
                platform: PlatformId::ChatGpt
            }
        ));
        assert!(err.is_batch_fatal());
        assert_eq!(
            client.submit_calls("python") + client.submit_calls("nodejs"),
            submits_before
        );
    }

    #[tokio::test]
    async fn test_remote_detection() {
        let client = Arc::new(ScriptedBackendClient::new());
        client.set_detected_platform("nodejs", "perplexity");
        let (dispatcher, _) = dispatcher(Arc::clone(&client), PlatformId::GenericWeb, Duration::from_secs(5));

        assert_eq!(dispatcher.detect_remote_platform().await, Some(PlatformId::Perplexity));
        assert_eq!(client.detect_calls("nodejs"), 1);

        // The detection session is reused for submissions
        dispatcher.execute(&prompt("p1"), 1).await.unwrap();
        assert_eq!(client.launch_calls("nodejs"), 1);

        client.set_detected_platform("nodejs", "some-new-ai");
        assert_eq!(dispatcher.detect_remote_platform().await, None);
    }
}
