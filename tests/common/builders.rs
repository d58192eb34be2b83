//! Builders shared by the integration tests.

use autopromptr_core::config::AutomationConfig;
use autopromptr_core::models::{Batch, BatchSettings, TextPrompt};
use autopromptr_core::orchestration::BatchOrchestrator;
use autopromptr_core::persistence::InMemoryBatchStore;
use autopromptr_core::services::BackendRegistry;
use autopromptr_core::test_helpers::ScriptedBackendClient;
use std::sync::Arc;

/// Default configuration with millisecond backoff so retries stay fast
pub fn fast_config() -> AutomationConfig {
    let mut config = AutomationConfig::default();
    config.queue.backoff_base_ms = 1;
    config.queue.max_backoff_ms = 4;
    config
}

pub fn prompts(prefix: &str, count: u32) -> Vec<TextPrompt> {
    (1..=count)
        .map(|i| TextPrompt::new(format!("{prefix}-p{i}"), format!("{prefix} prompt {i}"), i))
        .collect()
}

/// Batch builder with zero dispatch delay
pub struct BatchBuilder {
    id: String,
    url: String,
    prompts: u32,
    max_retries: u32,
}

impl BatchBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            url: "https://claude.ai/new".to_string(),
            prompts: 3,
            max_retries: 3,
        }
    }

    pub fn url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn prompts(mut self, count: u32) -> Self {
        self.prompts = count;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn build(self) -> Batch {
        Batch::new(
            self.id.as_str(),
            format!("Batch {}", self.id),
            self.url,
            prompts(&self.id, self.prompts),
        )
        .with_settings(BatchSettings {
            max_retries: self.max_retries,
            automation_delay_ms: 0,
            ..BatchSettings::default()
        })
    }
}

/// Orchestrator wired to a scripted client and an in-memory store
pub struct Harness {
    pub client: Arc<ScriptedBackendClient>,
    pub store: Arc<InMemoryBatchStore>,
    pub orchestrator: BatchOrchestrator,
}

impl Harness {
    pub fn new(config: AutomationConfig) -> Self {
        let client = Arc::new(ScriptedBackendClient::new());
        let store = Arc::new(InMemoryBatchStore::new());
        let registry = BackendRegistry::from_config(&config);
        let orchestrator = BatchOrchestrator::new(
            config,
            client.clone(),
            registry,
            store.clone(),
        );
        Self {
            client,
            store,
            orchestrator,
        }
    }
}
