//! # Batch Model
//!
//! A batch is a named, ordered collection of text prompts delivered to one
//! automation target.
//!
//! ## Overview
//!
//! Batches are created by the caller, mutated only by the batch orchestrator
//! during a run, and persisted through the [`BatchStore`](crate::persistence::BatchStore)
//! collaborator. Settings are attached at submission time and are read-only
//! while the batch runs.
//!
//! ## Validation
//!
//! [`Batch::validate`] enforces the submission rules before any work starts:
//! - non-blank name
//! - target is a remote `http(s)` URL or a local path (`/`, `~/`, `./`, `C:\`)
//! - between one and `max_prompts` prompts, none blank, ids unique

use crate::constants::defaults;
use crate::error::{AutomationError, AutomationResult};
use crate::platform::PlatformId;
use crate::state_machine::BatchStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// A batch of prompts targeting one platform URL.
///
/// `prompts` are processed in ascending `order`; the vector itself may be in any
/// order. `platform` is filled in by the orchestrator when the caller leaves it
/// unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub name: String,
    pub target_url: String,
    pub prompts: Vec<TextPrompt>,
    pub status: BatchStatus,
    #[serde(default)]
    pub platform: Option<PlatformId>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub settings: BatchSettings,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    /// Create a draft batch with default settings
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        target_url: impl Into<String>,
        prompts: Vec<TextPrompt>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            target_url: target_url.into(),
            prompts,
            status: BatchStatus::Draft,
            platform: None,
            error_message: None,
            settings: BatchSettings::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_settings(mut self, settings: BatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_platform(mut self, platform: PlatformId) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Prompts sorted by their processing order
    pub fn ordered_prompts(&self) -> Vec<TextPrompt> {
        let mut prompts = self.prompts.clone();
        prompts.sort_by_key(|prompt| prompt.order);
        prompts
    }

    /// Check submission rules; `max_prompts` comes from orchestration config
    pub fn validate(&self, max_prompts: usize) -> AutomationResult<()> {
        if self.name.trim().is_empty() {
            return Err(AutomationError::validation("batch name is required"));
        }

        let target = self.target_url.trim();
        if target.is_empty() {
            return Err(AutomationError::validation("target URL is required"));
        }
        if !is_remote_url(target) && !is_local_path(target) {
            return Err(AutomationError::validation(format!(
                "target '{target}' is neither an http(s) URL nor a local path"
            )));
        }

        if self.prompts.is_empty() {
            return Err(AutomationError::validation(
                "at least one prompt is required",
            ));
        }
        if self.prompts.len() > max_prompts {
            return Err(AutomationError::validation(format!(
                "batch has {} prompts, maximum is {max_prompts}",
                self.prompts.len()
            )));
        }

        let mut ids = HashSet::with_capacity(self.prompts.len());
        for prompt in &self.prompts {
            if prompt.text.trim().is_empty() {
                return Err(AutomationError::validation(format!(
                    "prompt '{}' has no text",
                    prompt.id
                )));
            }
            if !ids.insert(prompt.id.as_str()) {
                return Err(AutomationError::validation(format!(
                    "duplicate prompt id '{}'",
                    prompt.id
                )));
            }
        }

        Ok(())
    }
}

fn is_remote_url(target: &str) -> bool {
    url::Url::parse(target)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

fn is_local_path(target: &str) -> bool {
    let bytes = target.as_bytes();
    let windows_drive = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/');

    target.starts_with('/') || target.starts_with("~/") || target.starts_with("./") || windows_drive
}

/// A single prompt; `order` defines its processing sequence within the batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPrompt {
    pub id: String,
    pub text: String,
    pub order: u32,
}

impl TextPrompt {
    pub fn new(id: impl Into<String>, text: impl Into<String>, order: u32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            order,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    Minimal,
    #[default]
    Standard,
    Detailed,
    Verbose,
}

/// Optional local model used to assist automation on the backend side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAiAssistant {
    pub enabled: bool,
    pub assistant_type: String,
}

/// Per-batch automation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchSettings {
    pub wait_for_idle: bool,
    pub max_retries: u32,
    /// Delay between consecutive prompt dispatches
    pub automation_delay_ms: u64,
    pub element_timeout_ms: u64,
    pub debug_level: DebugLevel,
    pub local_ai_assistant: Option<LocalAiAssistant>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            wait_for_idle: true,
            max_retries: defaults::MAX_PROMPT_RETRIES,
            automation_delay_ms: defaults::AUTOMATION_DELAY_MS,
            element_timeout_ms: defaults::ELEMENT_TIMEOUT_MS,
            debug_level: DebugLevel::default(),
            local_ai_assistant: None,
        }
    }
}

impl BatchSettings {
    pub fn automation_delay(&self) -> Duration {
        Duration::from_millis(self.automation_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompts(n: u32) -> Vec<TextPrompt> {
        (1..=n)
            .map(|i| TextPrompt::new(format!("p{i}"), format!("prompt {i}"), i))
            .collect()
    }

    #[test]
    fn test_valid_batch() {
        let batch = Batch::new("b1", "Demo", "https://claude.ai/new", prompts(3));
        assert!(batch.validate(50).is_ok());
        assert_eq!(batch.status, BatchStatus::Draft);
    }

    #[test]
    fn test_local_paths_accepted() {
        for target in ["/home/me/app", "~/projects/site", "./index.html", "C:\\sites\\app"] {
            let batch = Batch::new("b1", "Local", target, prompts(1));
            assert!(batch.validate(50).is_ok(), "{target} should be accepted");
        }
    }

    #[test]
    fn test_validation_failures() {
        let blank_name = Batch::new("b1", "  ", "https://claude.ai", prompts(1));
        assert!(blank_name.validate(50).is_err());

        let bad_target = Batch::new("b1", "x", "claude dot ai", prompts(1));
        assert!(bad_target.validate(50).is_err());

        let no_prompts = Batch::new("b1", "x", "https://claude.ai", vec![]);
        assert!(no_prompts.validate(50).is_err());

        let too_many = Batch::new("b1", "x", "https://claude.ai", prompts(51));
        assert!(too_many.validate(50).is_err());

        let mut blank_prompt = prompts(2);
        blank_prompt[1].text = "   ".to_string();
        let batch = Batch::new("b1", "x", "https://claude.ai", blank_prompt);
        assert!(batch.validate(50).is_err());

        let mut duplicate = prompts(2);
        duplicate[1].id = "p1".to_string();
        let batch = Batch::new("b1", "x", "https://claude.ai", duplicate);
        let err = batch.validate(50).unwrap_err();
        assert!(err.to_string().contains("duplicate prompt id"));
    }

    #[test]
    fn test_ordered_prompts() {
        let batch = Batch::new(
            "b1",
            "x",
            "https://claude.ai",
            vec![
                TextPrompt::new("c", "third", 3),
                TextPrompt::new("a", "first", 1),
                TextPrompt::new("b", "second", 2),
            ],
        );
        let ids: Vec<_> = batch.ordered_prompts().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: BatchSettings =
            serde_json::from_str(r#"{"maxRetries": 5, "debugLevel": "verbose"}"#).unwrap();
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.debug_level, DebugLevel::Verbose);
        assert_eq!(settings.automation_delay_ms, 2_000);
    }
}
