// Scripted backend client for tests
//
// Stands in for the HTTP backends: each backend name gets a probe behavior and a
// submit behavior, and every call is counted so tests can assert on exactly
// which network calls were (or were not) made.

use crate::client::{
    BackendClient, ClientError, ClientResult, HealthResponse, LaunchOptions, LaunchResponse,
    PlatformDetectRequest, PlatformDetectResponse, PromptSubmission,
};
use crate::models::BackendDescriptor;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const HANG: Duration = Duration::from_secs(3600);

/// How `GET /health` answers for a backend
#[derive(Debug, Clone)]
pub enum ProbeBehavior {
    Healthy,
    Slow(Duration),
    Status(u16),
    Hang,
}

/// How `POST /prompt/submit` answers for a backend
#[derive(Debug, Clone)]
pub enum SubmitBehavior {
    Succeed,
    Slow(Duration),
    AlwaysFail { status: u16 },
    /// Fail the first `n` submissions of each prompt, then succeed
    FailTimes(u32),
    Hang,
}

#[derive(Debug, Default)]
pub struct ScriptedBackendClient {
    probes: Mutex<HashMap<String, ProbeBehavior>>,
    submits: Mutex<HashMap<String, SubmitBehavior>>,
    failing_launches: Mutex<HashMap<String, bool>>,
    launch_delays: Mutex<HashMap<String, Duration>>,
    launch_options: Mutex<HashMap<String, LaunchOptions>>,
    detected: Mutex<HashMap<String, String>>,
    calls: Mutex<HashMap<(String, &'static str), usize>>,
    prompt_attempts: Mutex<HashMap<String, u32>>,
    submission_log: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    sessions: AtomicUsize,
}

impl ScriptedBackendClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_health(&self, backend: &str, behavior: ProbeBehavior) {
        self.probes.lock().insert(backend.to_string(), behavior);
    }

    pub fn set_submit(&self, backend: &str, behavior: SubmitBehavior) {
        self.submits.lock().insert(backend.to_string(), behavior);
    }

    pub fn fail_launches(&self, backend: &str, failing: bool) {
        self.failing_launches
            .lock()
            .insert(backend.to_string(), failing);
    }

    /// Make `/browser/launch` on `backend` take `delay` before answering
    pub fn delay_launches(&self, backend: &str, delay: Duration) {
        self.launch_delays.lock().insert(backend.to_string(), delay);
    }

    /// Options sent with the most recent launch on `backend`
    pub fn last_launch(&self, backend: &str) -> Option<LaunchOptions> {
        self.launch_options.lock().get(backend).cloned()
    }

    pub fn set_detected_platform(&self, backend: &str, platform: &str) {
        self.detected
            .lock()
            .insert(backend.to_string(), platform.to_string());
    }

    pub fn health_calls(&self, backend: &str) -> usize {
        self.count(backend, "health")
    }

    pub fn launch_calls(&self, backend: &str) -> usize {
        self.count(backend, "launch")
    }

    pub fn submit_calls(&self, backend: &str) -> usize {
        self.count(backend, "submit")
    }

    pub fn detect_calls(&self, backend: &str) -> usize {
        self.count(backend, "detect")
    }

    /// Attempts seen for a prompt text across all backends
    pub fn attempts_for(&self, prompt: &str) -> u32 {
        self.prompt_attempts
            .lock()
            .get(prompt)
            .copied()
            .unwrap_or(0)
    }

    /// `(backend, prompt)` pairs in the order submissions started
    pub fn submissions(&self) -> Vec<(String, String)> {
        self.submission_log.lock().clone()
    }

    /// Highest number of submissions observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn count(&self, backend: &str, call: &'static str) -> usize {
        self.calls
            .lock()
            .get(&(backend.to_string(), call))
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, backend: &str, call: &'static str) {
        *self
            .calls
            .lock()
            .entry((backend.to_string(), call))
            .or_insert(0) += 1;
    }

    async fn run_submit(&self, backend: &str, prompt: &str) -> ClientResult<Value> {
        let attempt = {
            let mut attempts = self.prompt_attempts.lock();
            let entry = attempts.entry(prompt.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        let behavior = self
            .submits
            .lock()
            .get(backend)
            .cloned()
            .unwrap_or(SubmitBehavior::Succeed);

        let ok = json!({ "status": "submitted", "backend": backend, "prompt": prompt });
        match behavior {
            SubmitBehavior::Succeed => Ok(ok),
            SubmitBehavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ok)
            }
            SubmitBehavior::AlwaysFail { status } => Err(ClientError::Status {
                status,
                body: "scripted failure".to_string(),
            }),
            SubmitBehavior::FailTimes(failures) if attempt <= failures => Err(ClientError::Status {
                status: 500,
                body: format!("scripted failure {attempt}/{failures}"),
            }),
            SubmitBehavior::FailTimes(_) => Ok(ok),
            SubmitBehavior::Hang => {
                tokio::time::sleep(HANG).await;
                Ok(ok)
            }
        }
    }
}

/// Decrements the in-flight gauge even when the submit future is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendClient for ScriptedBackendClient {
    async fn health(&self, backend: &BackendDescriptor) -> ClientResult<HealthResponse> {
        self.record(&backend.name, "health");
        let behavior = self
            .probes
            .lock()
            .get(&backend.name)
            .cloned()
            .unwrap_or(ProbeBehavior::Healthy);

        let healthy = HealthResponse {
            status: "healthy".to_string(),
            service: Some(backend.name.clone()),
            version: Some("test".to_string()),
        };
        match behavior {
            ProbeBehavior::Healthy => Ok(healthy),
            ProbeBehavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(healthy)
            }
            ProbeBehavior::Status(status) => Err(ClientError::Status {
                status,
                body: "scripted probe failure".to_string(),
            }),
            ProbeBehavior::Hang => {
                tokio::time::sleep(HANG).await;
                Ok(healthy)
            }
        }
    }

    async fn launch_browser(
        &self,
        backend: &BackendDescriptor,
        options: &LaunchOptions,
    ) -> ClientResult<LaunchResponse> {
        self.record(&backend.name, "launch");
        self.launch_options
            .lock()
            .insert(backend.name.clone(), options.clone());
        let delay = self.launch_delays.lock().get(&backend.name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failing_launches
            .lock()
            .get(&backend.name)
            .copied()
            .unwrap_or(false);
        if failing {
            return Err(ClientError::network("scripted launch failure"));
        }
        let session = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(LaunchResponse {
            session_id: format!("{}-session-{session}", backend.name),
        })
    }

    async fn submit_prompt(
        &self,
        backend: &BackendDescriptor,
        submission: &PromptSubmission,
    ) -> ClientResult<Value> {
        self.record(&backend.name, "submit");
        self.submission_log
            .lock()
            .push((backend.name.clone(), submission.prompt.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _gauge = InFlight(&self.in_flight);

        self.run_submit(&backend.name, &submission.prompt).await
    }

    async fn detect_platform(
        &self,
        backend: &BackendDescriptor,
        _request: &PlatformDetectRequest,
    ) -> ClientResult<PlatformDetectResponse> {
        self.record(&backend.name, "detect");
        match self.detected.lock().get(&backend.name) {
            Some(platform) => Ok(PlatformDetectResponse {
                platform: platform.clone(),
            }),
            None => Err(ClientError::Status {
                status: 404,
                body: "no detection scripted".to_string(),
            }),
        }
    }
}
