//! reqwest implementation of [`BackendClient`].

use super::error::{ClientError, ClientResult};
use super::traits::{
    BackendClient, HealthResponse, LaunchOptions, LaunchResponse, PlatformDetectRequest,
    PlatformDetectResponse, PromptSubmission,
};
use crate::constants::routes;
use crate::models::BackendDescriptor;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// HTTP client for the automation backends' JSON API
#[derive(Debug, Clone)]
pub struct HttpBackendClient {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpBackendClient {
    pub fn new(request_timeout: Duration) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("autopromptr-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::network(e.to_string()))?;

        Ok(Self {
            http,
            request_timeout,
        })
    }

    fn url(backend: &BackendDescriptor, route: &str) -> ClientResult<reqwest::Url> {
        let raw = backend.endpoint(route);
        reqwest::Url::parse(&raw).map_err(|_| ClientError::InvalidUrl { url: raw })
    }

    fn map_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            }
        } else if err.is_decode() {
            ClientError::Decode {
                message: err.to_string(),
            }
        } else {
            ClientError::network(err.to_string())
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
        response.json::<T>().await.map_err(|e| ClientError::Decode {
            message: e.to_string(),
        })
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        backend: &BackendDescriptor,
        route: &str,
        body: &B,
    ) -> ClientResult<T> {
        let url = Self::url(backend, route)?;
        let started = Instant::now();
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        debug!(
            backend = %backend.name,
            route = route,
            status = response.status().as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Backend responded"
        );
        self.decode(response).await
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn health(&self, backend: &BackendDescriptor) -> ClientResult<HealthResponse> {
        let url = Self::url(backend, routes::HEALTH)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        self.decode(response).await
    }

    async fn launch_browser(
        &self,
        backend: &BackendDescriptor,
        options: &LaunchOptions,
    ) -> ClientResult<LaunchResponse> {
        self.post(backend, routes::BROWSER_LAUNCH, options).await
    }

    async fn submit_prompt(
        &self,
        backend: &BackendDescriptor,
        submission: &PromptSubmission,
    ) -> ClientResult<Value> {
        self.post(backend, routes::PROMPT_SUBMIT, submission).await
    }

    async fn detect_platform(
        &self,
        backend: &BackendDescriptor,
        request: &PlatformDetectRequest,
    ) -> ClientResult<PlatformDetectResponse> {
        self.post(backend, routes::PLATFORM_DETECT, request).await
    }
}
