//! Backend API client
//!
//! Every request built here carries the process-wide bearer token, if one is
//! installed. Only the session reconciler installs or clears that token; call
//! sites never pass it explicitly.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use propo_common::{Profile, ProfileUpdate, RegisterProfile};
use propo_config::ApiConfig;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ApiError;

pub const PROFILE_PATH: &str = "/auth/me";
pub const REGISTER_PATH: &str = "/auth/register";

/// Default credential plus the reconciliation generation that wrote it
#[derive(Debug, Default)]
struct TokenSlot {
    generation: u64,
    token: Option<String>,
}

/// Backend REST client with a shared default bearer token
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: Arc<ApiConfig>,
    http_client: reqwest::Client,
    token: Arc<RwLock<TokenSlot>>,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        if config.base_url.trim().is_empty() {
            return Err(ApiError::Config("base_url must not be empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
            token: Arc::new(RwLock::new(TokenSlot::default())),
        })
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Token currently attached to outgoing requests
    pub fn bearer_token(&self) -> Option<String> {
        self.token.read().token.clone()
    }

    /// Replace the default token unless a newer generation already wrote it
    pub(crate) fn install_token(&self, generation: u64, token: Option<String>) -> bool {
        let mut slot = self.token.write();
        if generation < slot.generation {
            debug!(generation, current = slot.generation, "Ignoring stale token write");
            return false;
        }
        slot.generation = generation;
        slot.token = token;
        true
    }

    /// Request builder with the default bearer token attached
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.request_as(method, path, None)
    }

    /// Request builder under `token`, falling back to the default token
    fn request_as(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url(), path);
        let builder = self.http_client.request(method, url);
        match token.map(str::to_string).or_else(|| self.bearer_token()) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and decode a JSON body, mapping error statuses
    pub async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, error_detail(&body)))
    }

    /// GET with retries on server errors and rate limiting
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get_with(path, None).await
    }

    async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        let attempts = self.config.retry_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff(self.config.retry_delay(), attempt);
                tokio::time::sleep(delay).await;
            }

            let builder = self.request_as(Method::GET, path, token);

            match self.send(builder).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() => {
                    warn!(path, attempt, error = %e, "Retryable API error");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::Other("Request failed".into())))
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(Method::PATCH, path).json(body)).await
    }

    /// `GET /auth/me` with the default token
    pub async fn current_profile(&self) -> Result<Profile, ApiError> {
        self.get(PROFILE_PATH).await
    }

    /// `GET /auth/me` under a specific token
    pub(crate) async fn profile_for_token(&self, token: &str) -> Result<Profile, ApiError> {
        self.get_with(PROFILE_PATH, Some(token)).await
    }

    /// `POST /auth/register`. `token` overrides the default credential, for
    /// identities the reconciler has not adopted yet.
    pub async fn register_profile(
        &self,
        request: &RegisterProfile,
        token: Option<&str>,
    ) -> Result<Profile, ApiError> {
        let builder = self.request_as(Method::POST, REGISTER_PATH, token).json(request);
        self.send(builder).await
    }

    /// `PATCH /auth/me`
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError> {
        self.patch(PROFILE_PATH, update).await
    }
}

/// Pull a readable message out of an error body (`{"detail": ...}`)
fn error_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };

    match value.get("detail") {
        Some(serde_json::Value::String(detail)) => detail.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
            .collect::<Vec<_>>()
            .join("; "),
        _ => body.to_string(),
    }
}

/// Delay before retry `attempt` (1-based), doubling each time
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}
