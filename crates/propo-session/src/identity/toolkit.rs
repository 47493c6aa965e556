//! Identity toolkit REST adapter
//!
//! Speaks the identity-toolkit account endpoints (`accounts:signInWithPassword`,
//! `accounts:signUp`, `accounts:update`, `accounts:signInWithIdp`) and the
//! secure-token refresh endpoint. Sessions live in memory; id tokens are cached
//! until they come within the configured buffer of expiry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use propo_config::IdentityConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{Identity, IdentityService, SessionBroadcaster, SessionChanges};
use crate::error::IdentityError;

const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Source of a federated credential, standing in for the provider popup.
///
/// Returns the provider's id token, or `None` when the user dismissed the prompt.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn obtain(&self, provider_id: &str) -> Result<Option<String>, IdentityError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id_token: &'a str,
    display_name: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest<'a> {
    post_body: String,
    request_uri: &'a str,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
}

/// Account endpoint response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

/// Secure-token endpoint response
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Clone)]
struct StoredSession {
    identity: Identity,
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

impl StoredSession {
    fn is_fresh(&self, buffer: Duration) -> bool {
        self.expires_at > Instant::now() + buffer
    }
}

fn parse_expires_in(value: Option<&str>) -> Duration {
    let secs = value
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    Duration::from_secs(secs)
}

/// Form-encoded credential carried in a `signInWithIdp` request
fn idp_post_body(provider_token: &str, provider_id: &str) -> Result<String, IdentityError> {
    serde_urlencoded::to_string([("id_token", provider_token), ("providerId", provider_id)])
        .map_err(|e| IdentityError::Provider(format!("cannot encode credential: {}", e)))
}

/// REST identity provider client
pub struct ToolkitIdentity {
    config: IdentityConfig,
    http_client: reqwest::Client,
    session: RwLock<Option<StoredSession>>,
    broadcaster: SessionBroadcaster,
    prompt: Option<Arc<dyn CredentialPrompt>>,
}

impl ToolkitIdentity {
    pub fn new(config: IdentityConfig) -> Result<Self, IdentityError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self::with_client(config, http_client))
    }

    pub fn with_client(config: IdentityConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
            session: RwLock::new(None),
            broadcaster: SessionBroadcaster::new(),
            prompt: None,
        }
    }

    /// Install the prompt used by federated sign-in
    pub fn with_credential_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    fn accounts_url(&self, operation: &str) -> String {
        format!(
            "{}/v1/accounts:{}",
            self.config.identity_url.trim_end_matches('/'),
            operation
        )
    }

    fn token_url(&self) -> String {
        format!("{}/v1/token", self.config.token_url.trim_end_matches('/'))
    }

    async fn call_accounts<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        body: &B,
    ) -> Result<AccountResponse, IdentityError> {
        let response = self
            .http_client
            .post(self.accounts_url(operation))
            .query(&[("key", self.config.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, IdentityError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => Err(IdentityError::from_code(&envelope.error.message)),
            Err(_) => Err(IdentityError::Provider(format!("HTTP {}: {}", status, body))),
        }
    }

    /// Store the session from an account response and announce it
    async fn establish(&self, response: AccountResponse) -> Result<Identity, IdentityError> {
        let (Some(id_token), Some(refresh_token)) = (response.id_token, response.refresh_token)
        else {
            return Err(IdentityError::Provider(
                "account response carried no tokens".to_string(),
            ));
        };

        let identity = Identity {
            uid: response.local_id,
            email: response.email,
            display_name: response.display_name.filter(|n| !n.is_empty()),
        };
        let expires_at = Instant::now() + parse_expires_in(response.expires_in.as_deref());

        *self.session.write().await = Some(StoredSession {
            identity: identity.clone(),
            id_token,
            refresh_token,
            expires_at,
        });

        info!(uid = %identity.uid, "Identity session established");
        self.broadcaster.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn refresh(&self, session: &StoredSession) -> Result<StoredSession, IdentityError> {
        let request = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: &session.refresh_token,
        };

        let response = self
            .http_client
            .post(self.token_url())
            .query(&[("key", self.config.api_key.as_str())])
            .form(&request)
            .send()
            .await?;

        let refreshed: RefreshResponse = Self::decode(response).await?;
        debug!(uid = %session.identity.uid, "Rotated id token");

        Ok(StoredSession {
            identity: session.identity.clone(),
            id_token: refreshed.id_token,
            refresh_token: refreshed.refresh_token,
            expires_at: Instant::now() + parse_expires_in(refreshed.expires_in.as_deref()),
        })
    }

    async fn drop_session(&self) {
        let had_session = self.session.write().await.take().is_some();
        if had_session {
            self.broadcaster.publish(None);
        }
    }
}

#[async_trait]
impl IdentityService for ToolkitIdentity {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, IdentityError> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response = self.call_accounts("signInWithPassword", &request).await?;
        self.establish(response).await
    }

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, IdentityError> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response = self.call_accounts("signUp", &request).await?;
        self.establish(response).await
    }

    async fn sign_in_with_provider(&self, provider_id: &str) -> Result<Identity, IdentityError> {
        let prompt = self.prompt.as_ref().ok_or_else(|| {
            IdentityError::Provider(format!("no credential prompt for {}", provider_id))
        })?;

        let provider_token = prompt
            .obtain(provider_id)
            .await?
            .ok_or(IdentityError::PopupClosed)?;

        let request = IdpRequest {
            post_body: idp_post_body(&provider_token, provider_id)?,
            request_uri: "http://localhost",
            return_idp_credential: true,
            return_secure_token: true,
        };
        let response = self.call_accounts("signInWithIdp", &request).await?;
        self.establish(response).await
    }

    async fn current_token(
        &self,
        identity: &Identity,
        force_refresh: bool,
    ) -> Result<String, IdentityError> {
        let buffer = self.config.token_expiry_buffer();

        {
            let session = self.session.read().await;
            match session.as_ref() {
                Some(s) if !s.identity.same_user(identity) => {
                    return Err(IdentityError::NotSignedIn)
                }
                Some(s) if !force_refresh && s.is_fresh(buffer) => {
                    return Ok(s.id_token.clone())
                }
                Some(_) => {}
                None => return Err(IdentityError::NotSignedIn),
            }
        }

        let mut session = self.session.write().await;

        // Double-check in case another task refreshed while we waited
        let current = match session.as_ref() {
            Some(s) if s.identity.same_user(identity) => s.clone(),
            _ => return Err(IdentityError::NotSignedIn),
        };
        if !force_refresh && current.is_fresh(buffer) {
            return Ok(current.id_token);
        }

        match self.refresh(&current).await {
            Ok(refreshed) => {
                let token = refreshed.id_token.clone();
                *session = Some(refreshed);
                Ok(token)
            }
            Err(IdentityError::SessionExpired) => {
                warn!(uid = %identity.uid, "Refresh token rejected, ending session");
                *session = None;
                drop(session);
                self.broadcaster.publish(None);
                Err(IdentityError::SessionExpired)
            }
            Err(e) => Err(e),
        }
    }

    async fn update_display_name(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Result<(), IdentityError> {
        let id_token = self.current_token(identity, false).await?;
        let request = UpdateRequest {
            id_token: &id_token,
            display_name: name,
            return_secure_token: true,
        };
        let response = self.call_accounts("update", &request).await?;

        let mut session = self.session.write().await;
        if let Some(stored) = session.as_mut().filter(|s| s.identity.same_user(identity)) {
            stored.identity.display_name = Some(name.to_string());
            if let (Some(id_token), Some(refresh_token)) = (response.id_token, response.refresh_token) {
                stored.id_token = id_token;
                stored.refresh_token = refresh_token;
                stored.expires_at =
                    Instant::now() + parse_expires_in(response.expires_in.as_deref());
            }
        }

        debug!(uid = %identity.uid, "Display name updated");
        Ok(())
    }

    fn on_session_change(&self) -> SessionChanges {
        self.broadcaster.subscribe()
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.drop_session().await;
        info!("Identity session ended");
        Ok(())
    }
}
