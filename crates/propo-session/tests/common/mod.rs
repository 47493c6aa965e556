//! Shared fixtures for session integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use propo_config::ApiConfig;
use propo_session::{
    ApiClient, Identity, IdentityError, IdentityService, MemoryNavigator, Notice, Notifier,
    SessionBroadcaster, SessionChanges, SessionReconciler, SessionSnapshot,
};
use wiremock::MockServer;

/// In-memory identity provider. Tokens are `token-<uid>`.
#[derive(Default)]
pub struct FakeIdentity {
    broadcaster: SessionBroadcaster,
    accounts: Mutex<HashMap<String, (String, Identity)>>,
    pub display_names: Mutex<Vec<(String, String)>>,
    pub sign_outs: AtomicUsize,
    next_uid: AtomicUsize,
}

impl FakeIdentity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_account(self: Arc<Self>, email: &str, password: &str, uid: &str) -> Arc<Self> {
        let identity = Identity::new(uid).with_email(email);
        self.accounts
            .lock()
            .insert(email.to_string(), (password.to_string(), identity));
        self
    }

    /// Fire a session-change notification
    pub fn emit(&self, identity: Option<Identity>) {
        self.broadcaster.publish(identity);
    }

    pub fn token_for(uid: &str) -> String {
        format!("token-{}", uid)
    }
}

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, IdentityError> {
        let identity = match self.accounts.lock().get(email) {
            Some((expected, identity)) if expected == password => identity.clone(),
            _ => return Err(IdentityError::InvalidCredentials),
        };
        self.broadcaster.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, IdentityError> {
        let identity = {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(email) {
                return Err(IdentityError::EmailInUse);
            }
            let n = self.next_uid.fetch_add(1, Ordering::SeqCst);
            let identity = Identity::new(format!("new-{}", n)).with_email(email);
            accounts.insert(email.to_string(), (password.to_string(), identity.clone()));
            identity
        };
        self.broadcaster.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_with_provider(&self, provider_id: &str) -> Result<Identity, IdentityError> {
        if provider_id == "closed.example" {
            return Err(IdentityError::PopupClosed);
        }
        let identity = Identity::new(format!("fed-{}", provider_id)).with_email("fed@propo.test");
        self.broadcaster.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn current_token(
        &self,
        identity: &Identity,
        _force_refresh: bool,
    ) -> Result<String, IdentityError> {
        Ok(Self::token_for(&identity.uid))
    }

    async fn update_display_name(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Result<(), IdentityError> {
        self.display_names
            .lock()
            .push((identity.uid.clone(), name.to_string()));
        Ok(())
    }

    fn on_session_change(&self) -> SessionChanges {
        self.broadcaster.subscribe()
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.broadcaster.publish(None);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

pub struct Harness {
    pub reconciler: Arc<SessionReconciler>,
    pub navigator: Arc<MemoryNavigator>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness(identity: Arc<FakeIdentity>, server: &MockServer, start_path: &str) -> Harness {
    let config = ApiConfig::new(server.uri()).with_retry(1, Duration::from_millis(10));
    let api = ApiClient::new(config).expect("api client");
    let navigator = Arc::new(MemoryNavigator::new(start_path));
    let notifier = Arc::new(RecordingNotifier::default());

    let reconciler = SessionReconciler::new(identity, api, navigator.clone(), notifier.clone());
    reconciler.start();

    Harness {
        reconciler,
        navigator,
        notifier,
    }
}

pub async fn settle_where<F>(reconciler: &SessionReconciler, predicate: F) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), reconciler.wait_for(predicate))
        .await
        .expect("session did not settle")
}

pub async fn settle(reconciler: &SessionReconciler) -> SessionSnapshot {
    settle_where(reconciler, SessionSnapshot::is_settled).await
}

pub fn profile_json(id: i64, uid: &str, email: &str, role: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "firebase_uid": uid,
        "email": email,
        "role": role,
        "name": null,
        "documents": null
    })
}

pub fn bearer(uid: &str) -> String {
    format!("Bearer {}", FakeIdentity::token_for(uid))
}
