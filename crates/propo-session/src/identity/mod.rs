//! Identity provider seam
//!
//! The session layer talks to the external identity provider only through
//! [`IdentityService`]. Session changes are delivered over a channel: the
//! current identity immediately on subscribe, then one message per sign-in,
//! sign-up or sign-out. Dropping the receiver unsubscribes.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::IdentityError;

pub mod toolkit;

pub use toolkit::{CredentialPrompt, ToolkitIdentity};

/// Handle for an authenticated identity-provider session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Provider-assigned user id
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn same_user(&self, other: &Identity) -> bool {
        self.uid == other.uid
    }
}

/// Stream of session-change notifications (`None` = signed out)
pub type SessionChanges = mpsc::UnboundedReceiver<Option<Identity>>;

/// External identity provider
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, IdentityError>;

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, IdentityError>;

    /// Federated sign-in (Google and friends)
    async fn sign_in_with_provider(&self, provider_id: &str) -> Result<Identity, IdentityError>;

    /// Short-lived bearer token for `identity`
    async fn current_token(
        &self,
        identity: &Identity,
        force_refresh: bool,
    ) -> Result<String, IdentityError>;

    async fn update_display_name(&self, identity: &Identity, name: &str)
        -> Result<(), IdentityError>;

    /// Subscribe to session changes
    fn on_session_change(&self) -> SessionChanges;

    async fn sign_out(&self) -> Result<(), IdentityError>;
}

/// Fan-out of session changes to every live subscriber.
///
/// Subscribing and publishing share one lock so a new subscriber never misses
/// or reorders a change.
#[derive(Debug, Default)]
pub struct SessionBroadcaster {
    inner: Mutex<BroadcasterInner>,
}

#[derive(Debug, Default)]
struct BroadcasterInner {
    current: Option<Identity>,
    subscribers: Vec<mpsc::UnboundedSender<Option<Identity>>>,
}

impl SessionBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> SessionChanges {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        // Receiver is alive, send cannot fail
        let _ = tx.send(inner.current.clone());
        inner.subscribers.push(tx);
        rx
    }

    pub fn publish(&self, identity: Option<Identity>) {
        let mut inner = self.inner.lock();
        inner.current = identity.clone();
        inner
            .subscribers
            .retain(|tx| tx.send(identity.clone()).is_ok());
    }

    pub fn current(&self) -> Option<Identity> {
        self.inner.lock().current.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }
}
