//! Sign-in handlers
//!
//! After the identity provider accepts the credentials, the destination is
//! resolved from the reconciled profile: the role home when a profile exists,
//! profile completion (done by the reconciler) when it does not.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{IdentityError, Result, SessionError};
use crate::identity::Identity;
use crate::notify::Notice;
use crate::reconciler::SessionReconciler;
use crate::routes::Route;
use crate::state::{SessionSnapshot, SessionState};

pub struct SignInFlow {
    reconciler: Arc<SessionReconciler>,
}

impl SignInFlow {
    pub fn new(reconciler: Arc<SessionReconciler>) -> Self {
        Self { reconciler }
    }

    pub async fn with_password(&self, email: &str, password: &str) -> Result<SessionSnapshot> {
        let outcome = self
            .reconciler
            .identity_service()
            .sign_in_with_password(email, password)
            .await;
        self.finish(outcome).await
    }

    pub async fn with_provider(&self, provider_id: &str) -> Result<SessionSnapshot> {
        let outcome = self
            .reconciler
            .identity_service()
            .sign_in_with_provider(provider_id)
            .await;
        self.finish(outcome).await
    }

    async fn finish(
        &self,
        outcome: std::result::Result<Identity, IdentityError>,
    ) -> Result<SessionSnapshot> {
        let identity = match outcome {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Sign-in failed");
                let err = SessionError::from(e);
                self.reconciler
                    .notifier()
                    .notify(Notice::error(err.user_message()));
                return Err(err);
            }
        };

        info!(uid = %identity.uid, "Signed in");
        self.reconciler
            .notifier()
            .notify(Notice::success("Logged in successfully"));

        let snapshot = self.reconciler.adopt(&identity).await;
        if let SessionState::AuthenticatedWithProfile { profile } = &snapshot.state {
            self.reconciler
                .navigator()
                .navigate(Route::landing(Some(profile)));
        }
        Ok(snapshot)
    }
}
