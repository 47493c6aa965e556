//! Registration and profile completion
//!
//! Fresh registration creates the identity first and then the backend profile.
//! Profile completion reuses an identity that already exists (e.g. from a
//! federated sign-in) and only creates the backend profile. If the backend
//! step fails the identity stays valid; the next reconciliation finds no
//! profile and routes back to completion.

use std::sync::Arc;

use propo_common::{Profile, RegisterProfile, Role};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::identity::Identity;
use crate::notify::Notice;
use crate::reconciler::SessionReconciler;
use crate::routes::Route;

/// Which variant of the registration surface is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationMode {
    Fresh,
    CompleteProfile,
}

impl RegistrationMode {
    /// Read the mode from a registration path's query string
    pub fn from_path(path: &str) -> Self {
        if Route::is_complete_profile_path(path) {
            RegistrationMode::CompleteProfile
        } else {
            RegistrationMode::Fresh
        }
    }
}

/// Fields submitted on the registration form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationForm {
    pub email: String,
    pub name: String,
    pub role: Role,
}

pub struct RegistrationFlow {
    reconciler: Arc<SessionReconciler>,
}

impl RegistrationFlow {
    pub fn new(reconciler: Arc<SessionReconciler>) -> Self {
        Self { reconciler }
    }

    /// Create an identity with email and password, then its backend profile
    pub async fn register(&self, form: &RegistrationForm, password: &str) -> Result<Profile> {
        let identity = match self
            .reconciler
            .identity_service()
            .sign_up_with_password(&form.email, password)
            .await
        {
            Ok(identity) => identity,
            Err(e) => return Err(self.report(SessionError::from(e))),
        };
        info!(uid = %identity.uid, "Identity created");

        let request = RegisterProfile {
            email: form.email.clone(),
            role: form.role,
            name: non_empty(&form.name),
        };
        self.submit(RegistrationMode::Fresh, &identity, &request).await
    }

    /// Create the backend profile for the identity that is already signed in
    pub async fn complete_profile(&self, name: &str, role: Role) -> Result<Profile> {
        let identity = match self.reconciler.current_identity() {
            Some(identity) => identity,
            None => return Err(self.report(SessionError::NotSignedIn)),
        };
        let email = match identity.email.clone() {
            Some(email) => email,
            None => return Err(self.report(SessionError::MissingEmail)),
        };

        let name = non_empty(name);
        if let Some(name) = name.as_deref() {
            if identity.display_name.as_deref() != Some(name) {
                // Display name is cosmetic; a failure here must not block the profile
                if let Err(e) = self
                    .reconciler
                    .identity_service()
                    .update_display_name(&identity, name)
                    .await
                {
                    warn!(error = %e, "Could not update identity display name");
                }
            }
        }

        let request = RegisterProfile { email, role, name };
        self.submit(RegistrationMode::CompleteProfile, &identity, &request)
            .await
    }

    async fn submit(
        &self,
        mode: RegistrationMode,
        identity: &Identity,
        request: &RegisterProfile,
    ) -> Result<Profile> {
        let token = match self
            .reconciler
            .identity_service()
            .current_token(identity, false)
            .await
        {
            Ok(token) => token,
            Err(e) => return Err(self.report(SessionError::from(e))),
        };

        let created = match self
            .reconciler
            .api()
            .register_profile(request, Some(&token))
            .await
        {
            Ok(profile) => profile,
            Err(e) => {
                warn!(uid = %identity.uid, error = %e, "Backend registration failed");
                return Err(self.report(SessionError::Registration(e)));
            }
        };
        info!(uid = %identity.uid, role = %created.role, "Profile registered");
        self.reconciler.notifier().notify(Notice::success("Account created!"));

        let tracked = self
            .reconciler
            .current_identity()
            .is_some_and(|current| current.same_user(identity));
        match (tracked, mode) {
            (true, _) => {
                if let Err(e) = self.reconciler.refresh_profile().await {
                    warn!(error = %e, "Profile refresh after registration failed");
                }
            }
            // Sign-up notification not processed yet; reconcile it now
            (false, RegistrationMode::Fresh) => {
                self.reconciler.adopt(identity).await;
            }
            (false, RegistrationMode::CompleteProfile) => {
                debug!(uid = %identity.uid, "Identity no longer current, skipping refresh");
            }
        }

        // A lookup overtaken by a newer session change is discarded; only the
        // settled session decides where to go
        let snapshot = self.reconciler.wait_until_settled().await;
        let still_signed_in = snapshot
            .identity
            .as_ref()
            .is_some_and(|current| current.same_user(identity));
        if !still_signed_in {
            info!(uid = %identity.uid, "Session changed during registration, not navigating");
            return Ok(created);
        }

        let profile = snapshot.profile().cloned().unwrap_or(created);
        self.reconciler.navigator().navigate(Route::landing(Some(&profile)));
        Ok(profile)
    }

    fn report(&self, err: SessionError) -> SessionError {
        self.reconciler
            .notifier()
            .notify(Notice::error(err.user_message()));
        err
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
