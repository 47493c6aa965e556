//! Session Reconciler
//!
//! Owns the process-wide view of who is signed in and with what role:
//! - Subscribes to identity-provider session changes
//! - Installs the bearer token on the API client
//! - Looks up the backend profile and publishes the resulting state
//! - Redirects identities without a profile to profile completion
//!
//! Every reconciliation is tagged with a generation taken from the published
//! snapshot. A result is committed only while its generation is still the
//! latest, so a slow lookup for an older notification can never overwrite a
//! newer one.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use propo_common::Profile;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::api::ApiClient;
use crate::error::{Result, SessionError};
use crate::identity::{Identity, IdentityService};
use crate::notify::{Notice, Notifier};
use crate::routes::{Navigator, Route};
use crate::state::{SessionSnapshot, SessionState, StateKind};

/// What started a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Identity-provider notification: may reset state and redirect
    SessionChange,
    /// Explicit profile refresh: keeps state on failure, never redirects
    Refresh,
}

pub struct SessionReconciler {
    identity: Arc<dyn IdentityService>,
    api: ApiClient,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    state_tx: watch::Sender<SessionSnapshot>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionReconciler {
    pub fn new(
        identity: Arc<dyn IdentityService>,
        api: ApiClient,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionSnapshot::initial());

        Arc::new(Self {
            identity,
            api,
            navigator,
            notifier,
            state_tx,
            listener: Mutex::new(None),
        })
    }

    /// Subscribe to the identity provider and reconcile on every change
    pub fn start(self: &Arc<Self>) {
        let mut listener = self.listener.lock();
        if listener.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Session listener already running");
            return;
        }

        let mut changes = self.identity.on_session_change();
        let weak: Weak<Self> = Arc::downgrade(self);

        *listener = Some(tokio::spawn(async move {
            while let Some(identity) = changes.recv().await {
                let Some(reconciler) = weak.upgrade() else {
                    break;
                };
                reconciler.dispatch(identity);
            }
            debug!("Session listener stopped");
        }));

        info!("Session reconciler started");
    }

    /// Stop listening for session changes
    pub fn stop(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
            info!("Session reconciler stopped");
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub(crate) fn identity_service(&self) -> &Arc<dyn IdentityService> {
        &self.identity
    }

    pub(crate) fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub(crate) fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_tx.borrow().clone()
    }

    /// Observe every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.state_tx.borrow().identity.clone()
    }

    pub fn current_profile(&self) -> Option<Profile> {
        self.state_tx.borrow().profile().cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.state_tx.borrow().loading
    }

    /// Wait until the published snapshot satisfies `predicate`
    pub async fn wait_for<F>(&self, predicate: F) -> SessionSnapshot
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.state_tx.subscribe();
        let snapshot = match rx.wait_for(predicate).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        snapshot
    }

    pub async fn wait_until_settled(&self) -> SessionSnapshot {
        self.wait_for(SessionSnapshot::is_settled).await
    }

    /// Reconcile a session change inline, returning once it has resolved
    pub async fn handle_session_change(&self, identity: Option<Identity>) {
        let generation = self.begin(identity.as_ref());
        if let Some(identity) = identity {
            let span = info_span!("reconcile", generation, uid = %identity.uid);
            let _ = self
                .reconcile(generation, identity, Trigger::SessionChange)
                .instrument(span)
                .await;
        }
    }

    /// Make sure `identity` has been reconciled and return the settled view.
    ///
    /// Used right after a sign-in or sign-up, whose notification may not have
    /// reached the listener yet.
    pub async fn adopt(&self, identity: &Identity) -> SessionSnapshot {
        let tracked = self
            .state_tx
            .borrow()
            .identity
            .as_ref()
            .is_some_and(|current| current.same_user(identity));

        if !tracked {
            self.handle_session_change(Some(identity.clone())).await;
        }
        self.wait_until_settled().await
    }

    /// End the session and go to the login page
    pub async fn sign_out(&self) -> Result<()> {
        let already_signed_out = {
            let snap = self.state_tx.borrow();
            snap.identity.is_none() && snap.kind() == StateKind::Anonymous
        };

        if already_signed_out {
            debug!("Sign-out requested while already signed out");
        } else {
            if let Err(e) = self.identity.sign_out().await {
                warn!(error = %e, "Sign-out failed");
                let err = SessionError::from(e);
                self.notifier.notify(Notice::error(err.user_message()));
                return Err(err);
            }
            self.begin(None);
        }

        self.navigator.navigate(Route::Login);
        Ok(())
    }

    /// Re-run the profile lookup for the current identity.
    ///
    /// Uses the identity's cached token (no forced refresh). A reconciliation
    /// already in flight is awaited rather than superseded, so a pending
    /// redirect to profile completion is never lost. Returns `Ok(None)` when
    /// nobody is signed in, the backend has no profile, or a newer session
    /// change overtook this lookup.
    pub async fn refresh_profile(&self) -> Result<Option<Profile>> {
        let (generation, identity) = loop {
            self.wait_for(|snap| snap.identity.is_none() || !snap.loading)
                .await;

            let mut started = None;
            let mut busy = false;
            self.state_tx.send_if_modified(|snap| {
                let Some(identity) = snap.identity.clone() else {
                    return false;
                };
                if snap.loading {
                    busy = true;
                    return false;
                }
                snap.generation += 1;
                snap.loading = true;
                started = Some((snap.generation, identity));
                true
            });

            match started {
                Some(started) => break started,
                None if busy => continue,
                None => {
                    debug!("No identity present, nothing to refresh");
                    return Ok(None);
                }
            }
        };

        let span = info_span!("refresh_profile", generation, uid = %identity.uid);
        self.reconcile(generation, identity, Trigger::Refresh)
            .instrument(span)
            .await
    }

    /// Record a notification and hand the lookup to a background task
    fn dispatch(self: &Arc<Self>, identity: Option<Identity>) {
        let generation = self.begin(identity.as_ref());

        if let Some(identity) = identity {
            let reconciler = Arc::clone(self);
            let span = info_span!("reconcile", generation, uid = %identity.uid);
            tokio::spawn(
                async move {
                    let _ = reconciler
                        .reconcile(generation, identity, Trigger::SessionChange)
                        .await;
                }
                .instrument(span),
            );
        }
    }

    /// Open a new generation for a session notification
    fn begin(&self, identity: Option<&Identity>) -> u64 {
        let mut generation = 0;
        let mut user_changed = false;

        self.state_tx.send_modify(|snap| {
            snap.generation += 1;
            generation = snap.generation;

            match identity {
                Some(identity) => {
                    let same_user = snap
                        .identity
                        .as_ref()
                        .is_some_and(|current| current.same_user(identity));
                    if !same_user {
                        snap.state = SessionState::Unknown;
                        user_changed = true;
                    }
                    snap.identity = Some(identity.clone());
                    snap.loading = true;
                }
                None => {
                    snap.identity = None;
                    snap.state = SessionState::Anonymous;
                    snap.loading = false;
                }
            }
        });

        // Never let one user's token ride along with another user's requests
        if identity.is_none() || user_changed {
            self.api.install_token(generation, None);
        }
        if identity.is_none() {
            info!(generation, "No identity, session cleared");
        }

        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state_tx.borrow().generation == generation
    }

    /// Apply `update` only if `generation` is still the latest
    fn commit<R>(
        &self,
        generation: u64,
        update: impl FnOnce(&mut SessionSnapshot) -> R,
    ) -> Option<R> {
        let mut outcome = None;
        self.state_tx.send_if_modified(|snap| {
            if snap.generation != generation {
                return false;
            }
            outcome = Some(update(snap));
            true
        });
        outcome
    }

    async fn reconcile(
        &self,
        generation: u64,
        identity: Identity,
        trigger: Trigger,
    ) -> Result<Option<Profile>> {
        let token = match self.identity.current_token(&identity, false).await {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "Failed to obtain bearer token");
                let err = SessionError::from(e);
                if !self.fail(generation, trigger, err.to_string()) {
                    debug!("Discarding stale token failure");
                    return Ok(None);
                }
                self.api.install_token(generation, None);
                self.notifier.notify(Notice::error(err.user_message()));
                return Err(err);
            }
        };

        if !self.is_current(generation) {
            debug!("Superseded before token install");
            return Ok(None);
        }
        self.api.install_token(generation, Some(token.clone()));

        match self.api.profile_for_token(&token).await {
            Ok(profile) => {
                if profile.external_id != identity.uid {
                    warn!(
                        profile_uid = %profile.external_id,
                        "Profile belongs to a different external id"
                    );
                }

                let role = profile.role;
                let committed = self.commit(generation, |snap| {
                    snap.state = SessionState::AuthenticatedWithProfile {
                        profile: profile.clone(),
                    };
                    snap.loading = false;
                });

                match committed {
                    Some(()) => {
                        info!(%role, "Profile loaded");
                        Ok(Some(profile))
                    }
                    None => {
                        debug!("Discarding stale profile lookup");
                        Ok(None)
                    }
                }
            }
            Err(e) if e.is_not_found() => {
                let entered = self.commit(generation, |snap| {
                    let entered = snap.kind() != StateKind::AuthenticatedNoProfile;
                    snap.state = SessionState::AuthenticatedNoProfile;
                    snap.loading = false;
                    entered
                });

                match entered {
                    Some(entered) => {
                        info!("Identity has no profile yet");
                        if entered && trigger == Trigger::SessionChange {
                            self.redirect_to_profile_completion();
                        }
                    }
                    None => debug!("Discarding stale not-found result"),
                }
                Ok(None)
            }
            Err(e) => {
                error!(error = %e, "Profile lookup failed");
                let err = SessionError::ProfileLookup(e);
                if !self.fail(generation, trigger, err.to_string()) {
                    debug!("Discarding stale lookup failure");
                    return Ok(None);
                }
                self.notifier.notify(Notice::error(err.user_message()));
                Err(err)
            }
        }
    }

    /// Record a failed attempt; a refresh keeps whatever state it found
    fn fail(&self, generation: u64, trigger: Trigger, message: String) -> bool {
        self.commit(generation, |snap| {
            snap.loading = false;
            if trigger == Trigger::SessionChange || snap.kind() == StateKind::Unknown {
                snap.state = SessionState::Error { message };
            }
        })
        .is_some()
    }

    fn redirect_to_profile_completion(&self) {
        let current = self.navigator.current_path();
        if Route::is_registration_path(&current) {
            debug!(path = %current, "Already on registration, not redirecting");
            return;
        }
        self.navigator.navigate(Route::CompleteProfile);
    }
}

impl Drop for SessionReconciler {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}
