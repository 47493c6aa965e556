//! Reconciliation state as seen by consumers

use propo_common::{Profile, Role};

use crate::identity::Identity;

/// Where reconciliation stands for the latest session notification
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Before the first reconciliation for this identity resolves
    Unknown,
    Anonymous,
    /// Identity present, backend has no profile for it
    AuthenticatedNoProfile,
    AuthenticatedWithProfile { profile: Profile },
    /// Profile lookup failed for a reason other than not-found
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Unknown,
    Anonymous,
    AuthenticatedNoProfile,
    AuthenticatedWithProfile,
    Error,
}

impl SessionState {
    pub fn kind(&self) -> StateKind {
        match self {
            SessionState::Unknown => StateKind::Unknown,
            SessionState::Anonymous => StateKind::Anonymous,
            SessionState::AuthenticatedNoProfile => StateKind::AuthenticatedNoProfile,
            SessionState::AuthenticatedWithProfile { .. } => StateKind::AuthenticatedWithProfile,
            SessionState::Error { .. } => StateKind::Error,
        }
    }
}

/// What a page should render for the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessGate {
    Loading,
    SignInRequired,
    /// Lookup failed; show the "access denied / try again" fallback
    Unavailable,
    CompletingProfile,
    Ready(Role),
}

/// Observable `{identity, profile, loading}` view
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Identity from the latest session notification
    pub identity: Option<Identity>,
    pub state: SessionState,
    pub loading: bool,
    /// Reconciliation generation this snapshot belongs to
    pub generation: u64,
}

impl SessionSnapshot {
    pub fn initial() -> Self {
        Self {
            identity: None,
            state: SessionState::Unknown,
            loading: true,
            generation: 0,
        }
    }

    pub fn kind(&self) -> StateKind {
        self.state.kind()
    }

    pub fn profile(&self) -> Option<&Profile> {
        match &self.state {
            SessionState::AuthenticatedWithProfile { profile } => Some(profile),
            _ => None,
        }
    }

    /// Settled: not loading and past the initial unknown state
    pub fn is_settled(&self) -> bool {
        !self.loading && self.kind() != StateKind::Unknown
    }

    pub fn gate(&self) -> AccessGate {
        if self.loading {
            return AccessGate::Loading;
        }
        if self.identity.is_none() {
            return AccessGate::SignInRequired;
        }
        match &self.state {
            SessionState::AuthenticatedWithProfile { profile } => AccessGate::Ready(profile.role),
            SessionState::AuthenticatedNoProfile => AccessGate::CompletingProfile,
            SessionState::Error { .. } => AccessGate::Unavailable,
            SessionState::Unknown => AccessGate::Loading,
            SessionState::Anonymous => AccessGate::SignInRequired,
        }
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_profile() -> Profile {
        Profile {
            id: 3,
            external_id: "u3".to_string(),
            email: "o@propo.test".to_string(),
            role: Role::Owner,
            name: Some("Olive Owner".to_string()),
            documents: None,
        }
    }

    #[test]
    fn test_initial_snapshot_is_loading() {
        let snap = SessionSnapshot::initial();
        assert_eq!(snap.kind(), StateKind::Unknown);
        assert!(!snap.is_settled());
        assert_eq!(snap.gate(), AccessGate::Loading);
    }

    #[test]
    fn test_gate_by_state() {
        let mut snap = SessionSnapshot {
            identity: Some(Identity::new("u3")),
            state: SessionState::AuthenticatedWithProfile {
                profile: owner_profile(),
            },
            loading: false,
            generation: 4,
        };
        assert_eq!(snap.gate(), AccessGate::Ready(Role::Owner));
        assert_eq!(snap.profile().map(|p| p.id), Some(3));

        snap.state = SessionState::Error {
            message: "boom".to_string(),
        };
        assert_eq!(snap.gate(), AccessGate::Unavailable);
        assert!(snap.profile().is_none());

        snap.state = SessionState::AuthenticatedNoProfile;
        assert_eq!(snap.gate(), AccessGate::CompletingProfile);

        snap.identity = None;
        snap.state = SessionState::Anonymous;
        assert_eq!(snap.gate(), AccessGate::SignInRequired);
    }
}
