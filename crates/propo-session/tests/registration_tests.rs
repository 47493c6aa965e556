//! Registration Flow Tests
//!
//! Tests for:
//! - Profile completion for an identity without a profile
//! - Fresh email/password registration
//! - Identity and backend failures during registration

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{bearer, harness, profile_json, settle, FakeIdentity};
use propo_common::Role;
use propo_session::{
    ApiError, Identity, IdentityError, NoticeLevel, RegistrationFlow, RegistrationForm, Route,
    SessionError, StateKind,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers profile lookups with 404 until the profile has been registered
struct ProfileStore {
    registered: Arc<AtomicBool>,
    uid: &'static str,
    email: &'static str,
}

impl Respond for ProfileStore {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.registered.load(Ordering::SeqCst) {
            ResponseTemplate::new(200).set_body_json(profile_json(11, self.uid, self.email, "OWNER"))
        } else {
            ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "detail": "User not found in database. Please register."
            }))
        }
    }
}

struct RegisterEndpoint {
    registered: Arc<AtomicBool>,
    uid: &'static str,
    email: &'static str,
}

impl Respond for RegisterEndpoint {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.registered.store(true, Ordering::SeqCst);
        ResponseTemplate::new(201).set_body_json(profile_json(11, self.uid, self.email, "OWNER"))
    }
}

#[tokio::test]
async fn test_complete_profile_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .and(header("Authorization", bearer("fed-1").as_str()))
        .and(body_json(serde_json::json!({
            "email": "a@b.com",
            "role": "TENANT",
            "name": "A B"
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(profile_json(3, "fed-1", "a@b.com", "TENANT")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("Authorization", bearer("fed-1").as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(profile_json(3, "fed-1", "a@b.com", "TENANT")),
        )
        .mount(&server)
        .await;

    let identity = FakeIdentity::new();
    identity.emit(Some(Identity::new("fed-1").with_email("a@b.com")));
    let h = harness(identity.clone(), &server, "/login");

    let snap = settle(&h.reconciler).await;
    assert_eq!(snap.kind(), StateKind::AuthenticatedNoProfile);
    assert_eq!(h.navigator.history(), vec![Route::CompleteProfile]);

    let profile = RegistrationFlow::new(h.reconciler.clone())
        .complete_profile("A B", Role::Tenant)
        .await
        .unwrap();

    assert_eq!(profile.role, Role::Tenant);
    assert_eq!(
        h.reconciler.snapshot().kind(),
        StateKind::AuthenticatedWithProfile
    );
    assert_eq!(
        h.navigator.history(),
        vec![Route::CompleteProfile, Route::TenantHome]
    );
    assert_eq!(
        identity.display_names.lock().clone(),
        vec![("fed-1".to_string(), "A B".to_string())]
    );

    let notices = h.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Success);
    assert_eq!(notices[0].message, "Account created!");
}

#[tokio::test]
async fn test_fresh_registration_lands_on_role_home() {
    let server = MockServer::start().await;
    let registered = Arc::new(AtomicBool::new(false));
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ProfileStore {
            registered: registered.clone(),
            uid: "new-0",
            email: "owner@propo.test",
        })
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .and(header("Authorization", bearer("new-0").as_str()))
        .respond_with(RegisterEndpoint {
            registered: registered.clone(),
            uid: "new-0",
            email: "owner@propo.test",
        })
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(FakeIdentity::new(), &server, "/register");
    settle(&h.reconciler).await;

    let form = RegistrationForm {
        email: "owner@propo.test".to_string(),
        name: "Olive Owner".to_string(),
        role: Role::Owner,
    };
    let profile = RegistrationFlow::new(h.reconciler.clone())
        .register(&form, "s3cret!!")
        .await
        .unwrap();

    assert_eq!(profile.external_id, "new-0");
    assert_eq!(h.navigator.history(), vec![Route::OwnerHome]);
    assert_eq!(h.reconciler.current_profile().unwrap().role, Role::Owner);
    assert!(registered.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_email_in_use_stops_before_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let identity = FakeIdentity::new().with_account("taken@propo.test", "pw123456", "u-taken");
    let h = harness(identity, &server, "/register");
    settle(&h.reconciler).await;

    let form = RegistrationForm {
        email: "taken@propo.test".to_string(),
        name: String::new(),
        role: Role::Tenant,
    };
    let result = RegistrationFlow::new(h.reconciler.clone())
        .register(&form, "another1")
        .await;

    assert!(matches!(
        result,
        Err(SessionError::Identity(IdentityError::EmailInUse))
    ));
    let notices = h.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert!(h.navigator.history().is_empty());
}

#[tokio::test]
async fn test_backend_rejection_keeps_identity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "detail": "User already registered"
        })))
        .mount(&server)
        .await;

    let identity = FakeIdentity::new();
    identity.emit(Some(Identity::new("u-dup").with_email("dup@propo.test")));
    let h = harness(identity, &server, "/register?mode=complete_profile");
    settle(&h.reconciler).await;

    let result = RegistrationFlow::new(h.reconciler.clone())
        .complete_profile("", Role::Owner)
        .await;

    match result {
        Err(SessionError::Registration(ApiError::Validation(detail))) => {
            assert_eq!(detail, "User already registered")
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(h.notifier.notices()[0].message, "User already registered");
    assert_eq!(h.reconciler.current_identity().unwrap().uid, "u-dup");
    assert_eq!(
        h.reconciler.snapshot().kind(),
        StateKind::AuthenticatedNoProfile
    );
    assert!(h.navigator.history().is_empty());
}

#[tokio::test]
async fn test_complete_profile_requires_identity() {
    let server = MockServer::start().await;
    let h = harness(FakeIdentity::new(), &server, "/register?mode=complete_profile");
    settle(&h.reconciler).await;

    let result = RegistrationFlow::new(h.reconciler.clone())
        .complete_profile("Nobody", Role::Tenant)
        .await;

    assert!(matches!(result, Err(SessionError::NotSignedIn)));
    assert_eq!(h.notifier.notices().len(), 1);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_complete_profile_requires_email() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let identity = FakeIdentity::new();
    identity.emit(Some(Identity::new("phone-only")));
    let h = harness(identity, &server, "/register");
    settle(&h.reconciler).await;

    let result = RegistrationFlow::new(h.reconciler.clone())
        .complete_profile("P", Role::Tenant)
        .await;

    assert!(matches!(result, Err(SessionError::MissingEmail)));
}
