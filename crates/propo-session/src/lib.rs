//! # Propo session layer
//!
//! Bridges the identity provider's session with the application's user
//! profile. The [`SessionReconciler`] listens for sign-in, sign-up and
//! sign-out, keeps the API client's bearer token in step, looks up the
//! profile, and redirects users who still need to complete registration.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use propo_config::{ApiConfig, IdentityConfig};
//! use propo_session::{
//!     ApiClient, MemoryNavigator, SessionReconciler, SignInFlow, ToolkitIdentity,
//!     TracingNotifier,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let identity = Arc::new(ToolkitIdentity::new(IdentityConfig::new("web-api-key"))?);
//!     let api = ApiClient::new(ApiConfig::new("http://localhost:8000"))?;
//!     let reconciler = SessionReconciler::new(
//!         identity,
//!         api,
//!         Arc::new(MemoryNavigator::new("/login")),
//!         Arc::new(TracingNotifier),
//!     );
//!     reconciler.start();
//!
//!     let snapshot = SignInFlow::new(reconciler.clone())
//!         .with_password("owner@propo.test", "secret")
//!         .await?;
//!     println!("{:?}", snapshot.gate());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod error;
pub mod identity;
pub mod notify;
pub mod reconciler;
pub mod registration;
pub mod routes;
pub mod sign_in;
pub mod state;

pub use api::ApiClient;
pub use error::{ApiError, IdentityError, Result, SessionError};
pub use identity::{
    CredentialPrompt, Identity, IdentityService, SessionBroadcaster, SessionChanges,
    ToolkitIdentity,
};
pub use notify::{Notice, NoticeLevel, Notifier, TracingNotifier};
pub use reconciler::SessionReconciler;
pub use registration::{RegistrationFlow, RegistrationForm, RegistrationMode};
pub use routes::{nav_items, MemoryNavigator, NavItem, Navigator, Route};
pub use sign_in::SignInFlow;
pub use state::{AccessGate, SessionSnapshot, SessionState, StateKind};
