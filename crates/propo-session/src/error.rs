//! Error types for the session layer
//!
//! Transport failures from the identity provider and the backend are caught
//! where they are awaited and converted into one of these kinds.

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failures reported by the identity provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email address is already in use")]
    EmailInUse,

    #[error("Password is too weak: {0}")]
    WeakPassword(String),

    #[error("Sign-in window was closed before completing")]
    PopupClosed,

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Session expired, please sign in again")]
    SessionExpired,

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Identity service unreachable: {0}")]
    Transport(String),
}

impl IdentityError {
    /// Map an identity toolkit error code (`EMAIL_EXISTS`, `WEAK_PASSWORD : ...`)
    pub fn from_code(code: &str) -> Self {
        let (head, detail) = match code.split_once(':') {
            Some((head, detail)) => (head.trim(), detail.trim()),
            None => (code.trim(), ""),
        };

        match head {
            "EMAIL_EXISTS" => IdentityError::EmailInUse,
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS"
            | "INVALID_EMAIL" | "MISSING_PASSWORD" => IdentityError::InvalidCredentials,
            "WEAK_PASSWORD" => IdentityError::WeakPassword(detail.to_string()),
            "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "INVALID_ID_TOKEN" | "USER_DISABLED"
            | "USER_NOT_FOUND" | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => IdentityError::SessionExpired,
            _ => IdentityError::Provider(code.to_string()),
        }
    }
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        IdentityError::Transport(err.to_string())
    }
}

/// Backend API errors, mapped from HTTP status codes
#[derive(Error, Debug)]
pub enum ApiError {
    /// 401
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 403
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 404
    #[error("Not found: {0}")]
    NotFound(String),

    /// 400 / 422, carrying the backend's `detail`
    #[error("Validation error: {0}")]
    Validation(String),

    /// 429
    #[error("Rate limit exceeded")]
    RateLimited,

    /// 5xx
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::RateLimited | ApiError::Server { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    /// Create an error from an HTTP status code and message
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 | 422 => ApiError::Validation(message),
            401 => ApiError::Unauthorized(message),
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            code @ 500..=599 => ApiError::Server {
                status: code,
                message,
            },
            _ => ApiError::Other(format!("HTTP {}: {}", status, message)),
        }
    }
}

/// Errors surfaced by the session reconciler and the sign-in/registration flows
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Could not load profile: {0}")]
    ProfileLookup(ApiError),

    #[error("Registration failed: {0}")]
    Registration(ApiError),

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Signed-in identity has no email address")]
    MissingEmail,
}

impl SessionError {
    /// Text suitable for a transient user notification
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Registration(ApiError::Validation(detail)) => detail.clone(),
            SessionError::ProfileLookup(_) => {
                "Could not load your profile. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}
