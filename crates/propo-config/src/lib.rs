//! Propo Configuration
//!
//! TOML-based configuration for the session layer and the CLI, with
//! environment variable overrides applied on top.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Upper bound on API retries; backoff doubles per attempt
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
}

/// Backend REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the backend, without trailing slash
    pub base_url: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Attempts for idempotent reads (1 = no retry)
    pub retry_attempts: u32,
    /// Initial backoff between read retries in milliseconds
    pub retry_delay_ms: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 30_000,
            retry_attempts: 3,
            retry_delay_ms: 100,
            user_agent: format!("propo-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Identity provider (identity toolkit REST API) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Web API key appended as `?key=` to every call
    pub api_key: String,
    /// Base URL of the accounts endpoints
    pub identity_url: String,
    /// Base URL of the token refresh endpoint
    pub token_url: String,
    /// Refresh an id token this many seconds before it expires
    pub token_expiry_buffer_secs: u64,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            identity_url: "https://identitytoolkit.googleapis.com".to_string(),
            token_url: "https://securetoken.googleapis.com".to_string(),
            token_expiry_buffer_secs: 60,
            timeout_ms: 15_000,
        }
    }
}

impl IdentityConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Point both endpoints at one host (emulators, tests)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.identity_url = url.clone();
        self.token_url = url;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn token_expiry_buffer(&self) -> Duration {
        Duration::from_secs(self.token_expiry_buffer_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// text or json
    pub format: String,
    /// Default filter when RUST_LOG is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject settings that cannot produce a working client
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("api.base_url must not be empty".into()));
        }
        if self.api.timeout_ms == 0 {
            return Err(ConfigError::ValidationError("api.timeout_ms must be greater than zero".into()));
        }
        if self.api.retry_attempts == 0 || self.api.retry_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::ValidationError(format!(
                "api.retry_attempts must be between 1 and {}",
                MAX_RETRY_ATTEMPTS
            )));
        }
        if self.identity.identity_url.trim().is_empty() || self.identity.token_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("identity endpoints must not be empty".into()));
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Propo Configuration
# Environment variables (PROPO_*) override these settings

[api]
base_url = "http://localhost:8000"
timeout_ms = 30000
retry_attempts = 3
retry_delay_ms = 100

[identity]
api_key = ""
identity_url = "https://identitytoolkit.googleapis.com"
token_url = "https://securetoken.googleapis.com"
token_expiry_buffer_secs = 60
timeout_ms = 15000

[logging]
format = "text"  # text or json
filter = "info"
"#
        .to_string()
    }
}
