//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "propo.toml",
    "config.toml",
    "./config/propo.toml",
    "/etc/propo/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("PROPO_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `PROPO_*` overrides read through `lookup`
fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // API
    if let Some(val) = lookup("PROPO_API_BASE_URL") {
        config.api.base_url = val.trim_end_matches('/').to_string();
    }
    if let Some(val) = lookup("PROPO_API_TIMEOUT_MS") {
        if let Ok(timeout) = val.parse() {
            config.api.timeout_ms = timeout;
        }
    }
    if let Some(val) = lookup("PROPO_API_RETRY_ATTEMPTS") {
        if let Ok(attempts) = val.parse() {
            config.api.retry_attempts = attempts;
        }
    }

    // Identity provider
    if let Some(val) = lookup("PROPO_IDENTITY_API_KEY") {
        config.identity.api_key = val;
    }
    if let Some(val) = lookup("PROPO_IDENTITY_URL") {
        config.identity.identity_url = val.trim_end_matches('/').to_string();
    }
    if let Some(val) = lookup("PROPO_IDENTITY_TOKEN_URL") {
        config.identity.token_url = val.trim_end_matches('/').to_string();
    }
    if let Some(val) = lookup("PROPO_IDENTITY_EMULATOR_HOST") {
        let base = format!("http://{}", val.trim_end_matches('/'));
        config.identity.identity_url = format!("{}/identitytoolkit.googleapis.com", base);
        config.identity.token_url = format!("{}/securetoken.googleapis.com", base);
    }

    // Logging
    if let Some(val) = lookup("LOG_FORMAT") {
        config.logging.format = val;
    }
}
