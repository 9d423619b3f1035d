//! Provider configuration
//!
//! Connection settings for one PowerStore array. Values come from CLI flags,
//! `POWERSTORE_*` environment variables, or a YAML file, in that order of
//! precedence.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: i64 = 120;

/// Connection settings for the array
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// REST base URL, for example `https://10.0.0.1/api/rest`
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure: bool,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: i64,
}

fn default_timeout() -> i64 {
    DEFAULT_TIMEOUT_SECS
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("insecure", &self.insecure)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Optional overrides, typically from CLI flags or the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: Option<bool>,
    pub timeout: Option<i64>,
}

impl ProviderConfig {
    /// Load settings from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Build the final config from an optional file and overrides
    pub fn resolve(file: Option<ProviderConfig>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = file.unwrap_or_else(|| ProviderConfig {
            endpoint: String::new(),
            username: String::new(),
            password: String::new(),
            insecure: false,
            timeout: DEFAULT_TIMEOUT_SECS,
        });

        if let Some(endpoint) = overrides.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(username) = overrides.username {
            config.username = username;
        }
        if let Some(password) = overrides.password {
            config.password = password;
        }
        if let Some(insecure) = overrides.insecure {
            config.insecure = insecure;
        }
        if let Some(timeout) = overrides.timeout {
            config.timeout = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check required attributes
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(Error::Configuration("endpoint is required".into()));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(Error::Configuration(format!(
                "endpoint must be an http(s) URL, got: {}",
                self.endpoint
            )));
        }
        if self.username.is_empty() {
            return Err(Error::Configuration(
                "username must be at least 1 character long".into(),
            ));
        }
        if self.password.is_empty() {
            return Err(Error::Configuration("password is required".into()));
        }
        if self.timeout <= 0 {
            return Err(Error::Configuration("timeout must be a positive number of seconds".into()));
        }
        Ok(())
    }

    pub fn timeout_secs(&self) -> u64 {
        u64::try_from(self.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS as u64)
    }
}
