use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::InitError;

pub const DEFAULT_ENVIRONMENT: &str = "production";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

static API_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^errly_[a-z0-9]{4}_[a-f0-9]{64}$").expect("valid regex"));

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

fn deserialize_base_url<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|base_url| normalize_base_url(&base_url))
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// SDK configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrlyConfig {
    /// Service root, stored without a trailing `/`
    #[serde(deserialize_with = "deserialize_base_url")]
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Carried for the transport; deliveries are attempted once
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
}

impl fmt::Debug for ErrlyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrlyConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("environment", &self.environment)
            .field("debug", &self.debug)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("release", &self.release)
            .finish()
    }
}

impl ErrlyConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            api_key: api_key.into(),
            environment: default_environment(),
            debug: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            release: None,
        }
    }

    /// Load from `ERRLY_*` environment variables.
    ///
    /// `ERRLY_URL` and `ERRLY_API_KEY` are required; unparsable optional
    /// values fall back to their defaults.
    pub fn from_env() -> Result<Self, InitError> {
        let base_url = std::env::var("ERRLY_URL")
            .map_err(|_| InitError::configuration("ERRLY_URL is not set"))?;
        let api_key = std::env::var("ERRLY_API_KEY")
            .map_err(|_| InitError::configuration("ERRLY_API_KEY is not set"))?;

        let mut config = Self::new(base_url, api_key);

        if let Ok(environment) = std::env::var("ERRLY_ENVIRONMENT") {
            config.environment = environment;
        }
        config.debug = std::env::var("ERRLY_DEBUG")
            .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        config.timeout_secs = std::env::var("ERRLY_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        config.release = std::env::var("ERRLY_RELEASE").ok();

        Ok(config)
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate_api_key(&self) -> bool {
        API_KEY_PATTERN.is_match(&self.api_key)
    }

    pub fn validate(&self) -> Result<(), InitError> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            InitError::configuration(format!("Invalid base URL '{}': {}", self.base_url, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(InitError::configuration(format!(
                "Base URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if !self.validate_api_key() {
            return Err(InitError::configuration(
                "API key must look like errly_<4 chars>_<64 hex chars>",
            ));
        }

        if self.timeout_secs == 0 {
            return Err(InitError::configuration("Timeout must be at least one second"));
        }

        Ok(())
    }
}
