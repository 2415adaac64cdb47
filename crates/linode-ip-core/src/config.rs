//! Configuration types for the Linode IP reconciler
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinodeIpConfig {
    /// Linode API connection settings
    pub provider: ProviderConfig,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Optional reconciler settings
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

impl LinodeIpConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.provider.validate()?;
        self.state_store.validate()?;
        self.reconciler.validate()?;
        Ok(())
    }
}

/// Linode API connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Personal access token sent as a bearer token
    pub api_token: String,

    /// Base URL of the API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API version path segment
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Prepended to the User-Agent header
    #[serde(default)]
    pub ua_prefix: Option<String>,

    /// Per-request HTTP timeout (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ProviderConfig {
    /// Create a provider configuration with default endpoint settings
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            api_url: default_api_url(),
            api_version: default_api_version(),
            ua_prefix: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Point the client at another endpoint (mock servers, alternate regions)
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.api_token.trim().is_empty() {
            return Err(crate::Error::config("Linode API token cannot be empty"));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(crate::Error::config(format!(
                "Linode API URL must start with http:// or https://, got '{}'",
                self.api_url
            )));
        }
        if self.api_version.trim().is_empty() {
            return Err(crate::Error::config("Linode API version cannot be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(crate::Error::config("Request timeout must be > 0"));
        }
        Ok(())
    }

    /// Base URL including the version segment, without a trailing slash
    pub fn base_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }

    /// Per-request HTTP timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(String::new())
    }
}

// api_token never reaches logs
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .field("ua_prefix", &self.ua_prefix)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn default_api_url() -> String {
    "https://api.linode.com".to_string()
}

fn default_api_version() -> String {
    "v4".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// State store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("State file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Capacity of the reconcile event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 100 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Deadline applied to a whole lifecycle operation (in seconds)
    ///
    /// Unset means the caller's context alone decides.
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

impl ReconcilerConfig {
    /// Validate the reconciler configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.operation_timeout_secs == Some(0) {
            return Err(crate::Error::config("Operation timeout must be > 0"));
        }
        Ok(())
    }

    /// Operation deadline as a duration
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            operation_timeout_secs: None,
        }
    }
}

fn default_event_channel_capacity() -> usize {
    100
}
