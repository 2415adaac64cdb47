// Environment configuration for linode-ipctl
//
// Everything except the subcommand and its arguments comes from the
// environment:
//
// ### Linode API
// - `LINODE_TOKEN`: Personal access token (required)
// - `LINODE_URL`: API base URL (default https://api.linode.com)
// - `LINODE_API_VERSION`: API version (default v4)
// - `LINODE_UA_PREFIX`: Prepended to the User-Agent header
//
// ### State Store
// - `LINODE_IP_STATE_STORE_TYPE`: Type of state store (file, memory)
// - `LINODE_IP_STATE_PATH`: Path to state file (for file store)
//
// ### Runtime
// - `LINODE_IP_TIMEOUT_SECS`: Deadline for the whole command
// - `LINODE_IP_LOG_LEVEL`: trace, debug, info, warn, error

use anyhow::Result;
use linode_ip_core::{LinodeIpConfig, ProviderConfig, ReconcilerConfig, StateStoreConfig};
use std::time::Duration;
use tracing::Level;

const DEFAULT_STATE_PATH: &str = "linode-ip-state.json";

/// Application configuration
#[derive(Clone)]
pub struct Config {
    api_token: String,
    api_url: Option<String>,
    api_version: Option<String>,
    ua_prefix: Option<String>,
    state_store_type: String,
    state_path: String,
    timeout_secs: Option<String>,
    log_level: String,
}

// token stays out of Debug output
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_token", &"<REDACTED>")
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .field("ua_prefix", &self.ua_prefix)
            .field("state_store_type", &self.state_store_type)
            .field("state_path", &self.state_path)
            .field("timeout_secs", &self.timeout_secs)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            api_token: lookup("LINODE_TOKEN").unwrap_or_default(),
            api_url: non_empty("LINODE_URL"),
            api_version: non_empty("LINODE_API_VERSION"),
            ua_prefix: non_empty("LINODE_UA_PREFIX"),
            state_store_type: non_empty("LINODE_IP_STATE_STORE_TYPE")
                .unwrap_or_else(|| "file".to_string()),
            state_path: non_empty("LINODE_IP_STATE_PATH")
                .unwrap_or_else(|| DEFAULT_STATE_PATH.to_string()),
            timeout_secs: non_empty("LINODE_IP_TIMEOUT_SECS"),
            log_level: non_empty("LINODE_IP_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        }
    }

    /// Validate the configuration
    ///
    /// This checks:
    /// - Token presence and obvious placeholders
    /// - State store type and path
    /// - Numeric ranges
    /// - Log level
    /// - The resulting library configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_token.trim().is_empty() {
            anyhow::bail!(
                "LINODE_TOKEN is required. \
                Set it via: export LINODE_TOKEN=your_token"
            );
        }

        let token_lower = self.api_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower == "token"
        {
            anyhow::bail!(
                "LINODE_TOKEN appears to be a placeholder. \
                Use a personal access token from the Linode Cloud Manager."
            );
        }

        match self.state_store_type.as_str() {
            "file" | "memory" => {}
            other => anyhow::bail!(
                "LINODE_IP_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        }

        if let Some(timeout) = self.timeout()?
            && !(1..=3600).contains(&timeout.as_secs())
        {
            anyhow::bail!(
                "LINODE_IP_TIMEOUT_SECS must be between 1 and 3600 seconds. Got: {}",
                timeout.as_secs()
            );
        }

        self.log_level()?;

        self.to_core().validate()?;

        Ok(())
    }

    /// Library configuration built from the environment
    pub fn to_core(&self) -> LinodeIpConfig {
        let mut provider = ProviderConfig::new(self.api_token.clone());
        if let Some(url) = &self.api_url {
            provider = provider.with_api_url(url.clone());
        }
        if let Some(version) = &self.api_version {
            provider.api_version = version.clone();
        }
        provider.ua_prefix = self.ua_prefix.clone();

        let state_store = match self.state_store_type.as_str() {
            "memory" => StateStoreConfig::Memory,
            _ => StateStoreConfig::File {
                path: self.state_path.clone(),
            },
        };

        LinodeIpConfig {
            provider,
            state_store,
            reconciler: ReconcilerConfig::default(),
        }
    }

    /// Deadline for the whole command
    pub fn timeout(&self) -> Result<Option<Duration>> {
        self.timeout_secs
            .as_deref()
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| {
                        anyhow::anyhow!(
                            "LINODE_IP_TIMEOUT_SECS must be a whole number of seconds. Got: {}",
                            raw
                        )
                    })
            })
            .transpose()
    }

    /// Maximum tracing level
    pub fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "LINODE_IP_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}
