//! Session configuration management.
//!
//! This module handles loading the endpoint, renewal policy and transport
//! settings. Every field has a default, so the file is optional.
//!
//! Configuration is stored at `~/.config/certsession/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::session::RenewalPolicy;
use crate::transport::TransportConfig;

/// Application name used for the config directory path
const APP_NAME: &str = "certsession";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Certificate login, keep-alive and logout live under this base.
pub const DEFAULT_IDENTITY_URL: &str = "https://identitysso-cert.betfair.com.au/api/";

/// Business calls go to this base.
pub const DEFAULT_API_URL: &str = "https://api.betfair.com/exchange/betting/rest/v1.0/";

/// On-disk form; durations are plain integers so the JSON stays readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub identity_url: String,
    pub api_url: String,
    pub keepalive_interval_secs: u64,
    pub max_reconnect_attempts: u32,
    pub backoff_base_ms: u64,
    pub max_jitter_ms: u64,
    pub shutdown_timeout_secs: u64,
    pub transport: TransportConfig,
}

impl Default for Config {
    fn default() -> Self {
        let policy = RenewalPolicy::default();
        Self {
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            keepalive_interval_secs: policy.keepalive_interval.as_secs(),
            max_reconnect_attempts: policy.max_reconnect_attempts,
            backoff_base_ms: policy.backoff_base.as_millis() as u64,
            max_jitter_ms: policy.max_jitter.as_millis() as u64,
            shutdown_timeout_secs: policy.shutdown_timeout.as_secs(),
            transport: TransportConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn policy(&self) -> RenewalPolicy {
        RenewalPolicy {
            keepalive_interval: Duration::from_secs(self.keepalive_interval_secs),
            max_reconnect_attempts: self.max_reconnect_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            identity_url: self.identity_url.clone(),
            api_url: self.api_url.clone(),
            policy: self.policy(),
            transport: self.transport.clone(),
        }
    }
}

/// Everything a `SessionManager` needs besides credentials.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub identity_url: String,
    pub api_url: String,
    pub policy: RenewalPolicy,
    pub transport: TransportConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Config::default().session_config()
    }
}
