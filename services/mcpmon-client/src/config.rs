//! Configuration types for the MCPmon client

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// MCPmon client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

impl Config {
    /// Check settings that would otherwise only fail on first use
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.api.base_url).map_err(|e| {
            ClientError::Config(format!("api.base_url '{}': {}", self.api.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "api.base_url '{}' must use http or https",
                self.api.base_url
            )));
        }
        if self.api.request_timeout_seconds == 0 {
            return Err(ClientError::Config(
                "api.request_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.realtime.connection_timeout_seconds == 0 {
            return Err(ClientError::Config(
                "realtime.connection_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// REST API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API, e.g. `https://api.example.com/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Push channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            connection_timeout_seconds: default_connection_timeout(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

fn default_connection_timeout() -> u64 {
    10
}

/// Configuration for automatic reconnection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Enable automatic reconnection when the connection is lost
    #[serde(default = "default_reconnect_enabled")]
    pub enabled: bool,
    /// Fixed delay between reconnection attempts in milliseconds
    #[serde(default = "default_reconnect_interval")]
    pub interval_ms: u64,
    /// Consecutive failed attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl ReconnectConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: default_reconnect_enabled(),
            interval_ms: default_reconnect_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_reconnect_enabled() -> bool {
    true
}

fn default_reconnect_interval() -> u64 {
    3000
}

fn default_max_attempts() -> u32 {
    10
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_interval_as_duration() {
        let config = ReconnectConfig {
            interval_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.api.base_url = "ftp://example.com".to_string();
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        config.api.base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut config = Config::default();
        config.realtime.connection_timeout_seconds = 0;
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.api.base_url, "http://localhost:3000");
        assert_eq!(config.realtime.reconnect, ReconnectConfig::default());
    }
}
