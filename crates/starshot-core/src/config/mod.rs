//! Configuration management for Starshot.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Secrets and proxy URLs are usually `${ENV_VAR}` references so the
//! file can be shared between kiosks.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use crate::prediction::resolve_env_var;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure for Starshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prediction API settings
    pub api: ApiConfig,

    /// CORS proxy settings
    pub proxy: ProxyConfig,

    /// Polling settings
    pub poll: PollConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.starshot.starshot/config.toml
    /// - Linux: ~/.config/starshot/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\starshot\config\config.toml
    ///
    /// Falls back to ~/.starshot/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "starshot", "starshot")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".starshot").join("config.toml")
            })
    }

    /// Resolved proxy health file path (with ~ expansion).
    pub fn health_file(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.proxy.health_file);
        PathBuf::from(expanded.into_owned())
    }

    pub fn health_ttl(&self) -> Duration {
        Duration::from_secs(self.proxy.health_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api.request_timeout_ms)
    }

    /// API token with `${ENV_VAR}` resolved.
    pub fn api_token(&self) -> Result<String, ConfigError> {
        resolve_env_var(&self.api.api_token).ok_or_else(|| {
            ConfigError::ValidationError(
                "API token not set. Set REPLICATE_API_TOKEN or api.api_token.".to_string(),
            )
        })
    }

    /// Proxy URLs to use, in priority order. Empty when proxying is disabled.
    ///
    /// Unset `${ENV_VAR}` entries are skipped.
    pub fn proxy_urls(&self) -> Vec<String> {
        if !self.proxy.enabled {
            return Vec::new();
        }
        self.proxy
            .urls
            .iter()
            .filter_map(|u| resolve_env_var(u))
            .collect()
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "https://api.replicate.com/v1");
        assert_eq!(config.poll.interval_ms, 2000);
        assert_eq!(config.poll.timeout_secs, 120);
        assert_eq!(config.poll.warn_after_secs, vec![60, 90]);
        assert!(!config.proxy.enabled);
        assert_eq!(config.health_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[api]"));
        assert!(toml.contains("[proxy]"));
        assert!(toml.contains("[poll]"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[proxy]\nenabled = true\nurls = [\"https://relay.example/replicate\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.proxy.enabled);
        assert_eq!(config.proxy_urls(), vec!["https://relay.example/replicate"]);
        assert_eq!(config.poll.timeout_secs, 120);
    }

    #[test]
    fn test_proxy_urls_empty_when_disabled() {
        let mut config = Config::default();
        config.proxy.urls = vec!["https://relay.example/replicate".into()];
        assert!(config.proxy_urls().is_empty());
    }

    #[test]
    fn test_unset_env_proxy_is_skipped() {
        let mut config = Config::default();
        config.proxy.enabled = true;
        config.proxy.urls = vec![
            "${DEFINITELY_NOT_SET_PROXY_XYZ}".into(),
            "https://relay.example/?url=".into(),
        ];
        assert_eq!(config.proxy_urls(), vec!["https://relay.example/?url="]);
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let mut config = Config::default();
        config.api.api_token = "${DEFINITELY_NOT_SET_TOKEN_XYZ}".into();
        let err = config.api_token().unwrap_err();
        assert!(err.to_string().contains("REPLICATE_API_TOKEN"));

        config.api.api_token = "r8_literal".into();
        assert_eq!(config.api_token().unwrap(), "r8_literal");
    }

    #[test]
    fn test_health_file_expands_tilde() {
        let config = Config::default();
        let path = config.health_file();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with(".starshot/proxy_health.json"));
    }
}
