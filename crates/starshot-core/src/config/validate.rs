//! Configuration validation with range checks.

use crate::error::ConfigError;
use crate::prediction::ModelRef;
use crate::proxy::origin_of;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if origin_of(&self.api.base_url).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "api.base_url is not a valid http(s) URL: {}",
                self.api.base_url
            )));
        }
        if !self.api.model.is_empty() {
            ModelRef::parse(&self.api.model)
                .map_err(|e| ConfigError::ValidationError(format!("api.model: {e}")))?;
        }
        if self.api.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "api.request_timeout_ms must be > 0".into(),
            ));
        }
        if self.proxy.enabled && self.proxy.urls.is_empty() {
            return Err(ConfigError::ValidationError(
                "proxy.urls must not be empty when proxy.enabled = true".into(),
            ));
        }
        if self.proxy.health_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "proxy.health_ttl_secs must be > 0".into(),
            ));
        }
        if self.poll.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll.interval_ms must be > 0".into(),
            ));
        }
        if self.poll.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "poll.timeout_secs must be > 0".into(),
            ));
        }
        if let Some(late) = self
            .poll
            .warn_after_secs
            .iter()
            .find(|s| **s >= self.poll.timeout_secs)
        {
            return Err(ConfigError::ValidationError(format!(
                "poll.warn_after_secs entry {late} must be below poll.timeout_secs ({})",
                self.poll.timeout_secs
            )));
        }
        Ok(())
    }
}
