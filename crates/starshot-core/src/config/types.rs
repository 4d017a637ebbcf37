//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};

/// Prediction API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API root, e.g. "https://api.replicate.com/v1"
    pub base_url: String,

    /// Bearer token (supports ${ENV_VAR} syntax)
    pub api_token: String,

    /// Default model as "owner/name"
    pub model: String,

    /// Input key that receives the user photo
    pub image_input_key: String,

    /// Per-request timeout in milliseconds. Must cover the synchronous wait
    /// the API performs for `Prefer: wait`.
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.replicate.com/v1".to_string(),
            api_token: "${REPLICATE_API_TOKEN}".to_string(),
            model: "black-forest-labs/flux-kontext-pro".to_string(),
            image_input_key: "input_image".to_string(),
            request_timeout_ms: 90_000,
        }
    }
}

/// CORS proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Route API calls through the proxies below
    pub enabled: bool,

    /// Proxy base URLs in priority order (supports ${ENV_VAR} syntax)
    pub urls: Vec<String>,

    /// Where proxy health is persisted
    pub health_file: String,

    /// Health records older than this are ignored
    pub health_ttl_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            urls: vec!["${STARSHOT_PROXY_URL}".to_string()],
            health_file: "~/.starshot/proxy_health.json".to_string(),
            health_ttl_secs: 3600,
        }
    }
}

/// Polling settings for predictions still running after submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between status checks in milliseconds
    pub interval_ms: u64,

    /// Elapsed seconds at which a one-time slow-job warning fires
    pub warn_after_secs: Vec<u64>,

    /// Elapsed seconds after which the job is cancelled
    pub timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            warn_after_secs: vec![60, 90],
            timeout_secs: 120,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
