//! Error types for the Starshot prediction client.
//!
//! Errors are split by concern: configuration problems surface once at
//! startup, while prediction errors carry enough structure (HTTP status,
//! remote message) for the retry and proxy layers to classify them.

use thiserror::Error;

/// Top-level error type for Starshot operations.
#[derive(Error, Debug)]
pub enum StarshotError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote prediction errors
    #[error("Prediction error: {0}")]
    Prediction(#[from] PredictionError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors raised while submitting, polling, or cancelling a prediction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictionError {
    /// The API (or a proxy in front of it) answered with a non-2xx status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection-level failure: DNS, refused connection, reset, TLS
    #[error("Request failed: {0}")]
    Transport(String),

    /// A single HTTP request exceeded its timeout
    #[error("Request timed out after {0}ms")]
    RequestTimeout(u64),

    /// The response body could not be understood
    #[error("Invalid response from prediction API: {0}")]
    InvalidResponse(String),

    /// The request was rejected locally before being sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The remote job reported `failed`
    #[error("{0}")]
    Failed(String),

    /// The remote job reported `canceled`
    #[error("Prediction was canceled")]
    Canceled,

    /// The poller gave up waiting and cancelled the job
    #[error(
        "Generation took longer than expected ({elapsed_secs}s) and was cancelled. Please try again."
    )]
    TimedOut { elapsed_secs: u64 },
}

/// Retry eligibility of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient trouble; repeating the request may succeed.
    Retryable,
    /// The request itself is wrong or categorically blocked.
    NonRetryable,
}

/// HTTP statuses that describe the request rather than the transport.
const REQUEST_LEVEL_STATUSES: [u16; 6] = [400, 401, 403, 404, 422, 429];

impl PredictionError {
    /// Classify this error for retry purposes.
    ///
    /// Anything not explicitly request-level is retryable.
    pub fn class(&self) -> ErrorClass {
        if self.is_request_level() {
            ErrorClass::NonRetryable
        } else {
            ErrorClass::Retryable
        }
    }

    /// True for authentication, not-found, rate-limit and validation failures.
    ///
    /// No proxy can fix these, so the failover loop stops on them.
    pub fn is_request_level(&self) -> bool {
        match self {
            PredictionError::Http { status, .. } => REQUEST_LEVEL_STATUSES.contains(status),
            PredictionError::InvalidRequest(_) => true,
            _ => false,
        }
    }

    /// HTTP status code, if this error came from an HTTP response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            PredictionError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Convenience type alias for Starshot results.
pub type Result<T> = std::result::Result<T, StarshotError>;
