//! Prediction data model: remote jobs, their inputs, and model identifiers.

use crate::error::PredictionError;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

/// Lifecycle state reported by the prediction API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    /// No further transitions happen after a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PredictionStatus::Succeeded | PredictionStatus::Failed | PredictionStatus::Canceled
        )
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionStatus::Starting => write!(f, "starting"),
            PredictionStatus::Processing => write!(f, "processing"),
            PredictionStatus::Succeeded => write!(f, "succeeded"),
            PredictionStatus::Failed => write!(f, "failed"),
            PredictionStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// Output of a finished prediction: one URL or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    Single(String),
    Many(Vec<String>),
}

impl PredictionOutput {
    pub fn urls(&self) -> Vec<&str> {
        match self {
            PredictionOutput::Single(url) => vec![url.as_str()],
            PredictionOutput::Many(urls) => urls.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PredictionOutput::Single(url) => url.is_empty(),
            PredictionOutput::Many(urls) => urls.is_empty(),
        }
    }
}

/// Local, possibly stale copy of a remote prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    /// Server-assigned opaque id
    pub id: String,

    pub status: PredictionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PredictionOutput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

impl Prediction {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Convert a terminal prediction into the caller-facing result.
    ///
    /// Succeeded predictions must carry output; failed ones surface the remote
    /// error text verbatim.
    pub fn into_result(self) -> Result<Prediction, PredictionError> {
        match self.status {
            PredictionStatus::Succeeded => {
                if self.output.as_ref().is_some_and(|o| !o.is_empty()) {
                    Ok(self)
                } else {
                    Err(PredictionError::InvalidResponse(format!(
                        "prediction {} succeeded without output",
                        self.id
                    )))
                }
            }
            PredictionStatus::Failed => Err(PredictionError::Failed(
                self.error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "Prediction failed without an error message".to_string()),
            )),
            PredictionStatus::Canceled => Err(PredictionError::Canceled),
            PredictionStatus::Starting | PredictionStatus::Processing => {
                Err(PredictionError::InvalidResponse(format!(
                    "prediction {} is still {}",
                    self.id, self.status
                )))
            }
        }
    }
}

/// `owner/name` identifier of a hosted model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    owner: String,
    name: String,
}

impl ModelRef {
    pub fn parse(s: &str) -> Result<Self, PredictionError> {
        let invalid = || {
            PredictionError::InvalidRequest(format!(
                "model must look like 'owner/name', got '{s}'"
            ))
        };
        let (owner, name) = s.trim().split_once('/').ok_or_else(invalid)?;
        let valid = |part: &str| {
            !part.is_empty() && !part.contains('/') && !part.chars().any(char::is_whitespace)
        };
        if !valid(owner) || !valid(name) {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Base64-encoded image ready to embed in a prediction input.
#[derive(Debug, Clone)]
pub struct ImageInput {
    /// Base64-encoded image bytes
    pub data: String,
    /// MIME type (e.g., "image/jpeg", "image/png")
    pub media_type: String,
}

impl ImageInput {
    /// Create an `ImageInput` from raw bytes and a format or extension.
    pub fn from_bytes(bytes: &[u8], format: &str) -> Self {
        let media_type = match format.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            other => {
                tracing::warn!("Unknown image format '{other}', defaulting to image/jpeg");
                "image/jpeg"
            }
        };

        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            media_type: media_type.to_string(),
        }
    }

    /// Read an image file, taking the format from its extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Ok(Self::from_bytes(&bytes, format))
    }

    /// Data URL accepted by the prediction API in place of a file URL.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// Model inputs sent as `{"input": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PredictionInput(Map<String, Value>);

impl PredictionInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn insert_image(&mut self, key: impl Into<String>, image: &ImageInput) {
        self.insert(key, image.data_url());
    }

    /// Parse a `key=value` pair. Values that parse as JSON (numbers, bools,
    /// arrays) are kept typed; anything else is a string.
    pub fn insert_pair(&mut self, pair: &str) -> Result<(), PredictionError> {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            PredictionError::InvalidRequest(format!("input must be key=value, got '{pair}'"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(PredictionError::InvalidRequest(format!(
                "input key is empty in '{pair}'"
            )));
        }
        let value = serde_json::from_str::<Value>(raw)
            .ok()
            .filter(|v| !v.is_string())
            .unwrap_or_else(|| Value::String(raw.to_string()));
        self.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
