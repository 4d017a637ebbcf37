//! Starshot Core - Resilient client for remote image predictions.
//!
//! Starshot submits image-generation jobs to a hosted prediction API and sees
//! them through to a result despite flaky networks, slow jobs, and blocked
//! origins.
//!
//! # Architecture
//!
//! ```text
//! Generator ─ retry ─▶ create ─▶ Poller ─▶ get ... get ─▶ Prediction
//!                        │                   │
//!                        └──── ProxyRouter ──┘ (CORS relays, health-ordered)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use starshot_core::{Config, PredictionInput, Starshot};
//!
//! #[tokio::main]
//! async fn main() -> starshot_core::Result<()> {
//!     let config = Config::load()?;
//!     let starshot = Starshot::new(config)?;
//!
//!     let model = starshot.model(None)?;
//!     let input = PredictionInput::new().with("prompt", "a selfie with a star");
//!     let prediction = starshot.generate(&model, &input).await?;
//!     println!("Output: {:?}", prediction.output);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod clock;
pub mod config;
pub mod error;
pub mod prediction;
pub mod progress;
pub mod proxy;
pub mod retry;

// Re-exports for convenient access
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use error::{ConfigError, PredictionError, Result, StarshotError};
pub use prediction::{
    Generator, ImageInput, ModelRef, PollPolicy, Prediction, PredictionApi, PredictionInput,
    PredictionOutput, PredictionStatus, ReplicateClient,
};
pub use progress::{Phase, ProgressEvent, ProgressHub};
pub use proxy::{FileHealthStore, ProxyCandidate, ProxyHealthStore, ProxyRouter};
pub use retry::{retry_with_backoff, RetryConfig, RetryPreset};

use std::sync::Arc;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Starshot client - the main entry point for running predictions.
///
/// Wires the configured API client, proxy router, and persistent proxy
/// health into a [`Generator`].
pub struct Starshot {
    config: Config,
    health: Arc<dyn ProxyHealthStore>,
    router: ProxyRouter,
    generator: Generator,
}

impl Starshot {
    /// Create a new Starshot instance talking to the configured API.
    pub fn new(config: Config) -> Result<Self> {
        tracing::debug!("Initializing Starshot v{}", VERSION);

        let token = config.api_token()?;
        let health = Self::health_store(&config);
        let client = ReplicateClient::new(
            &config.api.base_url,
            &token,
            Self::build_router(&config, health.clone())?,
            config.request_timeout(),
        );
        Self::with_api(config, Arc::new(client), health)
    }

    /// Create a Starshot instance around an existing API implementation.
    pub fn with_api(
        config: Config,
        api: Arc<dyn PredictionApi>,
        health: Arc<dyn ProxyHealthStore>,
    ) -> Result<Self> {
        let router = Self::build_router(&config, health.clone())?;
        let generator = Generator::new(api, PollPolicy::from(&config.poll));
        Ok(Self {
            config,
            health,
            router,
            generator,
        })
    }

    fn health_store(config: &Config) -> Arc<dyn ProxyHealthStore> {
        Arc::new(FileHealthStore::new(
            config.health_file(),
            config.health_ttl(),
            Arc::new(SystemClock),
        ))
    }

    fn build_router(config: &Config, health: Arc<dyn ProxyHealthStore>) -> Result<ProxyRouter> {
        let origin = proxy::origin_of(&config.api.base_url).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "api.base_url is not a valid http(s) URL: {}",
                config.api.base_url
            ))
        })?;
        let urls = config.proxy_urls();
        if urls.is_empty() {
            if config.proxy.enabled {
                tracing::warn!("Proxy enabled but no proxy URL resolved; calling the API directly");
            }
            return Ok(ProxyRouter::direct(origin));
        }
        Ok(ProxyRouter::new(origin, urls, health))
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Hub carrying progress events for [`Starshot::generate`].
    pub fn progress(&self) -> &ProgressHub {
        self.generator.progress()
    }

    /// Resolve the model to run: an explicit override or `api.model`.
    pub fn model(&self, override_model: Option<&str>) -> Result<ModelRef> {
        let name = override_model.unwrap_or(&self.config.api.model);
        if name.is_empty() {
            return Err(ConfigError::ValidationError(
                "No model given. Pass --model or set api.model.".into(),
            )
            .into());
        }
        Ok(ModelRef::parse(name)?)
    }

    /// Run a prediction to completion with retries and polling.
    pub async fn generate(&self, model: &ModelRef, input: &PredictionInput) -> Result<Prediction> {
        Ok(self.generator.run(model, input).await?)
    }

    /// Fetch the current state of a prediction.
    pub async fn status(&self, id: &str) -> Result<Prediction> {
        Ok(self.generator.api().get(id).await?)
    }

    /// Cancel a prediction.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        Ok(self.generator.api().cancel(id).await?)
    }

    /// Configured proxies in priority order with their current health.
    pub fn proxy_candidates(&self) -> Vec<ProxyCandidate> {
        self.router.candidates()
    }

    /// Forget all recorded proxy health.
    pub fn clear_proxy_health(&self) {
        self.health.clear();
    }
}
