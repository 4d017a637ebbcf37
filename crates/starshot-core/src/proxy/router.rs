//! Priority-ordered proxy failover.

use super::endpoint::ProxyEndpoint;
#[cfg(test)]
use super::endpoint::ProxyMode;
use super::health::{ProxyHealthRecord, ProxyHealthStore};
use crate::error::PredictionError;
use std::future::Future;
use std::sync::Arc;

/// A configured proxy together with its current health, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyCandidate {
    pub url: String,
    /// `None` when the proxy has no unexpired record
    pub health: Option<ProxyHealthRecord>,
}

enum Route {
    Direct,
    Proxied {
        endpoints: Vec<ProxyEndpoint>,
        store: Arc<dyn ProxyHealthStore>,
    },
}

/// Routes API requests through CORS proxies in priority order.
pub struct ProxyRouter {
    api_origin: String,
    route: Route,
}

impl ProxyRouter {
    /// Requests go straight to the API.
    pub fn direct(api_origin: impl Into<String>) -> Self {
        Self {
            api_origin: api_origin.into(),
            route: Route::Direct,
        }
    }

    /// Requests go through `proxies`, first entry tried first.
    ///
    /// An empty list degrades to direct routing.
    pub fn new(
        api_origin: impl Into<String>,
        proxies: Vec<String>,
        store: Arc<dyn ProxyHealthStore>,
    ) -> Self {
        let api_origin = api_origin.into();
        let endpoints: Vec<_> = proxies
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(ProxyEndpoint::new)
            .collect();

        if endpoints.is_empty() {
            return Self::direct(api_origin);
        }
        Self {
            api_origin,
            route: Route::Proxied { endpoints, store },
        }
    }

    #[cfg(test)]
    fn is_direct(&self) -> bool {
        matches!(self.route, Route::Direct)
    }

    /// Configured proxies in priority order, with fresh health attached.
    pub fn candidates(&self) -> Vec<ProxyCandidate> {
        let Route::Proxied { endpoints, store } = &self.route else {
            return Vec::new();
        };
        let records = store.read();
        endpoints
            .iter()
            .map(|endpoint| ProxyCandidate {
                url: endpoint.base().to_string(),
                health: records.iter().find(|r| r.url == endpoint.base()).cloned(),
            })
            .collect()
    }

    /// URL used to reach `target` through the proxy at `index`.
    #[cfg(test)]
    fn wrap(&self, index: usize, target: &str) -> Option<String> {
        match &self.route {
            Route::Direct => (index == 0).then(|| target.to_string()),
            Route::Proxied { endpoints, .. } => endpoints
                .get(index)
                .map(|e| e.wrap(target, &self.api_origin)),
        }
    }

    /// Send a request for `target`, failing over between proxies.
    ///
    /// `send` receives the final URL. The first success wins; a request-level
    /// error stops the loop at once. Otherwise the last proxy's error is
    /// returned.
    pub async fn dispatch<T, F, Fut>(&self, target: &str, mut send: F) -> Result<T, PredictionError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, PredictionError>>,
    {
        let (endpoints, store) = match &self.route {
            Route::Direct => return send(target.to_string()).await,
            Route::Proxied { endpoints, store } => (endpoints, store),
        };

        let mut last_error = None;
        for (index, endpoint) in endpoints.iter().enumerate() {
            let url = endpoint.wrap(target, &self.api_origin);
            let mode = endpoint.mode_for(target, &self.api_origin);
            tracing::debug!(
                "Proxy {}/{} ({mode:?}): {url}",
                index + 1,
                endpoints.len()
            );

            match send(url).await {
                Ok(value) => {
                    store.record_success(endpoint.base());
                    return Ok(value);
                }
                Err(e) => {
                    store.record_failure(endpoint.base());
                    if e.is_request_level() {
                        tracing::debug!(
                            "Request rejected via {}: {e}; not trying other proxies",
                            endpoint.base()
                        );
                        return Err(e);
                    }
                    tracing::warn!("Proxy {} failed: {e}", endpoint.base());
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PredictionError::Transport("no proxy endpoints available".to_string())
        }))
    }

    /// Rewriting mode each proxy would use for `target`.
    #[cfg(test)]
    fn modes_for(&self, target: &str) -> Vec<ProxyMode> {
        match &self.route {
            Route::Direct => Vec::new(),
            Route::Proxied { endpoints, .. } => endpoints
                .iter()
                .map(|e| e.mode_for(target, &self.api_origin))
                .collect(),
        }
    }
}
