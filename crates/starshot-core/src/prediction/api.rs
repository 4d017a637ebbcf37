//! Prediction API trait and the Replicate HTTP client.
//!
//! Every request goes through the [`ProxyRouter`], so a browser-style CORS
//! relay can sit between the client and the API.

use super::types::{ModelRef, Prediction, PredictionInput};
use crate::error::PredictionError;
use crate::proxy::ProxyRouter;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Remote asynchronous job API.
///
/// Uses `async_trait` because native async fn in trait is not object-safe
/// (the generator holds an `Arc<dyn PredictionApi>`).
#[async_trait]
pub trait PredictionApi: Send + Sync {
    /// Submit a job, waiting a bounded time for it to finish synchronously.
    async fn create(
        &self,
        model: &ModelRef,
        input: &PredictionInput,
    ) -> Result<Prediction, PredictionError>;

    /// Fetch the current state of a job.
    async fn get(&self, id: &str) -> Result<Prediction, PredictionError>;

    /// Ask the remote to stop a job.
    async fn cancel(&self, id: &str) -> Result<(), PredictionError>;
}

/// Resolve `${ENV_VAR}` references in config strings.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    input: &'a PredictionInput,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    title: Option<String>,
}

/// Replicate predictions API client.
pub struct ReplicateClient {
    base_url: String,
    api_token: String,
    client: reqwest::Client,
    router: ProxyRouter,
    request_timeout: Duration,
}

impl ReplicateClient {
    pub fn new(
        base_url: &str,
        api_token: &str,
        router: ProxyRouter,
        request_timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            client: reqwest::Client::new(),
            router,
            request_timeout,
        }
    }

    pub fn router(&self) -> &ProxyRouter {
        &self.router
    }

    fn create_url(&self, model: &ModelRef) -> String {
        format!(
            "{}/models/{}/{}/predictions",
            self.base_url,
            model.owner(),
            model.name()
        )
    }

    fn prediction_url(&self, id: &str) -> String {
        format!("{}/predictions/{}", self.base_url, id)
    }

    /// One HTTP exchange against a fully built URL.
    async fn send(
        &self,
        method: Method,
        url: String,
        body: Option<&CreateRequest<'_>>,
        prefer_wait: bool,
    ) -> Result<Option<Prediction>, PredictionError> {
        let start = Instant::now();
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.api_token)
            .timeout(self.request_timeout);
        if prefer_wait {
            request = request.header("Prefer", "wait");
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = resp.status();
        tracing::debug!(
            "{method} {url} -> {status} in {}ms",
            start.elapsed().as_millis()
        );

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PredictionError::Http {
                status: status.as_u16(),
                message: error_message(status, &text),
            });
        }

        let text = resp.text().await.map_err(|e| self.map_transport(e))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| PredictionError::InvalidResponse(format!("{e}: {}", truncate(&text))))
    }

    fn map_transport(&self, e: reqwest::Error) -> PredictionError {
        if e.is_timeout() {
            PredictionError::RequestTimeout(self.request_timeout.as_millis() as u64)
        } else if e.is_decode() {
            PredictionError::InvalidResponse(e.to_string())
        } else {
            PredictionError::Transport(e.to_string())
        }
    }
}

fn required(prediction: Option<Prediction>) -> Result<Prediction, PredictionError> {
    prediction.ok_or_else(|| PredictionError::InvalidResponse("empty response body".to_string()))
}

/// Prefer the API's `detail` field, then `title`, then the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(msg) = parsed.detail.or(parsed.title) {
            return msg;
        }
    }
    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        truncate(body).to_string()
    }
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(300) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[async_trait]
impl PredictionApi for ReplicateClient {
    async fn create(
        &self,
        model: &ModelRef,
        input: &PredictionInput,
    ) -> Result<Prediction, PredictionError> {
        let target = self.create_url(model);
        let body = CreateRequest { input };
        let body = &body;
        tracing::info!("Submitting prediction to {model}");
        let prediction = self
            .router
            .dispatch(&target, move |url| {
                self.send(Method::POST, url, Some(body), true)
            })
            .await
            .and_then(required)?;
        tracing::info!(
            "Prediction {} created with status {}",
            prediction.id,
            prediction.status
        );
        Ok(prediction)
    }

    async fn get(&self, id: &str) -> Result<Prediction, PredictionError> {
        let target = self.prediction_url(id);
        self.router
            .dispatch(&target, move |url| self.send(Method::GET, url, None, false))
            .await
            .and_then(required)
    }

    async fn cancel(&self, id: &str) -> Result<(), PredictionError> {
        let target = format!("{}/cancel", self.prediction_url(id));
        self.router
            .dispatch(&target, move |url| self.send(Method::POST, url, None, false))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::prediction::PredictionStatus;
    use crate::proxy::{MemoryHealthStore, ProxyHealthStore};
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ReplicateClient {
        let base = format!("{}/v1", server.uri());
        ReplicateClient::new(
            &base,
            "r8_test",
            ProxyRouter::direct(server.uri()),
            Duration::from_secs(5),
        )
    }

    fn model() -> ModelRef {
        ModelRef::parse("acme/selfie").unwrap()
    }

    #[tokio::test]
    async fn test_create_sends_prefer_wait_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/models/acme/selfie/predictions"))
            .and(header("Prefer", "wait"))
            .and(header("Authorization", "Bearer r8_test"))
            .and(body_json(serde_json::json!({"input": {"prompt": "hi"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "p1",
                "status": "succeeded",
                "output": "https://cdn/x.png"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let input = PredictionInput::new().with("prompt", "hi");
        let prediction = client(&server).create(&model(), &input).await.unwrap();
        assert_eq!(prediction.id, "p1");
        assert_eq!(prediction.status, PredictionStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_get_and_cancel_paths() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "p9",
                "status": "processing"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/predictions/p9/cancel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "p9",
                "status": "canceled"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = client(&server);
        let p = api.get("p9").await.unwrap();
        assert_eq!(p.status, PredictionStatus::Processing);
        api.cancel("p9").await.unwrap();
    }

    #[tokio::test]
    async fn test_http_error_uses_detail_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "title": "Unauthenticated",
                "detail": "You did not pass a valid authentication token"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .create(&model(), &PredictionInput::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PredictionError::Http {
                status: 401,
                message: "You did not pass a valid authentication token".into()
            }
        );
        assert!(!crate::retry::is_retryable(&err));
    }

    #[tokio::test]
    async fn test_server_error_plain_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let err = client(&server).get("p1").await.unwrap_err();
        assert_eq!(err.status_code(), Some(503));
        assert!(err.to_string().contains("upstream unavailable"));
        assert!(crate::retry::is_retryable(&err));
    }

    #[tokio::test]
    async fn test_invalid_json_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy page</html>"))
            .mount(&server)
            .await;

        let err = client(&server).get("p1").await.unwrap_err();
        assert!(matches!(err, PredictionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_request_timeout_maps_to_timeout_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(serde_json::json!({"id": "p1", "status": "processing"})),
            )
            .mount(&server)
            .await;

        let api = ReplicateClient::new(
            &format!("{}/v1", server.uri()),
            "r8_test",
            ProxyRouter::direct(server.uri()),
            Duration::from_millis(100),
        );
        let err = api.get("p1").await.unwrap_err();
        assert_eq!(err, PredictionError::RequestTimeout(100));
    }

    #[tokio::test]
    async fn test_requests_go_through_query_proxy() {
        let api_server = MockServer::start().await;
        let proxy_server = MockServer::start().await;
        let target = format!("{}/v1/predictions/p1", api_server.uri());

        Mock::given(method("GET"))
            .and(path("/raw"))
            .and(query_param("url", target.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "p1",
                "status": "starting"
            })))
            .expect(1)
            .mount(&proxy_server)
            .await;

        let store = Arc::new(MemoryHealthStore::new(Arc::new(ManualClock::at(1))));
        let proxy_base = format!("{}/raw?url=", proxy_server.uri());
        let router = ProxyRouter::new(api_server.uri(), vec![proxy_base.clone()], store.clone());
        let api = ReplicateClient::new(
            &format!("{}/v1", api_server.uri()),
            "r8_test",
            router,
            Duration::from_secs(5),
        );

        let p = api.get("p1").await.unwrap();
        assert_eq!(p.status, PredictionStatus::Starting);
        let health = store.read();
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].url, proxy_base);
        assert_eq!(health[0].success_count, 1);
    }

    #[tokio::test]
    async fn test_path_proxy_failover_to_second_proxy() {
        let api_server = MockServer::start().await;
        let dead_proxy = MockServer::start().await;
        let live_proxy = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(1)
            .mount(&dead_proxy)
            .await;
        Mock::given(method("GET"))
            .and(path("/replicate/v1/predictions/p1"))
            .and(header("Authorization", "Bearer r8_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "p1",
                "status": "succeeded",
                "output": ["https://cdn/a.png"]
            })))
            .expect(1)
            .mount(&live_proxy)
            .await;

        let store = Arc::new(MemoryHealthStore::new(Arc::new(ManualClock::at(1))));
        let router = ProxyRouter::new(
            api_server.uri(),
            vec![
                format!("{}/replicate", dead_proxy.uri()),
                format!("{}/replicate", live_proxy.uri()),
            ],
            store.clone(),
        );
        let api = ReplicateClient::new(
            &format!("{}/v1", api_server.uri()),
            "r8_test",
            router,
            Duration::from_secs(5),
        );

        let p = api.get("p1").await.unwrap();
        assert_eq!(p.status, PredictionStatus::Succeeded);
        let candidates = api.router().candidates();
        assert_eq!(candidates[0].health.as_ref().unwrap().failure_count, 1);
        assert_eq!(candidates[1].health.as_ref().unwrap().success_count, 1);
    }

    #[test]
    fn test_resolve_env_var() {
        assert_eq!(resolve_env_var("plain-key"), Some("plain-key".to_string()));
        assert_eq!(resolve_env_var(""), None);
        assert_eq!(resolve_env_var("${DEFINITELY_NOT_SET_XYZ_123}"), None);
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, r#"{"title":"Not found"}"#),
            "Not found"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "  "), "Bad Gateway");
    }
}
