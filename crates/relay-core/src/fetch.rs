//! Browser-mimicking HTTP client with pacing, retry, and backoff.
//!
//! All upstream traffic flows through [`ThrottledFetch`]: a `wreq` client
//! built with a Chrome emulation profile (see [`crate::emulation`]), a
//! gaussian pre-call delay, and a bounded retry loop for transient
//! failures. HTTP error statuses are returned to the caller for
//! inspection — only transport-level failures become errors. A 429 is
//! never retried here; the pool switches accounts instead.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use relay_types::error::UpstreamError;

use crate::config::FetchConfig;
use crate::emulation::chrome_emulation;
use crate::jitter::{is_network_error, jittered_ms};

/// Additional attempts after the first (3 attempts total).
const MAX_RETRIES: u32 = 2;

/// Statuses retried locally; everything else is the caller's problem.
const RETRIABLE_STATUSES: &[u16] = &[500, 502, 503, 504];

/// One outbound request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// HTTP method name ("POST", "GET", ...)
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl FetchRequest {
    /// Shorthand for a JSON POST.
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: HashMap::new(),
            body: Some(body),
        }
    }

    /// Merge extra headers into the request (caller's entries win).
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// A completed response: status plus the full body text.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, UpstreamError> {
        serde_json::from_str(&self.body)
            .map_err(|e| UpstreamError::Internal { message: format!("invalid JSON body: {e}") })
    }
}

/// Seam between callers (handlers, telemetry) and the real HTTP stack.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: FetchRequest) -> Result<FetchResponse, UpstreamError>;
}

/// The production transport.
pub struct ThrottledFetch {
    client: wreq::Client,
    config: FetchConfig,
}

impl ThrottledFetch {
    /// Build the client with a Chrome profile pinned to the host OS.
    pub fn new(config: FetchConfig) -> Result<Self, UpstreamError> {
        let client = wreq::Client::builder()
            .emulation(chrome_emulation())
            .build()
            .map_err(|e| UpstreamError::Internal { message: format!("client build: {e}") })?;
        Ok(Self { client, config })
    }

    /// Pre-call pacing delay: `max(0, base + N(0, base·0.4/4))` ms.
    async fn pre_call_delay(&self) {
        if !self.config.request_throttling_enabled {
            return;
        }
        let delay = jittered_ms(self.config.request_delay_ms as f64, 0.4);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// Backoff before retry `attempt`: `max(500, 1000·2^attempt + jitter)` ms.
    fn backoff_ms(attempt: u32) -> u64 {
        let base = 1000.0 * f64::from(1u32 << attempt);
        jittered_ms(base, 0.5).max(500)
    }

    fn build_request(
        &self,
        request: &FetchRequest,
    ) -> Result<wreq::RequestBuilder, UpstreamError> {
        let method = wreq::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| UpstreamError::Internal { message: format!("bad method: {e}") })?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        Ok(builder)
    }
}

#[async_trait]
impl Transport for ThrottledFetch {
    async fn execute(&self, request: FetchRequest) -> Result<FetchResponse, UpstreamError> {
        self.pre_call_delay().await;

        let mut last_error: Option<String> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = Self::backoff_ms(attempt - 1);
                tracing::warn!(
                    "Retrying {} {} (attempt {}/{}) after {}ms",
                    request.method,
                    request.url,
                    attempt + 1,
                    MAX_RETRIES + 1,
                    backoff
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let response = self.build_request(&request)?.send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let retriable =
                        RETRIABLE_STATUSES.contains(&status) && attempt < MAX_RETRIES;
                    if retriable {
                        tracing::debug!("Upstream returned {}, will retry", status);
                        last_error = Some(format!("upstream returned {status}"));
                        continue;
                    }
                    let body = resp.text().await.unwrap_or_default();
                    return Ok(FetchResponse { status, body });
                },
                Err(e) => {
                    let message = e.to_string();
                    if is_network_error(&message) && attempt < MAX_RETRIES {
                        tracing::debug!("Transport error ({}), will retry", message);
                        last_error = Some(message);
                        continue;
                    }
                    return Err(UpstreamError::Network { message });
                },
            }
        }

        Err(UpstreamError::Network {
            message: last_error.unwrap_or_else(|| "all attempts failed".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quiet_config() -> FetchConfig {
        FetchConfig { request_throttling_enabled: false, request_delay_ms: 0 }
    }

    #[tokio::test]
    async fn success_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1internal:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let fetch = ThrottledFetch::new(quiet_config()).unwrap();
        let resp = fetch
            .execute(FetchRequest::post(
                format!("{}/v1internal:generateContent", server.uri()),
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.json().unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .expect(1)
            .mount(&server)
            .await;

        let fetch = ThrottledFetch::new(quiet_config()).unwrap();
        let resp =
            fetch.execute(FetchRequest::post(server.uri(), serde_json::json!({}))).await.unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "recovered");
    }

    #[tokio::test]
    async fn persistent_server_error_returns_last_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let fetch = ThrottledFetch::new(quiet_config()).unwrap();
        let resp =
            fetch.execute(FetchRequest::post(server.uri(), serde_json::json!({}))).await.unwrap();

        // Final 503 is returned, not raised — the caller classifies it.
        assert_eq!(resp.status, 503);
    }

    #[tokio::test]
    async fn rate_limit_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;

        let fetch = ThrottledFetch::new(quiet_config()).unwrap();
        let resp =
            fetch.execute(FetchRequest::post(server.uri(), serde_json::json!({}))).await.unwrap();

        assert_eq!(resp.status, 429, "429 must surface immediately for account rotation");
    }

    #[tokio::test]
    async fn client_errors_pass_through_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetch = ThrottledFetch::new(quiet_config()).unwrap();
        let resp =
            fetch.execute(FetchRequest::post(server.uri(), serde_json::json!({}))).await.unwrap();

        assert_eq!(resp.status, 404);
    }

    #[test]
    fn backoff_has_a_floor() {
        for attempt in 0..3 {
            for _ in 0..100 {
                assert!(ThrottledFetch::backoff_ms(attempt) >= 500);
            }
        }
    }
}
