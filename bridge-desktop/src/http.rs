//! `reqwest` transport

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("storefront-core/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`HttpClient`] over a pooled `reqwest::Client`.
///
/// Redirects follow reqwest's defaults. Nothing is retried.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .map(Self::from_client)
            .map_err(|e| BridgeError::NotAvailable(format!("reqwest client: {}", e)))
    }

    /// Wrap a client configured elsewhere (proxies, custom roots).
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn classify(error: reqwest::Error) -> BridgeError {
    if error.is_timeout() {
        BridgeError::Timeout(error.to_string())
    } else if error.is_connect() || error.is_request() {
        BridgeError::Connection(error.to_string())
    } else {
        BridgeError::OperationFailed(error.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = self.inner.request(reqwest_method(method), url.as_str());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let started = std::time::Instant::now();
        let response = builder.send().await.map_err(|e| {
            warn!(%method, %url, error = %e, "No response from storefront API");
            classify(e)
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(classify)?;

        debug!(
            %method,
            %url,
            status,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Response received"
        );

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
