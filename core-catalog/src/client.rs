//! HTTP Client Adapter
//!
//! Thin layer over the host [`HttpClient`]: joins paths onto the configured
//! base URL, encodes query parameters and attaches the standard headers
//! (`Accept`, optional bearer token, configured defaults).
//!
//! Every status code comes back as a response. Interpreting `404` or `500`
//! is up to the caller; only transport failures are errors here.

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_runtime::config::CoreConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{CatalogError, Result};

/// Ordered query-string parameters.
///
/// Order is preserved both in the encoded query string and in cache keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl ToString) {
        self.pairs.push((name.into(), value.to_string()));
    }

    /// Append only when `value` is present.
    pub fn push_opt<V: ToString>(&mut self, name: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.push(name, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// `name=value` strings, used as cache key parameters.
    pub fn key_parts(&self) -> Vec<String> {
        self.pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect()
    }

    /// `application/x-www-form-urlencoded` rendering, without the leading `?`.
    pub fn encode(&self) -> Result<String> {
        serde_urlencoded::to_string(&self.pairs)
            .map_err(|e| CatalogError::InvalidRequest(format!("Invalid query parameters: {}", e)))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (name, value) in iter {
            params.push(name, value);
        }
        params
    }
}

/// Encode one path segment (e.g. a slug) so it cannot alter the path.
pub fn path_segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Storefront backend client.
#[derive(Clone)]
pub struct ApiClient {
    http_client: Arc<dyn HttpClient>,
    base_url: Url,
    default_headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl ApiClient {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: Url) -> Self {
        Self {
            http_client,
            base_url,
            default_headers: Vec::new(),
            timeout: None,
        }
    }

    /// Client using the configured transport, base URL, headers and timeout.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            http_client: Arc::clone(&config.http_client),
            base_url: config.base_url.clone(),
            default_headers: config.default_headers.clone(),
            timeout: Some(config.request_timeout),
        }
    }

    /// Header sent with every request, e.g. a client identifier.
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for `path` below the base URL, with `params` appended.
    pub fn url(&self, path: &str, params: &QueryParams) -> Result<String> {
        let mut url = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.encode()?);
        }

        Url::parse(&url)
            .map(String::from)
            .map_err(|e| CatalogError::InvalidRequest(format!("Invalid URL for {}: {}", path, e)))
    }

    /// Request with the standard headers attached.
    pub fn request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &QueryParams,
        token: Option<&str>,
    ) -> Result<HttpRequest> {
        let mut request = HttpRequest::new(method, self.url(path, params)?)
            .header("Accept", "application/json");

        for (name, value) in &self.default_headers {
            request = request.header(name.clone(), value.clone());
        }
        if let Some(token) = token {
            request = request.bearer_token(token);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        Ok(request)
    }

    /// Execute once. Any status is `Ok`.
    #[instrument(skip(self, request), fields(method = request.method.as_str()))]
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        match self.http_client.execute(request).await {
            Ok(response) => {
                debug!(status = response.status, "Storefront API responded");
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, "Storefront API request failed");
                Err(CatalogError::Transport(e))
            }
        }
    }

    pub async fn get(
        &self,
        path: &str,
        params: &QueryParams,
        token: Option<&str>,
    ) -> Result<HttpResponse> {
        let request = self.request(HttpMethod::Get, path, params, token)?;
        self.send(request).await
    }

    pub async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<HttpResponse> {
        let request = self.with_body(HttpMethod::Post, path, body, token)?;
        self.send(request).await
    }

    pub async fn put<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<HttpResponse> {
        let request = self.with_body(HttpMethod::Put, path, body, token)?;
        self.send(request).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<HttpResponse> {
        let request = self.request(HttpMethod::Delete, path, &QueryParams::new(), token)?;
        self.send(request).await
    }

    fn with_body<B: Serialize>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<HttpRequest> {
        self.request(method, path, &QueryParams::new(), token)?
            .json(body)
            .map_err(|e| CatalogError::InvalidRequest(e.to_string()))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("default_headers", &self.default_headers)
            .field("timeout", &self.timeout)
            .finish()
    }
}
