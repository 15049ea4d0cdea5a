//! Transport contract
//!
//! One call to [`HttpClient::execute`] is one request on the wire. Retries and
//! status interpretation belong to the caller, so a `503` is returned as an
//! [`HttpResponse`] and only a missing response is a [`BridgeError`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Verbs used by the storefront API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request. Built by value: `HttpRequest::new(..).header(..).timeout(..)`.
#[derive(Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Per-request override of the client timeout.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("Authorization", value)
    }

    /// Serialize `payload` as the body and tag it `application/json`.
    pub fn json<T: Serialize>(self, payload: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(payload).map_err(|e| {
            BridgeError::OperationFailed(format!("Cannot encode request body: {}", e))
        })?;
        Ok(self
            .header("Content-Type", "application/json")
            .body(Bytes::from(encoded)))
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut header_names: Vec<&str> = self.headers.keys().map(String::as_str).collect();
        header_names.sort_unstable();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &header_names)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send `request` once.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Timeout`] or [`BridgeError::Connection`] when no
    /// response arrived. Every received status is `Ok`.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_chain() {
        let request = HttpRequest::get("https://api.shop.example/categories-data")
            .header("X-Client", "storefront-ios")
            .bearer_token("tok")
            .timeout(Duration::from_secs(5));

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.headers["X-Client"], "storefront-ios");
        assert_eq!(request.headers["Authorization"], "Bearer tok");
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_json_body() {
        let request = HttpRequest::new(HttpMethod::Post, "https://api.shop.example/addresses")
            .json(&serde_json::json!({ "city": "Lyon" }))
            .unwrap();

        assert_eq!(request.headers["Content-Type"], "application/json");
        assert_eq!(request.body.as_deref(), Some(&br#"{"city":"Lyon"}"#[..]));
    }

    #[test]
    fn test_debug_hides_header_values() {
        let request = HttpRequest::get("https://api.shop.example/addresses").bearer_token("secret");
        let printed = format!("{:?}", request);

        assert!(printed.contains("Authorization"));
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_response_helpers() {
        let mut response = HttpResponse::new(404, "");
        response
            .headers
            .insert("content-type".to_string(), "text/plain".to_string());

        assert!(response.is_not_found());
        assert!(!response.is_success());
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert!(HttpResponse::new(204, "").is_success());
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
    }
}
