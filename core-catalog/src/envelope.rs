//! Response envelope
//!
//! Storefront endpoints wrap their payload as
//! `{"status": ..., "data": {"data": <payload>}}`. Some answer with the flat
//! `{"status": ..., "data": <payload>}` instead; both decode to the payload,
//! the nested form taking precedence. The outer `status` is informational;
//! the HTTP status decides success.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{CatalogError, Result};

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    pub data: Payload<T>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Payload<T> {
    Nested { data: T },
    Flat(T),
}

impl<T> Payload<T> {
    pub fn into_inner(self) -> T {
        match self {
            Payload::Nested { data } | Payload::Flat(data) => data,
        }
    }
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

/// Decode an enveloped body into `T`.
pub fn decode<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice::<Envelope<T>>(body)
        .map(Envelope::into_inner)
        .map_err(|e| CatalogError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
}

/// Best-effort error text from a non-success body: its `message` field when
/// the body is JSON, otherwise the raw text, truncated.
pub fn error_message(body: &[u8]) -> String {
    const MAX_LEN: usize = 200;

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        let message = value
            .get("message")
            .or_else(|| value.get("data").and_then(|data| data.get("message")))
            .and_then(|message| message.as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.chars().count() > MAX_LEN {
        let truncated: String = text.chars().take(MAX_LEN).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}
