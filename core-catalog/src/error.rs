//! Error types for catalog requests

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Catalog request errors
///
/// A `404` is not represented here: list endpoints turn it into an empty
/// collection and detail endpoints into `None`.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// No response was obtained
    #[error("Transport failure: {0}")]
    Transport(#[source] BridgeError),

    /// The backend answered with a status other than 2xx or 404
    #[error("Storefront API error (status {status}): {message}")]
    Status { status: u16, message: String },

    /// The body did not match the expected envelope
    #[error("Failed to decode {endpoint} response: {message}")]
    Decode { endpoint: String, message: String },

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl CatalogError {
    /// HTTP status for [`CatalogError::Status`].
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, CatalogError::Transport(_))
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, CatalogError::Decode { .. })
    }
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;
