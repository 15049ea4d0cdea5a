use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Failed to serialize session: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Persisted session is corrupted: {0}")]
    Corrupted(String),
}

impl From<bridge_traits::error::BridgeError> for SessionError {
    fn from(error: bridge_traits::error::BridgeError) -> Self {
        SessionError::SecureStorageUnavailable(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
