use thiserror::Error;

/// Failure reported by a host adapter.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The host cannot provide this capability at all (no keychain, no data
    /// directory).
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// No response was received, as opposed to an adapter-side failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
