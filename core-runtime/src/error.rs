use thiserror::Error;

/// Startup failures: bad configuration, a missing host bridge, or a bridge
/// that could not be constructed.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Host capability {capability} is missing: {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Runtime setup failed: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
