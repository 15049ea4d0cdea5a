use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error(transparent)]
    Config(core_runtime::Error),

    #[error("Session error: {0}")]
    Session(#[from] core_session::SessionError),

    #[error("Query error: {0}")]
    Query(#[from] core_query::QueryError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] core_catalog::CatalogError),
}

impl From<core_runtime::Error> for CoreError {
    fn from(error: core_runtime::Error) -> Self {
        match error {
            core_runtime::Error::CapabilityMissing {
                capability,
                message,
            } => CoreError::CapabilityMissing {
                capability,
                message,
            },
            other => CoreError::Config(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
