use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the query cache.
///
/// Cloneable so that every caller joined on one flight receives the same
/// outcome.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// The caller's cancellation token fired before the flight settled.
    #[error("Query cancelled")]
    Cancelled,

    /// The query's fetch function failed.
    #[error("{0}")]
    Fetch(Arc<dyn StdError + Send + Sync + 'static>),

    /// The cached value under this key has a different Rust type than the
    /// one requested.
    #[error("Cached value for '{key}' does not have the requested type")]
    TypeMismatch { key: String },
}

impl QueryError {
    pub fn fetch<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        QueryError::Fetch(Arc::new(error))
    }

    /// Borrow the original fetch error as its concrete type.
    pub fn fetch_error<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            QueryError::Fetch(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
