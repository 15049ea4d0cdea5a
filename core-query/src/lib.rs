//! # Query Cache
//!
//! Explicit data-fetching cache for the storefront core.
//!
//! ## Overview
//!
//! A [`Query`] pairs a [`QueryKey`] (resource name plus ordered parameters)
//! with [`QueryOptions`] and an async fetch function. [`QueryCache`] runs
//! queries with these guarantees:
//!
//! - at most one in-flight request per key; concurrent callers share it
//! - successful data is served without a request until `stale_time` elapses
//!   or the key is invalidated
//! - disabled queries only run through [`QueryCache::refetch`]
//! - failed fetches are retried `retry` times with exponential backoff,
//!   cancelled ones never are
//! - a caller whose `CancellationToken` fires gets [`QueryError::Cancelled`];
//!   when the last caller of a flight leaves, the flight is aborted and
//!   nothing is committed
//!
//! Results are handed out as [`QueryState`] snapshots. The entry map is
//! guarded by a `parking_lot::Mutex` that is never held across an `.await`.

pub mod cache;
pub mod error;
pub mod key;
pub mod query;
pub mod state;

pub use cache::QueryCache;
pub use error::{QueryError, Result};
pub use key::QueryKey;
pub use query::Query;
pub use state::{FetchStatus, QueryOptions, QueryState};

pub use tokio_util::sync::CancellationToken;
