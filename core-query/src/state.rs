use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::QueryError;
use crate::key::QueryKey;

/// Lifecycle of one cache entry: `Idle -> Loading -> {Success | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Per-query behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Disabled queries only run through an explicit `refetch`.
    pub enabled: bool,
    /// How long a successful result is served without a new request.
    pub stale_time: Duration,
    /// Additional attempts after a failed fetch.
    pub retry: u32,
    /// Base delay for exponential backoff between attempts.
    pub retry_delay: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: Duration::ZERO,
            retry: 0,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl QueryOptions {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Point-in-time view of a cache entry, typed to the query's output.
pub struct QueryState<T> {
    pub key: QueryKey,
    pub status: FetchStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<QueryError>,
    /// When `data` was last committed.
    pub updated_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
    /// A flight for this key is currently running.
    pub is_fetching: bool,
}

impl<T> QueryState<T> {
    pub(crate) fn idle(key: QueryKey) -> Self {
        Self {
            key,
            status: FetchStatus::Idle,
            data: None,
            error: None,
            updated_at: None,
            is_stale: true,
            is_fetching: false,
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == FetchStatus::Error
    }

    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            updated_at: self.updated_at,
            is_stale: self.is_stale,
            is_fetching: self.is_fetching,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for QueryState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryState")
            .field("key", &self.key.to_string())
            .field("status", &self.status)
            .field("data", &self.data)
            .field("error", &self.error.as_ref().map(|e| e.to_string()))
            .field("updated_at", &self.updated_at)
            .field("is_stale", &self.is_stale)
            .field("is_fetching", &self.is_fetching)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = QueryOptions::default();
        assert!(options.enabled);
        assert_eq!(options.stale_time, Duration::ZERO);
        assert_eq!(options.retry, 0);
    }

    #[test]
    fn test_options_builder() {
        let options = QueryOptions::default()
            .enabled(false)
            .stale_time(Duration::from_secs(86_400))
            .retry(2)
            .retry_delay(Duration::from_millis(250));

        assert!(!options.enabled);
        assert_eq!(options.stale_time, Duration::from_secs(86_400));
        assert_eq!(options.retry, 2);
        assert_eq!(options.retry_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_idle_state() {
        let state: QueryState<Vec<String>> = QueryState::idle(QueryKey::new("popular-searches"));
        assert_eq!(state.status, FetchStatus::Idle);
        assert!(state.data().is_none());
        assert!(state.is_stale);
        assert!(!state.is_fetching);
    }
}
