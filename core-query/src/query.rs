use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::key::QueryKey;
use crate::state::QueryOptions;

/// A cacheable read: a key, its options and the function producing the value.
///
/// Implementations capture their parameters by value. `fetch` should check
/// `cancel` at its await points; the cache also stops polling a flight once
/// every waiter has cancelled.
#[async_trait]
pub trait Query: Send + Sync + 'static {
    type Output: Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    fn key(&self) -> QueryKey;

    fn options(&self) -> QueryOptions {
        QueryOptions::default()
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Self::Output, Self::Error>;
}
