//! Behavioural tests for the query cache: de-duplication, staleness,
//! retries, cancellation and invalidation.

use async_trait::async_trait;
use bridge_traits::ManualClock;
use core_query::{CancellationToken, FetchStatus, Query, QueryCache, QueryError, QueryKey, QueryOptions};
use core_runtime::events::{CoreEvent, EventBus, QueryEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
enum BackendError {
    #[error("unexpected status {0}")]
    Status(u16),
}

#[derive(Clone)]
struct ProductQuery {
    slug: String,
    calls: Arc<AtomicUsize>,
    pending_failures: Arc<AtomicUsize>,
    latency: Duration,
    options: QueryOptions,
}

impl ProductQuery {
    fn new(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            pending_failures: Arc::new(AtomicUsize::new(0)),
            latency: Duration::from_millis(50),
            options: QueryOptions::default(),
        }
    }

    fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    fn failing(self, times: usize) -> Self {
        self.pending_failures.store(times, Ordering::SeqCst);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Query for ProductQuery {
    type Output = String;
    type Error = BackendError;

    fn key(&self) -> QueryKey {
        QueryKey::new("product").with_param(&self.slug)
    }

    fn options(&self) -> QueryOptions {
        self.options.clone()
    }

    async fn fetch(&self, _cancel: &CancellationToken) -> Result<String, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.latency).await;

        let should_fail = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            Err(BackendError::Status(503))
        } else {
            Ok(format!("{}#{}", self.slug, call))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_request() {
    let cache = QueryCache::default();
    let query = ProductQuery::new("linen-shirt");
    let cancel = CancellationToken::new();

    let (a, b, c) = tokio::join!(
        cache.fetch(query.clone(), &cancel),
        cache.fetch(query.clone(), &cancel),
        cache.fetch(query.clone(), &cancel),
    );

    assert_eq!(query.calls(), 1);
    for state in [a.unwrap(), b.unwrap(), c.unwrap()] {
        assert_eq!(state.status, FetchStatus::Success);
        assert_eq!(state.data().map(String::as_str), Some("linen-shirt#1"));
        assert!(!state.is_fetching);
    }
}

#[tokio::test(start_paused = true)]
async fn fresh_data_is_served_until_stale_time_elapses() {
    let clock = Arc::new(ManualClock::default());
    let cache = QueryCache::new(clock.clone());
    let query = ProductQuery::new("linen-shirt")
        .with_options(QueryOptions::default().stale_time(Duration::from_secs(60)));
    let cancel = CancellationToken::new();

    cache.fetch(query.clone(), &cancel).await.unwrap();
    clock.advance(Duration::from_secs(30));
    let cached = cache.fetch(query.clone(), &cancel).await.unwrap();
    assert_eq!(query.calls(), 1);
    assert!(!cached.is_stale);

    clock.advance(Duration::from_secs(31));
    let refreshed = cache.fetch(query.clone(), &cancel).await.unwrap();
    assert_eq!(query.calls(), 2);
    assert_eq!(refreshed.data().map(String::as_str), Some("linen-shirt#2"));
}

#[tokio::test(start_paused = true)]
async fn zero_stale_time_refetches_every_call() {
    let cache = QueryCache::default();
    let query = ProductQuery::new("linen-shirt");
    let cancel = CancellationToken::new();

    cache.fetch(query.clone(), &cancel).await.unwrap();
    cache.fetch(query.clone(), &cancel).await.unwrap();

    assert_eq!(query.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn disabled_query_only_runs_on_refetch() {
    let cache = QueryCache::default();
    let query = ProductQuery::new("linen-shirt")
        .with_options(QueryOptions::default().enabled(false));
    let cancel = CancellationToken::new();

    let idle = cache.fetch(query.clone(), &cancel).await.unwrap();
    assert_eq!(idle.status, FetchStatus::Idle);
    assert!(idle.data().is_none());
    assert_eq!(query.calls(), 0);

    let triggered = cache.refetch(query.clone(), &cancel).await.unwrap();
    assert_eq!(triggered.status, FetchStatus::Success);
    assert_eq!(query.calls(), 1);

    // Still disabled: the snapshot is served, no new request
    let again = cache.fetch(query.clone(), &cancel).await.unwrap();
    assert_eq!(again.data().map(String::as_str), Some("linen-shirt#1"));
    assert_eq!(query.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failure_is_reported_in_state() {
    let cache = QueryCache::default();
    let query = ProductQuery::new("linen-shirt").failing(1);
    let cancel = CancellationToken::new();

    let state = cache.fetch(query.clone(), &cancel).await.unwrap();

    assert_eq!(state.status, FetchStatus::Error);
    assert!(state.data().is_none());
    let error = state.error.expect("error recorded");
    assert_eq!(
        error.fetch_error::<BackendError>(),
        Some(&BackendError::Status(503))
    );
}

#[tokio::test(start_paused = true)]
async fn failure_keeps_previous_data() {
    let cache = QueryCache::default();
    let query = ProductQuery::new("linen-shirt");
    let cancel = CancellationToken::new();

    cache.fetch(query.clone(), &cancel).await.unwrap();
    query.pending_failures.store(1, Ordering::SeqCst);
    let state = cache.fetch(query.clone(), &cancel).await.unwrap();

    assert_eq!(state.status, FetchStatus::Error);
    assert_eq!(state.data().map(String::as_str), Some("linen-shirt#1"));
}

#[tokio::test(start_paused = true)]
async fn retries_with_exponential_backoff() {
    let cache = QueryCache::default();
    let query = ProductQuery::new("linen-shirt").failing(2).with_options(
        QueryOptions::default()
            .retry(2)
            .retry_delay(Duration::from_millis(100)),
    );
    let cancel = CancellationToken::new();

    let started = tokio::time::Instant::now();
    let state = cache.fetch(query.clone(), &cancel).await.unwrap();

    assert_eq!(state.status, FetchStatus::Success);
    assert_eq!(query.calls(), 3);
    // 3 x 50ms latency + 100ms + 200ms backoff
    assert!(started.elapsed() >= Duration::from_millis(450));
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_bounded() {
    let cache = QueryCache::default();
    let query = ProductQuery::new("linen-shirt")
        .failing(5)
        .with_options(QueryOptions::default().retry(1));
    let cancel = CancellationToken::new();

    let state = cache.fetch(query.clone(), &cancel).await.unwrap();

    assert_eq!(state.status, FetchStatus::Error);
    assert_eq!(query.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelling_the_only_waiter_aborts_the_flight() {
    let cache = QueryCache::default();
    let mut query = ProductQuery::new("linen-shirt");
    query.latency = Duration::from_secs(5);
    let cancel = CancellationToken::new();

    let (result, _) = tokio::join!(cache.fetch(query.clone(), &cancel), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
    });

    assert!(matches!(result, Err(QueryError::Cancelled)));
    let key = query.key();
    let snapshot = cache.snapshot::<String>(&key).unwrap();
    assert_eq!(snapshot.status, FetchStatus::Idle);
    assert!(snapshot.data().is_none());
    assert!(!snapshot.is_fetching);

    // The next caller starts a fresh flight
    let fresh = CancellationToken::new();
    let state = cache.fetch(query.clone(), &fresh).await.unwrap();
    assert_eq!(state.data().map(String::as_str), Some("linen-shirt#2"));
}

#[tokio::test(start_paused = true)]
async fn one_waiter_cancelling_does_not_abort_others() {
    let cache = QueryCache::default();
    let query = ProductQuery::new("linen-shirt");
    let leaving = CancellationToken::new();
    let staying = CancellationToken::new();

    let (left, stayed, _) = tokio::join!(
        cache.fetch(query.clone(), &leaving),
        cache.fetch(query.clone(), &staying),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            leaving.cancel();
        }
    );

    assert!(matches!(left, Err(QueryError::Cancelled)));
    let stayed = stayed.unwrap();
    assert_eq!(stayed.status, FetchStatus::Success);
    assert_eq!(query.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn pre_cancelled_token_makes_no_request() {
    let cache = QueryCache::default();
    let query = ProductQuery::new("linen-shirt");
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(cache.fetch(query.clone(), &cancel).await.is_err());
    assert_eq!(query.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn invalidation_forces_next_fetch_to_hit_network() {
    let cache = QueryCache::default();
    let query = ProductQuery::new("linen-shirt")
        .with_options(QueryOptions::default().stale_time(Duration::from_secs(3600)));
    let cancel = CancellationToken::new();
    let key = query.key();

    cache.fetch(query.clone(), &cancel).await.unwrap();
    assert!(cache.invalidate(&key));

    let stale = cache.snapshot::<String>(&key).unwrap();
    assert!(stale.is_stale);
    assert_eq!(stale.status, FetchStatus::Success);

    cache.fetch(query.clone(), &cancel).await.unwrap();
    assert_eq!(query.calls(), 2);
    assert!(!cache.invalidate(&QueryKey::new("unknown")));
}

#[tokio::test(start_paused = true)]
async fn invalidation_during_flight_cancels_it() {
    let cache = QueryCache::default();
    let query = ProductQuery::new("linen-shirt");
    let cancel = CancellationToken::new();
    let key = query.key();

    let (result, _) = tokio::join!(cache.fetch(query.clone(), &cancel), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(&key);
    });

    assert!(matches!(result, Err(QueryError::Cancelled)));
    let state = cache.snapshot::<String>(&key).unwrap();
    assert_eq!(state.status, FetchStatus::Idle);
    assert!(state.data().is_none());
    assert!(!state.is_fetching);
    assert_eq!(query.calls(), 1);
}

/// Tracks how many fetches for one key are running at the same moment.
#[derive(Clone, Default)]
struct ConcurrencyGauge {
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

struct RunningFetch(Arc<AtomicUsize>);

impl Drop for RunningFetch {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGauge {
    fn enter(&self) -> RunningFetch {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        RunningFetch(Arc::clone(&self.running))
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct SlowStockQuery {
    gauge: ConcurrencyGauge,
}

#[async_trait]
impl Query for SlowStockQuery {
    type Output = u32;
    type Error = BackendError;

    fn key(&self) -> QueryKey {
        QueryKey::new("stock").with_param("linen-shirt")
    }

    async fn fetch(&self, _cancel: &CancellationToken) -> Result<u32, BackendError> {
        let _running = self.gauge.enter();
        let call = self.gauge.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(call as u32)
    }
}

#[tokio::test(start_paused = true)]
async fn refetch_after_invalidation_never_overlaps_the_cancelled_flight() {
    let cache = QueryCache::default();
    let query = SlowStockQuery {
        gauge: ConcurrencyGauge::default(),
    };
    let cancel = CancellationToken::new();
    let key = query.key();

    let (first, second) = tokio::join!(cache.fetch(query.clone(), &cancel), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(&key);
        cache.fetch(query.clone(), &cancel).await
    });

    assert!(matches!(first, Err(QueryError::Cancelled)));
    let second = second.unwrap();
    assert_eq!(second.status, FetchStatus::Success);
    assert_eq!(second.data().copied(), Some(2));
    assert_eq!(query.gauge.peak(), 1);
}

#[tokio::test(start_paused = true)]
async fn removal_and_clear_cancel_running_flights() {
    let cache = QueryCache::default();
    let query = SlowStockQuery {
        gauge: ConcurrencyGauge::default(),
    };
    let cancel = CancellationToken::new();
    let key = query.key();

    let (removed, refetched) = tokio::join!(cache.fetch(query.clone(), &cancel), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.remove(&key));
        cache.fetch(query.clone(), &cancel).await
    });
    assert!(matches!(removed, Err(QueryError::Cancelled)));
    assert_eq!(refetched.unwrap().data().copied(), Some(2));

    let (cleared, _) = tokio::join!(cache.refetch(query.clone(), &cancel), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.clear();
    });
    assert!(matches!(cleared, Err(QueryError::Cancelled)));
    assert!(cache.is_empty());
    assert_eq!(query.gauge.peak(), 1);
}

#[tokio::test(start_paused = true)]
async fn removal_and_resource_invalidation() {
    let cache = QueryCache::default();
    let cancel = CancellationToken::new();
    let shirt = ProductQuery::new("linen-shirt");
    let boots = ProductQuery::new("desert-boots");

    cache.fetch(shirt.clone(), &cancel).await.unwrap();
    cache.fetch(boots.clone(), &cancel).await.unwrap();
    assert_eq!(cache.len(), 2);

    assert_eq!(cache.invalidate_resource("product"), 2);
    assert_eq!(cache.invalidate_resource("category"), 0);

    assert!(cache.remove(&shirt.key()));
    assert!(!cache.remove(&shirt.key()));
    assert_eq!(cache.status(&shirt.key()), FetchStatus::Idle);
    assert_eq!(cache.keys(), vec![boots.key()]);

    cache.clear();
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn lifecycle_events_are_emitted() {
    let bus = EventBus::new(32);
    let mut events = bus.subscribe();
    let cache = QueryCache::with_events(Arc::new(ManualClock::default()), bus);
    let query = ProductQuery::new("linen-shirt");
    let cancel = CancellationToken::new();

    let _ = tokio::join!(
        cache.fetch(query.clone(), &cancel),
        cache.fetch(query.clone(), &cancel),
    );

    let key = "product[linen-shirt]".to_string();
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Query(QueryEvent::FetchStarted { key: key.clone() })
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Query(QueryEvent::FetchJoined { key: key.clone() })
    );
    match events.recv().await.unwrap() {
        CoreEvent::Query(QueryEvent::FetchSucceeded { key: done, .. }) => assert_eq!(done, key),
        other => panic!("unexpected event: {:?}", other),
    }
}
