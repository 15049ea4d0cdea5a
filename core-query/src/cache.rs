//! Keyed query cache with request de-duplication, staleness windows and
//! cooperative cancellation.
//!
//! Every key owns at most one in-flight request ("flight"). Callers for a key
//! that is already in flight join it and await the same shared future. A
//! flight commits its outcome to the entry only while it is still the entry's
//! current flight. Invalidation, removal and abandonment detach and cancel it:
//! nothing is committed and callers still waiting on it receive
//! [`QueryError::Cancelled`]. A detached flight is parked until it winds down,
//! and the next flight for the same key waits for it before fetching, so a
//! key never has two fetches running at once.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bridge_traits::clock::{self, Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, QueryEvent};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{QueryError, Result};
use crate::key::QueryKey;
use crate::query::Query;
use crate::state::{FetchStatus, QueryOptions, QueryState};

/// Upper bound for the exponential retry backoff.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

type AnyValue = Arc<dyn Any + Send + Sync>;
type FlightOutcome = std::result::Result<AnyValue, QueryError>;
type FlightFuture = Shared<BoxFuture<'static, FlightOutcome>>;

struct FlightHandle {
    id: u64,
    // Only modified while the entries lock is held.
    waiters: AtomicUsize,
    cancel: CancellationToken,
}

struct Flight {
    handle: Arc<FlightHandle>,
    future: FlightFuture,
}

struct CacheEntry {
    status: FetchStatus,
    data: Option<AnyValue>,
    error: Option<QueryError>,
    updated_at: Option<DateTime<Utc>>,
    stale_time: Duration,
    invalidated: bool,
    flight: Option<Flight>,
}

impl CacheEntry {
    fn new(stale_time: Duration) -> Self {
        Self {
            status: FetchStatus::Idle,
            data: None,
            error: None,
            updated_at: None,
            stale_time,
            invalidated: false,
            flight: None,
        }
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        if self.invalidated {
            return true;
        }
        match self.updated_at {
            Some(at) => clock::elapsed(at, now) >= self.stale_time,
            None => true,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.status == FetchStatus::Success && self.data.is_some() && !self.is_stale(now)
    }

    /// Status to fall back to when a flight goes away without committing.
    fn settled_status(&self) -> FetchStatus {
        if self.error.is_some() {
            FetchStatus::Error
        } else if self.data.is_some() {
            FetchStatus::Success
        } else {
            FetchStatus::Idle
        }
    }

    fn current_flight_id(&self) -> Option<u64> {
        self.flight.as_ref().map(|flight| flight.handle.id)
    }

    fn detach_flight(&mut self) -> Option<Flight> {
        let flight = self.flight.take()?;
        self.status = self.settled_status();
        Some(flight)
    }

    fn state<T>(&self, key: &QueryKey, now: DateTime<Utc>) -> Result<QueryState<T>>
    where
        T: Send + Sync + 'static,
    {
        let data = match &self.data {
            Some(value) => Some(Arc::clone(value).downcast::<T>().map_err(|_| {
                QueryError::TypeMismatch {
                    key: key.to_string(),
                }
            })?),
            None => None,
        };

        Ok(QueryState {
            key: key.clone(),
            status: self.status,
            data,
            error: self.error.clone(),
            updated_at: self.updated_at,
            is_stale: self.is_stale(now),
            is_fetching: self.flight.is_some(),
        })
    }
}

struct CacheInner {
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
    next_flight_id: AtomicU64,
    // Cancelled flights that may still be winding down, keyed by the query
    // they belonged to. Locked after `entries`, never before.
    retired: Mutex<HashMap<QueryKey, (u64, FlightFuture)>>,
}

impl CacheInner {
    /// Cancel a detached flight and park it until it has stopped.
    fn retire(&self, key: &QueryKey, flight: Flight) {
        flight.handle.cancel.cancel();
        self.retired
            .lock()
            .insert(key.clone(), (flight.handle.id, flight.future));
    }

    fn predecessor(&self, key: &QueryKey) -> Option<FlightFuture> {
        self.retired.lock().get(key).map(|(_, future)| future.clone())
    }

    fn release(&self, key: &QueryKey, flight_id: u64) {
        let mut retired = self.retired.lock();
        if matches!(retired.get(key), Some((id, _)) if *id == flight_id) {
            retired.remove(key);
        }
    }

    fn emit(&self, event: QueryEvent) {
        if let Some(bus) = &self.events {
            // No subscribers is fine.
            bus.emit(CoreEvent::Query(event));
        }
    }

    fn commit(
        &self,
        key: &QueryKey,
        flight_id: u64,
        outcome: &FlightOutcome,
        attempts: u32,
        started: Instant,
    ) {
        let committed = {
            let now = self.clock.now();
            let mut entries = self.entries.lock();
            match entries.get_mut(key) {
                Some(entry) if entry.current_flight_id() == Some(flight_id) => {
                    entry.flight = None;
                    match outcome {
                        Ok(value) => {
                            entry.data = Some(Arc::clone(value));
                            entry.error = None;
                            entry.status = FetchStatus::Success;
                            entry.updated_at = Some(now);
                            entry.invalidated = false;
                        }
                        Err(QueryError::Cancelled) => {
                            entry.status = entry.settled_status();
                        }
                        Err(error) => {
                            entry.error = Some(error.clone());
                            entry.status = FetchStatus::Error;
                        }
                    }
                    true
                }
                _ => false,
            }
        };

        if !committed {
            debug!(key = %key, "Discarding result of superseded query flight");
            return;
        }

        match outcome {
            Ok(_) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                debug!(key = %key, attempts, duration_ms, "Query fetch succeeded");
                self.emit(QueryEvent::FetchSucceeded {
                    key: key.to_string(),
                    duration_ms,
                });
            }
            Err(QueryError::Cancelled) => {
                self.emit(QueryEvent::FetchCancelled {
                    key: key.to_string(),
                });
            }
            Err(error) => {
                warn!(key = %key, attempts, error = %error, "Query fetch failed");
                self.emit(QueryEvent::FetchFailed {
                    key: key.to_string(),
                    message: error.to_string(),
                    attempts,
                });
            }
        }
    }
}

/// One caller awaiting a flight. Dropping an unsettled waiter releases its
/// claim; the last claim to go cancels and detaches the flight.
struct Waiter {
    inner: Arc<CacheInner>,
    key: QueryKey,
    handle: Arc<FlightHandle>,
    settled: bool,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let abandoned = {
            let mut entries = self.inner.entries.lock();
            let remaining = self.handle.waiters.fetch_sub(1, Ordering::SeqCst) - 1;
            if remaining > 0 {
                false
            } else {
                self.handle.cancel.cancel();
                if let Some(entry) = entries.get_mut(&self.key) {
                    if entry.current_flight_id() == Some(self.handle.id) {
                        if let Some(flight) = entry.detach_flight() {
                            self.inner.retire(&self.key, flight);
                        }
                    }
                }
                true
            }
        };

        if abandoned {
            debug!(key = %self.key, "Every waiter cancelled; aborting query flight");
            self.inner.emit(QueryEvent::FetchCancelled {
                key: self.key.to_string(),
            });
        }
    }
}

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at [`MAX_RETRY_DELAY`].
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.checked_mul(factor)
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

async fn run_flight<Q: Query>(
    inner: Weak<CacheInner>,
    query: Arc<Q>,
    key: QueryKey,
    options: QueryOptions,
    handle: Arc<FlightHandle>,
    predecessor: Option<FlightFuture>,
) -> FlightOutcome {
    if let Some(previous) = predecessor {
        // Already cancelled; only its fetch has to unwind.
        let _ = previous.await;
    }

    let started = Instant::now();
    let cancel = handle.cancel.clone();
    let mut attempt: u32 = 0;

    let outcome = loop {
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(QueryError::Cancelled),
            result = query.fetch(&cancel) => result
                .map(|value| Arc::new(value) as AnyValue)
                .map_err(QueryError::fetch),
        };

        match result {
            Err(error) if !error.is_cancelled() && attempt <= options.retry => {
                let delay = backoff_delay(options.retry_delay, attempt);
                debug!(key = %key, attempt, error = %error, ?delay, "Retrying query fetch");
                if let Some(inner) = inner.upgrade() {
                    inner.emit(QueryEvent::FetchRetrying {
                        key: key.to_string(),
                        attempt: attempt + 1,
                        delay_ms: delay.as_millis() as u64,
                    });
                }

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break Err(QueryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            other => break other,
        }
    };

    if let Some(inner) = inner.upgrade() {
        inner.commit(&key, handle.id, &outcome, attempt, started);
        inner.release(&key, handle.id);
    }

    outcome
}

/// Shared, cloneable query cache.
///
/// # Example
///
/// ```ignore
/// let cache = QueryCache::default();
/// let cancel = CancellationToken::new();
/// let state = cache.fetch(GetCategoriesData::new(api.clone()), &cancel).await?;
/// if let Some(categories) = state.data() {
///     render(categories);
/// }
/// ```
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl QueryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::build(clock, None)
    }

    /// Cache that reports lifecycle events on `events`.
    pub fn with_events(clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self::build(clock, Some(events))
    }

    fn build(clock: Arc<dyn Clock>, events: Option<EventBus>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                clock,
                events,
                next_flight_id: AtomicU64::new(1),
                retired: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Serve `query` from the cache or the network.
    ///
    /// - disabled query: current snapshot, no request
    /// - fresh entry: cached data, no request
    /// - otherwise: start a flight, or join the one already running for the key
    ///
    /// Fetch failures are reported inside the returned state
    /// (`FetchStatus::Error`). `Err` is reserved for cancellation of this
    /// caller and for a type mismatch on the key.
    pub async fn fetch<Q: Query>(
        &self,
        query: Q,
        cancel: &CancellationToken,
    ) -> Result<QueryState<Q::Output>> {
        let options = query.options();
        if !options.enabled {
            let key = query.key();
            debug!(key = %key, "Query disabled; serving snapshot");
            return self.snapshot(&key);
        }
        self.execute(query, options, cancel, false).await
    }

    /// Explicit trigger: ignores `enabled` and freshness, but still joins a
    /// flight already running for the key.
    pub async fn refetch<Q: Query>(
        &self,
        query: Q,
        cancel: &CancellationToken,
    ) -> Result<QueryState<Q::Output>> {
        let options = query.options();
        self.execute(query, options, cancel, true).await
    }

    async fn execute<Q: Query>(
        &self,
        query: Q,
        options: QueryOptions,
        cancel: &CancellationToken,
        force: bool,
    ) -> Result<QueryState<Q::Output>> {
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        let key = query.key();
        let now = self.inner.clock.now();

        let (future, handle, joined) = {
            let mut entries = self.inner.entries.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(options.stale_time));
            entry.stale_time = options.stale_time;

            if !force && entry.is_fresh(now) {
                debug!(key = %key, "Serving fresh cached query");
                return entry.state(&key, now);
            }

            match &entry.flight {
                Some(flight) => {
                    flight.handle.waiters.fetch_add(1, Ordering::SeqCst);
                    (flight.future.clone(), Arc::clone(&flight.handle), true)
                }
                None => {
                    let handle = Arc::new(FlightHandle {
                        id: self.inner.next_flight_id.fetch_add(1, Ordering::Relaxed),
                        waiters: AtomicUsize::new(1),
                        cancel: CancellationToken::new(),
                    });
                    let future = run_flight(
                        Arc::downgrade(&self.inner),
                        Arc::new(query),
                        key.clone(),
                        options,
                        Arc::clone(&handle),
                        self.inner.predecessor(&key),
                    )
                    .boxed()
                    .shared();

                    entry.status = FetchStatus::Loading;
                    entry.flight = Some(Flight {
                        handle: Arc::clone(&handle),
                        future: future.clone(),
                    });
                    (future, handle, false)
                }
            }
        };

        if joined {
            debug!(key = %key, "Joining in-flight query");
            self.inner.emit(QueryEvent::FetchJoined {
                key: key.to_string(),
            });
        } else {
            debug!(key = %key, force, "Starting query fetch");
            self.inner.emit(QueryEvent::FetchStarted {
                key: key.to_string(),
            });
        }

        let mut waiter = Waiter {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            handle,
            settled: false,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(key = %key, "Query caller cancelled");
                return Err(QueryError::Cancelled);
            }
            _ = future => {
                waiter.settled = true;
            }
        }

        if waiter.handle.cancel.is_cancelled() {
            debug!(key = %key, "Query flight was superseded");
            return Err(QueryError::Cancelled);
        }
        self.snapshot(&key)
    }

    /// Current state of `key` without touching the network.
    pub fn snapshot<T>(&self, key: &QueryKey) -> Result<QueryState<T>>
    where
        T: Send + Sync + 'static,
    {
        let now = self.inner.clock.now();
        let entries = self.inner.entries.lock();
        match entries.get(key) {
            Some(entry) => entry.state(key, now),
            None => Ok(QueryState::idle(key.clone())),
        }
    }

    pub fn status(&self, key: &QueryKey) -> FetchStatus {
        self.inner
            .entries
            .lock()
            .get(key)
            .map_or(FetchStatus::Idle, |entry| entry.status)
    }

    /// Mark `key` stale and cancel any running flight. Returns whether the
    /// key was cached.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let found = {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(key) {
                Some(entry) => {
                    entry.invalidated = true;
                    if let Some(flight) = entry.detach_flight() {
                        self.inner.retire(key, flight);
                    }
                    true
                }
                None => false,
            }
        };

        if found {
            debug!(key = %key, "Query invalidated");
            self.inner.emit(QueryEvent::Invalidated {
                key: key.to_string(),
            });
        }
        found
    }

    /// Invalidate every key of `resource`, whatever its parameters.
    pub fn invalidate_resource(&self, resource: &str) -> usize {
        let invalidated: Vec<QueryKey> = {
            let mut entries = self.inner.entries.lock();
            entries
                .iter_mut()
                .filter(|(key, _)| key.resource() == resource)
                .map(|(key, entry)| {
                    entry.invalidated = true;
                    if let Some(flight) = entry.detach_flight() {
                        self.inner.retire(key, flight);
                    }
                    key.clone()
                })
                .collect()
        };

        for key in &invalidated {
            self.inner.emit(QueryEvent::Invalidated {
                key: key.to_string(),
            });
        }
        debug!(resource, count = invalidated.len(), "Resource invalidated");
        invalidated.len()
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = {
            let mut entries = self.inner.entries.lock();
            match entries.remove(key) {
                Some(mut entry) => {
                    if let Some(flight) = entry.detach_flight() {
                        self.inner.retire(key, flight);
                    }
                    true
                }
                None => false,
            }
        };
        if removed {
            debug!(key = %key, "Query removed");
            self.inner.emit(QueryEvent::Removed {
                key: key.to_string(),
            });
        }
        removed
    }

    pub fn clear(&self) {
        {
            let mut entries = self.inner.entries.lock();
            for (key, mut entry) in entries.drain() {
                if let Some(flight) = entry.detach_flight() {
                    self.inner.retire(&key, flight);
                }
            }
        }
        debug!("Query cache cleared");
        self.inner.emit(QueryEvent::Cleared);
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        self.inner.entries.lock().keys().cloned().collect()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.len())
            .field("has_events", &self.inner.events.is_some())
            .finish()
    }
}
