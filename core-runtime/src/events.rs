//! # Core events
//!
//! Session, UI and query-cache changes are published on an [`EventBus`] so a
//! host shell can react (re-render the tab bar, show a sign-in banner, record
//! fetch failures) without polling.
//!
//! Publishers never block and never fail: with nobody listening an event is
//! dropped. Each subscriber buffers up to the bus capacity; a subscriber that
//! falls further behind gets [`RecvError::Lagged`] once and then resumes with
//! the oldest retained event.
//!
//! Session events describe *that* something changed. Tokens and profile data
//! stay in the session store.
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, UiEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut ui = bus.stream().filter(CoreEvent::is_ui);
//!
//! bus.emit(CoreEvent::Ui(UiEvent::TabBarVisibilityChanged { visible: false }));
//! assert_eq!(ui.recv().await.unwrap().name(), "ui.tab_bar_visibility_changed");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::trace;

pub use tokio::sync::broadcast::error::RecvError;

/// Per-subscriber buffer used when the configuration does not set one.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Session(SessionEvent),
    Ui(UiEvent),
    Query(QueryEvent),
}

impl CoreEvent {
    /// Stable dotted name, e.g. `query.fetch_failed`.
    pub fn name(&self) -> &'static str {
        match self {
            CoreEvent::Session(event) => match event {
                SessionEvent::SessionIdChanged { .. } => "session.session_id_changed",
                SessionEvent::LoginStateChanged { .. } => "session.login_state_changed",
                SessionEvent::UserChanged { .. } => "session.user_changed",
                SessionEvent::TokenChanged { .. } => "session.token_changed",
                SessionEvent::RegionsChanged { .. } => "session.regions_changed",
                SessionEvent::Restored { .. } => "session.restored",
                SessionEvent::PersistenceFailed { .. } => "session.persistence_failed",
            },
            CoreEvent::Ui(UiEvent::TabBarVisibilityChanged { .. }) => {
                "ui.tab_bar_visibility_changed"
            }
            CoreEvent::Query(event) => match event {
                QueryEvent::FetchStarted { .. } => "query.fetch_started",
                QueryEvent::FetchJoined { .. } => "query.fetch_joined",
                QueryEvent::FetchSucceeded { .. } => "query.fetch_succeeded",
                QueryEvent::FetchRetrying { .. } => "query.fetch_retrying",
                QueryEvent::FetchFailed { .. } => "query.fetch_failed",
                QueryEvent::FetchCancelled { .. } => "query.fetch_cancelled",
                QueryEvent::Invalidated { .. } => "query.invalidated",
                QueryEvent::Removed { .. } => "query.removed",
                QueryEvent::Cleared => "query.cleared",
            },
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self, CoreEvent::Session(_))
    }

    pub fn is_ui(&self) -> bool {
        matches!(self, CoreEvent::Ui(_))
    }

    pub fn is_query(&self) -> bool {
        matches!(self, CoreEvent::Query(_))
    }

    /// Something the user may need to hear about: a failed fetch or a
    /// session that could not be saved.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CoreEvent::Query(QueryEvent::FetchFailed { .. })
                | CoreEvent::Session(SessionEvent::PersistenceFailed { .. })
        )
    }
}

impl fmt::Display for CoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Session store changes. Secrets appear only as presence flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SessionEvent {
    SessionIdChanged { present: bool },
    LoginStateChanged { is_logged: bool },
    UserChanged { user_id: Option<String> },
    TokenChanged { present: bool },
    RegionsChanged { count: usize },
    /// Loaded from the secure store at startup.
    Restored { is_logged: bool },
    PersistenceFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum UiEvent {
    TabBarVisibilityChanged { visible: bool },
}

/// Query cache activity. `key` is the rendered query key, e.g.
/// `product[linen-shirt]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum QueryEvent {
    FetchStarted { key: String },
    /// Caller attached to a request already in flight.
    FetchJoined { key: String },
    FetchSucceeded { key: String, duration_ms: u64 },
    /// `attempt` is the attempt about to run, so the first retry is 2.
    FetchRetrying { key: String, attempt: u32, delay_ms: u64 },
    FetchFailed { key: String, message: String, attempts: u32 },
    /// All waiters went away before the response; nothing was cached.
    FetchCancelled { key: String },
    Invalidated { key: String },
    Removed { key: String },
    Cleared,
}

/// Cloneable publisher. Subscribers only see events emitted after they
/// subscribed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Publish to every current subscriber and return how many there were.
    pub fn emit(&self, event: CoreEvent) -> usize {
        trace!(event = event.name(), "Publishing core event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Subscriber with an optional predicate; non-matching events are skipped.
pub struct EventStream {
    receiver: broadcast::Receiver<CoreEvent>,
    predicate: Option<Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>>,
}

impl EventStream {
    pub fn new(receiver: broadcast::Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            predicate: None,
        }
    }

    /// Keep only events for which `predicate` holds. Replaces any earlier
    /// predicate.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    fn wants(&self, event: &CoreEvent) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(event),
            None => true,
        }
    }

    /// Wait for the next matching event.
    ///
    /// # Errors
    ///
    /// [`RecvError::Lagged`] after falling behind, [`RecvError::Closed`] once
    /// every bus handle is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.wants(&event) {
                return Ok(event);
            }
        }
    }

    /// Next matching event already buffered, if any.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(skipped)) => return Some(Err(RecvError::Lagged(skipped))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            };
            if self.wants(&event) {
                return Some(Ok(event));
            }
        }
    }

    /// Everything matching that is buffered right now.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Some(next) = self.try_recv() {
            match next {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filtered", &self.predicate.is_some())
            .finish()
    }
}
