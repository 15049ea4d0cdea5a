//! Session Store
//!
//! Holds the shopper's session (`session_id`, login flag, profile, bearer
//! token, regions) behind a cloneable handle. Every clone shares the same
//! state, so the handle is injected wherever the session is read.
//!
//! Reads are synchronous and always observe the latest write. Subscribers
//! get watch semantics: a receiver sees the newest value, not every
//! intermediate one.

use crate::error::Result;
use crate::persistence::SessionPersistor;
use crate::types::{Region, Session, UserProfile};
use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct SessionStore {
    state: Arc<watch::Sender<Session>>,
    events: Option<EventBus>,
}

impl SessionStore {
    /// Empty session, no event reporting.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Empty session that reports every mutation on `events`.
    pub fn with_events(events: EventBus) -> Self {
        Self::build(Some(events))
    }

    fn build(events: Option<EventBus>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            state: Arc::new(state),
            events,
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(bus) = &self.events {
            bus.emit(CoreEvent::Session(event));
        }
    }

    /// Copy of the current session.
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    pub fn is_logged(&self) -> bool {
        self.state.borrow().is_logged
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    pub fn regions(&self) -> Vec<Region> {
        self.state.borrow().regions.clone()
    }

    /// Receiver that is notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn set_session_id(&self, session_id: Option<String>) {
        let present = session_id.is_some();
        self.state.send_modify(|session| session.session_id = session_id);
        self.emit(SessionEvent::SessionIdChanged { present });
    }

    pub fn set_is_logged(&self, is_logged: bool) {
        self.state.send_modify(|session| session.is_logged = is_logged);
        self.emit(SessionEvent::LoginStateChanged { is_logged });
    }

    pub fn set_user(&self, user: Option<UserProfile>) {
        let user_id = user.as_ref().map(|user| user.id.clone());
        self.state.send_modify(|session| session.user = user);
        self.emit(SessionEvent::UserChanged { user_id });
    }

    pub fn set_token(&self, token: Option<String>) {
        let present = token.is_some();
        self.state.send_modify(|session| session.token = token);
        self.emit(SessionEvent::TokenChanged { present });
    }

    pub fn set_regions(&self, regions: Vec<Region>) {
        let count = regions.len();
        self.state.send_modify(|session| session.regions = regions);
        self.emit(SessionEvent::RegionsChanged { count });
    }

    /// Store the token and profile of a freshly authenticated shopper.
    ///
    /// Subscribers see a single change carrying all three fields.
    pub fn sign_in(&self, token: String, user: UserProfile) {
        let user_id = user.id.clone();
        self.state.send_modify(|session| {
            session.token = Some(token);
            session.user = Some(user);
            session.is_logged = true;
        });

        info!(user_id = %user_id, "Shopper signed in");
        self.emit(SessionEvent::TokenChanged { present: true });
        self.emit(SessionEvent::UserChanged {
            user_id: Some(user_id),
        });
        self.emit(SessionEvent::LoginStateChanged { is_logged: true });
    }

    /// Drop credentials and identity. Regions survive a sign-out.
    pub fn sign_out(&self) {
        self.state.send_modify(|session| {
            session.token = None;
            session.user = None;
            session.session_id = None;
            session.is_logged = false;
        });

        info!("Shopper signed out");
        self.emit(SessionEvent::TokenChanged { present: false });
        self.emit(SessionEvent::UserChanged { user_id: None });
        self.emit(SessionEvent::SessionIdChanged { present: false });
        self.emit(SessionEvent::LoginStateChanged { is_logged: false });
    }

    /// Back to the empty session.
    pub fn reset(&self) {
        self.state.send_replace(Session::default());
        debug!("Session reset");
        self.emit(SessionEvent::LoginStateChanged { is_logged: false });
    }

    /// Replace the whole session with a previously persisted one.
    pub fn restore(&self, session: Session) {
        let is_logged = session.is_logged;
        self.state.send_replace(session);
        self.emit(SessionEvent::Restored { is_logged });
    }

    /// Load the persisted session, if any, into this store.
    ///
    /// Returns `true` when a session was restored.
    pub async fn rehydrate(&self, persistor: &SessionPersistor) -> Result<bool> {
        match persistor.load().await {
            Ok(Some(session)) => {
                info!(is_logged = session.is_logged, "Session rehydrated");
                self.restore(session);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(error) => {
                self.emit(SessionEvent::PersistenceFailed {
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Persist the session after every change until the last handle is dropped.
    ///
    /// Save failures are logged and reported on the event bus; the task keeps
    /// running.
    pub fn spawn_autosave(&self, persistor: SessionPersistor) -> JoinHandle<()> {
        let mut changes = self.subscribe();
        let events = self.events.clone();

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let session = changes.borrow_and_update().clone();
                if let Err(error) = persistor.save(&session).await {
                    warn!(error = %error, "Failed to autosave session");
                    if let Some(bus) = &events {
                        bus.emit(CoreEvent::Session(SessionEvent::PersistenceFailed {
                            message: error.to_string(),
                        }));
                    }
                }
            }
            debug!("Session store dropped, autosave stopped");
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &*self.state.borrow())
            .field("events", &self.events.is_some())
            .finish()
    }
}
