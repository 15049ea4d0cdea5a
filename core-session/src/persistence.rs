//! Session Persistence
//!
//! Saves a selectable subset of the [`Session`] into a [`SecureStore`] and
//! restores it at startup. The payload is JSON under a single key
//! ([`SESSION_KEY`] by default); the store is responsible for encryption.
//!
//! A payload that no longer decodes is deleted so the next start begins from
//! an empty session, and the caller gets [`SessionError::Corrupted`].

use crate::error::{Result, SessionError};
use crate::types::{Region, Session, UserProfile};
use bridge_traits::storage::SecureStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store key holding the persisted session.
pub const SESSION_KEY: &str = "session";

const FORMAT_VERSION: u32 = 1;

/// Which session fields survive a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedFields {
    pub session_id: bool,
    pub is_logged: bool,
    pub user: bool,
    pub token: bool,
    pub regions: bool,
}

impl PersistedFields {
    pub const fn all() -> Self {
        Self {
            session_id: true,
            is_logged: true,
            user: true,
            token: true,
            regions: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            session_id: false,
            is_logged: false,
            user: false,
            token: false,
            regions: false,
        }
    }

    pub fn with_session_id(mut self, enabled: bool) -> Self {
        self.session_id = enabled;
        self
    }

    pub fn with_is_logged(mut self, enabled: bool) -> Self {
        self.is_logged = enabled;
        self
    }

    pub fn with_user(mut self, enabled: bool) -> Self {
        self.user = enabled;
        self
    }

    pub fn with_token(mut self, enabled: bool) -> Self {
        self.token = enabled;
        self
    }

    pub fn with_regions(mut self, enabled: bool) -> Self {
        self.regions = enabled;
        self
    }
}

impl Default for PersistedFields {
    fn default() -> Self {
        Self::all()
    }
}

/// On-disk shape. Fields that are not persisted are simply absent.
#[derive(Serialize, Deserialize)]
struct StoredSession {
    version: u32,
    saved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_logged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<UserProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    regions: Option<Vec<Region>>,
}

impl StoredSession {
    fn capture(session: &Session, fields: PersistedFields) -> Self {
        Self {
            version: FORMAT_VERSION,
            saved_at: Utc::now(),
            session_id: session.session_id.clone().filter(|_| fields.session_id),
            is_logged: fields.is_logged.then_some(session.is_logged),
            user: session.user.clone().filter(|_| fields.user),
            token: session.token.clone().filter(|_| fields.token),
            regions: fields.regions.then(|| session.regions.clone()),
        }
    }

    fn into_session(self, fields: PersistedFields) -> Session {
        Session {
            session_id: self.session_id.filter(|_| fields.session_id),
            is_logged: fields.is_logged && self.is_logged.unwrap_or(false),
            user: self.user.filter(|_| fields.user),
            token: self.token.filter(|_| fields.token),
            regions: self
                .regions
                .filter(|_| fields.regions)
                .unwrap_or_default(),
        }
    }
}

/// Reads and writes the persisted session.
#[derive(Clone)]
pub struct SessionPersistor {
    secure_store: Arc<dyn SecureStore>,
    fields: PersistedFields,
    key: String,
}

impl SessionPersistor {
    /// Persist every session field under [`SESSION_KEY`].
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self::with_fields(secure_store, PersistedFields::default())
    }

    pub fn with_fields(secure_store: Arc<dyn SecureStore>, fields: PersistedFields) -> Self {
        Self {
            secure_store,
            fields,
            key: SESSION_KEY.to_string(),
        }
    }

    /// Use a different store key, e.g. to keep several shells apart.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn fields(&self) -> PersistedFields {
        self.fields
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write the selected fields of `session`, replacing any previous payload.
    pub async fn save(&self, session: &Session) -> Result<()> {
        let stored = StoredSession::capture(session, self.fields);
        let payload = serde_json::to_vec(&stored)?;

        self.secure_store
            .write_value(&self.key, &payload)
            .await
            .map_err(|e| {
                warn!(key = %self.key, "Failed to persist session");
                SessionError::SecureStorageUnavailable(e.to_string())
            })?;

        debug!(key = %self.key, is_logged = session.is_logged, "Session persisted");
        Ok(())
    }

    /// Read the persisted session.
    ///
    /// Returns `Ok(None)` when nothing was saved yet. Fields outside
    /// [`PersistedFields`] come back empty even if an older payload has them.
    pub async fn load(&self) -> Result<Option<Session>> {
        let payload = match self.secure_store.read_value(&self.key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(key = %self.key, "No persisted session");
                return Ok(None);
            }
            Err(e) => {
                warn!(key = %self.key, "Failed to read persisted session");
                return Err(SessionError::SecureStorageUnavailable(e.to_string()));
            }
        };

        match serde_json::from_slice::<StoredSession>(&payload) {
            Ok(stored) if stored.version == FORMAT_VERSION => {
                Ok(Some(stored.into_session(self.fields)))
            }
            Ok(stored) => {
                self.discard().await;
                Err(SessionError::Corrupted(format!(
                    "unsupported format version {}",
                    stored.version
                )))
            }
            Err(e) => {
                self.discard().await;
                Err(SessionError::Corrupted(e.to_string()))
            }
        }
    }

    /// Remove the persisted session.
    pub async fn clear(&self) -> Result<()> {
        self.secure_store.remove_value(&self.key).await?;
        info!(key = %self.key, "Persisted session cleared");
        Ok(())
    }

    async fn discard(&self) {
        warn!(key = %self.key, "Persisted session is unreadable, deleting it");
        if let Err(e) = self.secure_store.remove_value(&self.key).await {
            warn!(key = %self.key, error = %e, "Failed to delete unreadable session");
        }
    }
}

impl std::fmt::Debug for SessionPersistor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPersistor")
            .field("fields", &self.fields)
            .field("key", &self.key)
            .finish()
    }
}
