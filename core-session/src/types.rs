use serde::{Deserialize, Serialize};
use std::fmt;

/// Profile of the signed-in shopper as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            first_name: None,
            last_name: None,
            phone: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// First and last name joined by a space, skipping missing parts.
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Administrative area offered in address forms (province, state, district).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    /// Enclosing region, for nested areas.
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl Region {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            code: None,
            parent_id: None,
        }
    }
}

/// Process-wide session state.
///
/// Fields change only through the [`SessionStore`](crate::SessionStore)
/// setters; nothing here is derived from anything else.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Option<String>,
    pub is_logged: bool,
    pub user: Option<UserProfile>,
    pub token: Option<String>,
    pub regions: Vec<Region>,
}

impl Session {
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id.as_ref().map(|_| "[REDACTED]"))
            .field("is_logged", &self.is_logged)
            .field("user", &self.user.as_ref().map(|user| &user.id))
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("regions", &self.regions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let user = UserProfile::new("u1").with_name("Ada", "Lovelace");
        assert_eq!(user.display_name().as_deref(), Some("Ada Lovelace"));

        let mut partial = UserProfile::new("u2");
        partial.last_name = Some("Hopper".to_string());
        assert_eq!(partial.display_name().as_deref(), Some("Hopper"));

        assert_eq!(UserProfile::new("u3").display_name(), None);
    }

    #[test]
    fn test_user_profile_tolerates_missing_fields() {
        let user: UserProfile = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        assert_eq!(user, UserProfile::new("u1"));
    }

    #[test]
    fn test_default_session_is_empty() {
        let session = Session::default();
        assert!(session.session_id.is_none());
        assert!(!session.is_logged);
        assert!(session.user.is_none());
        assert!(!session.has_token());
        assert!(session.regions.is_empty());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let session = Session {
            session_id: Some("sess-123".to_string()),
            token: Some("secret-token".to_string()),
            ..Default::default()
        };

        let debug = format!("{:?}", session);
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("sess-123"));
        assert!(debug.contains("[REDACTED]"));
    }
}
