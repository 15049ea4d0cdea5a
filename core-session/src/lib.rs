//! # Session Module
//!
//! Process-wide client state for the storefront shell.
//!
//! ## Overview
//!
//! - [`SessionStore`]: session id, login flag, profile, bearer token and
//!   regions, readable synchronously and observable through a watch channel
//! - [`UiStore`]: tab bar visibility flag
//! - [`SessionPersistor`]: saves the selected session fields into the
//!   encrypted key-value store and rehydrates them at startup
//!
//! Both stores are cloneable handles; every clone shares the same state.

pub mod error;
pub mod persistence;
pub mod session;
pub mod types;
pub mod ui;

pub use error::{Result, SessionError};
pub use persistence::{PersistedFields, SessionPersistor, SESSION_KEY};
pub use session::SessionStore;
pub use types::{Region, Session, UserProfile};
pub use ui::UiStore;
