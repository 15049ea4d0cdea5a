//! # Storefront runtime
//!
//! Shared plumbing for the storefront crates.
//!
//! - [`config`]: [`CoreConfig`](config::CoreConfig), its builder and the
//!   `STOREFRONT_*` environment mapping
//! - [`logging`]: the `tracing` subscriber and host log forwarding
//! - [`events`]: the broadcast bus for session, UI and cache events

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
