//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `storefront-workspace`
//! and enable `desktop-shims` to get the storefront core with the desktop
//! bridges already wired in.

#[cfg(feature = "desktop-shims")]
pub use core_service::{StorefrontCore, StorefrontDependencies};
