//! # Desktop adapters
//!
//! `bridge-traits` implementations for macOS, Windows and Linux builds.
//! Development shells and integration tests use them; mobile hosts inject
//! their own.
//!
//! - [`ReqwestHttpClient`]: one request per call, every status returned
//! - [`EncryptedFileStore`]: AES-256-GCM sealed values in one file per store id
//!
//! ```ignore
//! let http = ReqwestHttpClient::new()?;
//! let store = EncryptedFileStore::in_default_dir("storefront", "local-store-key")?;
//! ```

mod http;
mod secure_store;

pub use http::ReqwestHttpClient;
pub use secure_store::EncryptedFileStore;
