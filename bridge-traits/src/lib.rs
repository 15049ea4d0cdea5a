//! # Host capabilities
//!
//! Everything the storefront core needs from the device it runs on, as traits.
//! The core holds these behind `Arc<dyn _>` and never names a concrete
//! transport or keychain.
//!
//! | Capability | Trait | Desktop default |
//! |------------|-------|-----------------|
//! | Network | [`HttpClient`] | `bridge_desktop::ReqwestHttpClient` |
//! | Session storage | [`SecureStore`] | `bridge_desktop::EncryptedFileStore` |
//! | Time | [`Clock`] | [`SystemClock`] |
//! | Host logs | [`LoggerSink`] | [`ConsoleLogger`] |
//!
//! iOS and Android shells pass their own adapters when building the core.
//!
//! Failures surface as [`BridgeError`]. Messages may name keys and URLs but
//! never carry stored values or tokens.

pub mod clock;
pub mod error;
pub mod http;
pub mod logger;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::BridgeError;
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use logger::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use storage::SecureStore;
