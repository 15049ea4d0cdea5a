//! # Configuration
//!
//! [`CoreConfig`] is everything the storefront core needs before it can make
//! a request: where the API lives, how long to wait for it, which encrypted
//! store holds the session, and the host bridges. It is assembled with
//! [`CoreConfigBuilder`] and validated once in `build()`, so a bad URL or a
//! missing store key fails at startup instead of on the first fetch.
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .base_url("https://api.shop.example/v1")
//!     .default_header("X-Client", "storefront-ios")
//!     .http_client(Arc::new(NativeHttp::new()))
//!     .secure_store(Arc::new(KeychainStore::new()))
//!     .build()?;
//! ```
//!
//! With the `desktop-shims` feature any bridge left unset falls back to the
//! desktop adapters in `bridge-desktop`. Without it, an unset bridge is a
//! [`Error::CapabilityMissing`].
//!
//! ## Environment
//!
//! | Variable | Meaning |
//! |---|---|
//! | `STOREFRONT_API_URL` | API base URL, required |
//! | `STOREFRONT_STORE_ID` | encrypted store name, default `storefront` |
//! | `STOREFRONT_STORE_KEY` | key for the desktop encrypted store |
//! | `STOREFRONT_STORE_DIR` | directory for the desktop encrypted store |
//! | `STOREFRONT_LOG` | `EnvFilter` directives |
//! | `STOREFRONT_LOG_FORMAT` | `pretty`, `json` or `compact` |

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bridge_traits::{Clock, HttpClient, SecureStore, SystemClock};
use url::Url;

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::LogFormat;

pub const ENV_API_URL: &str = "STOREFRONT_API_URL";
pub const ENV_STORE_ID: &str = "STOREFRONT_STORE_ID";
pub const ENV_STORE_KEY: &str = "STOREFRONT_STORE_KEY";
pub const ENV_STORE_DIR: &str = "STOREFRONT_STORE_DIR";
pub const ENV_LOG: &str = "STOREFRONT_LOG";
pub const ENV_LOG_FORMAT: &str = "STOREFRONT_LOG_FORMAT";

pub const DEFAULT_STORE_ID: &str = "storefront";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_EVENT_BUFFER_SIZE: usize = 10_000;

#[derive(Clone)]
pub struct CoreConfig {
    /// Endpoint paths are joined onto this.
    pub base_url: Url,
    /// Sent with every API request, in insertion order.
    pub default_headers: Vec<(String, String)>,
    pub request_timeout: Duration,
    pub store_id: String,
    pub store_key: Option<String>,
    pub store_dir: Option<PathBuf>,
    /// Save the session on every change and restore it at startup.
    pub persist_session: bool,
    pub event_buffer_size: usize,
    pub log_filter: Option<String>,
    pub log_format: Option<LogFormat>,
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub clock: Arc<dyn Clock>,
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Read `STOREFRONT_*` variables and build.
    pub fn from_env() -> anyhow::Result<Self> {
        CoreConfigBuilder::from_env()?
            .build()
            .context("storefront configuration from environment is invalid")
    }

    /// Check the invariants `build()` enforces. Useful after mutating a
    /// config by hand.
    pub fn validate(&self) -> Result<()> {
        ensure(
            matches!(self.base_url.scheme(), "http" | "https"),
            || format!("Base URL must use http or https, got '{}'", self.base_url.scheme()),
        )?;
        ensure(!self.base_url.cannot_be_a_base(), || {
            "Base URL cannot be used as a base for endpoint paths".to_string()
        })?;
        ensure(!self.store_id.trim().is_empty(), || {
            "Store id cannot be empty".to_string()
        })?;
        ensure(
            !self.request_timeout.is_zero() && self.request_timeout <= MAX_REQUEST_TIMEOUT,
            || {
                format!(
                    "Request timeout must be greater than 0 and at most {}s, got {:?}",
                    MAX_REQUEST_TIMEOUT.as_secs(),
                    self.request_timeout
                )
            },
        )?;
        ensure(
            (1..=MAX_EVENT_BUFFER_SIZE).contains(&self.event_buffer_size),
            || {
                format!(
                    "Event buffer size must be between 1 and {}, got {}",
                    MAX_EVENT_BUFFER_SIZE, self.event_buffer_size
                )
            },
        )?;
        ensure(
            self.default_headers
                .iter()
                .all(|(name, _)| !name.trim().is_empty()),
            || "Default header names cannot be empty".to_string(),
        )
    }
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::Config(message()))
    }
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("base_url", &self.base_url.as_str())
            .field("default_headers", &self.default_headers)
            .field("request_timeout", &self.request_timeout)
            .field("store_id", &self.store_id)
            .field("store_key", &self.store_key.as_ref().map(|_| "[REDACTED]"))
            .field("store_dir", &self.store_dir)
            .field("persist_session", &self.persist_session)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("log_filter", &self.log_filter)
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

/// Fallback bridges for hosts that did not inject their own.
#[cfg(feature = "desktop-shims")]
mod fallback {
    use super::*;
    use bridge_desktop::{EncryptedFileStore, ReqwestHttpClient};

    pub(super) fn http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
        let client = ReqwestHttpClient::with_timeout(timeout)
            .map_err(|e| Error::Internal(format!("Desktop HTTP client unavailable: {}", e)))?;
        Ok(Arc::new(client))
    }

    pub(super) fn secure_store(
        store_id: &str,
        store_key: Option<&str>,
        store_dir: Option<&PathBuf>,
    ) -> Result<Arc<dyn SecureStore>> {
        let Some(key) = store_key else {
            return Err(Error::Config(format!(
                "The desktop encrypted store needs a key: call .store_key() or set {}",
                ENV_STORE_KEY
            )));
        };

        let opened = match store_dir {
            Some(dir) => EncryptedFileStore::new(dir.clone(), store_id, key),
            None => EncryptedFileStore::in_default_dir(store_id, key),
        };
        let store = opened
            .map_err(|e| Error::Internal(format!("Desktop encrypted store unavailable: {}", e)))?;
        Ok(Arc::new(store))
    }
}

#[cfg(not(feature = "desktop-shims"))]
mod fallback {
    use super::*;

    pub(super) fn http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
        Err(Error::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: "every API call goes through it; inject the host networking adapter \
                      or enable the 'desktop-shims' feature"
                .to_string(),
        })
    }

    pub(super) fn secure_store(
        _store_id: &str,
        _store_key: Option<&str>,
        _store_dir: Option<&PathBuf>,
    ) -> Result<Arc<dyn SecureStore>> {
        Err(Error::CapabilityMissing {
            capability: "SecureStore".to_string(),
            message: "session persistence needs Keychain/Keystore storage; inject it \
                      or enable the 'desktop-shims' feature"
                .to_string(),
        })
    }
}

#[derive(Default)]
pub struct CoreConfigBuilder {
    base_url: Option<String>,
    default_headers: Vec<(String, String)>,
    request_timeout: Option<Duration>,
    store_id: Option<String>,
    store_key: Option<String>,
    store_dir: Option<PathBuf>,
    persist_session: Option<bool>,
    event_buffer_size: Option<usize>,
    log_filter: Option<String>,
    log_format: Option<LogFormat>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let base_url = var(ENV_API_URL)
            .with_context(|| format!("{} must point at the storefront API", ENV_API_URL))?;
        Url::parse(&base_url).with_context(|| format!("{} is not a valid URL", ENV_API_URL))?;

        let mut builder = Self::default().base_url(base_url);
        builder.store_id = var(ENV_STORE_ID);
        builder.store_key = var(ENV_STORE_KEY);
        builder.store_dir = var(ENV_STORE_DIR).map(PathBuf::from);
        builder.log_filter = var(ENV_LOG);
        builder.log_format = var(ENV_LOG_FORMAT)
            .map(|raw| raw.parse::<LogFormat>())
            .transpose()
            .with_context(|| format!("{} is not a known log format", ENV_LOG_FORMAT))?;

        Ok(builder)
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn store_id(mut self, id: impl Into<String>) -> Self {
        self.store_id = Some(id.into());
        self
    }

    pub fn store_key(mut self, key: impl Into<String>) -> Self {
        self.store_key = Some(key.into());
        self
    }

    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    pub fn persist_session(mut self, enabled: bool) -> Self {
        self.persist_session = Some(enabled);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn log_filter(mut self, directives: impl Into<String>) -> Self {
        self.log_filter = Some(directives.into());
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = Some(format);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<CoreConfig> {
        let raw_url = self
            .base_url
            .ok_or_else(|| Error::Config("Base URL is required, set it with .base_url()".to_string()))?;
        let base_url = Url::parse(&raw_url)
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", raw_url, e)))?;

        let store_id = self.store_id.unwrap_or_else(|| DEFAULT_STORE_ID.to_string());
        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => client,
            None => fallback::http_client(request_timeout)?,
        };
        let secure_store = match self.secure_store {
            Some(store) => store,
            None => fallback::secure_store(
                &store_id,
                self.store_key.as_deref(),
                self.store_dir.as_ref(),
            )?,
        };

        let config = CoreConfig {
            base_url,
            default_headers: self.default_headers,
            request_timeout,
            store_id,
            store_key: self.store_key,
            store_dir: self.store_dir,
            persist_session: self.persist_session.unwrap_or(true),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            log_filter: self.log_filter,
            log_format: self.log_format,
            http_client,
            secure_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{HttpRequest, HttpResponse};
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    struct NullStore;

    #[async_trait]
    impl SecureStore for NullStore {
        async fn write_value(&self, _key: &str, _value: &[u8]) -> BridgeResult<()> {
            Ok(())
        }

        async fn read_value(&self, _key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn remove_value(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn wipe(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn with_bridges(builder: CoreConfigBuilder) -> CoreConfigBuilder {
        builder
            .http_client(Arc::new(MockHttp::new()))
            .secure_store(Arc::new(NullStore))
    }

    fn valid() -> CoreConfigBuilder {
        with_bridges(CoreConfig::builder().base_url("https://api.shop.example/v1/"))
    }

    fn config_error(builder: CoreConfigBuilder) -> String {
        match builder.build() {
            Err(Error::Config(message)) => message,
            Err(other) => panic!("expected a config error, got {:?}", other),
            Ok(_) => panic!("expected a config error, got a config"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = valid().build().unwrap();

        assert_eq!(config.base_url.as_str(), "https://api.shop.example/v1/");
        assert_eq!(config.store_id, DEFAULT_STORE_ID);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert!(config.persist_session);
        assert!(config.default_headers.is_empty());
        assert_eq!(config.log_format, None);
    }

    #[test]
    fn test_base_url_checks() {
        assert!(config_error(with_bridges(CoreConfig::builder())).contains("Base URL is required"));
        assert!(config_error(valid().base_url("not a url")).contains("Invalid base URL"));
        assert!(config_error(valid().base_url("ftp://files.example")).contains("http or https"));
        assert!(config_error(valid().base_url("mailto:shop@example.com")).contains("http or https"));
    }

    #[test]
    fn test_bounds() {
        assert!(config_error(valid().store_id("  ")).contains("Store id"));
        assert!(config_error(valid().request_timeout(Duration::ZERO)).contains("Request timeout"));
        assert!(config_error(valid().request_timeout(Duration::from_secs(301))).contains("at most 300s"));
        assert!(config_error(valid().event_buffer_size(0)).contains("Event buffer"));
        assert!(config_error(valid().event_buffer_size(10_001)).contains("10000"));
        assert!(config_error(valid().default_header(" ", "x")).contains("header names"));

        let config = valid()
            .request_timeout(Duration::from_secs(300))
            .event_buffer_size(16)
            .build()
            .unwrap();
        assert_eq!(config.event_buffer_size, 16);
    }

    #[test]
    fn test_validate_catches_later_edits() {
        let mut config = valid().build().unwrap();
        config.store_id.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_headers_keep_insertion_order() {
        let config = valid()
            .default_header("X-Client", "storefront-ios")
            .default_header("X-Client-Version", "4.2.0")
            .build()
            .unwrap();

        let names: Vec<&str> = config.default_headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["X-Client", "X-Client-Version"]);
    }

    #[test]
    fn test_debug_hides_store_key() {
        let printed = format!("{:?}", valid().store_key("super-secret").build().unwrap());
        assert!(printed.contains("[REDACTED]"));
        assert!(!printed.contains("super-secret"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_bridges_without_shims() {
        let missing_http = CoreConfig::builder()
            .base_url("https://api.shop.example")
            .secure_store(Arc::new(NullStore))
            .build();
        assert!(matches!(
            missing_http,
            Err(Error::CapabilityMissing { ref capability, .. }) if capability == "HttpClient"
        ));

        let missing_store = CoreConfig::builder()
            .base_url("https://api.shop.example")
            .http_client(Arc::new(MockHttp::new()))
            .build();
        assert!(matches!(
            missing_store,
            Err(Error::CapabilityMissing { ref capability, .. }) if capability == "SecureStore"
        ));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_store_needs_key() {
        let builder = CoreConfig::builder().base_url("https://api.shop.example");
        assert!(config_error(builder).contains(ENV_STORE_KEY));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_fallbacks() {
        let dir = std::env::temp_dir().join(format!("core-runtime-{}", uuid::Uuid::new_v4()));
        let config = CoreConfig::builder()
            .base_url("https://api.shop.example")
            .store_key("k3y")
            .store_dir(&dir)
            .build()
            .unwrap();

        assert_eq!(config.store_dir.as_deref(), Some(dir.as_path()));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_API_URL, "https://api.shop.example/v1"),
            (ENV_STORE_ID, "shop-eu"),
            (ENV_STORE_KEY, "k3y"),
            (ENV_STORE_DIR, "/tmp/storefront"),
            (ENV_LOG, "core_query=debug"),
            (ENV_LOG_FORMAT, "json"),
        ]);

        let builder =
            CoreConfigBuilder::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        let config = with_bridges(builder).build().unwrap();

        assert_eq!(config.base_url.as_str(), "https://api.shop.example/v1");
        assert_eq!(config.store_id, "shop-eu");
        assert_eq!(config.store_key.as_deref(), Some("k3y"));
        assert_eq!(config.store_dir, Some(PathBuf::from("/tmp/storefront")));
        assert_eq!(config.log_filter.as_deref(), Some("core_query=debug"));
        assert_eq!(config.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn test_from_lookup_blank_values_are_unset() {
        let builder = CoreConfigBuilder::from_lookup(|name| match name {
            ENV_API_URL => Some("https://api.shop.example".to_string()),
            _ => Some("   ".to_string()),
        })
        .unwrap();

        let config = with_bridges(builder).build().unwrap();
        assert_eq!(config.store_id, DEFAULT_STORE_ID);
        assert_eq!(config.store_key, None);
        assert_eq!(config.log_filter, None);
    }

    #[test]
    fn test_from_lookup_errors() {
        let err = CoreConfigBuilder::from_lookup(|_| None).err().unwrap();
        assert!(format!("{:#}", err).contains(ENV_API_URL));

        let err = CoreConfigBuilder::from_lookup(|name| {
            (name == ENV_API_URL).then(|| "::nope".to_string())
        })
        .err()
        .unwrap();
        assert!(format!("{:#}", err).contains("not a valid URL"));

        let err = CoreConfigBuilder::from_lookup(|name| match name {
            ENV_API_URL => Some("https://api.shop.example".to_string()),
            ENV_LOG_FORMAT => Some("xml".to_string()),
            _ => None,
        })
        .err()
        .unwrap();
        assert!(format!("{:#}", err).contains(ENV_LOG_FORMAT));
    }
}
