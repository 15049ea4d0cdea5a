//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host-provided bridges (HTTP transport, secure store,
//! clock) into the storefront core: the event bus, the query cache, the
//! session and UI stores, and the catalog hooks. Host shells hold one
//! [`StorefrontCore`] and call one method per screen query.
//!
//! Desktop apps typically enable the `desktop-shims` feature, which lets
//! [`CoreConfig`] fall back to the reqwest transport and the encrypted file
//! store when no bridge is injected.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{Clock, HttpClient, SecureStore};
use core_catalog::queries::resources;
use core_catalog::{
    Address, ApiClient, Category, CategoryDetail, GetAddresses, GetCategoriesData,
    GetCategoryData, GetFeaturedProducts, GetPopularSearches, GetProduct, GetRelatedProducts,
    GetSearchResults, Product, ProductDetail, QueryParams, SearchResults, StorefrontApi,
    UserProfile,
};
use core_query::{CancellationToken, QueryCache, QueryState};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::{init_logging, LoggingConfig};
use core_session::{SessionError, SessionPersistor, SessionStore, UiStore};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use core_runtime::config::CoreConfigBuilder;

/// Aggregated handle to the bridge dependencies the core requires.
#[derive(Clone)]
pub struct StorefrontDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub clock: Arc<dyn Clock>,
}

impl StorefrontDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        secure_store: Arc<dyn SecureStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            secure_store,
            clock,
        }
    }
}

impl From<&CoreConfig> for StorefrontDependencies {
    fn from(config: &CoreConfig) -> Self {
        Self {
            http_client: Arc::clone(&config.http_client),
            secure_store: Arc::clone(&config.secure_store),
            clock: Arc::clone(&config.clock),
        }
    }
}

struct CoreInner {
    config: CoreConfig,
    deps: StorefrontDependencies,
    events: EventBus,
    cache: QueryCache,
    session: SessionStore,
    ui: UiStore,
    api: StorefrontApi,
    persistor: Option<SessionPersistor>,
    autosave: Mutex<Option<JoinHandle<()>>>,
}

/// Primary façade exposed to host applications.
///
/// Cheap to clone; every clone shares the same cache and stores.
#[derive(Clone)]
pub struct StorefrontCore {
    inner: Arc<CoreInner>,
}

impl StorefrontCore {
    /// Wire every component from `config` and rehydrate the persisted
    /// session.
    ///
    /// A persisted session that cannot be read is logged and skipped; the
    /// core then starts signed out. Must be called inside a Tokio runtime
    /// when session persistence is enabled.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let deps = StorefrontDependencies::from(&config);
        let events = EventBus::new(config.event_buffer_size);
        let cache = QueryCache::with_events(Arc::clone(&deps.clock), events.clone());
        let session = SessionStore::with_events(events.clone());
        let ui = UiStore::with_events(events.clone());
        let api = StorefrontApi::new(ApiClient::from_config(&config));

        let persistor = config
            .persist_session
            .then(|| SessionPersistor::new(Arc::clone(&deps.secure_store)));

        let autosave = match &persistor {
            Some(persistor) => {
                match session.rehydrate(persistor).await {
                    Ok(true) => info!(is_logged = session.is_logged(), "Restored persisted session"),
                    Ok(false) => debug!("No persisted session to restore"),
                    Err(SessionError::Corrupted(reason)) => {
                        warn!(%reason, "Discarded unreadable persisted session")
                    }
                    Err(e) => warn!(error = %e, "Could not restore persisted session"),
                }
                Some(session.spawn_autosave(persistor.clone()))
            }
            None => None,
        };

        info!(
            base_url = %config.base_url,
            store_id = %config.store_id,
            persist_session = config.persist_session,
            "Storefront core ready"
        );

        Ok(Self {
            inner: Arc::new(CoreInner {
                config,
                deps,
                events,
                cache,
                session,
                ui,
                api,
                persistor,
                autosave: Mutex::new(autosave),
            }),
        })
    }

    /// Build the configuration from `STOREFRONT_*` variables, install the
    /// tracing subscriber, then bootstrap.
    ///
    /// Logging is only installed once per process; a second install attempt
    /// is ignored.
    pub async fn from_env() -> Result<Self> {
        let config = CoreConfig::from_env()
            .map_err(|e| CoreError::InitializationFailed(format!("{:#}", e)))?;

        if let Err(e) = init_logging(LoggingConfig::from_core_config(&config)) {
            debug!(error = %e, "Tracing subscriber already installed");
        }

        Self::bootstrap(config).await
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// Access the bridge dependencies being used by the core.
    pub fn dependencies(&self) -> &StorefrontDependencies {
        &self.inner.deps
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    pub fn ui(&self) -> &UiStore {
        &self.inner.ui
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    pub fn api(&self) -> &StorefrontApi {
        &self.inner.api
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe_events(&self) -> EventStream {
        self.inner.events.stream()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Saved addresses of the current shopper.
    ///
    /// Signed out, the state stays `Idle` and no request is made.
    pub async fn addresses(&self, cancel: &CancellationToken) -> Result<QueryState<Vec<Address>>> {
        let query = GetAddresses::from_session(self.inner.api.clone(), &self.inner.session);
        Ok(self.inner.cache.fetch(query, cancel).await?)
    }

    pub async fn categories(&self, cancel: &CancellationToken) -> Result<QueryState<Vec<Category>>> {
        let query = GetCategoriesData::new(self.inner.api.clone());
        Ok(self.inner.cache.fetch(query, cancel).await?)
    }

    pub async fn category(
        &self,
        slug: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryState<Option<CategoryDetail>>> {
        let query = GetCategoryData::new(self.inner.api.clone(), slug);
        Ok(self.inner.cache.fetch(query, cancel).await?)
    }

    pub async fn featured_products(
        &self,
        resource_type: &str,
        params: QueryParams,
        cancel: &CancellationToken,
    ) -> Result<QueryState<Vec<Product>>> {
        let query = GetFeaturedProducts::new(self.inner.api.clone(), resource_type, params);
        Ok(self.inner.cache.fetch(query, cancel).await?)
    }

    pub async fn product(
        &self,
        slug: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryState<Option<ProductDetail>>> {
        let query = GetProduct::new(self.inner.api.clone(), slug);
        Ok(self.inner.cache.fetch(query, cancel).await?)
    }

    pub async fn related_products(
        &self,
        slug: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryState<Vec<Product>>> {
        let query = GetRelatedProducts::new(self.inner.api.clone(), slug);
        Ok(self.inner.cache.fetch(query, cancel).await?)
    }

    /// Cached results for `query`. Never issues a request; see
    /// [`trigger_search`](Self::trigger_search).
    pub async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryState<SearchResults>> {
        let query = GetSearchResults::new(self.inner.api.clone(), query);
        Ok(self.inner.cache.fetch(query, cancel).await?)
    }

    /// Run the search for `query` now, even when it is empty.
    pub async fn trigger_search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryState<SearchResults>> {
        let query = GetSearchResults::new(self.inner.api.clone(), query);
        Ok(self.inner.cache.refetch(query, cancel).await?)
    }

    pub async fn popular_searches(
        &self,
        cancel: &CancellationToken,
    ) -> Result<QueryState<Vec<String>>> {
        let query = GetPopularSearches::new(self.inner.api.clone());
        Ok(self.inner.cache.fetch(query, cancel).await?)
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    pub fn sign_in(&self, token: String, user: UserProfile) {
        self.inner.session.sign_in(token, user);
    }

    /// Clear credentials and drop every cached address list.
    pub fn sign_out(&self) {
        self.inner.session.sign_out();

        let cache = &self.inner.cache;
        let mut removed = 0;
        for key in cache.keys() {
            if key.resource() == resources::ADDRESSES && cache.remove(&key) {
                removed += 1;
            }
        }
        debug!(removed, "Dropped cached addresses after sign-out");
    }

    /// Save the session now. Returns `false` when persistence is disabled.
    pub async fn persist_session(&self) -> Result<bool> {
        match &self.inner.persistor {
            Some(persistor) => {
                persistor.save(&self.inner.session.snapshot()).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop autosaving after one final save.
    pub async fn shutdown(&self) -> Result<()> {
        let handle = self.inner.autosave.lock().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.persist_session().await?;
        info!("Storefront core shut down");
        Ok(())
    }
}

impl std::fmt::Debug for StorefrontCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontCore")
            .field("config", &self.inner.config)
            .field("session", &self.inner.session)
            .field("cached_queries", &self.inner.cache.len())
            .finish()
    }
}
