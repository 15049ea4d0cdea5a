//! Data fetch hooks
//!
//! Each hook is a [`Query`]: it captures its parameters by value, names its
//! cache key and performs exactly one request through [`StorefrontApi`].
//! Run them through a [`core_query::QueryCache`] to get de-duplication and
//! staleness handling.

use async_trait::async_trait;
use core_query::{Query, QueryKey, QueryOptions};
use core_session::SessionStore;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::api::StorefrontApi;
use crate::client::QueryParams;
use crate::error::{CatalogError, Result};
use crate::models::{Address, Category, CategoryDetail, Product, ProductDetail, SearchResults};

/// Cache resource names, usable with `QueryCache::invalidate_resource`.
pub mod resources {
    pub const ADDRESSES: &str = "addresses";
    pub const CATEGORIES: &str = "categories-data";
    pub const CATEGORY: &str = "category";
    pub const FEATURED: &str = "featured";
    pub const PRODUCT: &str = "product";
    pub const RELATED_PRODUCTS: &str = "related-products";
    pub const SEARCH: &str = "search";
    pub const POPULAR_SEARCHES: &str = "popular-searches";
}

/// Address lists are served from cache for a day.
pub const ADDRESSES_STALE_TIME: Duration = Duration::from_secs(24 * 60 * 60);

const ANONYMOUS: &str = "anonymous";

/// Short, non-reversible stand-in for a bearer token in cache keys.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..8])
}

async fn until_cancelled<T, F>(cancel: &CancellationToken, request: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CatalogError::Cancelled),
        result = request => result,
    }
}

fn has_slug(slug: &str) -> bool {
    !slug.trim().is_empty()
}

/// Saved addresses of the signed-in shopper.
///
/// Disabled without a token; fetching anyway yields an empty list and makes
/// no request. Entries are keyed by a fingerprint of the token so a new
/// sign-in never sees the previous shopper's addresses.
#[derive(Clone, Debug)]
pub struct GetAddresses {
    api: StorefrontApi,
    token: Option<String>,
}

impl GetAddresses {
    pub fn new(api: StorefrontApi, token: Option<String>) -> Self {
        Self { api, token }
    }

    /// Hook bound to the token currently held by `session`.
    pub fn from_session(api: StorefrontApi, session: &SessionStore) -> Self {
        Self::new(api, session.token())
    }
}

#[async_trait]
impl Query for GetAddresses {
    type Output = Vec<Address>;
    type Error = CatalogError;

    fn key(&self) -> QueryKey {
        let owner = self
            .token
            .as_deref()
            .map(token_fingerprint)
            .unwrap_or_else(|| ANONYMOUS.to_string());
        QueryKey::new(resources::ADDRESSES).with_param(owner)
    }

    fn options(&self) -> QueryOptions {
        QueryOptions::default()
            .enabled(self.token.is_some())
            .stale_time(ADDRESSES_STALE_TIME)
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<Address>> {
        match self.token.as_deref() {
            Some(token) => until_cancelled(cancel, self.api.addresses(token)).await,
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GetCategoriesData {
    api: StorefrontApi,
}

impl GetCategoriesData {
    pub fn new(api: StorefrontApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Query for GetCategoriesData {
    type Output = Vec<Category>;
    type Error = CatalogError;

    fn key(&self) -> QueryKey {
        QueryKey::new(resources::CATEGORIES)
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<Category>> {
        until_cancelled(cancel, self.api.categories()).await
    }
}

#[derive(Clone, Debug)]
pub struct GetCategoryData {
    api: StorefrontApi,
    slug: String,
}

impl GetCategoryData {
    pub fn new(api: StorefrontApi, slug: impl Into<String>) -> Self {
        Self {
            api,
            slug: slug.into(),
        }
    }
}

#[async_trait]
impl Query for GetCategoryData {
    type Output = Option<CategoryDetail>;
    type Error = CatalogError;

    fn key(&self) -> QueryKey {
        QueryKey::new(resources::CATEGORY).with_param(&self.slug)
    }

    fn options(&self) -> QueryOptions {
        QueryOptions::default().enabled(has_slug(&self.slug))
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Option<CategoryDetail>> {
        until_cancelled(cancel, self.api.category(&self.slug)).await
    }
}

/// Product listing for a resource such as `new-arrivals` or `best-sellers`.
#[derive(Clone, Debug)]
pub struct GetFeaturedProducts {
    api: StorefrontApi,
    resource_type: String,
    params: QueryParams,
}

impl GetFeaturedProducts {
    pub fn new(api: StorefrontApi, resource_type: impl Into<String>, params: QueryParams) -> Self {
        Self {
            api,
            resource_type: resource_type.into(),
            params,
        }
    }
}

#[async_trait]
impl Query for GetFeaturedProducts {
    type Output = Vec<Product>;
    type Error = CatalogError;

    fn key(&self) -> QueryKey {
        QueryKey::new(resources::FEATURED)
            .with_param(&self.resource_type)
            .with_params(self.params.key_parts())
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<Product>> {
        until_cancelled(
            cancel,
            self.api.featured_products(&self.resource_type, &self.params),
        )
        .await
    }
}

#[derive(Clone, Debug)]
pub struct GetProduct {
    api: StorefrontApi,
    slug: String,
}

impl GetProduct {
    pub fn new(api: StorefrontApi, slug: impl Into<String>) -> Self {
        Self {
            api,
            slug: slug.into(),
        }
    }
}

#[async_trait]
impl Query for GetProduct {
    type Output = Option<ProductDetail>;
    type Error = CatalogError;

    fn key(&self) -> QueryKey {
        QueryKey::new(resources::PRODUCT).with_param(&self.slug)
    }

    fn options(&self) -> QueryOptions {
        QueryOptions::default().enabled(has_slug(&self.slug))
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Option<ProductDetail>> {
        until_cancelled(cancel, self.api.product(&self.slug)).await
    }
}

#[derive(Clone, Debug)]
pub struct GetRelatedProducts {
    api: StorefrontApi,
    slug: String,
}

impl GetRelatedProducts {
    pub fn new(api: StorefrontApi, slug: impl Into<String>) -> Self {
        Self {
            api,
            slug: slug.into(),
        }
    }
}

#[async_trait]
impl Query for GetRelatedProducts {
    type Output = Vec<Product>;
    type Error = CatalogError;

    fn key(&self) -> QueryKey {
        QueryKey::new(resources::RELATED_PRODUCTS).with_param(&self.slug)
    }

    fn options(&self) -> QueryOptions {
        QueryOptions::default().enabled(has_slug(&self.slug))
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<Product>> {
        until_cancelled(cancel, self.api.related_products(&self.slug)).await
    }
}

/// Search as the shopper types.
///
/// Always disabled: results load only through an explicit refetch, and an
/// empty query is sent like any other.
#[derive(Clone, Debug)]
pub struct GetSearchResults {
    api: StorefrontApi,
    query: String,
}

impl GetSearchResults {
    pub fn new(api: StorefrontApi, query: impl Into<String>) -> Self {
        Self {
            api,
            query: query.into(),
        }
    }
}

#[async_trait]
impl Query for GetSearchResults {
    type Output = SearchResults;
    type Error = CatalogError;

    fn key(&self) -> QueryKey {
        QueryKey::new(resources::SEARCH).with_param(&self.query)
    }

    fn options(&self) -> QueryOptions {
        QueryOptions::default().enabled(false)
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<SearchResults> {
        until_cancelled(cancel, self.api.search(&self.query)).await
    }
}

#[derive(Clone, Debug)]
pub struct GetPopularSearches {
    api: StorefrontApi,
}

impl GetPopularSearches {
    pub fn new(api: StorefrontApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Query for GetPopularSearches {
    type Output = Vec<String>;
    type Error = CatalogError;

    fn key(&self) -> QueryKey {
        QueryKey::new(resources::POPULAR_SEARCHES)
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        until_cancelled(cancel, self.api.popular_searches()).await
    }
}
