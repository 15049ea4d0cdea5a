//! Storefront endpoints
//!
//! One method per backend resource. Each makes a single request and applies
//! the same response policy:
//!
//! | Status | Outcome |
//! |--------|---------|
//! | 2xx    | envelope decoded into the typed result |
//! | 404    | empty collection, or `None` for detail endpoints |
//! | other  | [`CatalogError::Status`] |
//!
//! Transport failures surface as [`CatalogError::Transport`] and shape
//! mismatches as [`CatalogError::Decode`].

use bridge_traits::http::HttpResponse;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::client::{path_segment, ApiClient, QueryParams};
use crate::envelope;
use crate::error::{CatalogError, Result};
use crate::models::{
    sort_addresses, Address, Category, CategoryDetail, Product, ProductDetail, SearchResults,
};

/// Result count requested from `/search`.
pub const SEARCH_LIMIT: u32 = 10;

#[derive(Clone, Debug)]
pub struct StorefrontApi {
    client: ApiClient,
}

impl StorefrontApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Saved addresses of the signed-in shopper, default addresses first.
    #[instrument(skip_all)]
    pub async fn addresses(&self, token: &str) -> Result<Vec<Address>> {
        let response = self
            .client
            .get("/addresses", &QueryParams::new(), Some(token))
            .await?;
        let addresses: Vec<Address> = interpret("/addresses", response)?.unwrap_or_default();
        Ok(sort_addresses(addresses))
    }

    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>> {
        let response = self
            .client
            .get("/categories-data", &QueryParams::new(), None)
            .await?;
        Ok(interpret("/categories-data", response)?.unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub async fn category(&self, slug: &str) -> Result<Option<CategoryDetail>> {
        let path = format!("/getCategoryData/{}", path_segment(slug));
        let response = self.client.get(&path, &QueryParams::new(), None).await?;
        interpret("/getCategoryData", response)
    }

    /// Product listing such as `/new-arrivals?limit=8`.
    #[instrument(skip(self, params), fields(params = params.pairs().len()))]
    pub async fn featured_products(
        &self,
        resource_type: &str,
        params: &QueryParams,
    ) -> Result<Vec<Product>> {
        if resource_type.trim().is_empty() {
            return Err(CatalogError::InvalidRequest(
                "resource type cannot be empty".to_string(),
            ));
        }

        let path = format!("/{}", path_segment(resource_type));
        let response = self.client.get(&path, params, None).await?;
        Ok(interpret(&path, response)?.unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub async fn product(&self, slug: &str) -> Result<Option<ProductDetail>> {
        let path = format!("/getProduct/{}", path_segment(slug));
        let response = self.client.get(&path, &QueryParams::new(), None).await?;
        interpret("/getProduct", response)
    }

    #[instrument(skip(self))]
    pub async fn related_products(&self, slug: &str) -> Result<Vec<Product>> {
        let path = format!("/related-products/{}", path_segment(slug));
        let response = self.client.get(&path, &QueryParams::new(), None).await?;
        Ok(interpret("/related-products", response)?.unwrap_or_default())
    }

    /// Products, categories and brands matching `query`. An empty query is
    /// sent as is.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        let params = QueryParams::new().with("q", query).with("limit", SEARCH_LIMIT);
        let response = self.client.get("/search", &params, None).await?;
        Ok(interpret("/search", response)?.unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub async fn popular_searches(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get("/search/popular", &QueryParams::new(), None)
            .await?;
        Ok(interpret("/search/popular", response)?.unwrap_or_default())
    }
}

/// `Ok(None)` for 404, the decoded payload for 2xx, an error otherwise.
fn interpret<T: DeserializeOwned>(endpoint: &str, response: HttpResponse) -> Result<Option<T>> {
    if response.is_success() {
        return envelope::decode(endpoint, &response.body).map(Some);
    }

    if response.is_not_found() {
        debug!(endpoint, "Resource not found; treating as empty");
        return Ok(None);
    }

    let message = envelope::error_message(&response.body);
    warn!(endpoint, status = response.status, "Unexpected storefront API status");
    Err(CatalogError::Status {
        status: response.status,
        message,
    })
}
