//! # Catalog Module
//!
//! Storefront backend access: the HTTP client adapter, envelope decoding,
//! domain records and the data fetch hooks run through the query cache.
//!
//! ## Overview
//!
//! - [`ApiClient`]: base URL, headers and query encoding over the host
//!   `HttpClient`
//! - [`StorefrontApi`]: one method per endpoint with a single response policy
//!   (2xx decoded, 404 empty, anything else an error)
//! - [`queries`]: `GetAddresses`, `GetCategoriesData`, `GetCategoryData`,
//!   `GetFeaturedProducts`, `GetProduct`, `GetRelatedProducts`,
//!   `GetSearchResults` and `GetPopularSearches`
//!
//! ## Example
//!
//! ```ignore
//! use core_catalog::{ApiClient, GetCategoriesData, StorefrontApi};
//! use core_query::{CancellationToken, QueryCache};
//!
//! let api = StorefrontApi::new(ApiClient::from_config(&config));
//! let cache = QueryCache::default();
//! let state = cache
//!     .fetch(GetCategoriesData::new(api.clone()), &CancellationToken::new())
//!     .await?;
//! ```

pub mod api;
pub mod client;
pub mod envelope;
pub mod error;
pub mod models;
pub mod queries;

pub use api::{StorefrontApi, SEARCH_LIMIT};
pub use client::{ApiClient, QueryParams};
pub use error::{CatalogError, Result};
pub use models::{
    Address, Brand, Category, CategoryDetail, Product, ProductAttribute, ProductDetail,
    ProductVariant, Region, SearchResults, UserProfile,
};
pub use queries::{
    GetAddresses, GetCategoriesData, GetCategoryData, GetFeaturedProducts, GetPopularSearches,
    GetProduct, GetRelatedProducts, GetSearchResults,
};
