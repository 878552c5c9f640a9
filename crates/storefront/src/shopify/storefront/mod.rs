//! Storefront API client implementation.
//!
//! Posts hand-written GraphQL documents with `reqwest` and decodes typed
//! `serde` envelopes. Catalog reads are cached with `moka` (5-minute TTL);
//! cart operations and availability probes always hit the API.

mod cache;
pub mod queries;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use stonemill_core::{CurrencyCode, RemoteCartId, RemoteLineId, VariantId};

use crate::config::ShopifyStorefrontConfig;
use crate::shopify::types::{
    CartLineInput, CollectionConnection, Product, ProductConnection, RemoteCart,
};
use crate::shopify::{GraphQLError, ShopifyError};

use cache::CacheValue;
use response::{
    AvailabilityData, CartCreateData, CartLinesAddData, CartLinesRemoveData, CartLinesUpdateData,
    CollectionsData, GetCartData, GraphQLResponse, ProductByHandleData, ProductsData,
    WireCartMutation,
};

// =============================================================================
// StorefrontClient
// =============================================================================

/// Client for the Shopify Storefront API.
///
/// Provides type-safe access to products, collections, and cart operations.
/// Products and collections are cached for 5 minutes.
#[derive(Clone)]
pub struct StorefrontClient {
    inner: Arc<StorefrontClientInner>,
}

struct StorefrontClientInner {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
    cache: Cache<String, CacheValue>,
}

impl StorefrontClient {
    /// Create a new Storefront API client.
    #[must_use]
    pub fn new(config: &ShopifyStorefrontConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        let endpoint = format!(
            "https://{}/api/{}/graphql.json",
            config.store, config.api_version
        );

        Self {
            inner: Arc::new(StorefrontClientInner {
                client: reqwest::Client::new(),
                endpoint,
                access_token: config.storefront_token.expose_secret().to_string(),
                cache,
            }),
        }
    }

    /// Execute a GraphQL document.
    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ShopifyError> {
        let request_body = serde_json::json!({
            "query": query,
            "variables": variables,
        });

        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            // Private access tokens use a different header than public tokens
            // See: https://shopify.dev/docs/storefronts/headless/building-with-the-storefront-api/getting-started
            .header(
                "Shopify-Storefront-Private-Token",
                &self.inner.access_token,
            )
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        // Check for rate limiting
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ShopifyError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Storefront API returned non-success status"
            );
            return Err(ShopifyError::GraphQL(vec![GraphQLError::message(format!(
                "HTTP {status}: {}",
                response_text.chars().take(200).collect::<String>()
            ))]));
        }

        let response: GraphQLResponse<T> = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %response_text.chars().take(500).collect::<String>(),
                    "Failed to parse Storefront GraphQL response"
                );
                return Err(ShopifyError::Parse(e));
            }
        };

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            tracing::debug!(count = errors.len(), "GraphQL errors in response");
            return Err(ShopifyError::GraphQL(
                errors
                    .into_iter()
                    .map(|e| GraphQLError {
                        message: e.message,
                        path: e.path,
                    })
                    .collect(),
            ));
        }

        response.data.ok_or_else(|| {
            tracing::error!(
                body = %response_text.chars().take(500).collect::<String>(),
                "Storefront GraphQL response has no data and no errors"
            );
            ShopifyError::GraphQL(vec![GraphQLError::message("No data in response")])
        })
    }

    // =========================================================================
    // Product Methods
    // =========================================================================

    /// Get a product by its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found or the API request fails.
    #[instrument(skip(self), fields(handle = %handle))]
    pub async fn get_product_by_handle(&self, handle: &str) -> Result<Product, ShopifyError> {
        let cache_key = format!("product:{handle}");

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let data: ProductByHandleData = self
            .execute(
                &queries::GET_PRODUCT_BY_HANDLE,
                serde_json::json!({ "handle": handle }),
            )
            .await?;

        let product: Product = data
            .product
            .ok_or_else(|| ShopifyError::NotFound(format!("Product not found: {handle}")))?
            .try_into()?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    /// Get a paginated list of products.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_products(
        &self,
        first: i64,
        after: Option<String>,
    ) -> Result<ProductConnection, ShopifyError> {
        let cache_key = format!("products:{}", after.as_deref().unwrap_or(""));

        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let data: ProductsData = self
            .execute(
                &queries::GET_PRODUCTS,
                serde_json::json!({ "first": first, "after": after }),
            )
            .await?;

        let connection: ProductConnection = data.try_into()?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(connection.clone()))
            .await;

        Ok(connection)
    }

    // =========================================================================
    // Collection Methods
    // =========================================================================

    /// Get a paginated list of collections.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_collections(
        &self,
        first: i64,
        after: Option<String>,
    ) -> Result<CollectionConnection, ShopifyError> {
        let cache_key = format!("collections:{}", after.as_deref().unwrap_or(""));

        if let Some(CacheValue::Collections(collections)) = self.inner.cache.get(&cache_key).await
        {
            debug!("Cache hit for collections");
            return Ok(collections);
        }

        let data: CollectionsData = self
            .execute(
                &queries::GET_COLLECTIONS,
                serde_json::json!({ "first": first, "after": after }),
            )
            .await?;

        let connection: CollectionConnection = data.into();

        self.inner
            .cache
            .insert(cache_key, CacheValue::Collections(connection.clone()))
            .await;

        Ok(connection)
    }

    // =========================================================================
    // Availability (not cached - live stock data)
    // =========================================================================

    /// Read `quantityAvailable` for a variant.
    ///
    /// Returns `None` when the variant does not track inventory (or the id
    /// resolves to something that is not a variant).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(variant_id = %variant_id))]
    pub async fn variant_availability(
        &self,
        variant_id: &VariantId,
    ) -> Result<Option<i64>, ShopifyError> {
        let data: AvailabilityData = self
            .execute(
                &queries::VARIANT_AVAILABILITY,
                serde_json::json!({ "id": variant_id.as_str() }),
            )
            .await?;

        Ok(data.node.and_then(|n| n.quantity_available))
    }

    // =========================================================================
    // Cart Methods (not cached - mutable state)
    // =========================================================================

    /// Create a new cart, optionally seeded with lines, in the currency
    /// implied by the buyer-identity country.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart creation fails or user errors are returned.
    #[instrument(skip(self, lines))]
    pub async fn create_cart(
        &self,
        lines: Vec<CartLineInput>,
        currency: CurrencyCode,
    ) -> Result<RemoteCart, ShopifyError> {
        let data: CartCreateData = self
            .execute(
                &queries::CREATE_CART,
                serde_json::json!({
                    "input": {
                        "lines": line_inputs(&lines),
                        "buyerIdentity": { "countryCode": currency.country_code() },
                    }
                }),
            )
            .await?;

        cart_from_mutation(data.cart_create, "create cart")
    }

    /// Get an existing cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart is not found or the API request fails.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn fetch_cart(&self, cart_id: &RemoteCartId) -> Result<RemoteCart, ShopifyError> {
        let data: GetCartData = self
            .execute(
                &queries::GET_CART,
                serde_json::json!({ "cartId": cart_id.as_str() }),
            )
            .await?;

        let cart = data
            .cart
            .ok_or_else(|| ShopifyError::NotFound(format!("Cart not found: {cart_id}")))?;

        Ok(cart.try_into()?)
    }

    /// Add lines to a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart update fails or user errors are returned.
    #[instrument(skip(self, lines), fields(cart_id = %cart_id))]
    pub async fn add_lines(
        &self,
        cart_id: &RemoteCartId,
        lines: Vec<CartLineInput>,
    ) -> Result<RemoteCart, ShopifyError> {
        let data: CartLinesAddData = self
            .execute(
                &queries::ADD_CART_LINES,
                serde_json::json!({
                    "cartId": cart_id.as_str(),
                    "lines": line_inputs(&lines),
                }),
            )
            .await?;

        cart_from_mutation(data.cart_lines_add, "add to cart")
    }

    /// Update a single line's quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart update fails or user errors are returned.
    #[instrument(skip(self), fields(cart_id = %cart_id, line_id = %line_id))]
    pub async fn update_line_quantity(
        &self,
        cart_id: &RemoteCartId,
        line_id: &RemoteLineId,
        quantity: u32,
    ) -> Result<RemoteCart, ShopifyError> {
        let data: CartLinesUpdateData = self
            .execute(
                &queries::UPDATE_CART_LINES,
                serde_json::json!({
                    "cartId": cart_id.as_str(),
                    "lines": [ { "id": line_id.as_str(), "quantity": quantity } ],
                }),
            )
            .await?;

        cart_from_mutation(data.cart_lines_update, "update cart")
    }

    /// Remove lines from a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart update fails or user errors are returned.
    #[instrument(skip(self, line_ids), fields(cart_id = %cart_id))]
    pub async fn remove_lines(
        &self,
        cart_id: &RemoteCartId,
        line_ids: Vec<RemoteLineId>,
    ) -> Result<RemoteCart, ShopifyError> {
        let ids: Vec<&str> = line_ids.iter().map(RemoteLineId::as_str).collect();
        let data: CartLinesRemoveData = self
            .execute(
                &queries::REMOVE_CART_LINES,
                serde_json::json!({
                    "cartId": cart_id.as_str(),
                    "lineIds": ids,
                }),
            )
            .await?;

        cart_from_mutation(data.cart_lines_remove, "remove from cart")
    }

    // =========================================================================
    // Cache Management
    // =========================================================================

    /// Invalidate all cached catalog data.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }
}

/// Serialize cart line inputs into the wire `CartLineInput` list.
fn line_inputs(lines: &[CartLineInput]) -> Vec<serde_json::Value> {
    lines
        .iter()
        .map(|line| {
            serde_json::json!({
                "merchandiseId": line.variant_id.as_str(),
                "quantity": line.quantity,
            })
        })
        .collect()
}

/// Unwrap a cart mutation payload, surfacing user errors.
fn cart_from_mutation(
    payload: Option<WireCartMutation>,
    action: &str,
) -> Result<RemoteCart, ShopifyError> {
    let Some(result) = payload else {
        return Err(ShopifyError::GraphQL(vec![GraphQLError::message(format!(
            "Failed to {action}"
        ))]));
    };

    if !result.user_errors.is_empty() {
        return Err(ShopifyError::UserError(
            result
                .user_errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; "),
        ));
    }

    match result.cart {
        Some(cart) => Ok(cart.try_into()?),
        None => Err(ShopifyError::GraphQL(vec![GraphQLError::message(format!(
            "Failed to {action}"
        ))])),
    }
}
