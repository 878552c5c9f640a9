//! The seam between the cart synchronizer and the remote cart API.
//!
//! [`CartGateway`] is implemented by the production
//! [`StorefrontClient`](crate::shopify::StorefrontClient) and by scripted
//! mocks in tests. Static dispatch only - the synchronizer is generic over
//! its gateway.

use stonemill_core::{CurrencyCode, RemoteCartId, RemoteLineId, VariantId};

use crate::shopify::ShopifyError;
use crate::shopify::StorefrontClient;
use crate::shopify::types::{CartLineInput, RemoteCart};

/// Remote cart operations the synchronizer depends on.
#[allow(async_fn_in_trait)]
pub trait CartGateway: Send + Sync {
    /// Create a new cart, optionally seeded with lines, in the given currency.
    async fn create_cart(
        &self,
        lines: Vec<CartLineInput>,
        currency: CurrencyCode,
    ) -> Result<RemoteCart, ShopifyError>;

    /// Read an existing cart.
    async fn fetch_cart(&self, cart_id: &RemoteCartId) -> Result<RemoteCart, ShopifyError>;

    /// Add lines to a cart.
    async fn add_lines(
        &self,
        cart_id: &RemoteCartId,
        lines: Vec<CartLineInput>,
    ) -> Result<RemoteCart, ShopifyError>;

    /// Set one line's quantity.
    async fn update_line_quantity(
        &self,
        cart_id: &RemoteCartId,
        line_id: &RemoteLineId,
        quantity: u32,
    ) -> Result<RemoteCart, ShopifyError>;

    /// Remove lines from a cart.
    async fn remove_lines(
        &self,
        cart_id: &RemoteCartId,
        line_ids: Vec<RemoteLineId>,
    ) -> Result<RemoteCart, ShopifyError>;

    /// Read `quantityAvailable` for a variant; `None` when untracked.
    async fn variant_availability(
        &self,
        variant_id: &VariantId,
    ) -> Result<Option<i64>, ShopifyError>;
}

impl CartGateway for StorefrontClient {
    async fn create_cart(
        &self,
        lines: Vec<CartLineInput>,
        currency: CurrencyCode,
    ) -> Result<RemoteCart, ShopifyError> {
        Self::create_cart(self, lines, currency).await
    }

    async fn fetch_cart(&self, cart_id: &RemoteCartId) -> Result<RemoteCart, ShopifyError> {
        Self::fetch_cart(self, cart_id).await
    }

    async fn add_lines(
        &self,
        cart_id: &RemoteCartId,
        lines: Vec<CartLineInput>,
    ) -> Result<RemoteCart, ShopifyError> {
        Self::add_lines(self, cart_id, lines).await
    }

    async fn update_line_quantity(
        &self,
        cart_id: &RemoteCartId,
        line_id: &RemoteLineId,
        quantity: u32,
    ) -> Result<RemoteCart, ShopifyError> {
        Self::update_line_quantity(self, cart_id, line_id, quantity).await
    }

    async fn remove_lines(
        &self,
        cart_id: &RemoteCartId,
        line_ids: Vec<RemoteLineId>,
    ) -> Result<RemoteCart, ShopifyError> {
        Self::remove_lines(self, cart_id, line_ids).await
    }

    async fn variant_availability(
        &self,
        variant_id: &VariantId,
    ) -> Result<Option<i64>, ShopifyError> {
        Self::variant_availability(self, variant_id).await
    }
}
