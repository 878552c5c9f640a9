//! Application state shared across handlers.

use std::sync::Arc;

use crate::cart::CartRegistry;
use crate::config::StorefrontConfig;
use crate::content::ContentStore;
use crate::services::instagram::InstagramClient;
use crate::services::stripe::{StripeClient, StripeError};
use crate::shopify::StorefrontClient;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like API clients and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    storefront: StorefrontClient,
    stripe: StripeClient,
    instagram: Option<InstagramClient>,
    content: ContentStore,
    carts: CartRegistry,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the Stripe client cannot be built.
    pub fn new(config: StorefrontConfig, content: ContentStore) -> Result<Self, StripeError> {
        let storefront = StorefrontClient::new(&config.shopify);
        let stripe = StripeClient::new(&config.stripe)?;
        let instagram = config.instagram.as_ref().map(InstagramClient::new);
        let carts = CartRegistry::new(storefront.clone(), config.cart.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                storefront,
                stripe,
                instagram,
                content,
                carts,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the Storefront API client.
    #[must_use]
    pub fn storefront(&self) -> &StorefrontClient {
        &self.inner.storefront
    }

    /// Get a reference to the Stripe client.
    #[must_use]
    pub fn stripe(&self) -> &StripeClient {
        &self.inner.stripe
    }

    /// Get a reference to the Instagram client, if configured.
    #[must_use]
    pub fn instagram(&self) -> Option<&InstagramClient> {
        self.inner.instagram.as_ref()
    }

    /// Get a reference to the content store.
    #[must_use]
    pub fn content(&self) -> &ContentStore {
        &self.inner.content
    }

    /// Get a reference to the cart registry.
    #[must_use]
    pub fn carts(&self) -> &CartRegistry {
        &self.inner.carts
    }
}
