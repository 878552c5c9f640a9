//! Per-session cart service registry.
//!
//! Exactly one [`CartService`] exists per browser session. Handlers resolve
//! their service through the registry with the session's cart key; the
//! service is constructed (and hydrated from its mirror) on first use and
//! torn down explicitly when the session ends.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::CartConfig;
use crate::shopify::StorefrontClient;

use super::mirror::FileMirror;
use super::service::CartService;

/// The production cart service type.
pub type StorefrontCartService = CartService<StorefrontClient>;

/// Registry of live cart services, keyed by session cart key.
pub struct CartRegistry {
    gateway: StorefrontClient,
    config: CartConfig,
    services: RwLock<HashMap<String, Arc<StorefrontCartService>>>,
}

impl CartRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(gateway: StorefrontClient, config: CartConfig) -> Self {
        Self {
            gateway,
            config,
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Generate a fresh session cart key.
    #[must_use]
    pub fn new_key() -> String {
        Uuid::new_v4().to_string()
    }

    /// Resolve the cart service for a session, constructing and hydrating it
    /// on first use.
    pub async fn get_or_create(&self, key: &str) -> Arc<StorefrontCartService> {
        if let Some(service) = self.services.read().await.get(key) {
            return Arc::clone(service);
        }

        let mut services = self.services.write().await;
        // Double-checked: another request may have built it meanwhile.
        if let Some(service) = services.get(key) {
            return Arc::clone(service);
        }

        let mirror = FileMirror::new(self.config.mirror_dir.clone(), key);
        let service = Arc::new(CartService::new(
            self.gateway.clone(),
            mirror,
            self.config.max_per_item,
            self.config.default_currency,
        ));
        service.hydrate().await;
        services.insert(key.to_string(), Arc::clone(&service));
        service
    }

    /// Tear down a session's cart service.
    ///
    /// The durable mirror is left in place so the cart can be restored if
    /// the same key ever comes back.
    pub async fn discard(&self, key: &str) {
        self.services.write().await.remove(key);
    }

    /// Number of live services (for diagnostics).
    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    /// Whether any services are live.
    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }
}
