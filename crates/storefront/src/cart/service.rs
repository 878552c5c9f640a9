//! The cart synchronizer.
//!
//! Translates store-level intents into gateway calls, enforcing the per-item
//! maximum and stock availability before any remote write. Add and update are
//! pessimistic (remote first, commit after); removal is optimistic and always
//! converges local state to "removed". A failed mutation is retried at most
//! once, against a brand-new remote cart.
//!
//! Mutations on the same variant are serialized through a per-variant async
//! mutex, so overlapping requests from one session cannot lose updates.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

use stonemill_core::{CurrencyCode, RemoteCartId, VariantId};

use crate::shopify::ShopifyError;
use crate::shopify::types::{CartLineInput, RemoteCart};

use super::gateway::CartGateway;
use super::mirror::{CART_ID_KEY, CartMirror, LINES_KEY, decode_lines, encode_lines};
use super::state::{CartLine, CartSnapshot, CartState, NewCartItem};

/// Outcome of a failed cart mutation.
///
/// `OutOfStock` and `QuantityLimitExceeded` are expected, user-facing
/// conditions; `RemoteSync` is a genuine gateway failure that survived the
/// single retry.
#[derive(Debug, Error)]
pub enum CartError {
    /// The requested quantity exceeds what the variant has in stock.
    #[error("{title} is out of stock")]
    OutOfStock { title: String },

    /// The requested quantity exceeds the configured per-item ceiling.
    #[error("Only {max} per order of {title}")]
    QuantityLimitExceeded { max: u32, title: String },

    /// The gateway call failed (after the retry, where one applies).
    #[error("Cart sync failed: {0}")]
    RemoteSync(#[from] ShopifyError),
}

/// The cart service: local state plus the synchronizer that keeps it
/// reconciled with the remote cart.
///
/// One instance exists per browser session (see
/// [`super::registry::CartRegistry`]); construct with [`Self::new`] and call
/// [`Self::hydrate`] before first use.
pub struct CartService<G> {
    gateway: G,
    mirror: Box<dyn CartMirror>,
    max_per_item: u32,
    state: Mutex<CartState>,
    line_locks: Mutex<HashMap<VariantId, Arc<Mutex<()>>>>,
}

impl<G: CartGateway> CartService<G> {
    /// Create a service with an empty cart in the given currency.
    pub fn new(
        gateway: G,
        mirror: impl CartMirror + 'static,
        max_per_item: u32,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            gateway,
            mirror: Box::new(mirror),
            max_per_item,
            state: Mutex::new(CartState::new(currency)),
            line_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Restore cart state from the durable mirror.
    ///
    /// Structurally validates every persisted line and silently drops
    /// malformed entries. Idempotent; later calls are no-ops.
    pub async fn hydrate(&self) {
        let mut state = self.state.lock().await;
        if state.hydrated {
            return;
        }
        state.hydrated = true;

        if let Some(raw) = self.mirror.read(LINES_KEY) {
            state.lines = decode_lines(&raw);
        }
        if let Some(id) = self.mirror.read(CART_ID_KEY)
            && !id.is_empty()
        {
            state.session.remote_cart_id = Some(RemoteCartId::new(id));
        }
    }

    /// Read-only snapshot for rendering.
    pub async fn snapshot(&self) -> CartSnapshot {
        CartSnapshot::of(&*self.state.lock().await, self.max_per_item)
    }

    /// Fetch the remote cart's checkout URL, if a remote cart exists.
    ///
    /// # Errors
    ///
    /// Returns `CartError::RemoteSync` if the cart read fails.
    pub async fn checkout_url(&self) -> Result<Option<String>, CartError> {
        let cart_id = self.state.lock().await.session.remote_cart_id.clone();
        match cart_id {
            None => Ok(None),
            Some(id) => {
                let cart = self.gateway.fetch_cart(&id).await?;
                Ok(Some(cart.checkout_url))
            }
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add one unit of an item to the cart.
    ///
    /// Quantities always increment by exactly one; bulk changes go through
    /// [`Self::set_quantity`].
    ///
    /// # Errors
    ///
    /// `QuantityLimitExceeded`, `OutOfStock`, or `RemoteSync` when the
    /// gateway write (and its single retry) fails. Local state is unchanged
    /// on every error.
    #[instrument(skip(self, item), fields(variant_id = %item.variant_id))]
    pub async fn add(&self, item: NewCartItem) -> Result<(), CartError> {
        let lock = self.line_lock(&item.variant_id).await;
        let _guard = lock.lock().await;

        self.begin(&item.variant_id).await;
        let result = self.add_locked(&item).await;
        self.finish(&item.variant_id, &result, "add to cart").await;
        result
    }

    /// Remove a variant's line from the cart.
    ///
    /// Local state always converges to "removed", even when the remote call
    /// fails; removing a variant that is not in the cart is a no-op.
    ///
    /// # Errors
    ///
    /// Currently never fails: every remote failure path falls back to
    /// rebuilding the remote cart and still resolves locally.
    #[instrument(skip(self), fields(variant_id = %variant_id))]
    pub async fn remove(&self, variant_id: &VariantId) -> Result<(), CartError> {
        let lock = self.line_lock(variant_id).await;
        let _guard = lock.lock().await;

        self.begin(variant_id).await;
        let result = self.remove_locked(variant_id).await;
        self.finish(variant_id, &result, "remove from cart").await;
        result
    }

    /// Set a line's quantity; zero removes the line.
    ///
    /// # Errors
    ///
    /// `QuantityLimitExceeded`, `OutOfStock` (when increasing), or
    /// `RemoteSync`. Local state is unchanged on error.
    #[instrument(skip(self), fields(variant_id = %variant_id, quantity))]
    pub async fn set_quantity(
        &self,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<(), CartError> {
        let lock = self.line_lock(variant_id).await;
        let _guard = lock.lock().await;

        self.begin(variant_id).await;
        let result = if quantity == 0 {
            self.remove_locked(variant_id).await
        } else {
            self.set_quantity_locked(variant_id, quantity).await
        };
        self.finish(variant_id, &result, "update cart").await;
        result
    }

    /// Empty the cart.
    ///
    /// Local lines are always cleared; the remote removal is best-effort.
    ///
    /// # Errors
    ///
    /// Currently never fails; remote failures are logged and absorbed.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), CartError> {
        let (cart_id, line_ids) = {
            let state = self.state.lock().await;
            (
                state.session.remote_cart_id.clone(),
                state
                    .lines
                    .iter()
                    .filter_map(|l| l.remote_line_id.clone())
                    .collect::<Vec<_>>(),
            )
        };

        if let Some(cart_id) = cart_id
            && !line_ids.is_empty()
            && let Err(e) = self.gateway.remove_lines(&cart_id, line_ids).await
        {
            warn!(error = %e, "remote clear failed, clearing locally anyway");
        }

        let mut state = self.state.lock().await;
        state.lines.clear();
        state.last_error = None;
        self.persist(&state);
        Ok(())
    }

    /// Switch the session currency.
    ///
    /// A brand-new remote cart is created under the new currency and every
    /// local line is replayed onto it in a single bulk add; the old remote
    /// cart is abandoned. A no-op when the currency is unchanged.
    ///
    /// # Errors
    ///
    /// `RemoteSync` when the replacement cart cannot be created; the old
    /// session stays canonical in that case.
    #[instrument(skip(self))]
    pub async fn change_currency(&self, currency: CurrencyCode) -> Result<(), CartError> {
        let (current, replay) = {
            let state = self.state.lock().await;
            (state.session.currency_code, line_inputs(&state.lines))
        };
        if current == currency {
            return Ok(());
        }

        if replay.is_empty() {
            let mut state = self.state.lock().await;
            state.session.remote_cart_id = None;
            state.session.currency_code = currency;
            state.last_error = None;
            self.persist(&state);
            return Ok(());
        }

        let result = self.gateway.create_cart(replay, currency).await;
        let mut state = self.state.lock().await;
        match result {
            Ok(fresh) => {
                state.session.remote_cart_id = Some(fresh.id.clone());
                state.session.currency_code = currency;
                state.resync(&fresh);
                state.last_error = None;
                self.persist(&state);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to recreate cart for currency change");
                state.last_error = Some("Failed to switch currency".to_string());
                Err(CartError::RemoteSync(e))
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn line_lock(&self, variant_id: &VariantId) -> Arc<Mutex<()>> {
        self.line_locks
            .lock()
            .await
            .entry(variant_id.clone())
            .or_default()
            .clone()
    }

    async fn begin(&self, variant_id: &VariantId) {
        self.state.lock().await.loading.insert(variant_id.clone());
    }

    async fn finish(&self, variant_id: &VariantId, result: &Result<(), CartError>, action: &str) {
        let mut state = self.state.lock().await;
        state.loading.remove(variant_id);
        match result {
            Ok(()) => state.last_error = None,
            Err(e) => {
                match e {
                    // Expected, user-facing conditions; not an exception.
                    CartError::OutOfStock { .. } | CartError::QuantityLimitExceeded { .. } => {
                        debug!(error = %e, "cart mutation rejected");
                    }
                    CartError::RemoteSync(cause) => {
                        error!(error = %cause, "cart mutation failed after retry");
                    }
                }
                state.last_error = Some(Self::user_message(e, action));
            }
        }
    }

    fn user_message(err: &CartError, action: &str) -> String {
        match err {
            CartError::OutOfStock { .. } | CartError::QuantityLimitExceeded { .. } => {
                err.to_string()
            }
            CartError::RemoteSync(_) => format!("Failed to {action}"),
        }
    }

    /// Mirror the committed state. Called with the state lock held.
    fn persist(&self, state: &CartState) {
        self.mirror.write(LINES_KEY, &encode_lines(&state.lines));
        match &state.session.remote_cart_id {
            Some(id) => self.mirror.write(CART_ID_KEY, id.as_str()),
            None => self.mirror.remove(CART_ID_KEY),
        }
    }

    /// Stock check: fail-closed on a genuine shortfall, fail-open when the
    /// probe itself errors.
    async fn check_stock(
        &self,
        variant_id: &VariantId,
        title: &str,
        prospective: u32,
    ) -> Result<(), CartError> {
        match self.gateway.variant_availability(variant_id).await {
            Ok(Some(available)) if i64::from(prospective) > available => {
                Err(CartError::OutOfStock {
                    title: title.to_string(),
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(error = %e, "availability probe failed, proceeding");
                Ok(())
            }
        }
    }

    async fn add_locked(&self, item: &NewCartItem) -> Result<(), CartError> {
        let (currency, current_qty, cart_id) = {
            let state = self.state.lock().await;
            (
                state.session.currency_code,
                state.line(&item.variant_id).map_or(0, |l| l.quantity),
                state.session.remote_cart_id.clone(),
            )
        };

        let prospective = current_qty + 1;
        if prospective > self.max_per_item {
            return Err(CartError::QuantityLimitExceeded {
                max: self.max_per_item,
                title: item.title.clone(),
            });
        }
        self.check_stock(&item.variant_id, &item.title, prospective)
            .await?;

        // Ensure a remote cart session exists.
        let cart_id = match cart_id {
            Some(id) => id,
            None => {
                let cart = self.gateway.create_cart(Vec::new(), currency).await?;
                let id = cart.id.clone();
                self.state.lock().await.session.remote_cart_id = Some(id.clone());
                id
            }
        };

        let input = vec![CartLineInput {
            variant_id: item.variant_id.clone(),
            quantity: 1,
        }];

        let remote = match self.gateway.add_lines(&cart_id, input.clone()).await {
            Ok(cart) => cart,
            Err(e) => {
                // Retry exactly once against a brand-new cart seeded with the
                // current local lines.
                warn!(error = %e, "cart add failed, retrying against a new cart");
                let replay = {
                    let state = self.state.lock().await;
                    line_inputs(&state.lines)
                };
                let fresh = self.gateway.create_cart(replay, currency).await?;
                let fresh_id = fresh.id.clone();
                let cart = self.gateway.add_lines(&fresh_id, input).await?;
                self.state.lock().await.session.remote_cart_id = Some(fresh_id);
                cart
            }
        };

        let mut state = self.state.lock().await;
        state.resync(&remote);
        if state.line(&item.variant_id).is_none() {
            let (remote_line_id, unit_price, quantity) = remote
                .line_for_variant(&item.variant_id)
                .map_or((None, item.unit_price, prospective), |r| {
                    (Some(r.id.clone()), r.unit_price, r.quantity)
                });
            state.lines.push(CartLine {
                product_id: item.product_id.clone(),
                remote_line_id,
                variant_id: item.variant_id.clone(),
                title: item.title.clone(),
                unit_price,
                image_url: item.image_url.clone(),
                quantity,
            });
        }
        self.persist(&state);
        Ok(())
    }

    async fn remove_locked(&self, variant_id: &VariantId) -> Result<(), CartError> {
        let (line, cart_id) = {
            let state = self.state.lock().await;
            (
                state.line(variant_id).cloned(),
                state.session.remote_cart_id.clone(),
            )
        };

        // Not in the cart: nothing to do.
        let Some(line) = line else {
            return Ok(());
        };

        // Nothing to reconcile remotely.
        let (Some(remote_line_id), Some(cart_id)) = (line.remote_line_id.clone(), cart_id) else {
            let mut state = self.state.lock().await;
            state.remove_line(variant_id);
            self.persist(&state);
            return Ok(());
        };

        // Read before write: the remote cart may have dropped the line.
        match self.gateway.fetch_cart(&cart_id).await {
            Ok(remote) if !remote.contains_line(&remote_line_id) => {
                let mut state = self.state.lock().await;
                state.remove_line(variant_id);
                self.persist(&state);
                Ok(())
            }
            Ok(_) => match self.gateway.remove_lines(&cart_id, vec![remote_line_id]).await {
                Ok(remote) => {
                    let mut state = self.state.lock().await;
                    state.remove_line(variant_id);
                    state.resync(&remote);
                    self.persist(&state);
                    Ok(())
                }
                Err(e) => self.rebuild_without(variant_id, &e).await,
            },
            Err(e) => self.rebuild_without(variant_id, &e).await,
        }
    }

    /// Removal fallback: replace the remote cart with one rebuilt from the
    /// surviving local lines. Local consistency wins over remote consistency,
    /// so the line is dropped locally no matter what.
    async fn rebuild_without(
        &self,
        variant_id: &VariantId,
        cause: &ShopifyError,
    ) -> Result<(), CartError> {
        warn!(error = %cause, "cart remove failed, rebuilding remote cart");

        let (replay, currency) = {
            let state = self.state.lock().await;
            let survivors: Vec<&CartLine> = state
                .lines
                .iter()
                .filter(|l| &l.variant_id != variant_id)
                .collect();
            (
                survivors
                    .iter()
                    .map(|l| CartLineInput {
                        variant_id: l.variant_id.clone(),
                        quantity: l.quantity,
                    })
                    .collect::<Vec<_>>(),
                state.session.currency_code,
            )
        };

        let fresh = self.gateway.create_cart(replay, currency).await;

        let mut state = self.state.lock().await;
        state.remove_line(variant_id);
        match fresh {
            Ok(cart) => {
                state.session.remote_cart_id = Some(cart.id.clone());
                state.resync(&cart);
            }
            Err(e) => {
                warn!(error = %e, "replacement cart creation failed, detaching session");
                state.session.remote_cart_id = None;
                for line in &mut state.lines {
                    line.remote_line_id = None;
                }
            }
        }
        self.persist(&state);
        Ok(())
    }

    async fn set_quantity_locked(
        &self,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<(), CartError> {
        let (line, cart_id) = {
            let state = self.state.lock().await;
            (
                state.line(variant_id).cloned(),
                state.session.remote_cart_id.clone(),
            )
        };

        // Nothing to update.
        let Some(line) = line else {
            return Ok(());
        };

        if quantity > self.max_per_item {
            return Err(CartError::QuantityLimitExceeded {
                max: self.max_per_item,
                title: line.title.clone(),
            });
        }
        if quantity > line.quantity {
            self.check_stock(variant_id, &line.title, quantity).await?;
        }

        let (Some(remote_line_id), Some(cart_id)) = (line.remote_line_id.clone(), cart_id) else {
            return self.readd_at_quantity(variant_id, quantity).await;
        };

        // Read before write, like removal.
        let remote = self.gateway.fetch_cart(&cart_id).await?;
        if !remote.contains_line(&remote_line_id) {
            // The remote line vanished server-side: re-add on a fresh cart
            // instead of updating.
            return self.readd_at_quantity(variant_id, quantity).await;
        }

        let remote = self
            .gateway
            .update_line_quantity(&cart_id, &remote_line_id, quantity)
            .await?;

        let mut state = self.state.lock().await;
        state.resync(&remote);
        self.persist(&state);
        Ok(())
    }

    /// Update fallback: create a fresh remote cart carrying every local line,
    /// with the target variant at the requested quantity.
    async fn readd_at_quantity(
        &self,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<(), CartError> {
        let (inputs, currency) = {
            let state = self.state.lock().await;
            (
                state
                    .lines
                    .iter()
                    .map(|l| CartLineInput {
                        variant_id: l.variant_id.clone(),
                        quantity: if &l.variant_id == variant_id {
                            quantity
                        } else {
                            l.quantity
                        },
                    })
                    .collect::<Vec<_>>(),
                state.session.currency_code,
            )
        };

        let fresh = self.gateway.create_cart(inputs, currency).await?;

        let mut state = self.state.lock().await;
        state.session.remote_cart_id = Some(fresh.id.clone());
        state.resync(&fresh);
        self.persist(&state);
        Ok(())
    }
}

/// Replay inputs for a set of local lines.
fn line_inputs(lines: &[CartLine]) -> Vec<CartLineInput> {
    lines
        .iter()
        .map(|l| CartLineInput {
            variant_id: l.variant_id.clone(),
            quantity: l.quantity,
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cart::mirror::MemoryMirror;
    use crate::shopify::GraphQLError;
    use crate::shopify::types::RemoteCartLine;
    use rust_decimal::Decimal;
    use std::sync::Mutex as StdMutex;
    use stonemill_core::{Money, ProductId, RemoteLineId};

    // =========================================================================
    // Scripted gateway
    // =========================================================================

    #[derive(Default)]
    struct MockState {
        carts: HashMap<String, RemoteCart>,
        availability: HashMap<VariantId, i64>,
        next_cart: u32,
        next_line: u32,
        fail_adds: u32,
        fail_creates: u32,
        fail_removes: u32,
        fail_fetches: u32,
        availability_errors: u32,
        create_calls: u32,
    }

    #[derive(Default)]
    struct MockGateway {
        state: StdMutex<MockState>,
    }

    fn gateway_error() -> ShopifyError {
        ShopifyError::GraphQL(vec![GraphQLError::message("mock failure")])
    }

    impl MockGateway {
        fn with_stock(entries: &[(&str, i64)]) -> Self {
            let gateway = Self::default();
            {
                let mut state = gateway.state.lock().unwrap();
                for (variant, qty) in entries {
                    state.availability.insert(VariantId::new(*variant), *qty);
                }
            }
            gateway
        }

        fn cart(&self, id: &RemoteCartId) -> Option<RemoteCart> {
            self.state.lock().unwrap().carts.get(id.as_str()).cloned()
        }

        fn script(&self, f: impl FnOnce(&mut MockState)) {
            f(&mut self.state.lock().unwrap());
        }

        fn create_calls(&self) -> u32 {
            self.state.lock().unwrap().create_calls
        }
    }

    fn mock_line(state: &mut MockState, variant: &VariantId, quantity: u32) -> RemoteCartLine {
        state.next_line += 1;
        RemoteCartLine {
            id: RemoteLineId::new(format!("line-{}", state.next_line)),
            quantity,
            variant_id: variant.clone(),
            product_id: ProductId::new("gid://shopify/Product/p1"),
            product_title: "Mock Product".to_string(),
            variant_title: "Default".to_string(),
            unit_price: Money::new(Decimal::new(1000, 2), CurrencyCode::NZD),
            image_url: None,
        }
    }

    fn recompute(cart: &mut RemoteCart) {
        cart.total_quantity = cart.lines.iter().map(|l| l.quantity).sum();
    }

    impl CartGateway for MockGateway {
        async fn create_cart(
            &self,
            lines: Vec<CartLineInput>,
            currency: CurrencyCode,
        ) -> Result<RemoteCart, ShopifyError> {
            let mut state = self.state.lock().unwrap();
            state.create_calls += 1;
            if state.fail_creates > 0 {
                state.fail_creates -= 1;
                return Err(gateway_error());
            }
            state.next_cart += 1;
            let id = format!("cart-{}", state.next_cart);
            let mut cart = RemoteCart {
                id: RemoteCartId::new(&*id),
                checkout_url: format!("https://checkout.example/{id}"),
                currency_code: currency,
                total_quantity: 0,
                subtotal: Money::zero(currency),
                lines: Vec::new(),
            };
            for input in lines {
                let line = mock_line(&mut state, &input.variant_id, input.quantity);
                cart.lines.push(line);
            }
            recompute(&mut cart);
            state.carts.insert(id, cart.clone());
            Ok(cart)
        }

        async fn fetch_cart(&self, cart_id: &RemoteCartId) -> Result<RemoteCart, ShopifyError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_fetches > 0 {
                state.fail_fetches -= 1;
                return Err(gateway_error());
            }
            state
                .carts
                .get(cart_id.as_str())
                .cloned()
                .ok_or_else(|| ShopifyError::NotFound(cart_id.to_string()))
        }

        async fn add_lines(
            &self,
            cart_id: &RemoteCartId,
            lines: Vec<CartLineInput>,
        ) -> Result<RemoteCart, ShopifyError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_adds > 0 {
                state.fail_adds -= 1;
                return Err(gateway_error());
            }
            let mut cart = state
                .carts
                .get(cart_id.as_str())
                .cloned()
                .ok_or_else(|| ShopifyError::NotFound(cart_id.to_string()))?;
            for input in lines {
                if let Some(existing) = cart
                    .lines
                    .iter_mut()
                    .find(|l| l.variant_id == input.variant_id)
                {
                    existing.quantity += input.quantity;
                } else {
                    let line = mock_line(&mut state, &input.variant_id, input.quantity);
                    cart.lines.push(line);
                }
            }
            recompute(&mut cart);
            state.carts.insert(cart_id.as_str().to_string(), cart.clone());
            Ok(cart)
        }

        async fn update_line_quantity(
            &self,
            cart_id: &RemoteCartId,
            line_id: &RemoteLineId,
            quantity: u32,
        ) -> Result<RemoteCart, ShopifyError> {
            let mut state = self.state.lock().unwrap();
            let mut cart = state
                .carts
                .get(cart_id.as_str())
                .cloned()
                .ok_or_else(|| ShopifyError::NotFound(cart_id.to_string()))?;
            for line in &mut cart.lines {
                if &line.id == line_id {
                    line.quantity = quantity;
                }
            }
            recompute(&mut cart);
            state.carts.insert(cart_id.as_str().to_string(), cart.clone());
            Ok(cart)
        }

        async fn remove_lines(
            &self,
            cart_id: &RemoteCartId,
            line_ids: Vec<RemoteLineId>,
        ) -> Result<RemoteCart, ShopifyError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_removes > 0 {
                state.fail_removes -= 1;
                return Err(gateway_error());
            }
            let mut cart = state
                .carts
                .get(cart_id.as_str())
                .cloned()
                .ok_or_else(|| ShopifyError::NotFound(cart_id.to_string()))?;
            cart.lines.retain(|l| !line_ids.contains(&l.id));
            recompute(&mut cart);
            state.carts.insert(cart_id.as_str().to_string(), cart.clone());
            Ok(cart)
        }

        async fn variant_availability(
            &self,
            variant_id: &VariantId,
        ) -> Result<Option<i64>, ShopifyError> {
            let mut state = self.state.lock().unwrap();
            if state.availability_errors > 0 {
                state.availability_errors -= 1;
                return Err(gateway_error());
            }
            Ok(state.availability.get(variant_id).copied())
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn item(variant: &str) -> NewCartItem {
        NewCartItem {
            product_id: ProductId::new("gid://shopify/Product/p1"),
            variant_id: VariantId::new(variant),
            title: "Ceremonial Matcha 30g".to_string(),
            unit_price: Money::new(Decimal::new(3800, 2), CurrencyCode::NZD),
            image_url: None,
        }
    }

    fn service_with(
        gateway: MockGateway,
        max_per_item: u32,
    ) -> (CartService<MockGateway>, Arc<MemoryMirror>) {
        let mirror = Arc::new(MemoryMirror::new());
        let service = CartService::new(
            gateway,
            Arc::clone(&mirror),
            max_per_item,
            CurrencyCode::NZD,
        );
        (service, mirror)
    }

    // =========================================================================
    // Bounds, retries, and convergence
    // =========================================================================

    #[tokio::test]
    async fn add_twice_accumulates_a_single_line() {
        let gateway = MockGateway::with_stock(&[("v1", 10)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.add(item("v1")).await.unwrap();

        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines.first().unwrap().quantity, 2);
        assert_eq!(snapshot.count, 2);
        assert!(snapshot.last_error.is_none());
    }

    #[tokio::test]
    async fn add_never_exceeds_per_item_maximum() {
        let gateway = MockGateway::with_stock(&[("v1", 100)]);
        let (service, _) = service_with(gateway, 2);

        service.add(item("v1")).await.unwrap();
        service.add(item("v1")).await.unwrap();
        let err = service.add(item("v1")).await.unwrap_err();

        assert!(matches!(
            err,
            CartError::QuantityLimitExceeded { max: 2, .. }
        ));
        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.lines.first().unwrap().quantity, 2);
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("Only 2 per order of Ceremonial Matcha 30g")
        );
    }

    #[tokio::test]
    async fn add_fails_closed_on_stock_shortfall() {
        let gateway = MockGateway::with_stock(&[("v1", 1)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        let err = service.add(item("v1")).await.unwrap_err();

        assert!(matches!(err, CartError::OutOfStock { .. }));
        let snapshot = service.snapshot().await;
        // Neither local nor remote state changed.
        assert_eq!(snapshot.lines.first().unwrap().quantity, 1);
        let cart_id = RemoteCartId::new("cart-1");
        let remote = service.gateway.cart(&cart_id).unwrap();
        assert_eq!(remote.total_quantity, 1);
    }

    #[tokio::test]
    async fn add_fails_open_when_availability_probe_errors() {
        let gateway = MockGateway::default();
        gateway.script(|s| s.availability_errors = 1);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        assert_eq!(service.snapshot().await.count, 1);
    }

    #[tokio::test]
    async fn untracked_inventory_does_not_block_adds() {
        // No availability entry at all -> quantityAvailable is None.
        let gateway = MockGateway::default();
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        assert_eq!(service.snapshot().await.count, 1);
    }

    #[tokio::test]
    async fn add_retries_exactly_once_against_a_new_cart() {
        let gateway = MockGateway::with_stock(&[("v1", 10), ("v2", 10)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.gateway.script(|s| s.fail_adds = 1);
        service.add(item("v2")).await.unwrap();

        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.lines.len(), 2);
        // The replacement cart carries the replayed v1 line plus v2.
        let fresh = service.gateway.cart(&RemoteCartId::new("cart-2")).unwrap();
        assert_eq!(fresh.total_quantity, 2);
        assert!(fresh.line_for_variant(&VariantId::new("v1")).is_some());
        // Local lines now point at the fresh cart's line ids.
        for line in &snapshot.lines {
            assert!(fresh.contains_line(line.remote_line_id.as_ref().unwrap()));
        }
    }

    #[tokio::test]
    async fn add_retry_failure_leaves_local_state_unchanged() {
        let gateway = MockGateway::with_stock(&[("v1", 10)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.gateway.script(|s| s.fail_adds = 2);
        let err = service.add(item("v1")).await.unwrap_err();

        assert!(matches!(err, CartError::RemoteSync(_)));
        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.lines.first().unwrap().quantity, 1);
        assert_eq!(snapshot.last_error.as_deref(), Some("Failed to add to cart"));
    }

    #[tokio::test]
    async fn remove_of_absent_variant_is_a_noop() {
        let gateway = MockGateway::default();
        let (service, _) = service_with(gateway, 10);

        service.remove(&VariantId::new("missing")).await.unwrap();
        assert!(service.snapshot().await.is_empty());
        // No remote cart was ever created.
        assert_eq!(service.gateway.create_calls(), 0);
    }

    #[tokio::test]
    async fn remove_converges_locally_even_when_remote_fails() {
        let gateway = MockGateway::with_stock(&[("v1", 10), ("v2", 10)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.add(item("v2")).await.unwrap();
        service.gateway.script(|s| s.fail_removes = 1);

        service.remove(&VariantId::new("v1")).await.unwrap();

        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(
            snapshot.lines.first().unwrap().variant_id,
            VariantId::new("v2")
        );
        // The survivor was replayed onto a replacement cart.
        let fresh = service.gateway.cart(&RemoteCartId::new("cart-2")).unwrap();
        assert!(fresh.line_for_variant(&VariantId::new("v2")).is_some());
        assert!(fresh.line_for_variant(&VariantId::new("v1")).is_none());
    }

    #[tokio::test]
    async fn remove_converges_locally_even_when_rebuild_also_fails() {
        let gateway = MockGateway::with_stock(&[("v1", 10)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.gateway.script(|s| {
            s.fail_removes = 1;
            s.fail_creates = 1;
        });

        service.remove(&VariantId::new("v1")).await.unwrap();

        let snapshot = service.snapshot().await;
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn remove_drops_locally_when_remote_line_already_gone() {
        let gateway = MockGateway::with_stock(&[("v1", 10)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        // Drop the line server-side behind the synchronizer's back.
        service.gateway.script(|s| {
            if let Some(cart) = s.carts.get_mut("cart-1") {
                cart.lines.clear();
                cart.total_quantity = 0;
            }
        });

        service.remove(&VariantId::new("v1")).await.unwrap();
        assert!(service.snapshot().await.is_empty());
        // Read-before-write found it gone: no rebuild happened.
        assert_eq!(service.gateway.create_calls(), 1);
    }

    #[tokio::test]
    async fn set_quantity_zero_removes_regardless_of_remote_outcome() {
        let gateway = MockGateway::with_stock(&[("v1", 10)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.gateway.script(|s| {
            s.fail_removes = 1;
            s.fail_creates = 1;
        });

        service.set_quantity(&VariantId::new("v1"), 0).await.unwrap();
        assert!(service.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn set_quantity_updates_remote_then_local() {
        let gateway = MockGateway::with_stock(&[("v1", 10)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.set_quantity(&VariantId::new("v1"), 5).await.unwrap();

        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.lines.first().unwrap().quantity, 5);
        let remote = service.gateway.cart(&RemoteCartId::new("cart-1")).unwrap();
        assert_eq!(remote.total_quantity, 5);
    }

    #[tokio::test]
    async fn set_quantity_rejects_increase_beyond_stock() {
        let gateway = MockGateway::with_stock(&[("v1", 3)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        let err = service
            .set_quantity(&VariantId::new("v1"), 5)
            .await
            .unwrap_err();

        assert!(matches!(err, CartError::OutOfStock { .. }));
        assert_eq!(service.snapshot().await.lines.first().unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn set_quantity_allows_decrease_below_stock_level() {
        let gateway = MockGateway::with_stock(&[("v1", 3)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.set_quantity(&VariantId::new("v1"), 3).await.unwrap();
        // Stock drops to zero server-side; decreasing must still work.
        service.gateway.script(|s| {
            s.availability.insert(VariantId::new("v1"), 0);
        });
        service.set_quantity(&VariantId::new("v1"), 2).await.unwrap();
        assert_eq!(service.snapshot().await.lines.first().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn set_quantity_readds_when_remote_line_vanished() {
        let gateway = MockGateway::with_stock(&[("v1", 10)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.gateway.script(|s| {
            if let Some(cart) = s.carts.get_mut("cart-1") {
                cart.lines.clear();
                cart.total_quantity = 0;
            }
        });

        service.set_quantity(&VariantId::new("v1"), 4).await.unwrap();

        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.lines.first().unwrap().quantity, 4);
        let fresh = service.gateway.cart(&RemoteCartId::new("cart-2")).unwrap();
        assert_eq!(
            fresh.line_for_variant(&VariantId::new("v1")).unwrap().quantity,
            4
        );
    }

    #[tokio::test]
    async fn currency_change_replays_lines_onto_a_new_cart() {
        let gateway = MockGateway::with_stock(&[("v1", 10)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.set_quantity(&VariantId::new("v1"), 3).await.unwrap();

        service.change_currency(CurrencyCode::AUD).await.unwrap();

        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.currency_code, CurrencyCode::AUD);
        assert_eq!(snapshot.lines.first().unwrap().quantity, 3);

        let fresh = service.gateway.cart(&RemoteCartId::new("cart-2")).unwrap();
        assert_eq!(fresh.currency_code, CurrencyCode::AUD);
        assert_eq!(fresh.total_quantity, 3);
        // The old cart is abandoned, not destroyed.
        assert!(service.gateway.cart(&RemoteCartId::new("cart-1")).is_some());
    }

    #[tokio::test]
    async fn currency_change_on_empty_cart_detaches_the_session() {
        let gateway = MockGateway::with_stock(&[("v1", 10)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.remove(&VariantId::new("v1")).await.unwrap();
        service.change_currency(CurrencyCode::AUD).await.unwrap();

        // No new remote cart is created until the next mutation.
        assert_eq!(service.gateway.create_calls(), 1);
        service.add(item("v1")).await.unwrap();
        let fresh = service.gateway.cart(&RemoteCartId::new("cart-2")).unwrap();
        assert_eq!(fresh.currency_code, CurrencyCode::AUD);
    }

    #[tokio::test]
    async fn currency_change_to_same_currency_is_a_noop() {
        let gateway = MockGateway::with_stock(&[("v1", 10)]);
        let (service, _) = service_with(gateway, 10);
        service.add(item("v1")).await.unwrap();

        service.change_currency(CurrencyCode::NZD).await.unwrap();
        assert_eq!(service.gateway.create_calls(), 1);
    }

    #[tokio::test]
    async fn clear_empties_local_state() {
        let gateway = MockGateway::with_stock(&[("v1", 10), ("v2", 10)]);
        let (service, _) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.add(item("v2")).await.unwrap();
        service.clear().await.unwrap();

        assert!(service.snapshot().await.is_empty());
        let remote = service.gateway.cart(&RemoteCartId::new("cart-1")).unwrap();
        assert_eq!(remote.total_quantity, 0);
    }

    // =========================================================================
    // Mirror round-trip and hydration
    // =========================================================================

    #[tokio::test]
    async fn mirror_reproduces_in_memory_lines_after_every_mutation() {
        let gateway = MockGateway::with_stock(&[("v1", 10), ("v2", 10)]);
        let (service, mirror) = service_with(gateway, 10);

        service.add(item("v1")).await.unwrap();
        service.add(item("v2")).await.unwrap();
        service.set_quantity(&VariantId::new("v1"), 4).await.unwrap();
        service.remove(&VariantId::new("v2")).await.unwrap();

        let snapshot = service.snapshot().await;
        let persisted = decode_lines(&mirror.read(LINES_KEY).unwrap());
        assert_eq!(persisted, snapshot.lines);

        let persisted_id = mirror.read(CART_ID_KEY).unwrap();
        assert_eq!(persisted_id, "cart-1");
    }

    #[tokio::test]
    async fn hydrate_restores_well_formed_lines_and_drops_the_rest() {
        let mirror = Arc::new(MemoryMirror::new());
        let good = CartLine {
            product_id: ProductId::new("gid://shopify/Product/p1"),
            remote_line_id: Some(RemoteLineId::new("l1")),
            variant_id: VariantId::new("v1"),
            title: "Ceremonial Matcha 30g".to_string(),
            unit_price: Money::new(Decimal::new(3800, 2), CurrencyCode::NZD),
            image_url: None,
            quantity: 2,
        };
        let mut bad = serde_json::to_value(&good).unwrap();
        bad["variant_id"] = serde_json::Value::from("v2");
        bad["quantity"] = serde_json::Value::from("two");
        let doc = serde_json::to_string(&vec![serde_json::to_value(&good).unwrap(), bad]).unwrap();
        mirror.write(LINES_KEY, &doc);
        mirror.write(CART_ID_KEY, "cart-7");

        let service = CartService::new(
            MockGateway::default(),
            Arc::clone(&mirror),
            10,
            CurrencyCode::NZD,
        );
        service.hydrate().await;
        // Safe to call twice.
        service.hydrate().await;

        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.lines, vec![good]);
        assert_eq!(snapshot.count, 2);
    }
}
