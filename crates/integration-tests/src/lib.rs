//! Integration test harness for the Stonemill storefront.
//!
//! Provides [`ScriptedGateway`], an in-memory stand-in for the Storefront
//! API that the cart synchronizer talks to. Tests script failures into it
//! (`fail_adds`, `fail_removes`, ...) and inspect the remote carts it holds
//! to assert what actually reached the "server".

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;

use stonemill_core::{
    CurrencyCode, Money, ProductId, RemoteCartId, RemoteLineId, VariantId,
};
use stonemill_storefront::cart::{CartGateway, NewCartItem};
use stonemill_storefront::shopify::types::{CartLineInput, RemoteCart, RemoteCartLine};
use stonemill_storefront::shopify::{GraphQLError, ShopifyError};

/// Mutable state behind a [`ScriptedGateway`].
#[derive(Default)]
pub struct GatewayState {
    /// Remote carts by id.
    pub carts: HashMap<String, RemoteCart>,
    /// `quantityAvailable` per variant; absent = inventory untracked.
    pub availability: HashMap<VariantId, i64>,
    /// Remaining scripted failures per operation.
    pub fail_creates: u32,
    pub fail_fetches: u32,
    pub fail_adds: u32,
    pub fail_updates: u32,
    pub fail_removes: u32,
    pub availability_errors: u32,
    /// Call counters.
    pub create_calls: u32,
    pub add_calls: u32,
    next_cart: u32,
    next_line: u32,
}

impl GatewayState {
    fn next_line(&mut self, variant: &VariantId, quantity: u32, currency: CurrencyCode) -> RemoteCartLine {
        self.next_line += 1;
        RemoteCartLine {
            id: RemoteLineId::new(format!("gid://shopify/CartLine/{}", self.next_line)),
            quantity,
            variant_id: variant.clone(),
            product_id: ProductId::new("gid://shopify/Product/p1"),
            product_title: "Scripted Product".to_string(),
            variant_title: "Default".to_string(),
            unit_price: Money::new(Decimal::new(1000, 2), currency),
            image_url: None,
        }
    }
}

fn recompute(cart: &mut RemoteCart) {
    cart.total_quantity = cart.lines.iter().map(|l| l.quantity).sum();
    let amount: Decimal = cart
        .lines
        .iter()
        .map(|l| l.unit_price.times(l.quantity).amount)
        .sum();
    cart.subtotal = Money::new(amount, cart.currency_code);
}

fn gateway_error() -> ShopifyError {
    ShopifyError::GraphQL(vec![GraphQLError::message("scripted failure")])
}

/// Scripted in-memory cart gateway.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl ScriptedGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway with stock levels preconfigured.
    #[must_use]
    pub fn with_stock(entries: &[(&str, i64)]) -> Self {
        let gateway = Self::new();
        gateway.script(|state| {
            for (variant, quantity) in entries {
                state
                    .availability
                    .insert(VariantId::new(*variant), *quantity);
            }
        });
        gateway
    }

    /// Mutate the scripted state (stock levels, failure counters, carts).
    pub fn script(&self, f: impl FnOnce(&mut GatewayState)) {
        f(&mut self.state.lock().expect("gateway state poisoned"));
    }

    /// Read a remote cart by id.
    #[must_use]
    pub fn cart(&self, id: &str) -> Option<RemoteCart> {
        let state = self.state.lock().expect("gateway state poisoned");
        state.carts.get(id).cloned()
    }

    /// How many carts were created so far.
    #[must_use]
    pub fn create_calls(&self) -> u32 {
        self.state.lock().expect("gateway state poisoned").create_calls
    }
}

impl CartGateway for ScriptedGateway {
    async fn create_cart(
        &self,
        lines: Vec<CartLineInput>,
        currency: CurrencyCode,
    ) -> Result<RemoteCart, ShopifyError> {
        let mut state = self.state.lock().expect("gateway state poisoned");
        state.create_calls += 1;
        if state.fail_creates > 0 {
            state.fail_creates -= 1;
            return Err(gateway_error());
        }
        state.next_cart += 1;
        let id = format!("gid://shopify/Cart/{}", state.next_cart);
        let mut cart = RemoteCart {
            id: RemoteCartId::new(&*id),
            checkout_url: format!("https://stonemill.myshopify.com/checkout/{}", state.next_cart),
            currency_code: currency,
            total_quantity: 0,
            subtotal: Money::zero(currency),
            lines: Vec::new(),
        };
        for input in lines {
            let line = state.next_line(&input.variant_id, input.quantity, currency);
            cart.lines.push(line);
        }
        recompute(&mut cart);
        state.carts.insert(id, cart.clone());
        Ok(cart)
    }

    async fn fetch_cart(&self, cart_id: &RemoteCartId) -> Result<RemoteCart, ShopifyError> {
        let mut state = self.state.lock().expect("gateway state poisoned");
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
        let mut state = self.state.lock().expect("gateway state poisoned");
        state.add_calls += 1;
        if state.fail_adds > 0 {
            state.fail_adds -= 1;
            return Err(gateway_error());
        }
        let mut cart = state
            .carts
            .get(cart_id.as_str())
            .cloned()
            .ok_or_else(|| ShopifyError::NotFound(cart_id.to_string()))?;
        let currency = cart.currency_code;
        for input in lines {
            if let Some(existing) = cart
                .lines
                .iter_mut()
                .find(|l| l.variant_id == input.variant_id)
            {
                existing.quantity += input.quantity;
            } else {
                let line = state.next_line(&input.variant_id, input.quantity, currency);
                cart.lines.push(line);
            }
        }
        recompute(&mut cart);
        state
            .carts
            .insert(cart_id.as_str().to_string(), cart.clone());
        Ok(cart)
    }

    async fn update_line_quantity(
        &self,
        cart_id: &RemoteCartId,
        line_id: &RemoteLineId,
        quantity: u32,
    ) -> Result<RemoteCart, ShopifyError> {
        let mut state = self.state.lock().expect("gateway state poisoned");
        if state.fail_updates > 0 {
            state.fail_updates -= 1;
            return Err(gateway_error());
        }
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
        state
            .carts
            .insert(cart_id.as_str().to_string(), cart.clone());
        Ok(cart)
    }

    async fn remove_lines(
        &self,
        cart_id: &RemoteCartId,
        line_ids: Vec<RemoteLineId>,
    ) -> Result<RemoteCart, ShopifyError> {
        let mut state = self.state.lock().expect("gateway state poisoned");
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
        state
            .carts
            .insert(cart_id.as_str().to_string(), cart.clone());
        Ok(cart)
    }

    async fn variant_availability(
        &self,
        variant_id: &VariantId,
    ) -> Result<Option<i64>, ShopifyError> {
        let mut state = self.state.lock().expect("gateway state poisoned");
        if state.availability_errors > 0 {
            state.availability_errors -= 1;
            return Err(gateway_error());
        }
        Ok(state.availability.get(variant_id).copied())
    }
}

/// A catalog item for tests.
#[must_use]
pub fn test_item(variant: &str, title: &str, cents: i64) -> NewCartItem {
    NewCartItem {
        product_id: ProductId::new("gid://shopify/Product/p1"),
        variant_id: VariantId::new(variant),
        title: title.to_string(),
        unit_price: Money::new(Decimal::new(cents, 2), CurrencyCode::NZD),
        image_url: None,
    }
}
