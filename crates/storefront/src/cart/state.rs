//! In-memory cart entities.
//!
//! [`CartState`] is the canonical in-process representation; it is owned
//! exclusively by the [`crate::cart::service::CartService`] that wraps it.
//! Handlers read through [`CartSnapshot`], never the live state.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stonemill_core::{CurrencyCode, Money, ProductId, RemoteCartId, RemoteLineId, VariantId};

use crate::shopify::types::RemoteCart;

/// One product-variant-quantity entry in the local cart.
///
/// At most one line exists per `variant_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Parent product id.
    pub product_id: ProductId,
    /// Remote cart line id; `None` until the first successful sync.
    pub remote_line_id: Option<RemoteLineId>,
    /// Product variant backing this line.
    pub variant_id: VariantId,
    /// Display title shown in the cart.
    pub title: String,
    /// Price per unit in the session currency.
    pub unit_price: Money,
    /// Thumbnail URL.
    pub image_url: Option<String>,
    /// Quantity, always >= 1.
    pub quantity: u32,
}

/// The remote cart identity plus its currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSession {
    /// Remote cart id; `None` before the first remote creation.
    pub remote_cart_id: Option<RemoteCartId>,
    /// Presentment currency of the session.
    pub currency_code: CurrencyCode,
}

impl CartSession {
    /// A session with no remote cart yet.
    #[must_use]
    pub const fn detached(currency_code: CurrencyCode) -> Self {
        Self {
            remote_cart_id: None,
            currency_code,
        }
    }
}

/// Item data needed to create a new cart line.
#[derive(Debug, Clone)]
pub struct NewCartItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub title: String,
    pub unit_price: Money,
    pub image_url: Option<String>,
}

/// Canonical in-process cart state.
#[derive(Debug)]
pub(crate) struct CartState {
    pub session: CartSession,
    pub lines: Vec<CartLine>,
    pub last_error: Option<String>,
    pub loading: HashSet<VariantId>,
    pub hydrated: bool,
}

impl CartState {
    pub fn new(currency_code: CurrencyCode) -> Self {
        Self {
            session: CartSession::detached(currency_code),
            lines: Vec::new(),
            last_error: None,
            loading: HashSet::new(),
            hydrated: false,
        }
    }

    pub fn line(&self, variant_id: &VariantId) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.variant_id == variant_id)
    }

    pub fn remove_line(&mut self, variant_id: &VariantId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| &l.variant_id != variant_id);
        self.lines.len() != before
    }

    /// Total quantity across all lines.
    pub fn count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Subtotal in the session currency.
    pub fn subtotal(&self) -> Money {
        let amount: Decimal = self
            .lines
            .iter()
            .map(|l| l.unit_price.times(l.quantity).amount)
            .sum();
        Money::new(amount, self.session.currency_code)
    }

    /// Reconcile local lines against an authoritative remote cart.
    ///
    /// The remote state wins: lines the remote no longer holds are dropped,
    /// and surviving lines take the remote's line id, quantity, and unit
    /// price. Remote-only lines are not adopted; local entries carry the
    /// display data the remote cannot supply.
    pub fn resync(&mut self, remote: &RemoteCart) {
        self.lines.retain_mut(|line| {
            remote.line_for_variant(&line.variant_id).is_some_and(|r| {
                line.remote_line_id = Some(r.id.clone());
                line.quantity = r.quantity;
                line.unit_price = r.unit_price;
                true
            })
        });
    }
}

/// Read-only view of the cart for rendering.
#[derive(Debug, Clone)]
pub struct CartSnapshot {
    pub lines: Vec<CartLine>,
    pub count: u32,
    pub subtotal: Money,
    pub currency_code: CurrencyCode,
    pub last_error: Option<String>,
    pub max_per_item: u32,
    loading: HashSet<VariantId>,
}

impl CartSnapshot {
    pub(crate) fn of(state: &CartState, max_per_item: u32) -> Self {
        Self {
            lines: state.lines.clone(),
            count: state.count(),
            subtotal: state.subtotal(),
            currency_code: state.session.currency_code,
            last_error: state.last_error.clone(),
            max_per_item,
            loading: state.loading.clone(),
        }
    }

    /// Whether a mutation for this variant is currently in flight.
    #[must_use]
    pub fn is_line_loading(&self, variant_id: &VariantId) -> bool {
        self.loading.contains(variant_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
