//! Domain types for the Storefront API.
//!
//! These types provide a clean, ergonomic API separate from the raw wire
//! shapes in [`super::storefront::response`].

use serde::{Deserialize, Serialize};

use stonemill_core::{
    CollectionId, CurrencyCode, Money, ProductId, RemoteCartId, RemoteLineId, VariantId,
};

// =============================================================================
// Image Types
// =============================================================================

/// Product or collection image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Image URL.
    pub url: String,
    /// Alt text for accessibility.
    pub alt_text: Option<String>,
}

// =============================================================================
// Product Types
// =============================================================================

/// A product variant (specific combination of options).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    /// Variant ID.
    pub id: VariantId,
    /// Variant title (combination of option values).
    pub title: String,
    /// Whether this variant is available for sale.
    pub available_for_sale: bool,
    /// Quantity available (if inventory tracking enabled).
    pub quantity_available: Option<i64>,
    /// Current price.
    pub price: Money,
    /// Compare-at price (original price if on sale).
    pub compare_at_price: Option<Money>,
    /// Variant image.
    pub image: Option<Image>,
}

/// A product in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// URL handle.
    pub handle: String,
    /// Product title.
    pub title: String,
    /// Plain text description.
    pub description: String,
    /// Whether any variant is available.
    pub available_for_sale: bool,
    /// Product tags.
    pub tags: Vec<String>,
    /// Featured image.
    pub featured_image: Option<Image>,
    /// All product images.
    pub images: Vec<Image>,
    /// Product variants.
    pub variants: Vec<ProductVariant>,
    /// Minimum price across variants.
    pub min_price: Money,
}

impl Product {
    /// Find a variant of this product by id.
    #[must_use]
    pub fn variant(&self, id: &VariantId) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| &v.id == id)
    }
}

// =============================================================================
// Collection Types
// =============================================================================

/// A collection of products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    /// Collection ID.
    pub id: CollectionId,
    /// URL handle.
    pub handle: String,
    /// Collection title.
    pub title: String,
    /// Plain text description.
    pub description: String,
    /// Collection image.
    pub image: Option<Image>,
}

// =============================================================================
// Pagination Types
// =============================================================================

/// Pagination information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageInfo {
    /// Whether there are more items after this page.
    pub has_next_page: bool,
    /// Cursor for the last item.
    pub end_cursor: Option<String>,
}

/// Paginated list of products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConnection {
    /// Products in this page.
    pub products: Vec<Product>,
    /// Pagination info.
    pub page_info: PageInfo,
}

/// Paginated list of collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConnection {
    /// Collections in this page.
    pub collections: Vec<Collection>,
    /// Pagination info.
    pub page_info: PageInfo,
}

// =============================================================================
// Cart Types
// =============================================================================

/// A line item in the remote cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCartLine {
    /// Cart line ID.
    pub id: RemoteLineId,
    /// Quantity.
    pub quantity: u32,
    /// Product variant backing this line.
    pub variant_id: VariantId,
    /// Parent product id.
    pub product_id: ProductId,
    /// Product title.
    pub product_title: String,
    /// Variant title.
    pub variant_title: String,
    /// Price per unit.
    pub unit_price: Money,
    /// Variant image URL.
    pub image_url: Option<String>,
}

/// The remote shopping cart, as returned by every cart operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCart {
    /// Cart ID.
    pub id: RemoteCartId,
    /// Checkout URL.
    pub checkout_url: String,
    /// Presentment currency of the cart.
    pub currency_code: CurrencyCode,
    /// Total item quantity.
    pub total_quantity: u32,
    /// Cart subtotal.
    pub subtotal: Money,
    /// Cart lines.
    pub lines: Vec<RemoteCartLine>,
}

impl RemoteCart {
    /// Find the cart line backed by the given variant.
    #[must_use]
    pub fn line_for_variant(&self, variant_id: &VariantId) -> Option<&RemoteCartLine> {
        self.lines.iter().find(|l| &l.variant_id == variant_id)
    }

    /// Whether the cart still contains the given line.
    #[must_use]
    pub fn contains_line(&self, line_id: &RemoteLineId) -> bool {
        self.lines.iter().any(|l| &l.id == line_id)
    }
}

/// Input for adding a line to a cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLineInput {
    /// Product variant ID.
    pub variant_id: VariantId,
    /// Quantity to add.
    pub quantity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn line(variant: &str, line_id: &str) -> RemoteCartLine {
        RemoteCartLine {
            id: RemoteLineId::new(line_id),
            quantity: 1,
            variant_id: VariantId::new(variant),
            product_id: ProductId::new("gid://shopify/Product/1"),
            product_title: "Ceremonial Matcha".to_string(),
            variant_title: "30g".to_string(),
            unit_price: Money::new(Decimal::new(3800, 2), CurrencyCode::NZD),
            image_url: None,
        }
    }

    #[test]
    fn line_lookup_by_variant_and_id() {
        let cart = RemoteCart {
            id: RemoteCartId::new("gid://shopify/Cart/c1"),
            checkout_url: "https://checkout.example/c1".to_string(),
            currency_code: CurrencyCode::NZD,
            total_quantity: 2,
            subtotal: Money::new(Decimal::new(7600, 2), CurrencyCode::NZD),
            lines: vec![line("v1", "l1"), line("v2", "l2")],
        };

        assert!(cart.line_for_variant(&VariantId::new("v2")).is_some());
        assert!(cart.line_for_variant(&VariantId::new("v3")).is_none());
        assert!(cart.contains_line(&RemoteLineId::new("l1")));
        assert!(!cart.contains_line(&RemoteLineId::new("l9")));
    }
}
