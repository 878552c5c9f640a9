//! Wire shapes for Storefront API responses.
//!
//! Each struct mirrors the selection set of a document in [`super::queries`].
//! Conversions into the domain types in [`crate::shopify::types`] are
//! fallible only where a currency code has to be parsed.

use rust_decimal::Decimal;
use serde::Deserialize;

use stonemill_core::{
    CollectionId, CurrencyParseError, Money, ProductId, RemoteCartId, RemoteLineId, VariantId,
};

use crate::shopify::types::{
    Collection, CollectionConnection, Image, PageInfo, Product, ProductConnection, ProductVariant,
    RemoteCart, RemoteCartLine,
};

/// Top-level GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<WireGraphQLError>>,
}

#[derive(Debug, Deserialize)]
pub struct WireGraphQLError {
    pub message: String,
    #[serde(default)]
    pub path: Vec<serde_json::Value>,
}

// =============================================================================
// Shared wire fragments
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMoney {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub currency_code: String,
}

impl TryFrom<WireMoney> for Money {
    type Error = CurrencyParseError;

    fn try_from(wire: WireMoney) -> Result<Self, Self::Error> {
        Ok(Self::new(wire.amount, wire.currency_code.parse()?))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireImage {
    pub url: String,
    #[serde(default)]
    pub alt_text: Option<String>,
}

impl From<WireImage> for Image {
    fn from(wire: WireImage) -> Self {
        Self {
            url: wire.url,
            alt_text: wire.alt_text,
        }
    }
}

/// A connection selected as `{ nodes { ... } }`.
#[derive(Debug, Deserialize)]
pub struct Nodes<T> {
    pub nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl From<WirePageInfo> for PageInfo {
    fn from(wire: WirePageInfo) -> Self {
        Self {
            has_next_page: wire.has_next_page,
            end_cursor: wire.end_cursor,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConnection<T> {
    pub page_info: WirePageInfo,
    pub nodes: Vec<T>,
}

// =============================================================================
// Catalog wire shapes
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireVariant {
    pub id: String,
    pub title: String,
    pub available_for_sale: bool,
    #[serde(default)]
    pub quantity_available: Option<i64>,
    pub price: WireMoney,
    #[serde(default)]
    pub compare_at_price: Option<WireMoney>,
    #[serde(default)]
    pub image: Option<WireImage>,
}

impl TryFrom<WireVariant> for ProductVariant {
    type Error = CurrencyParseError;

    fn try_from(wire: WireVariant) -> Result<Self, Self::Error> {
        Ok(Self {
            id: VariantId::new(wire.id),
            title: wire.title,
            available_for_sale: wire.available_for_sale,
            quantity_available: wire.quantity_available,
            price: wire.price.try_into()?,
            compare_at_price: wire.compare_at_price.map(TryInto::try_into).transpose()?,
            image: wire.image.map(Into::into),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePriceRange {
    pub min_variant_price: WireMoney,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireProduct {
    pub id: String,
    pub handle: String,
    pub title: String,
    pub description: String,
    pub available_for_sale: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub featured_image: Option<WireImage>,
    pub images: Nodes<WireImage>,
    pub variants: Nodes<WireVariant>,
    pub price_range: WirePriceRange,
}

impl TryFrom<WireProduct> for Product {
    type Error = CurrencyParseError;

    fn try_from(wire: WireProduct) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::new(wire.id),
            handle: wire.handle,
            title: wire.title,
            description: wire.description,
            available_for_sale: wire.available_for_sale,
            tags: wire.tags,
            featured_image: wire.featured_image.map(Into::into),
            images: wire.images.nodes.into_iter().map(Into::into).collect(),
            variants: wire
                .variants
                .nodes
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
            min_price: wire.price_range.min_variant_price.try_into()?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCollection {
    pub id: String,
    pub handle: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub image: Option<WireImage>,
}

impl From<WireCollection> for Collection {
    fn from(wire: WireCollection) -> Self {
        Self {
            id: CollectionId::new(wire.id),
            handle: wire.handle,
            title: wire.title,
            description: wire.description,
            image: wire.image.map(Into::into),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductsData {
    pub products: WireConnection<WireProduct>,
}

impl TryFrom<ProductsData> for ProductConnection {
    type Error = CurrencyParseError;

    fn try_from(data: ProductsData) -> Result<Self, Self::Error> {
        Ok(Self {
            page_info: data.products.page_info.into(),
            products: data
                .products
                .nodes
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductByHandleData {
    pub product: Option<WireProduct>,
}

#[derive(Debug, Deserialize)]
pub struct CollectionsData {
    pub collections: WireConnection<WireCollection>,
}

impl From<CollectionsData> for CollectionConnection {
    fn from(data: CollectionsData) -> Self {
        Self {
            page_info: data.collections.page_info.into(),
            collections: data
                .collections
                .nodes
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }
}

/// Response for the `node(id:)` availability probe.
///
/// A non-variant node decodes as an empty object, so every field defaults.
#[derive(Debug, Deserialize)]
pub struct AvailabilityData {
    pub node: Option<AvailabilityNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityNode {
    #[serde(default)]
    pub quantity_available: Option<i64>,
}

// =============================================================================
// Cart wire shapes
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCart {
    pub id: String,
    pub checkout_url: String,
    pub total_quantity: u32,
    pub cost: WireCartCost,
    pub lines: Nodes<WireCartLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCartCost {
    pub subtotal_amount: WireMoney,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCartLine {
    pub id: String,
    pub quantity: u32,
    pub merchandise: WireMerchandise,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMerchandise {
    pub id: String,
    pub title: String,
    pub price: WireMoney,
    #[serde(default)]
    pub image: Option<WireImage>,
    pub product: WireLineProduct,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireLineProduct {
    pub id: String,
    pub title: String,
}

impl TryFrom<WireCart> for RemoteCart {
    type Error = CurrencyParseError;

    fn try_from(wire: WireCart) -> Result<Self, Self::Error> {
        let subtotal: Money = wire.cost.subtotal_amount.try_into()?;
        Ok(Self {
            id: RemoteCartId::new(wire.id),
            checkout_url: wire.checkout_url,
            currency_code: subtotal.currency_code,
            total_quantity: wire.total_quantity,
            subtotal,
            lines: wire
                .lines
                .nodes
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl TryFrom<WireCartLine> for RemoteCartLine {
    type Error = CurrencyParseError;

    fn try_from(wire: WireCartLine) -> Result<Self, Self::Error> {
        Ok(Self {
            id: RemoteLineId::new(wire.id),
            quantity: wire.quantity,
            variant_id: VariantId::new(wire.merchandise.id),
            product_id: ProductId::new(wire.merchandise.product.id),
            product_title: wire.merchandise.product.title,
            variant_title: wire.merchandise.title,
            unit_price: wire.merchandise.price.try_into()?,
            image_url: wire.merchandise.image.map(|i| i.url),
        })
    }
}

/// User error from a cart mutation.
#[derive(Debug, Deserialize)]
pub struct WireUserError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
}

/// Shared payload of all cart mutations.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCartMutation {
    pub cart: Option<WireCart>,
    #[serde(default)]
    pub user_errors: Vec<WireUserError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCreateData {
    pub cart_create: Option<WireCartMutation>,
}

#[derive(Debug, Deserialize)]
pub struct GetCartData {
    pub cart: Option<WireCart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLinesAddData {
    pub cart_lines_add: Option<WireCartMutation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLinesUpdateData {
    pub cart_lines_update: Option<WireCartMutation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLinesRemoveData {
    pub cart_lines_remove: Option<WireCartMutation>,
}
