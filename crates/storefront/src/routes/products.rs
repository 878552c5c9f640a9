//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::filters;
use crate::shopify::types::{Product, ProductVariant};
use crate::state::AppState;

/// Products per listing page.
const PAGE_SIZE: i64 = 12;

// =============================================================================
// View Types
// =============================================================================

/// Product display data for templates.
#[derive(Clone)]
pub struct ProductView {
    pub handle: String,
    pub title: String,
    pub description: String,
    pub price: String,
    pub available: bool,
    pub featured_image: Option<ImageView>,
    pub images: Vec<ImageView>,
    pub variants: Vec<VariantView>,
}

/// Image display data for templates.
#[derive(Clone)]
pub struct ImageView {
    pub url: String,
    pub alt: String,
}

/// Variant display data for templates.
#[derive(Clone)]
pub struct VariantView {
    pub id: String,
    pub title: String,
    pub price: String,
    pub available: bool,
}

impl From<&ProductVariant> for VariantView {
    fn from(variant: &ProductVariant) -> Self {
        Self {
            id: variant.id.to_string(),
            title: variant.title.clone(),
            price: variant.price.to_string(),
            available: variant.available_for_sale,
        }
    }
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        Self {
            handle: product.handle.clone(),
            title: product.title.clone(),
            description: product.description.clone(),
            price: product.min_price.to_string(),
            available: product.available_for_sale,
            featured_image: product.featured_image.as_ref().map(|img| ImageView {
                url: img.url.clone(),
                alt: img.alt_text.clone().unwrap_or_else(|| product.title.clone()),
            }),
            images: product
                .images
                .iter()
                .map(|img| ImageView {
                    url: img.url.clone(),
                    alt: img.alt_text.clone().unwrap_or_else(|| product.title.clone()),
                })
                .collect(),
            variants: product.variants.iter().map(VariantView::from).collect(),
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Pagination query parameters (cursor-based).
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub after: Option<String>,
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub products: Vec<ProductView>,
    pub next_cursor: Option<String>,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub product: ProductView,
}

// =============================================================================
// Handlers
// =============================================================================

/// Display product listing page.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<impl IntoResponse> {
    let connection = state
        .storefront()
        .get_products(PAGE_SIZE, query.after)
        .await?;

    let next_cursor = if connection.page_info.has_next_page {
        connection.page_info.end_cursor
    } else {
        None
    };

    Ok(ProductsIndexTemplate {
        products: connection.products.iter().map(ProductView::from).collect(),
        next_cursor,
    })
}

/// Display product detail page.
pub async fn show(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<impl IntoResponse> {
    let product = state
        .storefront()
        .get_product_by_handle(&handle)
        .await
        .map_err(|e| match e {
            crate::shopify::ShopifyError::NotFound(_) => AppError::NotFound(handle.clone()),
            other => AppError::Shopify(other),
        })?;

    Ok(ProductShowTemplate {
        product: ProductView::from(&product),
    })
}
