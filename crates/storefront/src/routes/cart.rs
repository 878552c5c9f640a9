//! Cart route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page reloads.
//! Each browser session maps to one cart service in the registry; the session
//! cookie only carries the registry key.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use stonemill_core::{CurrencyCode, VariantId};

use crate::cart::{CartError, CartSnapshot, NewCartItem};
use crate::filters;
use crate::state::AppState;

/// Session key for the cart registry key.
pub const CART_KEY: &str = "cart_key";

/// Currencies offered by the storefront switcher.
const CURRENCIES: [CurrencyCode; 5] = [
    CurrencyCode::NZD,
    CurrencyCode::AUD,
    CurrencyCode::USD,
    CurrencyCode::EUR,
    CurrencyCode::GBP,
];

// =============================================================================
// View Types
// =============================================================================

/// Cart item display data for templates.
#[derive(Clone)]
pub struct CartItemView {
    pub variant_id: String,
    pub title: String,
    pub quantity: u32,
    pub price: String,
    pub line_price: String,
    pub image: Option<String>,
    pub loading: bool,
}

/// Currency option for the switcher.
#[derive(Clone)]
pub struct CurrencyOption {
    pub code: &'static str,
    pub selected: bool,
}

/// Cart display data for templates.
#[derive(Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: String,
    pub item_count: u32,
    pub currencies: Vec<CurrencyOption>,
    pub error: Option<String>,
    pub max_per_item: u32,
}

impl CartView {
    fn from_snapshot(snapshot: &CartSnapshot) -> Self {
        Self {
            items: snapshot
                .lines
                .iter()
                .map(|line| CartItemView {
                    variant_id: line.variant_id.to_string(),
                    title: line.title.clone(),
                    quantity: line.quantity,
                    price: line.unit_price.to_string(),
                    line_price: line.unit_price.times(line.quantity).to_string(),
                    image: line.image_url.clone(),
                    loading: snapshot.is_line_loading(&line.variant_id),
                })
                .collect(),
            subtotal: snapshot.subtotal.to_string(),
            item_count: snapshot.count,
            currencies: CURRENCIES
                .iter()
                .map(|c| CurrencyOption {
                    code: c.code(),
                    selected: *c == snapshot.currency_code,
                })
                .collect(),
            error: snapshot.last_error.clone(),
            max_per_item: snapshot.max_per_item,
        }
    }
}

// =============================================================================
// Session Helpers
// =============================================================================

/// Get the session's cart key, creating one on first use.
async fn ensure_cart_key(session: &Session) -> String {
    if let Ok(Some(key)) = session.get::<String>(CART_KEY).await {
        return key;
    }
    let key = crate::cart::CartRegistry::new_key();
    if let Err(e) = session.insert(CART_KEY, key.clone()).await {
        tracing::error!("Failed to save cart key to session: {e}");
    }
    key
}

// =============================================================================
// Forms
// =============================================================================

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub handle: String,
    pub variant_id: String,
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub variant_id: String,
    pub quantity: u32,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub variant_id: String,
}

/// Currency switch form data.
#[derive(Debug, Deserialize)]
pub struct CurrencyForm {
    pub currency: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub cart: CartView,
}

/// Cart items fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate {
    pub cart: CartView,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u32,
}

/// Inline cart error fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_error.html")]
pub struct CartErrorTemplate {
    pub message: String,
}

/// Map a cart mutation failure to a fragment response.
///
/// Expected conditions (stock, quantity ceiling) render with 200 so HTMX
/// swaps the message inline; genuine sync failures render as server errors.
fn error_response(err: &CartError) -> Response {
    let status = match err {
        CartError::OutOfStock { .. } | CartError::QuantityLimitExceeded { .. } => StatusCode::OK,
        CartError::RemoteSync(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match err {
        CartError::RemoteSync(_) => "Something went wrong, please try again".to_string(),
        other => other.to_string(),
    };
    (status, CartErrorTemplate { message }).into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Display cart page.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> impl IntoResponse {
    let key = ensure_cart_key(&session).await;
    let service = state.carts().get_or_create(&key).await;
    let snapshot = service.snapshot().await;

    CartShowTemplate {
        cart: CartView::from_snapshot(&snapshot),
    }
}

/// Add one unit of a variant to the cart (HTMX).
///
/// Looks the product up by handle for display data, then hands the add to
/// the cart service. Returns the count badge plus an HTMX trigger so the
/// rest of the page can refresh itself.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AddToCartForm>,
) -> Response {
    let product = match state.storefront().get_product_by_handle(&form.handle).await {
        Ok(product) => product,
        Err(e) => {
            tracing::error!("Failed to load product for add-to-cart: {e}");
            return error_response(&CartError::RemoteSync(e));
        }
    };

    let variant_id = VariantId::new(form.variant_id);
    let Some(variant) = product.variant(&variant_id) else {
        return (
            StatusCode::BAD_REQUEST,
            CartErrorTemplate {
                message: "That option is no longer available".to_string(),
            },
        )
            .into_response();
    };

    let title = if variant.title == "Default Title" {
        product.title.clone()
    } else {
        format!("{} ({})", product.title, variant.title)
    };
    let item = NewCartItem {
        product_id: product.id.clone(),
        variant_id: variant_id.clone(),
        title,
        unit_price: variant.price,
        image_url: variant
            .image
            .as_ref()
            .or(product.featured_image.as_ref())
            .map(|i| i.url.clone()),
    };

    let key = ensure_cart_key(&session).await;
    let service = state.carts().get_or_create(&key).await;

    match service.add(item).await {
        Ok(()) => {
            let count = service.snapshot().await.count;
            (
                AppendHeaders([("HX-Trigger", "cart-updated")]),
                CartCountTemplate { count },
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Update cart item quantity (HTMX).
#[instrument(skip(state, session))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<UpdateCartForm>,
) -> Response {
    let key = ensure_cart_key(&session).await;
    let service = state.carts().get_or_create(&key).await;

    // Errors surface through the snapshot's stored message; the fragment
    // always re-renders the authoritative local state.
    let _ = service
        .set_quantity(&VariantId::new(form.variant_id), form.quantity)
        .await;

    let snapshot = service.snapshot().await;
    (
        AppendHeaders([("HX-Trigger", "cart-updated")]),
        CartItemsTemplate {
            cart: CartView::from_snapshot(&snapshot),
        },
    )
        .into_response()
}

/// Remove item from cart (HTMX).
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RemoveFromCartForm>,
) -> Response {
    let key = ensure_cart_key(&session).await;
    let service = state.carts().get_or_create(&key).await;

    let _ = service.remove(&VariantId::new(form.variant_id)).await;

    let snapshot = service.snapshot().await;
    (
        AppendHeaders([("HX-Trigger", "cart-updated")]),
        CartItemsTemplate {
            cart: CartView::from_snapshot(&snapshot),
        },
    )
        .into_response()
}

/// Empty the cart (HTMX).
#[instrument(skip(state, session))]
pub async fn clear(State(state): State<AppState>, session: Session) -> Response {
    let key = ensure_cart_key(&session).await;
    let service = state.carts().get_or_create(&key).await;

    let _ = service.clear().await;

    let snapshot = service.snapshot().await;
    (
        AppendHeaders([("HX-Trigger", "cart-updated")]),
        CartItemsTemplate {
            cart: CartView::from_snapshot(&snapshot),
        },
    )
        .into_response()
}

/// Switch the cart currency (HTMX).
#[instrument(skip(state, session))]
pub async fn currency(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CurrencyForm>,
) -> Response {
    let Ok(currency) = form.currency.parse::<CurrencyCode>() else {
        return (
            StatusCode::BAD_REQUEST,
            CartErrorTemplate {
                message: "Unsupported currency".to_string(),
            },
        )
            .into_response();
    };

    let key = ensure_cart_key(&session).await;
    let service = state.carts().get_or_create(&key).await;

    let _ = service.change_currency(currency).await;

    let snapshot = service.snapshot().await;
    (
        AppendHeaders([("HX-Trigger", "cart-updated")]),
        CartItemsTemplate {
            cart: CartView::from_snapshot(&snapshot),
        },
    )
        .into_response()
}

/// Get cart count badge (HTMX).
#[instrument(skip(state, session))]
pub async fn count(State(state): State<AppState>, session: Session) -> impl IntoResponse {
    let count = match session.get::<String>(CART_KEY).await {
        Ok(Some(key)) => state.carts().get_or_create(&key).await.snapshot().await.count,
        _ => 0,
    };

    CartCountTemplate { count }
}

/// Redirect to the remote checkout.
#[instrument(skip(state, session))]
pub async fn checkout(State(state): State<AppState>, session: Session) -> Response {
    let Ok(Some(key)) = session.get::<String>(CART_KEY).await else {
        return Redirect::to("/cart").into_response();
    };

    let service = state.carts().get_or_create(&key).await;
    match service.checkout_url().await {
        Ok(Some(url)) => Redirect::to(&url).into_response(),
        Ok(None) => Redirect::to("/cart").into_response(),
        Err(e) => {
            tracing::error!("Failed to resolve checkout URL: {e}");
            Redirect::to("/cart").into_response()
        }
    }
}
