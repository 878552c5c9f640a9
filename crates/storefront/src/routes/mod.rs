//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Home page
//! GET  /health                 - Health check
//!
//! # Catalog
//! GET  /products               - Product listing
//! GET  /products/{handle}      - Product detail
//! GET  /collections            - Collection listing
//!
//! # Cart (HTMX fragments)
//! GET  /cart                   - Cart page
//! POST /cart/add               - Add one unit (returns count badge)
//! POST /cart/update            - Set quantity (returns cart_items fragment)
//! POST /cart/remove            - Remove item (returns cart_items fragment)
//! POST /cart/clear             - Empty the cart (returns cart_items fragment)
//! POST /cart/currency          - Switch currency (returns cart_items fragment)
//! GET  /cart/count             - Cart count badge (fragment)
//!
//! # Checkout
//! GET  /checkout               - Redirect to the remote checkout
//!
//! # JSON API
//! POST /api/checkout           - { items: [{variantId, quantity}] } -> { checkoutUrl }
//! POST /api/payment-session    - { items: [...] } -> { id }
//!
//! # Content
//! GET  /pages/{slug}           - Static informational page
//! ```

pub mod api;
pub mod cart;
pub mod collections;
pub mod home;
pub mod pages;
pub mod products;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{handle}", get(products::show))
}

/// Create the collection routes router.
pub fn collection_routes() -> Router<AppState> {
    Router::new().route("/", get(collections::index))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
        .route("/currency", post(cart::currency))
        .route("/count", get(cart::count))
}

/// Create the JSON API routes router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(api::create_checkout))
        .route("/payment-session", post(api::create_payment_session))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Home page
        .route("/", get(home::home))
        // Catalog routes
        .nest("/products", product_routes())
        .nest("/collections", collection_routes())
        // Cart routes
        .nest("/cart", cart_routes())
        // Checkout redirect
        .route("/checkout", get(cart::checkout))
        // JSON API
        .nest("/api", api_routes())
        // Static informational pages
        .route("/pages/{slug}", get(pages::show))
}
