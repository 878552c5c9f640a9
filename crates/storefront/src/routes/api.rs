//! JSON API endpoints.
//!
//! Two POST endpoints consumed by the storefront's own front-end scripts:
//! checkout initiation and payment-session creation. Both respond with a
//! JSON body on success and an `{ "error": ... }` envelope on failure; a GET
//! on either path is answered 405 by the method router.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stonemill_core::VariantId;

use crate::error::AppError;
use crate::services::stripe::PaymentItem;
use crate::shopify::types::CartLineInput;
use crate::state::AppState;

/// JSON error envelope wrapper around [`AppError`].
#[derive(Debug)]
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<crate::shopify::ShopifyError> for ApiError {
    fn from(err: crate::shopify::ShopifyError) -> Self {
        Self(AppError::Shopify(err))
    }
}

impl From<crate::services::stripe::StripeError> for ApiError {
    fn from(err: crate::services::stripe::StripeError) -> Self {
        Self(AppError::Stripe(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let body = serde_json::json!({ "error": self.0.public_message() });
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self.0);
            tracing::error!(
                error = %self.0,
                sentry_event_id = %event_id,
                "API request error"
            );
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// =============================================================================
// Checkout initiation
// =============================================================================

/// Checkout request payload.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
}

/// One checkout item.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub variant_id: String,
    pub quantity: u32,
}

/// Checkout response payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

/// Create a remote cart from the posted items and return its checkout URL.
#[instrument(skip(state, request), fields(item_count = request.items.len()))]
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<CheckoutResponse> {
    let lines = validate_checkout_items(&request.items)?;

    let cart = state
        .storefront()
        .create_cart(lines, state.config().cart.default_currency)
        .await?;

    Ok(Json(CheckoutResponse {
        checkout_url: cart.checkout_url,
    }))
}

fn validate_checkout_items(items: &[CheckoutItem]) -> Result<Vec<CartLineInput>, ApiError> {
    if items.is_empty() {
        return Err(AppError::BadRequest("items must not be empty".to_string()).into());
    }
    items
        .iter()
        .map(|item| {
            if item.quantity == 0 {
                return Err(
                    AppError::BadRequest("quantity must be at least 1".to_string()).into(),
                );
            }
            if item.variant_id.is_empty() {
                return Err(AppError::BadRequest("variantId is required".to_string()).into());
            }
            Ok(CartLineInput {
                variant_id: VariantId::new(&*item.variant_id),
                quantity: item.quantity,
            })
        })
        .collect()
}

// =============================================================================
// Payment-session creation
// =============================================================================

/// Payment-session request payload.
#[derive(Debug, Deserialize)]
pub struct PaymentSessionRequest {
    pub items: Vec<PaymentSessionItem>,
}

/// One payment-session item: display data plus unit price in minor units.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionItem {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub unit_amount: i64,
    pub quantity: u32,
}

/// Payment-session response payload.
#[derive(Debug, Serialize)]
pub struct PaymentSessionResponse {
    pub id: String,
}

/// Create a payment session and return its id for the browser redirect.
#[instrument(skip(state, request), fields(item_count = request.items.len()))]
pub async fn create_payment_session(
    State(state): State<AppState>,
    Json(request): Json<PaymentSessionRequest>,
) -> ApiResult<PaymentSessionResponse> {
    let items = validate_payment_items(&request.items)?;

    let session = state
        .stripe()
        .create_checkout_session(
            &items,
            state.config().cart.default_currency,
            &state.config().base_url,
        )
        .await?;

    Ok(Json(PaymentSessionResponse { id: session.id }))
}

fn validate_payment_items(items: &[PaymentSessionItem]) -> Result<Vec<PaymentItem>, ApiError> {
    if items.is_empty() {
        return Err(AppError::BadRequest("items must not be empty".to_string()).into());
    }
    items
        .iter()
        .map(|item| {
            if item.quantity == 0 {
                return Err(
                    AppError::BadRequest("quantity must be at least 1".to_string()).into(),
                );
            }
            if item.unit_amount <= 0 {
                return Err(AppError::BadRequest("unitAmount must be positive".to_string()).into());
            }
            Ok(PaymentItem {
                name: item.name.clone(),
                image: item.image.clone(),
                unit_amount: item.unit_amount,
                quantity: item.quantity,
            })
        })
        .collect()
}
