//! Stripe API client for payment-session creation.
//!
//! One operation is used: creating a Checkout Session from a list of items
//! (name, image, unit amount in minor units, quantity). The returned session
//! id is handed to the browser for the redirect; payment capture itself is
//! entirely Stripe's.

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use stonemill_core::CurrencyCode;

use crate::config::StripeConfig;

/// Stripe API base URL.
const BASE_URL: &str = "https://api.stripe.com/v1";

/// Errors that can occur when interacting with the Stripe API.
#[derive(Debug, Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// One item of a payment session.
#[derive(Debug, Clone)]
pub struct PaymentItem {
    /// Display name.
    pub name: String,
    /// Product image URL.
    pub image: Option<String>,
    /// Unit price in minor units (cents).
    pub unit_amount: i64,
    /// Quantity.
    pub quantity: u32,
}

/// A created checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Session id, used by the browser to redirect to Stripe.
    pub id: String,
    /// Hosted payment page URL.
    pub url: Option<String>,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
}

impl StripeClient {
    /// Create a new Stripe API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| StripeError::Parse(format!("Invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    /// Create a payment checkout session.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or the response cannot be
    /// parsed.
    #[instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn create_checkout_session(
        &self,
        items: &[PaymentItem],
        currency: CurrencyCode,
        base_url: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let url = format!("{BASE_URL}/checkout/sessions");
        let params = session_params(items, currency, base_url);

        let response = self.client.post(&url).form(&params).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| StripeError::Parse(e.to_string()))
    }
}

/// Build the form-encoded parameter list for a checkout session.
///
/// Stripe's form encoding addresses nested fields with bracketed paths, one
/// pair per leaf value.
fn session_params(
    items: &[PaymentItem],
    currency: CurrencyCode,
    base_url: &str,
) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), "payment".to_string()),
        (
            "success_url".to_string(),
            format!("{base_url}/checkout/success"),
        ),
        ("cancel_url".to_string(), format!("{base_url}/cart")),
    ];

    let currency = currency.code().to_lowercase();
    for (i, item) in items.iter().enumerate() {
        params.push((
            format!("line_items[{i}][price_data][currency]"),
            currency.clone(),
        ));
        params.push((
            format!("line_items[{i}][price_data][product_data][name]"),
            item.name.clone(),
        ));
        if let Some(image) = &item.image {
            params.push((
                format!("line_items[{i}][price_data][product_data][images][0]"),
                image.clone(),
            ));
        }
        params.push((
            format!("line_items[{i}][price_data][unit_amount]"),
            item.unit_amount.to_string(),
        ));
        params.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
    }

    params
}
