//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. Page handlers return `Result<T, AppError>`;
//! cart mutations never surface here (they resolve to stored error strings
//! at the synchronizer boundary).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::content::ContentError;
use crate::services::instagram::InstagramError;
use crate::services::stripe::StripeError;
use crate::shopify::ShopifyError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Storefront API operation failed.
    #[error("Shopify error: {0}")]
    Shopify(#[from] ShopifyError),

    /// Stripe operation failed.
    #[error("Stripe error: {0}")]
    Stripe(#[from] StripeError),

    /// Instagram operation failed.
    #[error("Instagram error: {0}")]
    Instagram(#[from] InstagramError),

    /// Content loading failed.
    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Status code this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Shopify(ShopifyError::NotFound(_)) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Shopify(_) | Self::Stripe(_) | Self::Instagram(_) => StatusCode::BAD_GATEWAY,
            Self::Content(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Client-safe message; internal detail stays in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Shopify(ShopifyError::NotFound(_)) | Self::NotFound(_) => {
                "Not found".to_string()
            }
            Self::Shopify(_) | Self::Stripe(_) | Self::Instagram(_) => {
                "External service error".to_string()
            }
            Self::Content(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::BadRequest(msg) => msg.clone(),
        }
    }

    fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Stripe(_) | Self::Instagram(_) | Self::Content(_) | Self::Internal(_)
        ) || matches!(self, Self::Shopify(e) if !matches!(e, ShopifyError::NotFound(_)))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (self.status(), self.public_message()).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::NotFound("test".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::BadRequest("test".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Internal("test".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Shopify(ShopifyError::NotFound("x".to_string())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Shopify(ShopifyError::RateLimited(5)).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_public_message_hides_internal_detail() {
        let err = AppError::Internal("connection pool exhausted".to_string());
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::BadRequest("items must not be empty".to_string());
        assert_eq!(err.public_message(), "items must not be empty");
    }
}
