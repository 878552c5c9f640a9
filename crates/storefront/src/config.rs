//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPIFY_STORE` - Shopify store domain (e.g., stonemill.myshopify.com)
//! - `SHOPIFY_STOREFRONT_TOKEN` - Storefront API private access token
//! - `STRIPE_SECRET_KEY` - Stripe API secret key (payment sessions)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_BASE_URL` - Public URL (default: <http://localhost:3000>)
//! - `SHOPIFY_API_VERSION` - API version (default: 2026-01)
//! - `CART_MAX_PER_ITEM` - Per-line quantity ceiling (default: 10)
//! - `CART_MIRROR_DIR` - Directory for durable cart mirrors (default: data/carts)
//! - `CART_CURRENCY` - Default presentment currency (default: NZD)
//! - `INSTAGRAM_ACCESS_TOKEN` - Feed API token (feed disabled if unset)
//! - `INSTAGRAM_ALLOWED_POSTS` - Comma-separated post id allow-list
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use secrecy::SecretString;
use thiserror::Error;

use stonemill_core::CurrencyCode;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Shopify Storefront API configuration
    pub shopify: ShopifyStorefrontConfig,
    /// Stripe payment-session configuration
    pub stripe: StripeConfig,
    /// Instagram feed configuration (feed disabled when absent)
    pub instagram: Option<InstagramConfig>,
    /// Cart policy configuration
    pub cart: CartConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Shopify Storefront API configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct ShopifyStorefrontConfig {
    /// Shopify store domain (e.g., stonemill.myshopify.com)
    pub store: String,
    /// Shopify API version (e.g., 2026-01)
    pub api_version: String,
    /// Storefront API private access token (server-side only)
    pub storefront_token: SecretString,
}

impl std::fmt::Debug for ShopifyStorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyStorefrontConfig")
            .field("store", &self.store)
            .field("api_version", &self.api_version)
            .field("storefront_token", &"[REDACTED]")
            .finish()
    }
}

/// Stripe payment-session configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe API secret key
    pub secret_key: SecretString,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Instagram feed configuration.
#[derive(Clone)]
pub struct InstagramConfig {
    /// Instagram Graph API access token
    pub access_token: SecretString,
    /// Post ids allowed on the home-page strip (empty = all non-video posts)
    pub allowed_posts: Vec<String>,
}

impl std::fmt::Debug for InstagramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstagramConfig")
            .field("access_token", &"[REDACTED]")
            .field("allowed_posts", &self.allowed_posts)
            .finish()
    }
}

/// Cart policy configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Maximum quantity for any single cart line
    pub max_per_item: u32,
    /// Directory for per-session durable cart mirrors
    pub mirror_dir: PathBuf,
    /// Default presentment currency for new cart sessions
    pub default_currency: CurrencyCode,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("STOREFRONT_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_PORT".to_string(), e.to_string())
            })?;
        let base_url = get_env_or_default("STOREFRONT_BASE_URL", "http://localhost:3000");

        let shopify = ShopifyStorefrontConfig::from_env()?;
        let stripe = StripeConfig::from_env()?;
        let instagram = InstagramConfig::from_env()?;
        let cart = CartConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            host,
            port,
            base_url,
            shopify,
            stripe,
            instagram,
            cart,
            sentry_dsn,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl ShopifyStorefrontConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            store: get_required_env("SHOPIFY_STORE")?,
            api_version: get_env_or_default("SHOPIFY_API_VERSION", "2026-01"),
            storefront_token: get_validated_secret("SHOPIFY_STOREFRONT_TOKEN")?,
        })
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
        })
    }
}

impl InstagramConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(token) = get_optional_env("INSTAGRAM_ACCESS_TOKEN") else {
            return Ok(None);
        };
        validate_secret_strength(&token, "INSTAGRAM_ACCESS_TOKEN")?;

        let allowed_posts = get_optional_env("INSTAGRAM_ALLOWED_POSTS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(Self {
            access_token: SecretString::from(token),
            allowed_posts,
        }))
    }
}

impl CartConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let max_per_item = get_env_or_default("CART_MAX_PER_ITEM", "10")
            .parse::<u32>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("CART_MAX_PER_ITEM".to_string(), e.to_string())
            })?;
        if max_per_item == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CART_MAX_PER_ITEM".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let mirror_dir = PathBuf::from(get_env_or_default("CART_MIRROR_DIR", "data/carts"));

        let default_currency = get_env_or_default("CART_CURRENCY", "NZD")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("CART_CURRENCY".to_string(), e.to_string()))?;

        Ok(Self {
            max_per_item,
            mirror_dir,
            default_currency,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a real API token."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
