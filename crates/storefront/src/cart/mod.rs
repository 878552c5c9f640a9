//! Shopping cart state and synchronization.
//!
//! # Architecture
//!
//! The cart is a local view of a remote Shopify cart. Every mutation
//! round-trips to the Storefront API before committing local state, with one
//! deliberate exception: removal always converges locally even when the
//! remote call fails, because the UI must never keep showing an item the
//! shopper asked to remove.
//!
//! - [`state`] - the in-memory cart entities and read snapshot
//! - [`mirror`] - the durable key-value mirror (a cache, never authoritative)
//! - [`gateway`] - the seam to the remote cart API
//! - [`service`] - the synchronizer: validation, mutation, and recovery
//! - [`registry`] - one [`service::CartService`] per browser session

pub mod gateway;
pub mod mirror;
pub mod registry;
pub mod service;
pub mod state;

pub use gateway::CartGateway;
pub use mirror::{CART_ID_KEY, CartMirror, FileMirror, LINES_KEY, MemoryMirror};
pub use registry::{CartRegistry, StorefrontCartService};
pub use service::{CartError, CartService};
pub use state::{CartLine, CartSession, CartSnapshot, NewCartItem};
