//! Core types for Stonemill.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod money;

pub use id::*;
pub use money::{CurrencyCode, CurrencyParseError, Money};
