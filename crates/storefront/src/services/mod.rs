//! External service clients.
//!
//! - [`stripe`] - payment-session creation
//! - [`instagram`] - home-page media feed

pub mod instagram;
pub mod stripe;
