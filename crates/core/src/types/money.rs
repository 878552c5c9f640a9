//! Type-safe money representation using decimal arithmetic.
//!
//! Amounts are kept in the currency's standard unit (dollars, not cents) as
//! a [`Decimal`], matching what the Storefront API returns. Conversion to
//! minor units happens only at the payment-API boundary.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing an unsupported currency code.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unsupported currency code: {0}")]
pub struct CurrencyParseError(pub String);

/// ISO 4217 currency codes the store sells in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    /// New Zealand dollar (store default).
    #[default]
    NZD,
    /// Australian dollar.
    AUD,
    /// United States dollar.
    USD,
    /// Euro.
    EUR,
    /// Pound sterling.
    GBP,
}

impl CurrencyCode {
    /// ISO 4217 code string.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NZD => "NZD",
            Self::AUD => "AUD",
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
        }
    }

    /// Currency symbol for display.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::NZD | Self::AUD | Self::USD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }

    /// ISO 3166 country code used for the cart's buyer identity, which is
    /// how the Storefront API selects a cart's presentment currency.
    #[must_use]
    pub const fn country_code(self) -> &'static str {
        match self {
            Self::NZD => "NZ",
            Self::AUD => "AU",
            Self::USD => "US",
            Self::EUR => "DE",
            Self::GBP => "GB",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CurrencyCode {
    type Err = CurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NZD" => Ok(Self::NZD),
            "AUD" => Ok(Self::AUD),
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            other => Err(CurrencyParseError(other.to_string())),
        }
    }
}

/// A monetary amount with its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Zero in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }

    /// This amount multiplied by a line quantity.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self::new(self.amount * Decimal::from(quantity), self.currency_code)
    }

    /// Amount in minor units (cents), rounded half-up to two decimal places.
    ///
    /// All supported currencies have a minor-unit exponent of 2.
    #[must_use]
    pub fn minor_units(self) -> i64 {
        let cents = (self.amount * Decimal::from(100)).round();
        cents.to_i64().unwrap_or(i64::MAX)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:.2}", self.currency_code.symbol(), self.amount)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn currency_round_trips_through_str() {
        for code in [
            CurrencyCode::NZD,
            CurrencyCode::AUD,
            CurrencyCode::USD,
            CurrencyCode::EUR,
            CurrencyCode::GBP,
        ] {
            assert_eq!(code.code().parse::<CurrencyCode>().unwrap(), code);
        }
    }

    #[test]
    fn unknown_currency_is_rejected() {
        let err = "JPY".parse::<CurrencyCode>().unwrap_err();
        assert_eq!(err, CurrencyParseError("JPY".to_string()));
    }

    #[test]
    fn money_display_uses_symbol_and_two_decimals() {
        let price = Money::new(Decimal::new(1850, 2), CurrencyCode::NZD);
        assert_eq!(price.to_string(), "$18.50");

        let price = Money::new(Decimal::new(9, 0), CurrencyCode::GBP);
        assert_eq!(price.to_string(), "£9.00");
    }

    #[test]
    fn minor_units_rounds_half_up() {
        let price = Money::new(Decimal::new(12345, 3), CurrencyCode::USD); // 12.345
        assert_eq!(price.minor_units(), 1235);

        let price = Money::new(Decimal::new(1850, 2), CurrencyCode::NZD);
        assert_eq!(price.minor_units(), 1850);
    }

    #[test]
    fn times_scales_the_amount() {
        let unit = Money::new(Decimal::new(1999, 2), CurrencyCode::AUD);
        let line = unit.times(3);
        assert_eq!(line.amount, Decimal::new(5997, 2));
        assert_eq!(line.currency_code, CurrencyCode::AUD);
    }

    #[test]
    fn money_serde_keeps_string_amount() {
        let price = Money::new(Decimal::new(1999, 2), CurrencyCode::NZD);
        let json = serde_json::to_string(&price).unwrap();
        assert_eq!(json, r#"{"amount":"19.99","currency_code":"NZD"}"#);

        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, price);
    }
}
