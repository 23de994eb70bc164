//! Money types with precise decimal arithmetic
//!
//! Order totals arrive as decimals (often as strings) and leave for the CRM
//! as floating-point JSON numbers. Everything in between stays in
//! `rust_decimal` so no precision is lost before the final conversion.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// ISO 4217 currency code (three ASCII uppercase letters)
///
/// Shops can sell in any currency the CRM knows about, so this is a validated
/// code rather than a closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    pub const USD: CurrencyCode = CurrencyCode(*b"USD");
    pub const EUR: CurrencyCode = CurrencyCode(*b"EUR");
    pub const GBP: CurrencyCode = CurrencyCode(*b"GBP");
    pub const JPY: CurrencyCode = CurrencyCode(*b"JPY");

    /// Parses a currency code, accepting lowercase input
    pub fn parse(code: &str) -> Result<Self, MoneyError> {
        let trimmed = code.trim();
        let bytes = trimmed.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_alphabetic()) {
            return Err(MoneyError::InvalidCurrency(code.to_string()));
        }
        let mut out = [0u8; 3];
        for (slot, b) in out.iter_mut().zip(bytes) {
            *slot = b.to_ascii_uppercase();
        }
        Ok(Self(out))
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &str {
        // Only ASCII letters are ever stored.
        std::str::from_utf8(&self.0).unwrap_or("XXX")
    }

    /// Returns the number of minor-unit decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        match &self.0 {
            b"JPY" | b"KRW" | b"VND" | b"CLP" | b"ISK" | b"UGX" | b"XAF" | b"XOF" => 0,
            b"BHD" | b"KWD" | b"OMR" | b"JOD" | b"TND" | b"LYD" | b"IQD" => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CurrencyCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CurrencyCode::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount {0} cannot be represented as a floating-point number")]
    NotRepresentable(Decimal),
}

/// A monetary amount with associated currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: CurrencyCode,
}

impl Money {
    /// Creates a new Money value
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// Parses an amount from its textual form (e.g. `"19.99"`)
    pub fn parse(amount: &str, currency: CurrencyCode) -> Result<Self, MoneyError> {
        let amount = Decimal::from_str(amount.trim())
            .map_err(|e| MoneyError::InvalidAmount(format!("{amount:?}: {e}")))?;
        Ok(Self::new(amount, currency))
    }

    /// Creates a zero amount in the specified currency
    pub fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns the currency
    pub fn currency(&self) -> CurrencyCode {
        self.currency
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Rounds to the currency's standard decimal places
    pub fn round_to_currency(&self) -> Self {
        Self {
            amount: self.amount.round_dp(self.currency.decimal_places()),
            currency: self.currency,
        }
    }

    /// Converts the amount to the floating-point value a JSON API expects
    pub fn to_f64(&self) -> Result<f64, MoneyError> {
        self.amount
            .to_f64()
            .filter(|f| f.is_finite())
            .ok_or(MoneyError::NotRepresentable(self.amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency.decimal_places();
        write!(
            f,
            "{} {:.dp$}",
            self.currency,
            self.amount,
            dp = dp as usize
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_parse_normalizes_case() {
        let code = CurrencyCode::parse("eur").unwrap();
        assert_eq!(code, CurrencyCode::EUR);
        assert_eq!(code.to_string(), "EUR");
    }

    #[test]
    fn test_currency_parse_rejects_garbage() {
        assert!(CurrencyCode::parse("EURO").is_err());
        assert!(CurrencyCode::parse("U$D").is_err());
        assert!(CurrencyCode::parse("").is_err());
    }

    #[test]
    fn test_money_parse_and_float() {
        let m = Money::parse("19.99", CurrencyCode::USD).unwrap();
        assert_eq!(m.amount(), dec!(19.99));
        assert_eq!(m.to_f64().unwrap(), 19.99);
    }

    #[test]
    fn test_money_display_uses_currency_places() {
        assert_eq!(Money::new(dec!(5), CurrencyCode::USD).to_string(), "USD 5.00");
        assert_eq!(Money::new(dec!(500), CurrencyCode::JPY).to_string(), "JPY 500");
    }

    #[test]
    fn test_currency_serde_roundtrip_is_plain_string() {
        let json = serde_json::to_string(&CurrencyCode::GBP).unwrap();
        assert_eq!(json, "\"GBP\"");
        let back: CurrencyCode = serde_json::from_str("\"gbp\"").unwrap();
        assert_eq!(back, CurrencyCode::GBP);
    }
}
