//! Unit tests for the Money module
//!
//! Tests cover currency code parsing, amount parsing, float conversion for
//! API payloads, and display.

use core_kernel::{CurrencyCode, Money, MoneyError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

mod currency_codes {
    use super::*;

    #[test]
    fn test_known_constants() {
        assert_eq!(CurrencyCode::USD.code(), "USD");
        assert_eq!(CurrencyCode::JPY.decimal_places(), 0);
        assert_eq!(CurrencyCode::GBP.decimal_places(), 2);
    }

    #[test]
    fn test_any_three_letter_code_is_accepted() {
        let chf = CurrencyCode::parse("chf").unwrap();
        assert_eq!(chf.code(), "CHF");
        assert_eq!(chf.decimal_places(), 2);

        let kwd: CurrencyCode = "KWD".parse().unwrap();
        assert_eq!(kwd.decimal_places(), 3);
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(CurrencyCode::parse(" usd ").unwrap(), CurrencyCode::USD);
    }

    #[test]
    fn test_invalid_codes_report_input() {
        let err = CurrencyCode::parse("US1").unwrap_err();
        assert_eq!(err, MoneyError::InvalidCurrency("US1".to_string()));
    }

    #[test]
    fn test_deserialize_rejects_invalid_code() {
        let result: Result<CurrencyCode, _> = serde_json::from_str("\"DOLLARS\"");
        assert!(result.is_err());
    }
}

mod amounts {
    use super::*;

    #[test]
    fn test_parse_accepts_shop_formats() {
        assert_eq!(Money::parse("19.99", CurrencyCode::USD).unwrap().amount(), dec!(19.99));
        assert_eq!(Money::parse(" 5 ", CurrencyCode::USD).unwrap().amount(), dec!(5));
        assert_eq!(Money::parse("0.00", CurrencyCode::USD).unwrap().amount(), dec!(0.00));
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        let err = Money::parse("19,99", CurrencyCode::EUR).unwrap_err();
        assert!(matches!(err, MoneyError::InvalidAmount(_)));
    }

    #[test]
    fn test_sign_checks() {
        assert!(Money::zero(CurrencyCode::USD).is_zero());
        assert!(!Money::zero(CurrencyCode::USD).is_negative());
        assert!(Money::new(dec!(-0.01), CurrencyCode::USD).is_negative());
        assert!(!Money::new(Decimal::NEGATIVE_ONE * Decimal::ZERO, CurrencyCode::USD).is_negative());
    }

    #[test]
    fn test_round_to_currency() {
        let jpy = Money::new(dec!(1234.5), CurrencyCode::JPY).round_to_currency();
        assert_eq!(jpy.amount(), dec!(1234));
        let usd = Money::new(dec!(10.005), CurrencyCode::USD).round_to_currency();
        assert_eq!(usd.amount(), dec!(10.00));
    }
}

mod conversion {
    use super::*;

    #[test]
    fn test_to_f64_for_payloads() {
        assert_eq!(Money::new(dec!(25.00), CurrencyCode::USD).to_f64().unwrap(), 25.0);
        assert_eq!(Money::new(dec!(0.10), CurrencyCode::USD).to_f64().unwrap(), 0.1);
        assert_eq!(Money::new(dec!(-3.5), CurrencyCode::USD).to_f64().unwrap(), -3.5);
    }

    #[test]
    fn test_display_pads_to_currency_places() {
        assert_eq!(Money::new(dec!(19.9), CurrencyCode::GBP).to_string(), "GBP 19.90");
        assert_eq!(Money::new(dec!(1.5), CurrencyCode::parse("KWD").unwrap()).to_string(), "KWD 1.500");
    }

    #[test]
    fn test_money_serializes_with_currency() {
        let json = serde_json::to_value(Money::new(dec!(19.99), CurrencyCode::EUR)).unwrap();
        assert_eq!(json["currency"], "EUR");
    }
}
