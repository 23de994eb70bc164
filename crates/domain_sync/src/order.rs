//! Order events handed over by the shop platform
//!
//! An `OrderEvent` is an immutable snapshot of one completed order. The sync
//! core only ever borrows it. Its values are addressable by *source field
//! name* (`billing_email`, `order_total`, ...) so the field mapping table can
//! refer to them without knowing the struct layout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use core_kernel::{CoreError, CurrencyCode, Money, OrderId};

/// Customer name, contact and address details for one side of an order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerDetails {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
}

impl CustomerDetails {
    fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "first_name" => &self.first_name,
            "last_name" => &self.last_name,
            "company" => &self.company,
            "email" => &self.email,
            "phone" => &self.phone,
            "address_1" => &self.address_1,
            "address_2" => &self.address_2,
            "city" => &self.city,
            "state" => &self.state,
            "postcode" => &self.postcode,
            "country" => &self.country,
            _ => return None,
        };
        value.as_deref()
    }
}

/// Immutable snapshot of one completed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: OrderId,
    #[serde(default)]
    pub order_number: Option<String>,
    pub currency: CurrencyCode,
    /// Accepts `"19.99"` as well as `19.99` on the wire
    pub total_amount: Decimal,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub billing: CustomerDetails,
    #[serde(default)]
    pub shipping: CustomerDetails,
    #[serde(default)]
    pub customer_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Every source field name an `OrderEvent` can expose, in a stable order
pub const SOURCE_FIELDS: &[&str] = &[
    "billing_first_name",
    "billing_last_name",
    "billing_company",
    "billing_email",
    "billing_phone",
    "billing_address_1",
    "billing_address_2",
    "billing_city",
    "billing_state",
    "billing_postcode",
    "billing_country",
    "shipping_first_name",
    "shipping_last_name",
    "shipping_company",
    "shipping_address_1",
    "shipping_address_2",
    "shipping_city",
    "shipping_state",
    "shipping_postcode",
    "shipping_country",
    "order_id",
    "order_number",
    "order_currency",
    "order_total",
    "order_status",
    "payment_method",
    "order_notes",
    "transaction_id",
];

impl OrderEvent {
    /// Order total with its currency
    pub fn total(&self) -> Money {
        Money::new(self.total_amount, self.currency)
    }

    /// Rejects events that can never be synchronized
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.order_id.is_blank() {
            return Err(CoreError::validation("order identifier is blank"));
        }
        if self.total().is_negative() {
            return Err(CoreError::validation(format!(
                "order {} has a negative total {}",
                self.order_id,
                self.total()
            )));
        }
        Ok(())
    }

    /// Returns the value of a named source field.
    ///
    /// Blank text is treated as absent; a numeric zero total is a value.
    pub fn field(&self, name: &str) -> Option<Value> {
        let text = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
        };

        if let Some(rest) = name.strip_prefix("billing_") {
            return text(self.billing.field(rest));
        }
        if let Some(rest) = name.strip_prefix("shipping_") {
            // Email and phone only exist on the billing side.
            if matches!(rest, "email" | "phone") {
                return None;
            }
            return text(self.shipping.field(rest));
        }

        match name {
            "order_id" => text(Some(self.order_id.as_str())),
            "order_number" => text(self.order_number.as_deref()),
            "order_currency" => Some(Value::String(self.currency.to_string())),
            "order_total" => Some(Value::String(self.total_amount.normalize().to_string())),
            "order_status" => text(self.status.as_deref()),
            "payment_method" => text(self.payment_method.as_deref()),
            "order_notes" => text(self.customer_note.as_deref()),
            "transaction_id" => text(self.transaction_id.as_deref()),
            _ => None,
        }
    }

    /// All present source values, in `SOURCE_FIELDS` order
    pub fn source_values(&self) -> Vec<(&'static str, Value)> {
        SOURCE_FIELDS
            .iter()
            .filter_map(|name| self.field(name).map(|v| (*name, v)))
            .collect()
    }

    /// Free-text provenance label recorded on the contribution
    pub fn source_label(&self) -> String {
        format!("WooCommerce Order #{}", self.order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn order() -> OrderEvent {
        OrderEvent {
            order_id: OrderId::new("1001"),
            order_number: Some("1001".into()),
            currency: CurrencyCode::EUR,
            total_amount: dec!(19.99),
            payment_method: Some("stripe".into()),
            status: Some("completed".into()),
            transaction_id: None,
            billing: CustomerDetails {
                first_name: Some("Jane".into()),
                last_name: Some("Doe".into()),
                email: Some("jane@example.com".into()),
                phone: Some("   ".into()),
                ..Default::default()
            },
            shipping: CustomerDetails::default(),
            customer_note: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_field_lookup_by_source_name() {
        let order = order();
        assert_eq!(order.field("billing_email"), Some(Value::String("jane@example.com".into())));
        assert_eq!(order.field("order_total"), Some(Value::String("19.99".into())));
        assert_eq!(order.field("order_currency"), Some(Value::String("EUR".into())));
        assert_eq!(order.field("no_such_field"), None);
    }

    #[test]
    fn test_blank_values_are_absent() {
        let order = order();
        assert_eq!(order.field("billing_phone"), None);
        assert_eq!(order.field("shipping_city"), None);
        assert_eq!(order.field("shipping_email"), None);
    }

    #[test]
    fn test_zero_total_is_present() {
        let mut order = order();
        order.total_amount = dec!(0.00);
        assert_eq!(order.field("order_total"), Some(Value::String("0".into())));
    }

    #[test]
    fn test_total_amount_deserializes_from_string() {
        let json = serde_json::json!({
            "order_id": "77",
            "currency": "usd",
            "total_amount": "19.99",
            "created_at": "2024-03-01T12:30:00Z"
        });
        let order: OrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(order.total_amount, dec!(19.99));
        assert_eq!(order.currency, CurrencyCode::USD);
        assert_eq!(order.billing, CustomerDetails::default());
    }

    #[test]
    fn test_validate_rejects_blank_id_and_negative_total() {
        let mut blank = order();
        blank.order_id = OrderId::new(" ");
        assert!(blank.validate().is_err());

        let mut negative = order();
        negative.total_amount = dec!(-1);
        assert!(negative.validate().is_err());

        assert!(order().validate().is_ok());
    }

    #[test]
    fn test_source_label() {
        assert_eq!(order().source_label(), "WooCommerce Order #1001");
    }
}
