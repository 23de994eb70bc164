//! Test Data Builders
//!
//! Builders with sensible defaults so a test only spells out the fields it
//! cares about.

use chrono::{DateTime, Utc};
use core_kernel::{CurrencyCode, OrderId};
use domain_sync::{CustomerDetails, OrderEvent};
use rust_decimal::Decimal;

use crate::fixtures::{CustomerFixtures, TimeFixtures};

/// Builder for [`OrderEvent`]
pub struct OrderEventBuilder {
    order_id: OrderId,
    order_number: Option<String>,
    currency: CurrencyCode,
    total_amount: Decimal,
    payment_method: Option<String>,
    status: Option<String>,
    transaction_id: Option<String>,
    billing: CustomerDetails,
    shipping: CustomerDetails,
    customer_note: Option<String>,
    created_at: DateTime<Utc>,
}

impl Default for OrderEventBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderEventBuilder {
    /// Completed USD 25.00 stripe order placed by Jane Doe
    pub fn new() -> Self {
        Self {
            order_id: OrderId::new("1001"),
            order_number: Some("1001".to_string()),
            currency: CurrencyCode::USD,
            total_amount: Decimal::new(2500, 2),
            payment_method: Some("stripe".to_string()),
            status: Some("completed".to_string()),
            transaction_id: Some("ch_3PxT2aLkdIwHu7ix".to_string()),
            billing: CustomerFixtures::jane_doe(),
            shipping: CustomerDetails::default(),
            customer_note: None,
            created_at: TimeFixtures::order_placed(),
        }
    }

    /// Sets the order id and order number together
    pub fn with_order_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.order_number = Some(id.clone());
        self.order_id = OrderId::new(id);
        self
    }

    pub fn with_order_number(mut self, number: Option<&str>) -> Self {
        self.order_number = number.map(str::to_string);
        self
    }

    pub fn with_currency(mut self, currency: CurrencyCode) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_total(mut self, total: Decimal) -> Self {
        self.total_amount = total;
        self
    }

    pub fn with_payment_method(mut self, method: Option<&str>) -> Self {
        self.payment_method = method.map(str::to_string);
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn with_transaction_id(mut self, id: Option<&str>) -> Self {
        self.transaction_id = id.map(str::to_string);
        self
    }

    pub fn with_billing(mut self, billing: CustomerDetails) -> Self {
        self.billing = billing;
        self
    }

    pub fn with_shipping(mut self, shipping: CustomerDetails) -> Self {
        self.shipping = shipping;
        self
    }

    pub fn with_billing_email(mut self, email: Option<&str>) -> Self {
        self.billing.email = email.map(str::to_string);
        self
    }

    pub fn with_billing_name(mut self, first: &str, last: &str) -> Self {
        self.billing.first_name = Some(first.to_string());
        self.billing.last_name = Some(last.to_string());
        self
    }

    pub fn with_company(mut self, company: &str) -> Self {
        self.billing.company = Some(company.to_string());
        self
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.customer_note = Some(note.to_string());
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn build(self) -> OrderEvent {
        OrderEvent {
            order_id: self.order_id,
            order_number: self.order_number,
            currency: self.currency,
            total_amount: self.total_amount,
            payment_method: self.payment_method,
            status: self.status,
            transaction_id: self.transaction_id,
            billing: self.billing,
            shipping: self.shipping,
            customer_note: self.customer_note,
            created_at: self.created_at,
        }
    }
}
