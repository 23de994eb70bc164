//! Pre-built Test Fixtures
//!
//! Consistent, predictable data for unit and integration tests.

use chrono::{DateTime, TimeZone, Utc};
use domain_sync::config::{SETTING_AUTH_TOKEN, SETTING_BASE_URL, SETTING_FIELD_MAPPINGS};
use domain_sync::{CrmEntity, CustomerDetails, FieldMappingTable, MockCrm, MockSettingsStore, OrderEvent, SyncConfig};
use rust_decimal_macros::dec;
use serde_json::json;

use crate::builders::OrderEventBuilder;

/// Fixture for timestamps
pub struct TimeFixtures;

impl TimeFixtures {
    /// When the standard fixture order was placed (2024-03-01 12:30:00 UTC)
    pub fn order_placed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    /// `order_placed` in the CRM's `receive_date` layout
    pub fn order_placed_receive_date() -> &'static str {
        "2024-03-01 12:30:00"
    }
}

/// Fixture for customer details
pub struct CustomerFixtures;

impl CustomerFixtures {
    /// Individual with every billing field populated
    pub fn jane_doe() -> CustomerDetails {
        CustomerDetails {
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            company: None,
            email: Some("jane.doe@example.com".to_string()),
            phone: Some("+44 113 496 0000".to_string()),
            address_1: Some("1 Park Row".to_string()),
            address_2: None,
            city: Some("Leeds".to_string()),
            state: Some("West Yorkshire".to_string()),
            postcode: Some("LS1 5HN".to_string()),
            country: Some("GB".to_string()),
        }
    }

    /// Minimal customer: name and email only
    pub fn john_smith() -> CustomerDetails {
        CustomerDetails {
            first_name: Some("John".to_string()),
            last_name: Some("Smith".to_string()),
            email: Some("john.smith@example.org".to_string()),
            ..Default::default()
        }
    }

    /// Shipping address distinct from the billing one
    pub fn shipping_address() -> CustomerDetails {
        CustomerDetails {
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            address_1: Some("22 Stonegate".to_string()),
            city: Some("York".to_string()),
            postcode: Some("YO1 8AS".to_string()),
            country: Some("GB".to_string()),
            ..Default::default()
        }
    }
}

/// Fixture for order events
pub struct OrderFixtures;

impl OrderFixtures {
    pub fn completed() -> OrderEvent {
        OrderEventBuilder::new().build()
    }

    pub fn with_id(id: &str) -> OrderEvent {
        OrderEventBuilder::new().with_order_id(id).build()
    }

    /// Order with a `19.99` total, the canonical coercion case
    pub fn nineteen_ninety_nine() -> OrderEvent {
        OrderEventBuilder::new()
            .with_order_id("1999")
            .with_total(dec!(19.99))
            .build()
    }

    pub fn free() -> OrderEvent {
        OrderEventBuilder::new()
            .with_order_id("2000")
            .with_total(dec!(0.00))
            .build()
    }

    pub fn organization() -> OrderEvent {
        OrderEventBuilder::new()
            .with_order_id("3000")
            .with_company("Acme Widgets Ltd")
            .build()
    }

    pub fn without_email() -> OrderEvent {
        OrderEventBuilder::new()
            .with_order_id("4000")
            .with_billing_email(None)
            .build()
    }

    pub fn with_shipping() -> OrderEvent {
        OrderEventBuilder::new()
            .with_order_id("5000")
            .with_shipping(CustomerFixtures::shipping_address())
            .build()
    }
}

/// Fixture for settings and configuration
pub struct SettingsFixtures;

impl SettingsFixtures {
    pub const BASE_URL: &'static str = "https://crm.example.org";
    pub const AUTH_TOKEN: &'static str = "k9Xq2wLmP0aZ";

    /// Settings store with URL and credential but no mapping table
    pub async fn store() -> MockSettingsStore {
        let store = MockSettingsStore::new();
        store.set(SETTING_BASE_URL, json!(Self::BASE_URL)).await;
        store.set(SETTING_AUTH_TOKEN, json!(Self::AUTH_TOKEN)).await;
        store
    }

    /// Settings store holding an explicit mapping table
    pub async fn store_with_mappings(table: &FieldMappingTable) -> MockSettingsStore {
        let store = Self::store().await;
        store
            .set(SETTING_FIELD_MAPPINGS, json!(table))
            .await;
        store
    }

    pub fn config() -> SyncConfig {
        SyncConfig::new(Self::BASE_URL, Self::AUTH_TOKEN)
            .expect("fixture config is complete")
    }
}

/// Fixture for pre-populated CRM states
pub struct CrmFixtures;

impl CrmFixtures {
    /// CRM where `email` already belongs to a contact; returns the contact id
    pub async fn with_email_owner(crm: &MockCrm, email: &str, first: &str, last: &str) -> i64 {
        let contact_id = crm
            .seed(CrmEntity::Contact, json!({ "first_name": first, "last_name": last }))
            .await;
        crm.seed(
            CrmEntity::Email,
            json!({ "contact_id": contact_id, "email": email, "is_primary": 1 }),
        )
        .await;
        contact_id
    }

    /// CRM holding a contact by name only; returns the contact id
    pub async fn with_named_contact(crm: &MockCrm, first: &str, last: &str) -> i64 {
        crm.seed(CrmEntity::Contact, json!({ "first_name": first, "last_name": last }))
            .await
    }
}
