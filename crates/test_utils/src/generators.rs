//! Property-Based Test Generators
//!
//! Proptest strategies for orders and mapping tables, plus `fake`-backed
//! customers for tests that want realistic-looking data.

use chrono::{TimeZone, Utc};
use core_kernel::{CurrencyCode, OrderId};
use domain_sync::order::SOURCE_FIELDS;
use domain_sync::{CustomerDetails, FieldMappingTable, OrderEvent, TargetEntity};
use fake::faker::address::en::{CityName, PostCode, StreetName};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for supported currency codes
pub fn currency_strategy() -> impl Strategy<Value = CurrencyCode> {
    prop_oneof![
        Just(CurrencyCode::USD),
        Just(CurrencyCode::EUR),
        Just(CurrencyCode::GBP),
        Just(CurrencyCode::JPY),
    ]
}

/// Strategy for non-negative order totals with two decimal places
pub fn order_total_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Optional text that is sometimes blank or whitespace
pub fn optional_text_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        2 => "[A-Za-z][A-Za-z '-]{0,20}".prop_map(Some),
        1 => Just(Some(String::new())),
        1 => Just(Some("   ".to_string())),
        1 => Just(None),
    ]
}

pub fn customer_strategy() -> impl Strategy<Value = CustomerDetails> {
    (
        optional_text_strategy(),
        optional_text_strategy(),
        optional_text_strategy(),
        prop_oneof![
            3 => "[a-z]{1,10}@[a-z]{1,10}\\.(org|com)".prop_map(Some),
            1 => Just(None),
        ],
        optional_text_strategy(),
        optional_text_strategy(),
    )
        .prop_map(|(first_name, last_name, company, email, phone, city)| CustomerDetails {
            first_name,
            last_name,
            company,
            email,
            phone,
            city,
            ..Default::default()
        })
}

/// Strategy for valid order events
pub fn order_event_strategy() -> impl Strategy<Value = OrderEvent> {
    (
        1u64..1_000_000u64,
        currency_strategy(),
        order_total_strategy(),
        prop::option::of(prop_oneof![
            Just("stripe".to_string()),
            Just("paypal".to_string()),
            Just("bacs".to_string()),
            Just("cod".to_string()),
            "[a-z_]{3,12}",
        ]),
        customer_strategy(),
        customer_strategy(),
        0i64..1_800_000_000i64,
    )
        .prop_map(|(id, currency, total, payment_method, billing, shipping, ts)| OrderEvent {
            order_id: OrderId::from(id),
            order_number: Some(id.to_string()),
            currency,
            total_amount: total,
            payment_method,
            status: Some("completed".to_string()),
            transaction_id: None,
            billing,
            shipping,
            customer_note: None,
            created_at: Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now),
        })
}

/// Strategy for mapping tables over the known source fields
pub fn mapping_table_strategy() -> impl Strategy<Value = FieldMappingTable> {
    proptest::collection::vec(
        (
            proptest::sample::select(SOURCE_FIELDS),
            "[a-z_]{2,16}",
            prop_oneof![Just(TargetEntity::Contact), Just(TargetEntity::Contribution)],
        ),
        0..12,
    )
    .prop_map(|entries| {
        let mut table = FieldMappingTable::new();
        for (source, target, entity) in entries {
            table.insert(source, target, entity);
        }
        table
    })
}

/// Customer with fake but plausible details
pub fn fake_customer() -> CustomerDetails {
    CustomerDetails {
        first_name: Some(FirstName().fake()),
        last_name: Some(LastName().fake()),
        company: None,
        email: Some(SafeEmail().fake()),
        phone: Some(PhoneNumber().fake()),
        address_1: Some(StreetName().fake()),
        address_2: None,
        city: Some(CityName().fake()),
        state: None,
        postcode: Some(PostCode().fake()),
        country: Some("US".to_string()),
    }
}

/// Business customer with fake details
pub fn fake_business_customer() -> CustomerDetails {
    CustomerDetails {
        company: Some(CompanyName().fake()),
        ..fake_customer()
    }
}
