//! Field Mapping Resolver
//!
//! A declarative table says which order field feeds which CRM field, and
//! whether that CRM field lives on the Contact or on the Contribution. The
//! resolver projects an [`OrderEvent`] through the table into two flat maps
//! and only then coerces the known numeric fields, so the table itself never
//! has to know about formats.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "billing_email": { "field": "email", "type": "Contact" },
//!   "order_total":   { "field": "total_amount", "type": "Contribution" }
//! }
//! ```
//!
//! Entry order is preserved. A source field listed twice keeps its first
//! position and its last target.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use core_kernel::CoreError;

use crate::catalog::FieldCatalog;
use crate::order::OrderEvent;

/// CRM fields always submitted as integers
pub const INTEGER_FIELDS: &[&str] = &[
    "contact_id",
    "financial_type_id",
    "payment_instrument_id",
    "contribution_status_id",
    "is_test",
    "is_pay_later",
];

/// CRM fields always submitted as floating-point decimals
pub const DECIMAL_FIELDS: &[&str] = &[
    "total_amount",
    "fee_amount",
    "net_amount",
    "non_deductible_amount",
];

/// CRM entity a mapped value is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetEntity {
    Contact,
    Contribution,
}

impl TargetEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetEntity::Contact => "Contact",
            TargetEntity::Contribution => "Contribution",
        }
    }
}

impl fmt::Display for TargetEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one source field ends up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTarget {
    #[serde(rename = "field")]
    pub target_field: String,
    #[serde(rename = "type")]
    pub entity: TargetEntity,
}

/// One row of the mapping table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub source_field: String,
    pub target: MappingTarget,
}

/// Ordered source-field → target table, unique by source field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMappingTable {
    entries: Vec<FieldMapping>,
}

static DEFAULT_TABLE: Lazy<FieldMappingTable> = Lazy::new(|| {
    use TargetEntity::{Contact, Contribution};

    let mut table = FieldMappingTable::new();
    for (source, field, entity) in [
        ("billing_first_name", "first_name", Contact),
        ("billing_last_name", "last_name", Contact),
        ("billing_company", "organization_name", Contact),
        ("billing_email", "email", Contact),
        ("billing_phone", "phone", Contact),
        ("billing_address_1", "street_address", Contact),
        ("billing_address_2", "supplemental_address_1", Contact),
        ("billing_city", "city", Contact),
        ("billing_state", "state_province_id", Contact),
        ("billing_postcode", "postal_code", Contact),
        ("billing_country", "country_id", Contact),
        ("order_number", "invoice_number", Contribution),
        ("order_currency", "currency", Contribution),
        ("order_total", "total_amount", Contribution),
        ("transaction_id", "trxn_id", Contribution),
    ] {
        table.insert(source, field, entity);
    }
    table
});

impl FieldMappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table used when the settings store holds none
    pub fn default_table() -> Self {
        DEFAULT_TABLE.clone()
    }

    /// Inserts or replaces the mapping for `source`; last write wins
    pub fn insert(
        &mut self,
        source: impl Into<String>,
        target_field: impl Into<String>,
        entity: TargetEntity,
    ) {
        let source = source.into();
        let target = MappingTarget {
            target_field: target_field.into(),
            entity,
        };
        match self.entries.iter_mut().find(|e| e.source_field == source) {
            Some(existing) => existing.target = target,
            None => self.entries.push(FieldMapping {
                source_field: source,
                target,
            }),
        }
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, source: &str, target_field: &str, entity: TargetEntity) -> Self {
        self.insert(source, target_field, entity);
        self
    }

    pub fn get(&self, source: &str) -> Option<&MappingTarget> {
        self.entries
            .iter()
            .find(|e| e.source_field == source)
            .map(|e| &e.target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldMapping> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses the stored JSON form of the table
    pub fn from_json(value: Value) -> Result<Self, CoreError> {
        serde_json::from_value(value)
            .map_err(|e| CoreError::configuration(format!("invalid field mapping table: {e}")))
    }

    /// Projects an order through the table and coerces known numeric fields
    pub fn resolve(&self, order: &OrderEvent) -> MappedFields {
        let mut mapped = MappedFields::default();

        for entry in &self.entries {
            let Some(value) = order.field(&entry.source_field) else {
                continue;
            };
            let bucket = match entry.target.entity {
                TargetEntity::Contact => &mut mapped.contact,
                TargetEntity::Contribution => &mut mapped.contribution,
            };
            bucket.insert(entry.target.target_field.clone(), value);
        }

        coerce_values(&mut mapped.contact);
        coerce_values(&mut mapped.contribution);

        debug!(
            order_id = %order.order_id,
            contact_fields = mapped.contact.len(),
            contribution_fields = mapped.contribution.len(),
            "Resolved field mappings"
        );
        mapped
    }

    /// Mappings whose target field the CRM does not list for its entity
    pub fn unknown_targets<'a>(&'a self, catalog: &FieldCatalog) -> Vec<&'a FieldMapping> {
        self.entries
            .iter()
            .filter(|e| !catalog.knows(e.target.entity, &e.target.target_field))
            .collect()
    }
}

impl Serialize for FieldMappingTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.source_field, &entry.target)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTarget {
    Full(MappingTarget),
    Other(Value),
}

struct TableVisitor;

impl<'de> Visitor<'de> for TableVisitor {
    type Value = FieldMappingTable;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of source field to {field, type}")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut table = FieldMappingTable::new();
        while let Some((source, raw)) = access.next_entry::<String, RawTarget>()? {
            match raw {
                RawTarget::Full(target) => table.insert(source, target.target_field, target.entity),
                RawTarget::Other(value) => {
                    warn!(source_field = %source, target = %value, "Ignoring mapping without a Contact/Contribution target");
                }
            }
        }
        Ok(table)
    }
}

impl<'de> Deserialize<'de> for FieldMappingTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TableVisitor)
    }
}

/// Mapped values split by target entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedFields {
    pub contact: Map<String, Value>,
    pub contribution: Map<String, Value>,
}

impl MappedFields {
    /// Non-empty text value of a contact field
    pub fn contact_text(&self, field: &str) -> Option<&str> {
        self.contact
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Coerces known integer and decimal fields in place.
///
/// Values that do not parse are left untouched; the CRM is the authority on
/// what it accepts.
pub fn coerce_values(values: &mut Map<String, Value>) {
    for (key, value) in values.iter_mut() {
        let coerced = if INTEGER_FIELDS.contains(&key.as_str()) {
            coerce_integer(value)
        } else if DECIMAL_FIELDS.contains(&key.as_str()) {
            coerce_decimal(value)
        } else {
            None
        };

        match coerced {
            Some(v) => *value = v,
            None if value.is_string() && is_numeric_field(key) => {
                debug!(field = %key, value = %value, "Left non-numeric value uncoerced");
            }
            None => {}
        }
    }
}

fn is_numeric_field(key: &str) -> bool {
    INTEGER_FIELDS.contains(&key) || DECIMAL_FIELDS.contains(&key)
}

fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    Decimal::from_str(s)
                        .ok()
                        .filter(|d| d.fract().is_zero())
                        .and_then(|d| d.to_i64())
                })
                .map(Value::from)
        }
        Value::Bool(b) => Some(Value::from(i64::from(*b))),
        Value::Number(n) if !n.is_i64() && !n.is_u64() => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.is_finite())
            .map(|f| Value::from(f as i64)),
        _ => None,
    }
}

fn coerce_decimal(value: &Value) -> Option<Value> {
    let float = match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok()?.to_f64()?,
        Value::Number(n) if n.is_f64() => return None,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    float.is_finite().then(|| Value::from(float))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_kernel::{CurrencyCode, OrderId};
    use rust_decimal_macros::dec;
    use serde_json::json;

    use crate::order::CustomerDetails;

    fn order() -> OrderEvent {
        OrderEvent {
            order_id: OrderId::new("5"),
            order_number: Some("5".into()),
            currency: CurrencyCode::USD,
            total_amount: dec!(19.99),
            payment_method: Some("paypal".into()),
            status: None,
            transaction_id: None,
            billing: CustomerDetails {
                first_name: Some("Jane".into()),
                last_name: Some("Doe".into()),
                email: Some("jane@example.com".into()),
                ..Default::default()
            },
            shipping: CustomerDetails::default(),
            customer_note: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_resolve_splits_by_entity() {
        let mapped = FieldMappingTable::default_table().resolve(&order());
        assert_eq!(mapped.contact.get("email"), Some(&json!("jane@example.com")));
        assert_eq!(mapped.contact.get("first_name"), Some(&json!("Jane")));
        assert_eq!(mapped.contribution.get("total_amount"), Some(&json!(19.99)));
        assert_eq!(mapped.contribution.get("currency"), Some(&json!("USD")));
        assert!(!mapped.contact.contains_key("organization_name"));
    }

    #[test]
    fn test_unmapped_fields_are_dropped() {
        let table = FieldMappingTable::new().with("billing_email", "email", TargetEntity::Contact);
        let mapped = table.resolve(&order());
        assert_eq!(mapped.contact.len(), 1);
        assert!(mapped.contribution.is_empty());
    }

    #[test]
    fn test_empty_table_yields_empty_maps() {
        let mapped = FieldMappingTable::new().resolve(&order());
        assert_eq!(mapped, MappedFields::default());
    }

    #[test]
    fn test_last_write_wins_keeps_position() {
        let table = FieldMappingTable::new()
            .with("billing_email", "email", TargetEntity::Contact)
            .with("order_total", "total_amount", TargetEntity::Contribution)
            .with("billing_email", "email_primary.email", TargetEntity::Contact);
        assert_eq!(table.len(), 2);
        let first = table.iter().next().unwrap();
        assert_eq!(first.source_field, "billing_email");
        assert_eq!(first.target.target_field, "email_primary.email");
    }

    #[test]
    fn test_json_table_roundtrip_and_legacy_entries() {
        let stored = json!({
            "billing_email": {"field": "email", "type": "Contact"},
            "order_total": {"field": "total_amount", "type": "Contribution"},
            "billing_phone": "phone",
            "order_notes": {"field": "note", "type": ""}
        });
        let table = FieldMappingTable::from_json(stored).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("order_total").unwrap().entity, TargetEntity::Contribution);
        assert!(table.get("billing_phone").is_none());

        let back = serde_json::to_value(&table).unwrap();
        assert_eq!(back["billing_email"], json!({"field": "email", "type": "Contact"}));
    }

    #[test]
    fn test_from_json_rejects_non_map() {
        assert!(FieldMappingTable::from_json(json!(["billing_email"])).is_err());
    }

    #[test]
    fn test_coercion_rules() {
        let mut values = Map::new();
        values.insert("financial_type_id".into(), json!("3"));
        values.insert("is_pay_later".into(), json!(true));
        values.insert("total_amount".into(), json!("19.99"));
        values.insert("fee_amount".into(), json!(2));
        values.insert("payment_instrument_id".into(), json!("stripe"));
        values.insert("note".into(), json!("42"));

        coerce_values(&mut values);

        assert_eq!(values["financial_type_id"], json!(3));
        assert_eq!(values["is_pay_later"], json!(1));
        assert_eq!(values["total_amount"], json!(19.99));
        assert_eq!(values["fee_amount"], json!(2.0));
        assert_eq!(values["payment_instrument_id"], json!("stripe"));
        assert_eq!(values["note"], json!("42"));
    }

    #[test]
    fn test_zero_total_is_mapped() {
        let mut order = order();
        order.total_amount = dec!(0);
        let mapped = FieldMappingTable::default_table().resolve(&order);
        assert_eq!(mapped.contribution.get("total_amount"), Some(&json!(0.0)));
    }
}
