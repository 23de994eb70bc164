//! CRM field catalog
//!
//! Lists the fields the CRM accepts for Contact and Contribution so a
//! mapping table can be checked against them. When `getFields` fails or
//! comes back empty a built-in list is used instead.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crm::{CrmEntity, CrmRequest};
use crate::mapping::TargetEntity;
use crate::ports::CrmTransport;

/// One field the CRM exposes on an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmField {
    pub name: String,
    pub label: String,
    pub data_type: Option<String>,
    pub entity: TargetEntity,
}

/// Where a catalog section came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    Remote,
    BuiltIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCatalog {
    pub contact: Vec<CrmField>,
    pub contact_source: CatalogSource,
    pub contribution: Vec<CrmField>,
    pub contribution_source: CatalogSource,
}

const DEFAULT_CONTACT_FIELDS: &[(&str, &str)] = &[
    ("contact_type", "Contact Type"),
    ("first_name", "First Name"),
    ("last_name", "Last Name"),
    ("organization_name", "Organization Name"),
    ("email", "Email"),
    ("phone", "Phone"),
    ("street_address", "Street Address"),
    ("supplemental_address_1", "Supplemental Address 1"),
    ("city", "City"),
    ("postal_code", "Postal Code"),
    ("state_province_id", "State/Province"),
    ("country_id", "Country"),
];

const DEFAULT_CONTRIBUTION_FIELDS: &[(&str, &str)] = &[
    ("financial_type_id", "Financial Type"),
    ("total_amount", "Total Amount"),
    ("currency", "Currency"),
    ("contribution_status_id", "Contribution Status"),
    ("payment_instrument_id", "Payment Method"),
    ("source", "Source"),
    ("receive_date", "Receive Date"),
    ("invoice_id", "Invoice ID"),
    ("invoice_number", "Invoice Number"),
    ("trxn_id", "Transaction ID"),
];

impl FieldCatalog {
    /// Catalog built only from the built-in field lists
    pub fn built_in() -> Self {
        Self {
            contact: built_in_fields(TargetEntity::Contact),
            contact_source: CatalogSource::BuiltIn,
            contribution: built_in_fields(TargetEntity::Contribution),
            contribution_source: CatalogSource::BuiltIn,
        }
    }

    /// Loads both entity field lists from the CRM, falling back per entity
    pub async fn fetch(transport: &dyn CrmTransport) -> Self {
        let (contact, contact_source) = fetch_entity(transport, TargetEntity::Contact).await;
        let (contribution, contribution_source) =
            fetch_entity(transport, TargetEntity::Contribution).await;
        Self {
            contact,
            contact_source,
            contribution,
            contribution_source,
        }
    }

    pub fn fields(&self, entity: TargetEntity) -> &[CrmField] {
        match entity {
            TargetEntity::Contact => &self.contact,
            TargetEntity::Contribution => &self.contribution,
        }
    }

    pub fn knows(&self, entity: TargetEntity, field: &str) -> bool {
        self.fields(entity).iter().any(|f| f.name == field)
    }
}

fn crm_entity(entity: TargetEntity) -> CrmEntity {
    match entity {
        TargetEntity::Contact => CrmEntity::Contact,
        TargetEntity::Contribution => CrmEntity::Contribution,
    }
}

fn built_in_fields(entity: TargetEntity) -> Vec<CrmField> {
    let list = match entity {
        TargetEntity::Contact => DEFAULT_CONTACT_FIELDS,
        TargetEntity::Contribution => DEFAULT_CONTRIBUTION_FIELDS,
    };
    list.iter()
        .map(|(name, label)| CrmField {
            name: (*name).to_string(),
            label: (*label).to_string(),
            data_type: None,
            entity,
        })
        .collect()
}

async fn fetch_entity(
    transport: &dyn CrmTransport,
    entity: TargetEntity,
) -> (Vec<CrmField>, CatalogSource) {
    let request =
        CrmRequest::get_fields(crm_entity(entity)).select(["name", "label", "data_type"]);

    let response = match transport.send(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(entity = %entity, error = %e, "Field catalog unavailable, using built-in list");
            return (built_in_fields(entity), CatalogSource::BuiltIn);
        }
    };

    let fields: Vec<CrmField> = response
        .values
        .iter()
        .filter_map(|record| {
            let name = record.get("name")?.as_str()?.to_string();
            let label = record
                .get("label")
                .and_then(|v| v.as_str())
                .unwrap_or(&name)
                .to_string();
            let data_type = record
                .get("data_type")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            Some(CrmField {
                name,
                label,
                data_type,
                entity,
            })
        })
        .collect();

    if fields.is_empty() {
        warn!(entity = %entity, "CRM returned no fields, using built-in list");
        return (built_in_fields(entity), CatalogSource::BuiltIn);
    }

    debug!(entity = %entity, count = fields.len(), "Loaded field catalog");
    (fields, CatalogSource::Remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrmError;
    use crate::crm::CrmAction;
    use crate::mapping::FieldMappingTable;
    use crate::ports::mock::MockCrm;

    #[tokio::test]
    async fn test_fetch_uses_remote_fields() {
        let crm = MockCrm::new()
            .with_fields(CrmEntity::Contact, ["first_name", "last_name", "email"])
            .with_fields(CrmEntity::Contribution, ["total_amount"]);

        let catalog = FieldCatalog::fetch(&crm).await;
        assert_eq!(catalog.contact_source, CatalogSource::Remote);
        assert_eq!(catalog.contact.len(), 3);
        assert!(catalog.knows(TargetEntity::Contribution, "total_amount"));
        assert!(!catalog.knows(TargetEntity::Contribution, "currency"));
    }

    #[tokio::test]
    async fn test_fetch_falls_back_per_entity() {
        let crm = MockCrm::new().with_fields(CrmEntity::Contact, ["first_name"]);
        crm.fail_next(
            CrmEntity::Contribution,
            CrmAction::GetFields,
            CrmError::remote(Some(500), "boom"),
        )
        .await;

        let catalog = FieldCatalog::fetch(&crm).await;
        assert_eq!(catalog.contact_source, CatalogSource::Remote);
        assert_eq!(catalog.contribution_source, CatalogSource::BuiltIn);
        assert!(catalog.knows(TargetEntity::Contribution, "receive_date"));
    }

    #[test]
    fn test_unknown_targets_against_built_in() {
        let table = FieldMappingTable::new()
            .with("billing_email", "email", TargetEntity::Contact)
            .with("order_notes", "note", TargetEntity::Contribution);
        let unknown = table.unknown_targets(&FieldCatalog::built_in());
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].source_field, "order_notes");
    }

    #[test]
    fn test_default_table_targets_are_all_known() {
        let table = FieldMappingTable::default_table();
        let unknown = table.unknown_targets(&FieldCatalog::built_in());
        assert!(unknown.is_empty(), "unknown default targets: {unknown:?}");
    }
}
