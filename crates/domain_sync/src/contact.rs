//! Contact Resolution Engine
//!
//! Finds the CRM contact an order belongs to, or creates one. Precedence is
//! fixed: an exact email match wins, then an exact first + last name match,
//! and only then a new contact is created. Email, phone and postal address
//! are separate CRM entities and are written as follow-ups after the
//! contact itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use core_kernel::CrmContactId;

use crate::crm::{CrmEntity, CrmRequest, Operator};
use crate::error::SyncError;
use crate::mapping::MappedFields;
use crate::ports::CrmTransport;

/// Contact fields that must be present before any CRM call
pub const REQUIRED_CONTACT_FIELDS: &[&str] = &["email", "first_name", "last_name"];

/// Contact fields written to the Address entity rather than the contact
pub const ADDRESS_FIELDS: &[&str] = &[
    "street_address",
    "supplemental_address_1",
    "supplemental_address_2",
    "city",
    "state_province_id",
    "postal_code",
    "country_id",
    "state_province",
    "country",
];

const HOME_LOCATION_TYPE: i64 = 1;
const PHONE_TYPE: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactKind {
    Individual,
    Organization,
}

impl ContactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactKind::Individual => "Individual",
            ContactKind::Organization => "Organization",
        }
    }
}

/// Contact details extracted from the mapped fields
#[derive(Debug, Clone, PartialEq)]
pub struct ContactCandidate {
    pub kind: ContactKind,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub organization_name: Option<String>,
    pub phone: Option<String>,
    pub address: Map<String, Value>,
    /// Every other mapped Contact field, sent with the contact create
    pub extra: Map<String, Value>,
}

impl ContactCandidate {
    /// Fails with `MissingRequiredField` listing every absent required field
    pub fn from_mapped(fields: &MappedFields) -> Result<Self, SyncError> {
        let missing: Vec<&str> = REQUIRED_CONTACT_FIELDS
            .iter()
            .copied()
            .filter(|f| fields.contact_text(f).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(SyncError::missing_fields(missing));
        }

        let text = |f: &str| fields.contact_text(f).map(str::to_string);
        let organization_name = text("organization_name");

        let mut address = Map::new();
        let mut extra = Map::new();
        for (key, value) in &fields.contact {
            if ADDRESS_FIELDS.contains(&key.as_str()) {
                address.insert(key.clone(), value.clone());
            } else if !is_follow_up_field(key) {
                extra.insert(key.clone(), value.clone());
            }
        }

        Ok(Self {
            kind: if organization_name.is_some() {
                ContactKind::Organization
            } else {
                ContactKind::Individual
            },
            first_name: text("first_name").unwrap_or_default(),
            last_name: text("last_name").unwrap_or_default(),
            email: text("email").unwrap_or_default(),
            organization_name,
            phone: text("phone"),
            address,
            extra,
        })
    }

    /// Values for `Contact.create`
    fn contact_values(&self) -> Map<String, Value> {
        let mut values = self.extra.clone();
        values.insert("contact_type".into(), json!(self.kind.as_str()));
        values.insert("first_name".into(), json!(self.first_name));
        values.insert("last_name".into(), json!(self.last_name));
        if let Some(org) = &self.organization_name {
            values.insert("organization_name".into(), json!(org));
        }
        values
    }
}

fn is_follow_up_field(key: &str) -> bool {
    matches!(key, "email" | "phone") || key.starts_with("shipping_")
}

/// How the contact was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMatch {
    Email,
    Name,
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactResolution {
    pub contact_id: CrmContactId,
    pub matched_by: ContactMatch,
}

pub struct ContactResolver {
    transport: Arc<dyn CrmTransport>,
}

impl ContactResolver {
    pub fn new(transport: Arc<dyn CrmTransport>) -> Self {
        Self { transport }
    }

    /// Returns the contact for the mapped fields, creating it if necessary
    #[instrument(skip(self, fields))]
    pub async fn resolve(&self, fields: &MappedFields) -> Result<ContactResolution, SyncError> {
        let candidate = ContactCandidate::from_mapped(fields)?;

        if let Some(contact_id) = self.find_by_email(&candidate.email).await? {
            info!(contact_id = %contact_id, "Existing contact located by email");
            return Ok(ContactResolution {
                contact_id,
                matched_by: ContactMatch::Email,
            });
        }

        if let Some(contact_id) = self
            .find_by_name(&candidate.first_name, &candidate.last_name)
            .await?
        {
            info!(contact_id = %contact_id, "Existing contact located by name");
            return Ok(ContactResolution {
                contact_id,
                matched_by: ContactMatch::Name,
            });
        }

        let contact_id = self.create(&candidate).await?;
        Ok(ContactResolution {
            contact_id,
            matched_by: ContactMatch::Created,
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<CrmContactId>, SyncError> {
        let request = CrmRequest::get(CrmEntity::Email)
            .select(["id", "contact_id"])
            .filter("email", Operator::Eq, email)
            .limit(1);
        let response = self.transport.send(request).await?;
        Ok(response.first_id("contact_id").map(CrmContactId::new))
    }

    async fn find_by_name(
        &self,
        first_name: &str,
        last_name: &str,
    ) -> Result<Option<CrmContactId>, SyncError> {
        let request = CrmRequest::get(CrmEntity::Contact)
            .select(["id", "contact_type", "first_name", "last_name"])
            .filter("first_name", Operator::Eq, first_name)
            .filter("last_name", Operator::Eq, last_name)
            .limit(1);
        let response = self.transport.send(request).await?;
        Ok(response.first_id("id").map(CrmContactId::new))
    }

    async fn create(&self, candidate: &ContactCandidate) -> Result<CrmContactId, SyncError> {
        let response = self
            .transport
            .send(CrmRequest::create(CrmEntity::Contact, candidate.contact_values()))
            .await?;
        let contact_id = response
            .first_id("id")
            .map(CrmContactId::new)
            .ok_or_else(|| SyncError::ContactCreation("no ID returned".into()))?;

        info!(
            contact_id = %contact_id,
            contact_type = candidate.kind.as_str(),
            "New contact created"
        );

        // The contact exists from here on; follow-up failures leave it in place.
        if !candidate.address.is_empty() {
            let mut values = candidate.address.clone();
            values.insert("contact_id".into(), json!(contact_id.get()));
            values.insert("is_primary".into(), json!(1));
            values.insert("location_type_id".into(), json!(HOME_LOCATION_TYPE));
            self.follow_up(CrmEntity::Address, contact_id, values).await;
        }

        let mut email = Map::new();
        email.insert("contact_id".into(), json!(contact_id.get()));
        email.insert("email".into(), json!(candidate.email));
        email.insert("is_primary".into(), json!(1));
        email.insert("location_type_id".into(), json!(HOME_LOCATION_TYPE));
        self.follow_up(CrmEntity::Email, contact_id, email).await;

        if let Some(phone) = &candidate.phone {
            let mut values = Map::new();
            values.insert("contact_id".into(), json!(contact_id.get()));
            values.insert("phone".into(), json!(phone));
            values.insert("is_primary".into(), json!(1));
            values.insert("phone_type_id".into(), json!(PHONE_TYPE));
            values.insert("location_type_id".into(), json!(HOME_LOCATION_TYPE));
            self.follow_up(CrmEntity::Phone, contact_id, values).await;
        }

        Ok(contact_id)
    }

    async fn follow_up(&self, entity: CrmEntity, contact_id: CrmContactId, values: Map<String, Value>) {
        match self.transport.send(CrmRequest::create(entity, values)).await {
            Ok(_) => debug!(entity = %entity, contact_id = %contact_id, "Attached contact detail"),
            Err(e) => warn!(
                entity = %entity,
                contact_id = %contact_id,
                error = %e,
                "Failed to attach contact detail"
            ),
        }
    }
}
