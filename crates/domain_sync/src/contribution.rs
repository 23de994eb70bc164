//! Contribution Builder
//!
//! Assembles the contribution payload for a resolved contact and submits it.
//! If the CRM rejects the full payload because of a constraint (an invalid
//! option value, a dangling foreign key) the builder retries exactly once
//! with the smallest payload the CRM accepts.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};

use core_kernel::{CrmContactId, CrmContributionId};

use crate::config::{ContributionDefaults, PaymentInstrumentTable};
use crate::crm::{CrmEntity, CrmRequest};
use crate::error::{CrmError, SyncError};
use crate::mapping::coerce_values;
use crate::order::OrderEvent;
use crate::ports::CrmTransport;

/// Timestamp layout the CRM expects for `receive_date`
pub const RECEIVE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CONSTRAINT_MARKERS: &[&str] = &[
    "constraint",
    "violat",
    "foreign key",
    "integrity",
    "not a valid option",
];

/// True when a remote error message describes a data constraint failure
pub fn is_constraint_violation(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    CONSTRAINT_MARKERS.iter().any(|m| message.contains(m))
}

pub struct ContributionBuilder {
    transport: Arc<dyn CrmTransport>,
    defaults: ContributionDefaults,
    instruments: PaymentInstrumentTable,
}

impl ContributionBuilder {
    pub fn new(
        transport: Arc<dyn CrmTransport>,
        defaults: ContributionDefaults,
        instruments: PaymentInstrumentTable,
    ) -> Self {
        Self {
            transport,
            defaults,
            instruments,
        }
    }

    /// Full payload: defaults, then mapped fields, then the resolved contact
    pub fn payload(
        &self,
        contact_id: CrmContactId,
        order: &OrderEvent,
        mapped: &Map<String, Value>,
    ) -> Map<String, Value> {
        let mut values = Map::new();
        values.insert("contact_id".into(), json!(contact_id.get()));
        values.insert("financial_type_id".into(), json!(self.defaults.financial_type_id));
        values.insert("total_amount".into(), amount(order));
        values.insert("currency".into(), json!(order.currency.code()));
        values.insert(
            "contribution_status_id".into(),
            json!(self.defaults.contribution_status_id),
        );
        values.insert(
            "payment_instrument_id".into(),
            json!(self.instruments.lookup(order.payment_method.as_deref())),
        );
        values.insert("source".into(), json!(order.source_label()));
        values.insert(
            "receive_date".into(),
            json!(order.created_at.format(RECEIVE_DATE_FORMAT).to_string()),
        );
        values.insert("is_pay_later".into(), json!(i64::from(self.defaults.is_pay_later)));

        for (key, value) in mapped {
            values.insert(key.clone(), value.clone());
        }
        values.insert("contact_id".into(), json!(contact_id.get()));

        coerce_values(&mut values);
        values
    }

    /// Payload used for the single retry after a constraint violation
    pub fn reduced_payload(&self, contact_id: CrmContactId, order: &OrderEvent) -> Map<String, Value> {
        let mut values = Map::new();
        values.insert("contact_id".into(), json!(contact_id.get()));
        values.insert("financial_type_id".into(), json!(self.defaults.financial_type_id));
        values.insert("total_amount".into(), amount(order));
        values.insert("currency".into(), json!(order.currency.code()));
        values
    }

    /// Creates the contribution and returns its id
    #[instrument(skip(self, order, mapped), fields(order_id = %order.order_id))]
    pub async fn submit(
        &self,
        contact_id: CrmContactId,
        order: &OrderEvent,
        mapped: &Map<String, Value>,
    ) -> Result<CrmContributionId, SyncError> {
        let full = self.payload(contact_id, order, mapped);

        match self.create(full).await {
            Ok(Some(id)) => {
                info!(contribution_id = %id, contact_id = %contact_id, "Contribution created");
                Ok(id)
            }
            Ok(None) => Err(SyncError::ContributionCreation("no ID returned".into())),
            Err(CrmError::RemoteApi { message, .. }) if is_constraint_violation(&message) => {
                warn!(error = %message, "Contribution rejected by constraint, retrying with reduced payload");
                self.retry_reduced(contact_id, order).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn retry_reduced(
        &self,
        contact_id: CrmContactId,
        order: &OrderEvent,
    ) -> Result<CrmContributionId, SyncError> {
        match self.create(self.reduced_payload(contact_id, order)).await {
            Ok(Some(id)) => {
                info!(contribution_id = %id, contact_id = %contact_id, "Contribution created with reduced payload");
                Ok(id)
            }
            Ok(None) => Err(SyncError::ContributionCreation(
                "no ID returned for reduced payload".into(),
            )),
            Err(e) => Err(SyncError::ContributionCreation(format!(
                "reduced payload rejected: {e}"
            ))),
        }
    }

    async fn create(&self, values: Map<String, Value>) -> Result<Option<CrmContributionId>, CrmError> {
        let response = self
            .transport
            .send(CrmRequest::create(CrmEntity::Contribution, values))
            .await?;
        Ok(response.first_id("id").map(CrmContributionId::new))
    }
}

/// Order total as a JSON float
fn amount(order: &OrderEvent) -> Value {
    match order.total().to_f64() {
        Ok(value) => json!(value),
        // Not reachable for any real order total; let the CRM reject it.
        Err(_) => json!(order.total_amount.to_string()),
    }
}
