//! Sync Orchestrator
//!
//! Drives one order through the pipeline:
//!
//! ```text
//! Pending → ResolvingContact → CreatingContribution → MarkingSynced → Done
//!     │            │                    │                   │
//!     └────────────┴────────────────────┴───────────────────┴──→ Failed(stage, kind)
//! ```
//!
//! Steps run strictly in sequence. Failures before the contribution exists
//! release the claim so a later delivery can try again; nothing already
//! written to the CRM is rolled back. Once the contribution exists the claim
//! is never released: if its sync record cannot be written the order stays
//! claimed and fails as `Unrecorded`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use core_kernel::{CrmContactId, CrmContributionId, OrderId, SyncRunId};

use crate::config::SyncConfig;
use crate::contact::ContactResolver;
use crate::contribution::ContributionBuilder;
use crate::error::{SyncError, SyncErrorKind};
use crate::idempotency::{ClaimOutcome, ClaimToken, IdempotencyGuard};
use crate::mapping::FieldMappingTable;
use crate::order::OrderEvent;
use crate::ports::{CrmTransport, SyncRecordStore};

/// Pipeline stage an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Validation,
    Claim,
    ResolvingContact,
    CreatingContribution,
    MarkingSynced,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::Validation => "validation",
            SyncStage::Claim => "claim",
            SyncStage::ResolvingContact => "resolving_contact",
            SyncStage::CreatingContribution => "creating_contribution",
            SyncStage::MarkingSynced => "marking_synced",
        };
        f.write_str(name)
    }
}

impl SyncStage {
    /// State the pipeline is in while this stage runs
    pub fn state(self) -> SyncState {
        match self {
            SyncStage::Validation | SyncStage::Claim => SyncState::Pending,
            SyncStage::ResolvingContact => SyncState::ResolvingContact,
            SyncStage::CreatingContribution => SyncState::CreatingContribution,
            SyncStage::MarkingSynced => SyncState::MarkingSynced,
        }
    }
}

/// Lifecycle of a single synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    ResolvingContact,
    CreatingContribution,
    MarkingSynced,
    Done,
    Failed { stage: SyncStage, kind: SyncErrorKind },
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Done | SyncState::Failed { .. })
    }
}

/// Outcome handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub order_id: OrderId,
    pub contact_id: Option<CrmContactId>,
    pub contribution_id: Option<CrmContributionId>,
    /// True when this delivery did no CRM writes because another one owns
    /// or already completed the order
    pub skipped: bool,
}

impl SyncResult {
    fn skipped(order_id: OrderId, ids: Option<(CrmContactId, CrmContributionId)>) -> Self {
        Self {
            order_id,
            contact_id: ids.map(|(c, _)| c),
            contribution_id: ids.map(|(_, c)| c),
            skipped: true,
        }
    }

    pub fn state(&self) -> SyncState {
        SyncState::Done
    }
}

/// A failed synchronization
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Sync of order {order_id} failed during {stage}: {error}")]
pub struct SyncFailure {
    pub order_id: OrderId,
    pub stage: SyncStage,
    #[source]
    pub error: SyncError,
}

impl SyncFailure {
    pub fn kind(&self) -> SyncErrorKind {
        self.error.kind()
    }

    pub fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }

    pub fn state(&self) -> SyncState {
        SyncState::Failed {
            stage: self.stage,
            kind: self.kind(),
        }
    }
}

pub struct SyncOrchestrator {
    mappings: FieldMappingTable,
    guard: IdempotencyGuard,
    contacts: ContactResolver,
    contributions: ContributionBuilder,
}

impl SyncOrchestrator {
    pub fn new(
        config: &SyncConfig,
        transport: Arc<dyn CrmTransport>,
        store: Arc<dyn SyncRecordStore>,
    ) -> Self {
        Self {
            mappings: config.field_mappings.clone(),
            guard: IdempotencyGuard::new(store, config.claim_ttl),
            contacts: ContactResolver::new(transport.clone()),
            contributions: ContributionBuilder::new(
                transport,
                config.contribution_defaults,
                config.payment_instruments.clone(),
            ),
        }
    }

    pub fn guard(&self) -> &IdempotencyGuard {
        &self.guard
    }

    /// Synchronizes one order; safe to call repeatedly for the same order
    #[instrument(skip(self, order), fields(order_id = %order.order_id, run_id = %SyncRunId::new_v7()))]
    pub async fn synchronize(&self, order: &OrderEvent) -> Result<SyncResult, SyncFailure> {
        let order_id = order.order_id.clone();
        let fail = |stage: SyncStage, error: SyncError| SyncFailure {
            order_id: order.order_id.clone(),
            stage,
            error,
        };

        order
            .validate()
            .map_err(|e| fail(SyncStage::Validation, e.into()))?;

        let token = match self
            .guard
            .claim(&order_id)
            .await
            .map_err(|e| fail(SyncStage::Claim, e))?
        {
            ClaimOutcome::Claimed(token) => token,
            ClaimOutcome::AlreadySynced(record) => {
                info!(contribution_id = %record.contribution_id, "Order already synced, skipping");
                return Ok(SyncResult::skipped(
                    order_id,
                    Some((record.contact_id, record.contribution_id)),
                ));
            }
            ClaimOutcome::InProgress => {
                info!("Order is being synced by another delivery, skipping");
                return Ok(SyncResult::skipped(order_id, None));
            }
        };

        let mapped = self.mappings.resolve(order);

        enter(SyncStage::ResolvingContact);
        let contact = match self.contacts.resolve(&mapped).await {
            Ok(resolution) => resolution,
            Err(e) => return Err(self.abort(token, fail(SyncStage::ResolvingContact, e)).await),
        };

        enter(SyncStage::CreatingContribution);
        let contribution_id = match self
            .contributions
            .submit(contact.contact_id, order, &mapped.contribution)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                return Err(self
                    .abort(token, fail(SyncStage::CreatingContribution, e))
                    .await)
            }
        };

        enter(SyncStage::MarkingSynced);
        match self
            .record_outcome(&order_id, contact.contact_id, contribution_id)
            .await
        {
            Ok(()) => {}
            Err(SyncError::AlreadySynced { .. }) => {
                // Lost a race after a stale-claim takeover.
                let existing = self.guard.record(&order_id).await.ok().flatten();
                error!(
                    contribution_id = %contribution_id,
                    existing = ?existing.as_ref().map(|r| r.contribution_id),
                    "Order was completed by another delivery; contribution may be duplicated"
                );
                return Ok(SyncResult::skipped(
                    order_id,
                    existing.map(|r| (r.contact_id, r.contribution_id)),
                ));
            }
            Err(e) => {
                // The contribution exists; keep the claim so no retry writes another.
                let failure = fail(
                    SyncStage::MarkingSynced,
                    SyncError::Unrecorded {
                        contribution_id,
                        message: e.to_string(),
                    },
                );
                error!(
                    contact_id = %contact.contact_id,
                    contribution_id = %contribution_id,
                    error = %e,
                    "Contribution created but sync record not written; claim kept"
                );
                return Err(failure);
            }
        }

        debug!(state = ?SyncState::Done, "Sync state transition");
        info!(
            contact_id = %contact.contact_id,
            contribution_id = %contribution_id,
            matched_by = ?contact.matched_by,
            "Order synced"
        );

        Ok(SyncResult {
            order_id,
            contact_id: Some(contact.contact_id),
            contribution_id: Some(contribution_id),
            skipped: false,
        })
    }

    /// Writes the sync record, retrying a store failure once
    async fn record_outcome(
        &self,
        order_id: &OrderId,
        contact_id: CrmContactId,
        contribution_id: CrmContributionId,
    ) -> Result<(), SyncError> {
        match self
            .guard
            .mark_synced(order_id, contact_id, contribution_id)
            .await
        {
            Ok(_) => Ok(()),
            Err(e @ SyncError::AlreadySynced { .. }) => Err(e),
            Err(e) => {
                warn!(error = %e, "Writing sync record failed, retrying once");
                self.guard
                    .mark_synced(order_id, contact_id, contribution_id)
                    .await
                    .map(|_| ())
            }
        }
    }

    async fn abort(&self, token: ClaimToken, failure: SyncFailure) -> SyncFailure {
        debug!(state = ?failure.state(), "Sync state transition");
        warn!(
            stage = %failure.stage,
            kind = %failure.kind(),
            error = %failure.error,
            retryable = failure.is_retryable(),
            "Order sync failed"
        );
        if let Err(e) = self.guard.release(&failure.order_id, token).await {
            warn!(error = %e, "Failed to release claim");
        }
        failure
    }
}

fn enter(stage: SyncStage) {
    debug!(state = ?stage.state(), "Sync state transition");
}
