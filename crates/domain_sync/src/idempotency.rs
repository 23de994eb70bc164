//! Idempotency Guard
//!
//! Guarantees at most one contribution per order even when the same order
//! event is delivered several times, possibly concurrently. A delivery first
//! *claims* the order (atomic create-if-absent), and only the claimant may
//! go on to write to the CRM. A completed record is write-once.
//!
//! Claims carry a timestamp; a claim older than the configured TTL is
//! considered abandoned and may be taken over by a later delivery. The
//! timestamp doubles as the claim's [`ClaimToken`]: a release only succeeds
//! while the stored claim still carries the releasing delivery's token.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use core_kernel::{CrmContactId, CrmContributionId, DomainPort, OrderId};

use crate::error::SyncError;
use crate::ports::SyncRecordStore;

/// Key namespace for sync records in key-value stores
pub const RECORD_NAMESPACE: &str = "civicrm_sync";

/// Store key for an order's sync record
pub fn record_key(order_id: &OrderId) -> String {
    format!("{RECORD_NAMESPACE}:{order_id}")
}

/// Outcome of a completed synchronization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub order_id: OrderId,
    pub contact_id: CrmContactId,
    pub contribution_id: CrmContributionId,
    pub synced_at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn new(
        order_id: OrderId,
        contact_id: CrmContactId,
        contribution_id: CrmContributionId,
    ) -> Self {
        Self {
            order_id,
            contact_id,
            contribution_id,
            synced_at: Utc::now(),
        }
    }
}

/// Identifies one particular claim on an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimToken(DateTime<Utc>);

impl ClaimToken {
    pub fn new(claimed_at: DateTime<Utc>) -> Self {
        Self(claimed_at)
    }

    pub fn claimed_at(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Result of trying to claim an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This delivery owns the order and may write to the CRM
    Claimed(ClaimToken),
    /// A previous delivery completed the order
    AlreadySynced(SyncRecord),
    /// Another delivery holds a live claim
    InProgress,
}

#[derive(Debug, Clone)]
enum Entry {
    Claimed { at: DateTime<Utc> },
    Synced(SyncRecord),
}

/// Process-local sync record store
#[derive(Debug, Default, Clone)]
pub struct InMemorySyncRecordStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemorySyncRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed records
    pub async fn synced_count(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| matches!(e, Entry::Synced(_)))
            .count()
    }

    /// Inserts a claim with an explicit timestamp
    pub async fn insert_claim(&self, order_id: &OrderId, at: DateTime<Utc>) -> ClaimToken {
        self.entries
            .lock()
            .await
            .insert(record_key(order_id), Entry::Claimed { at });
        ClaimToken::new(at)
    }
}

impl DomainPort for InMemorySyncRecordStore {}

#[async_trait::async_trait]
impl SyncRecordStore for InMemorySyncRecordStore {
    async fn find(&self, order_id: &OrderId) -> Result<Option<SyncRecord>, SyncError> {
        let entries = self.entries.lock().await;
        Ok(match entries.get(&record_key(order_id)) {
            Some(Entry::Synced(record)) => Some(record.clone()),
            _ => None,
        })
    }

    async fn claim(&self, order_id: &OrderId, ttl: Duration) -> Result<ClaimOutcome, SyncError> {
        let mut entries = self.entries.lock().await;
        let key = record_key(order_id);
        let now = Utc::now();

        match entries.get(&key) {
            Some(Entry::Synced(record)) => return Ok(ClaimOutcome::AlreadySynced(record.clone())),
            Some(Entry::Claimed { at }) if now - *at < ttl => return Ok(ClaimOutcome::InProgress),
            Some(Entry::Claimed { at }) => {
                debug!(order_id = %order_id, claimed_at = %at, "Taking over stale claim");
            }
            None => {}
        }

        entries.insert(key, Entry::Claimed { at: now });
        Ok(ClaimOutcome::Claimed(ClaimToken::new(now)))
    }

    async fn complete(&self, record: &SyncRecord) -> Result<(), SyncError> {
        let mut entries = self.entries.lock().await;
        let key = record_key(&record.order_id);

        if let Some(Entry::Synced(_)) = entries.get(&key) {
            return Err(SyncError::AlreadySynced {
                order_id: record.order_id.clone(),
            });
        }
        entries.insert(key, Entry::Synced(record.clone()));
        Ok(())
    }

    async fn release(&self, order_id: &OrderId, token: ClaimToken) -> Result<bool, SyncError> {
        let mut entries = self.entries.lock().await;
        let key = record_key(order_id);
        match entries.get(&key) {
            Some(Entry::Claimed { at }) if *at == token.claimed_at() => {
                entries.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Default lifetime of an uncompleted claim
pub fn default_claim_ttl() -> Duration {
    Duration::minutes(10)
}

/// Idempotency operations over a [`SyncRecordStore`]
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn SyncRecordStore>,
    claim_ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn SyncRecordStore>, claim_ttl: Duration) -> Self {
        Self { store, claim_ttl }
    }

    pub async fn has_synced(&self, order_id: &OrderId) -> Result<bool, SyncError> {
        Ok(self.store.find(order_id).await?.is_some())
    }

    pub async fn record(&self, order_id: &OrderId) -> Result<Option<SyncRecord>, SyncError> {
        self.store.find(order_id).await
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn claim(&self, order_id: &OrderId) -> Result<ClaimOutcome, SyncError> {
        let outcome = self.store.claim(order_id, self.claim_ttl).await?;
        debug!(outcome = ?outcome, "Claim attempted");
        Ok(outcome)
    }

    /// Records the outcome; fails with `AlreadySynced` if one already exists
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_synced(
        &self,
        order_id: &OrderId,
        contact_id: CrmContactId,
        contribution_id: CrmContributionId,
    ) -> Result<SyncRecord, SyncError> {
        let record = SyncRecord::new(order_id.clone(), contact_id, contribution_id);
        self.store.complete(&record).await?;
        info!(
            contact_id = %contact_id,
            contribution_id = %contribution_id,
            "Order marked as synced"
        );
        Ok(record)
    }

    /// Drops this delivery's claim; a claim taken over by someone else stays
    #[instrument(skip(self, token), fields(order_id = %order_id))]
    pub async fn release(&self, order_id: &OrderId, token: ClaimToken) -> Result<bool, SyncError> {
        let released = self.store.release(order_id, token).await?;
        if !released {
            debug!("Claim no longer ours, left in place");
        }
        Ok(released)
    }
}

impl std::fmt::Debug for IdempotencyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyGuard")
            .field("claim_ttl", &self.claim_ttl)
            .finish_non_exhaustive()
    }
}
