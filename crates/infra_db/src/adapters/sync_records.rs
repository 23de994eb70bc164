//! PostgreSQL Sync Record Adapter
//!
//! Implements `SyncRecordStore` on the `sync_records` table. Exactly-once
//! semantics rest on the primary key over `order_id`:
//!
//! - **claim** inserts a pending row, or takes over a pending row whose
//!   `claimed_at` is older than the TTL, in a single `INSERT ... ON CONFLICT
//!   DO UPDATE ... WHERE` statement. A returned row means this caller won.
//! - **complete** upserts the ids and `synced_at`, but only over a row that
//!   is not yet completed. Zero affected rows means someone else finished.
//! - **release** deletes the row only while it is still pending and its
//!   `claimed_at` still equals the releasing delivery's claim token.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{
    AdapterHealth, CrmContactId, CrmContributionId, DomainPort, HealthCheckResult,
    HealthCheckable, OrderId,
};
use domain_sync::{ClaimOutcome, ClaimToken, SyncError, SyncRecord, SyncRecordStore};

use crate::error::DatabaseError;

#[derive(Debug, sqlx::FromRow)]
struct SyncRecordRow {
    order_id: String,
    contact_id: Option<i64>,
    contribution_id: Option<i64>,
    synced_at: Option<DateTime<Utc>>,
}

impl SyncRecordRow {
    /// `None` while the row is only a claim
    fn into_record(self) -> Result<Option<SyncRecord>, DatabaseError> {
        let Some(synced_at) = self.synced_at else {
            return Ok(None);
        };
        match (self.contact_id, self.contribution_id) {
            (Some(contact_id), Some(contribution_id)) => Ok(Some(SyncRecord {
                order_id: OrderId::new(self.order_id),
                contact_id: CrmContactId::new(contact_id),
                contribution_id: CrmContributionId::new(contribution_id),
                synced_at,
            })),
            _ => Err(DatabaseError::CorruptRow(format!(
                "sync record for order {} is completed without ids",
                self.order_id
            ))),
        }
    }
}

/// PostgreSQL-backed [`SyncRecordStore`]
#[derive(Debug, Clone)]
pub struct PgSyncRecordStore {
    pool: PgPool,
}

impl PgSyncRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_row(&self, order_id: &OrderId) -> Result<Option<SyncRecordRow>, DatabaseError> {
        sqlx::query_as::<_, SyncRecordRow>(
            r#"
            SELECT order_id, contact_id, contribution_id, synced_at
            FROM sync_records
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::classify)
    }
}

impl DomainPort for PgSyncRecordStore {}

#[async_trait]
impl SyncRecordStore for PgSyncRecordStore {
    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn find(&self, order_id: &OrderId) -> Result<Option<SyncRecord>, SyncError> {
        Ok(match self.fetch_row(order_id).await? {
            Some(row) => row.into_record()?,
            None => None,
        })
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn claim(&self, order_id: &OrderId, ttl: Duration) -> Result<ClaimOutcome, SyncError> {
        let now = Utc::now();
        let stale_before = now - ttl;

        let won = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            INSERT INTO sync_records (order_id, claimed_at)
            VALUES ($1, $2)
            ON CONFLICT (order_id) DO UPDATE
                SET claimed_at = EXCLUDED.claimed_at
                WHERE sync_records.synced_at IS NULL
                  AND sync_records.claimed_at < $3
            RETURNING claimed_at
            "#,
        )
        .bind(order_id.as_str())
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::classify)?;

        // The stored value, not `now`: the column keeps microseconds only.
        if let Some(claimed_at) = won {
            debug!(claimed_at = %claimed_at, "Claim acquired");
            return Ok(ClaimOutcome::Claimed(ClaimToken::new(claimed_at)));
        }

        // Lost: either completed already or someone holds a live claim.
        match self.fetch_row(order_id).await? {
            Some(row) => match row.into_record()? {
                Some(record) => Ok(ClaimOutcome::AlreadySynced(record)),
                None => Ok(ClaimOutcome::InProgress),
            },
            // Released between the two statements; report as in progress and
            // let the next delivery claim it.
            None => Ok(ClaimOutcome::InProgress),
        }
    }

    #[instrument(skip(self, record), fields(order_id = %record.order_id))]
    async fn complete(&self, record: &SyncRecord) -> Result<(), SyncError> {
        let result = sqlx::query(
            r#"
            INSERT INTO sync_records (order_id, contact_id, contribution_id, claimed_at, synced_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (order_id) DO UPDATE
                SET contact_id = EXCLUDED.contact_id,
                    contribution_id = EXCLUDED.contribution_id,
                    synced_at = EXCLUDED.synced_at
                WHERE sync_records.synced_at IS NULL
            "#,
        )
        .bind(record.order_id.as_str())
        .bind(record.contact_id.get())
        .bind(record.contribution_id.get())
        .bind(record.synced_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::classify)?;

        if result.rows_affected() == 0 {
            return Err(SyncError::AlreadySynced {
                order_id: record.order_id.clone(),
            });
        }
        debug!("Sync record completed");
        Ok(())
    }

    #[instrument(skip(self, token), fields(order_id = %order_id))]
    async fn release(&self, order_id: &OrderId, token: ClaimToken) -> Result<bool, SyncError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sync_records
            WHERE order_id = $1
              AND synced_at IS NULL
              AND claimed_at = $2
            "#,
        )
        .bind(order_id.as_str())
        .bind(token.claimed_at())
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::classify)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl HealthCheckable for PgSyncRecordStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult::new("postgres-sync-records", AdapterHealth::Healthy, latency_ms, None),
            Err(e) => HealthCheckResult::new(
                "postgres-sync-records",
                AdapterHealth::Unhealthy,
                latency_ms,
                Some(format!("Database error: {e}")),
            ),
        }
    }
}
