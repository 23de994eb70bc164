//! PostgreSQL settings adapter
//!
//! Settings live in `sync_settings` as JSONB, keyed by the same names the
//! shop platform uses (`wc_civicrm_url`, ...).

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::DomainPort;
use domain_sync::{SettingsStore, SyncError};

use crate::error::DatabaseError;

/// PostgreSQL-backed [`SettingsStore`]
#[derive(Debug, Clone)]
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a setting
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &Value) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO sync_settings (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::classify)?;
        Ok(())
    }
}

impl DomainPort for PgSettingsStore {}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError> {
        let value = sqlx::query_scalar::<_, Value>("SELECT value FROM sync_settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::classify)?;
        Ok(value)
    }
}
