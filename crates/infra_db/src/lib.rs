//! Infrastructure Database Layer
//!
//! PostgreSQL adapters for the sync core's durable ports, using SQLx.
//!
//! # Tables
//!
//! - `sync_records`: one row per order. The primary key on `order_id` is
//!   what makes the claim atomic; `INSERT ... ON CONFLICT` decides which
//!   delivery wins.
//! - `sync_settings`: JSONB key-value settings read by `SyncConfig::load`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgSyncRecordStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/crm_sync")).await?;
//! run_migrations(&pool).await?;
//! let store = Arc::new(PgSyncRecordStore::new(pool));
//! ```

pub mod pool;
pub mod error;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, create_pool_from_url, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use adapters::{PgSettingsStore, PgSyncRecordStore};
