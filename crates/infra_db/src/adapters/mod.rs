//! PostgreSQL adapters for the sync core's ports

pub mod settings;
pub mod sync_records;

pub use settings::PgSettingsStore;
pub use sync_records::PgSyncRecordStore;
