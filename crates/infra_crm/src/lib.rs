//! CRM Infrastructure Layer
//!
//! Adapters that connect the sync core to the outside world:
//!
//! - [`transport::HttpCrmTransport`]: `CrmTransport` over HTTP with reqwest
//! - [`config::EnvSettingsStore`]: `SettingsStore` over `CRM_SYNC_*` variables
//! - [`telemetry::init_tracing`]: subscriber setup for binaries and tools
//!
//! # Examples
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use domain_sync::{InMemorySyncRecordStore, SyncConfig, SyncOrchestrator};
//! use infra_crm::{init_tracing, CrmTransportConfig, EnvSettingsStore, HttpCrmTransport};
//!
//! let settings = EnvSettingsStore::from_env()?;
//! init_tracing(&settings.settings().log_level, settings.settings().log_json);
//!
//! let config = SyncConfig::load(&settings).await?;
//! let transport = HttpCrmTransport::new(CrmTransportConfig::from_sync_config(&config))?;
//! let orchestrator = SyncOrchestrator::new(
//!     &config,
//!     Arc::new(transport),
//!     Arc::new(InMemorySyncRecordStore::new()),
//! );
//! let result = orchestrator.synchronize(&order).await?;
//! ```

pub mod config;
pub mod telemetry;
pub mod transport;

pub use config::{EnvSettings, EnvSettingsStore};
pub use telemetry::init_tracing;
pub use transport::{ConnectionStatus, CrmTransportConfig, HttpCrmTransport};
