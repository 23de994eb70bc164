//! Ports and Adapters Infrastructure
//!
//! Foundational marker traits and health types shared by every port in the
//! workspace. The sync core defines its own port traits (CRM transport,
//! sync record store, settings store) on top of these, and the infra crates
//! provide the adapters.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              Sync Orchestrator               │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │                 Port Traits                  │
//! │ CrmTransport, SyncRecordStore, SettingsStore │
//! └──────────────────────────────────────────────┘
//!            ▲                        ▲
//!  ┌─────────┴─────────┐    ┌─────────┴─────────┐
//!  │   HTTP adapter    │    │  Postgres / mem   │
//!  │    (infra_crm)    │    │    (infra_db)     │
//!  └───────────────────┘    └───────────────────┘
//! ```

use serde::{Deserialize, Serialize};

/// Marker trait for all domain ports
///
/// Ports are shared behind `Arc` across async tasks, so every
/// implementation must be thread-safe.
pub trait DomainPort: Send + Sync + 'static {}

/// Health status for an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    /// Adapter is healthy and operational
    Healthy,
    /// Adapter is degraded but operational
    Degraded,
    /// Adapter is unhealthy and not operational
    Unhealthy,
    /// Health status is unknown
    Unknown,
}

/// Health check result for an adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Adapter identifier
    pub adapter_id: String,
    /// Current health status
    pub status: AdapterHealth,
    /// Latency of the health check in milliseconds
    pub latency_ms: u64,
    /// Optional message with additional details
    pub message: Option<String>,
    /// Timestamp of the health check
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl HealthCheckResult {
    /// Builds a result stamped with the current time
    pub fn new(
        adapter_id: impl Into<String>,
        status: AdapterHealth,
        latency_ms: u64,
        message: Option<String>,
    ) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status,
            latency_ms,
            message,
            checked_at: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == AdapterHealth::Healthy
    }
}

/// Trait for adapters that support health checks
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    /// Performs a health check on the adapter
    async fn health_check(&self) -> HealthCheckResult;
}
