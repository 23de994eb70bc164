//! Core Kernel - Foundational types for the order-to-CRM sync workspace
//!
//! This crate provides the building blocks used by every other crate:
//! - Money and ISO 4217 currency codes with precise decimal arithmetic
//! - Strongly-typed order and CRM identifiers
//! - Port infrastructure (marker traits and health checks)

pub mod money;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Money, CurrencyCode, MoneyError};
pub use identifiers::{OrderId, CrmContactId, CrmContributionId, SyncRunId};
pub use error::CoreError;
pub use ports::{DomainPort, AdapterHealth, HealthCheckResult, HealthCheckable};
