//! Test Utilities Crate
//!
//! Shared test infrastructure for the order-to-CRM sync workspace.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built orders, settings and CRM states
//! - `builders`: Builder for order events
//! - `database`: PostgreSQL test containers
//! - `assertions`: Assertions over sync outcomes and recorded CRM traffic
//! - `generators`: Property-based and fake data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;

pub use domain_sync::{MockCrm, MockSettingsStore};
