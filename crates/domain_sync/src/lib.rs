//! Order-to-CRM Synchronization Core
//!
//! Turns a completed shop order into exactly one CRM contribution attached
//! to the right contact.
//!
//! # Pipeline
//!
//! 1. **Idempotency Guard** claims the order so concurrent or repeated
//!    deliveries cannot both write.
//! 2. **Field Mapping Resolver** projects the order into Contact-typed and
//!    Contribution-typed field maps using a declarative table.
//! 3. **Contact Resolution Engine** finds the contact by email, then by name,
//!    or creates it.
//! 4. **Contribution Builder** submits the contribution, with one reduced
//!    retry after a constraint violation.
//! 5. The outcome is recorded write-once and returned to the caller.
//!
//! The CRM and the durable stores are reached only through the traits in
//! [`ports`].
//!
//! # Examples
//!
//! ```rust
//! use domain_sync::{FieldMappingTable, OrderEvent};
//! use serde_json::json;
//!
//! let order: OrderEvent = serde_json::from_value(json!({
//!     "order_id": "1001",
//!     "currency": "USD",
//!     "total_amount": "19.99",
//!     "billing": { "first_name": "Jane", "last_name": "Doe", "email": "jane@example.com" },
//!     "created_at": "2024-03-01T12:30:00Z"
//! })).unwrap();
//!
//! let mapped = FieldMappingTable::default_table().resolve(&order);
//! assert_eq!(mapped.contact["email"], json!("jane@example.com"));
//! assert_eq!(mapped.contribution["total_amount"], json!(19.99));
//! ```

pub mod catalog;
pub mod config;
pub mod contact;
pub mod contribution;
pub mod crm;
pub mod error;
pub mod idempotency;
pub mod mapping;
pub mod orchestrator;
pub mod order;
pub mod ports;

pub use catalog::{CatalogSource, CrmField, FieldCatalog};
pub use config::{ContributionDefaults, PaymentInstrumentTable, SyncConfig};
pub use contact::{ContactCandidate, ContactKind, ContactMatch, ContactResolution, ContactResolver};
pub use contribution::ContributionBuilder;
pub use crm::{CrmAction, CrmEntity, CrmRequest, CrmResponse, Operator};
pub use error::{CrmError, SyncError, SyncErrorKind};
pub use idempotency::{ClaimOutcome, ClaimToken, IdempotencyGuard, InMemorySyncRecordStore, SyncRecord};
pub use mapping::{FieldMapping, FieldMappingTable, MappedFields, MappingTarget, TargetEntity};
pub use orchestrator::{SyncFailure, SyncOrchestrator, SyncResult, SyncStage, SyncState};
pub use order::{CustomerDetails, OrderEvent};
pub use ports::{CrmTransport, SettingsStore, SyncRecordStore};
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::{MockCrm, MockSettingsStore};
