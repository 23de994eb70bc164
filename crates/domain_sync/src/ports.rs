//! Ports for the synchronization core
//!
//! The core owns neither the CRM nor the durable stores; it reaches them
//! through these traits. Adapters live in `infra_crm` and `infra_db`.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;

use core_kernel::{DomainPort, OrderId};

use crate::crm::{CrmRequest, CrmResponse};
use crate::error::{CrmError, SyncError};
use crate::idempotency::{ClaimOutcome, ClaimToken, SyncRecord};

/// Sends one request to the CRM and returns the normalized envelope
#[async_trait]
pub trait CrmTransport: DomainPort {
    async fn send(&self, request: CrmRequest) -> Result<CrmResponse, CrmError>;
}

/// Durable storage of sync records with an atomic claim
#[async_trait]
pub trait SyncRecordStore: DomainPort {
    /// Returns the completed record for an order, if any
    async fn find(&self, order_id: &OrderId) -> Result<Option<SyncRecord>, SyncError>;

    /// Atomically creates an in-flight marker unless a completed record or
    /// a live claim younger than `ttl` exists
    async fn claim(&self, order_id: &OrderId, ttl: Duration) -> Result<ClaimOutcome, SyncError>;

    /// Stores the completed record; `SyncError::AlreadySynced` if one exists
    async fn complete(&self, record: &SyncRecord) -> Result<(), SyncError>;

    /// Drops an uncompleted claim if it still carries `token`; returns
    /// whether a claim was dropped. Completed records are left alone.
    async fn release(&self, order_id: &OrderId, token: ClaimToken) -> Result<bool, SyncError>;
}

/// Read-only access to persisted plugin settings
#[async_trait]
pub trait SettingsStore: DomainPort {
    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError>;
}

/// Mock implementations for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    use serde_json::{json, Map};
    use tokio::sync::RwLock;

    use crate::crm::{CrmAction, CrmEntity, Operator};

    #[derive(Debug, Default)]
    struct MockState {
        next_id: i64,
        records: HashMap<CrmEntity, Vec<Map<String, Value>>>,
        fields: HashMap<CrmEntity, Vec<String>>,
        requests: Vec<CrmRequest>,
        failures: VecDeque<(CrmEntity, CrmAction, CrmError)>,
        empty_creates: Vec<CrmEntity>,
    }

    /// In-memory CRM that records every request it receives.
    ///
    /// Supports `get` with `=` filters, `create`, `update` by id and
    /// `getFields`. Failures can be scripted per entity and action.
    #[derive(Debug, Clone)]
    pub struct MockCrm {
        state: Arc<RwLock<MockState>>,
    }

    impl Default for MockCrm {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockCrm {
        pub fn new() -> Self {
            Self {
                state: Arc::new(RwLock::new(MockState {
                    next_id: 1,
                    ..Default::default()
                })),
            }
        }

        /// Declares the fields `getFields` returns for an entity
        pub fn with_fields<I, S>(self, entity: CrmEntity, names: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            let names = names.into_iter().map(Into::into).collect();
            if let Ok(mut state) = self.state.try_write() {
                state.fields.insert(entity, names);
            }
            self
        }

        /// Inserts a record directly, bypassing request logging; returns its id
        pub async fn seed(&self, entity: CrmEntity, values: Value) -> i64 {
            let mut state = self.state.write().await;
            let id = state.next_id;
            state.next_id += 1;
            let mut record = match values {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            record.insert("id".into(), json!(id));
            state.records.entry(entity).or_default().push(record);
            id
        }

        /// Makes the next matching request fail with `error`
        pub async fn fail_next(&self, entity: CrmEntity, action: CrmAction, error: CrmError) {
            self.state
                .write()
                .await
                .failures
                .push_back((entity, action, error));
        }

        /// Makes creates of `entity` succeed without returning a record
        pub async fn return_no_id_on_create(&self, entity: CrmEntity) {
            self.state.write().await.empty_creates.push(entity);
        }

        pub async fn records(&self, entity: CrmEntity) -> Vec<Map<String, Value>> {
            self.state
                .read()
                .await
                .records
                .get(&entity)
                .cloned()
                .unwrap_or_default()
        }

        pub async fn requests(&self) -> Vec<CrmRequest> {
            self.state.read().await.requests.clone()
        }

        pub async fn request_count(&self, entity: CrmEntity, action: CrmAction) -> usize {
            self.state
                .read()
                .await
                .requests
                .iter()
                .filter(|r| r.entity() == entity && r.action() == action)
                .count()
        }

        /// Number of create or update requests received
        pub async fn write_count(&self) -> usize {
            self.state
                .read()
                .await
                .requests
                .iter()
                .filter(|r| r.action().is_write())
                .count()
        }
    }

    fn loosely_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::String(x), Value::String(y)) => x == y,
            (Value::String(s), other) | (other, Value::String(s)) => *s == other.to_string(),
            _ => a == b,
        }
    }

    fn record_matches(record: &Map<String, Value>, request: &CrmRequest) -> bool {
        request.filters().iter().all(|c| match c.op {
            Operator::Eq => record
                .get(&c.field)
                .map(|v| loosely_equal(v, &c.value))
                .unwrap_or(false),
            _ => true,
        })
    }

    impl DomainPort for MockCrm {}

    #[async_trait]
    impl CrmTransport for MockCrm {
        async fn send(&self, request: CrmRequest) -> Result<CrmResponse, CrmError> {
            // Lets concurrent deliveries interleave at every CRM call.
            tokio::task::yield_now().await;

            let mut state = self.state.write().await;
            state.requests.push(request.clone());

            let entity = request.entity();
            let action = request.action();

            if let Some(pos) = state
                .failures
                .iter()
                .position(|(e, a, _)| *e == entity && *a == action)
            {
                if let Some((_, _, error)) = state.failures.remove(pos) {
                    return Err(error);
                }
            }

            match action {
                CrmAction::Get => {
                    let limit = request.row_limit().map(|l| l as usize).unwrap_or(usize::MAX);
                    let values = state
                        .records
                        .get(&entity)
                        .map(|records| {
                            records
                                .iter()
                                .filter(|r| record_matches(r, &request))
                                .take(limit)
                                .cloned()
                                .collect()
                        })
                        .unwrap_or_default();
                    Ok(CrmResponse::new(values))
                }
                CrmAction::Create => {
                    if state.empty_creates.contains(&entity) {
                        return Ok(CrmResponse::default());
                    }
                    let id = state.next_id;
                    state.next_id += 1;
                    let mut record = request.values().clone();
                    record.insert("id".into(), json!(id));
                    state.records.entry(entity).or_default().push(record.clone());
                    Ok(CrmResponse::new(vec![record]))
                }
                CrmAction::Update => {
                    let values = request.values().clone();
                    let updated: Vec<_> = state
                        .records
                        .entry(entity)
                        .or_default()
                        .iter_mut()
                        .filter(|r| record_matches(r, &request))
                        .map(|r| {
                            for (k, v) in &values {
                                r.insert(k.clone(), v.clone());
                            }
                            r.clone()
                        })
                        .collect();
                    Ok(CrmResponse::new(updated))
                }
                CrmAction::GetFields => {
                    let values = state
                        .fields
                        .get(&entity)
                        .map(|names| {
                            names
                                .iter()
                                .map(|name| {
                                    let mut field = Map::new();
                                    field.insert("name".into(), json!(name));
                                    field.insert("label".into(), json!(name));
                                    field.insert("data_type".into(), json!("String"));
                                    field
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    Ok(CrmResponse::new(values))
                }
            }
        }
    }

    /// Settings store backed by a map
    #[derive(Debug, Clone, Default)]
    pub struct MockSettingsStore {
        values: Arc<RwLock<HashMap<String, Value>>>,
    }

    impl MockSettingsStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn set(&self, key: &str, value: Value) {
            self.values.write().await.insert(key.to_string(), value);
        }
    }

    impl DomainPort for MockSettingsStore {}

    #[async_trait]
    impl SettingsStore for MockSettingsStore {
        async fn get(&self, key: &str) -> Result<Option<Value>, SyncError> {
            Ok(self.values.read().await.get(key).cloned())
        }
    }

}
