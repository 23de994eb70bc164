//! Typed CRM requests and the normalized response envelope
//!
//! Every call the sync core makes is one `CrmRequest`: an entity, an action
//! and a parameter set. Responses are normalized into a single shape at the
//! transport boundary, whatever form the remote `values` arrived in.

use std::fmt;

use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::CrmError;

/// CRM entities the sync core talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrmEntity {
    Contact,
    Email,
    Phone,
    Address,
    Contribution,
}

impl CrmEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrmEntity::Contact => "Contact",
            CrmEntity::Email => "Email",
            CrmEntity::Phone => "Phone",
            CrmEntity::Address => "Address",
            CrmEntity::Contribution => "Contribution",
        }
    }
}

impl fmt::Display for CrmEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrmAction {
    Get,
    Create,
    Update,
    GetFields,
}

impl CrmAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrmAction::Get => "get",
            CrmAction::Create => "create",
            CrmAction::Update => "update",
            CrmAction::GetFields => "getFields",
        }
    }

    /// Actions that change remote state
    pub fn is_write(&self) -> bool {
        matches!(self, CrmAction::Create | CrmAction::Update)
    }
}

impl fmt::Display for CrmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operators accepted in `where` clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
        }
    }
}

/// One `[field, operator, value]` triple
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.field)?;
        tuple.serialize_element(self.op.as_str())?;
        tuple.serialize_element(&self.value)?;
        tuple.end()
    }
}

/// A single API call
///
/// Values can only be attached through [`create`](Self::create) and
/// [`update`](Self::update); read requests never carry a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CrmRequest {
    entity: CrmEntity,
    action: CrmAction,
    select: Vec<String>,
    filters: Vec<Condition>,
    values: Map<String, Value>,
    limit: Option<u32>,
}

impl CrmRequest {
    fn new(entity: CrmEntity, action: CrmAction) -> Self {
        Self {
            entity,
            action,
            select: Vec::new(),
            filters: Vec::new(),
            values: Map::new(),
            limit: None,
        }
    }

    pub fn get(entity: CrmEntity) -> Self {
        Self::new(entity, CrmAction::Get)
    }

    pub fn get_fields(entity: CrmEntity) -> Self {
        Self::new(entity, CrmAction::GetFields)
    }

    pub fn create(entity: CrmEntity, values: Map<String, Value>) -> Self {
        let mut request = Self::new(entity, CrmAction::Create);
        request.values = strip_pseudo_fields(values);
        request
    }

    pub fn update(entity: CrmEntity, values: Map<String, Value>) -> Self {
        let mut request = Self::new(entity, CrmAction::Update);
        request.values = strip_pseudo_fields(values);
        request
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.filters.push(Condition {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn entity(&self) -> CrmEntity {
        self.entity
    }

    pub fn action(&self) -> CrmAction {
        self.action
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn filters(&self) -> &[Condition] {
        &self.filters
    }

    pub fn selected(&self) -> &[String] {
        &self.select
    }

    pub fn row_limit(&self) -> Option<u32> {
        self.limit
    }

    /// Path below the site base URL
    pub fn path(&self) -> String {
        format!("civicrm/ajax/api4/{}/{}", self.entity, self.action)
    }

    /// The `params` document sent to the API
    pub fn params(&self) -> Value {
        let mut params = Map::new();
        if !self.select.is_empty() {
            params.insert("select".into(), json!(self.select));
        }
        if !self.filters.is_empty() {
            params.insert("where".into(), json!(self.filters));
        }
        if self.action.is_write() {
            params.insert("values".into(), Value::Object(self.values.clone()));
        }
        if let Some(limit) = self.limit {
            params.insert("limit".into(), json!(limit));
        }
        params.insert("checkPermissions".into(), Value::Bool(false));
        Value::Object(params)
    }
}

/// Drops `field:suffix` pseudo-field keys the API rejects on write
fn strip_pseudo_fields(mut values: Map<String, Value>) -> Map<String, Value> {
    values.retain(|key, _| {
        let keep = !key.contains(':');
        if !keep {
            debug!(field = %key, "Stripped pseudo-field from write request");
        }
        keep
    });
    values
}

/// Normalized API response: always a list of records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrmResponse {
    pub values: Vec<Map<String, Value>>,
}

impl CrmResponse {
    pub fn new(values: Vec<Map<String, Value>>) -> Self {
        Self { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn first(&self) -> Option<&Map<String, Value>> {
        self.values.first()
    }

    /// Integer `key` of the first record; numeric strings are accepted
    pub fn first_id(&self, key: &str) -> Option<i64> {
        self.first().and_then(|record| record.get(key)).and_then(as_id)
    }

    /// Normalizes a raw HTTP status and body into a response or error
    pub fn from_envelope(status: u16, body: &str) -> Result<Self, CrmError> {
        let success = (200..300).contains(&status);

        let envelope: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(e) if success => {
                return Err(CrmError::malformed(format!(
                    "response is not JSON ({e}): {}",
                    excerpt(body)
                )))
            }
            Err(_) => return Err(CrmError::remote(Some(status), excerpt(body))),
        };

        if let Some(message) = error_message(&envelope) {
            return Err(CrmError::remote(Some(status), message));
        }
        if !success {
            return Err(CrmError::remote(Some(status), excerpt(body)));
        }

        let values = match envelope.get("values") {
            None => return Err(CrmError::malformed("response has no values")),
            Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => records(items.iter())?,
            Some(Value::Object(map)) => records(map.values())?,
            Some(other) => {
                return Err(CrmError::malformed(format!(
                    "values has unexpected shape: {other}"
                )))
            }
        };
        Ok(Self { values })
    }
}

fn records<'a>(items: impl Iterator<Item = &'a Value>) -> Result<Vec<Map<String, Value>>, CrmError> {
    items
        .map(|item| match item {
            Value::Object(record) => Ok(record.clone()),
            other => Err(CrmError::malformed(format!("record is not an object: {other}"))),
        })
        .collect()
}

fn error_message(envelope: &Value) -> Option<String> {
    let message = match envelope.get("error_message") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };
    let flagged = match envelope.get("is_error") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() != Some(0),
        Some(Value::String(s)) => s != "0" && !s.is_empty(),
        _ => false,
    };
    match (message, flagged) {
        (Some(message), _) => Some(message),
        (None, true) => Some("CRM reported an error without a message".to_string()),
        (None, false) => None,
    }
}

fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn excerpt(body: &str) -> String {
    const MAX: usize = 512;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_request_params() {
        let request = CrmRequest::get(CrmEntity::Email)
            .select(["id", "contact_id"])
            .filter("email", Operator::Eq, "a@b.org")
            .limit(1);

        assert_eq!(request.path(), "civicrm/ajax/api4/Email/get");
        assert_eq!(
            request.params(),
            json!({
                "select": ["id", "contact_id"],
                "where": [["email", "=", "a@b.org"]],
                "limit": 1,
                "checkPermissions": false
            })
        );
    }

    #[test]
    fn test_write_strips_pseudo_fields() {
        let mut values = Map::new();
        values.insert("first_name".into(), json!("Ann"));
        values.insert("prefix_id:label".into(), json!("Dr."));
        let request = CrmRequest::create(CrmEntity::Contact, values);

        assert_eq!(request.values().len(), 1);
        assert_eq!(request.params()["values"], json!({"first_name": "Ann"}));
        assert_eq!(request.path(), "civicrm/ajax/api4/Contact/create");
    }

    #[test]
    fn test_get_fields_path() {
        let request = CrmRequest::get_fields(CrmEntity::Contribution);
        assert_eq!(request.path(), "civicrm/ajax/api4/Contribution/getFields");
        assert!(!request.action().is_write());
    }

    #[test]
    fn test_envelope_array_values() {
        let response =
            CrmResponse::from_envelope(200, r#"{"values":[{"id":"12","contact_id":7}],"count":1}"#)
                .unwrap();
        assert_eq!(response.len(), 1);
        assert_eq!(response.first_id("id"), Some(12));
        assert_eq!(response.first_id("contact_id"), Some(7));
    }

    #[test]
    fn test_envelope_object_map_values() {
        let response =
            CrmResponse::from_envelope(200, r#"{"values":{"42":{"id":42}}}"#).unwrap();
        assert_eq!(response.first_id("id"), Some(42));
    }

    #[test]
    fn test_envelope_null_values_is_empty() {
        let response = CrmResponse::from_envelope(200, r#"{"values":null}"#).unwrap();
        assert!(response.is_empty());
    }

    #[test]
    fn test_envelope_error_message_is_verbatim() {
        let err = CrmResponse::from_envelope(
            200,
            r#"{"error_message":"DB Error: constraint violation","is_error":1}"#,
        )
        .unwrap_err();
        assert_eq!(err.remote_message(), Some("DB Error: constraint violation"));
    }

    #[test]
    fn test_envelope_is_error_without_message() {
        let err = CrmResponse::from_envelope(200, r#"{"is_error":1,"values":[]}"#).unwrap_err();
        assert!(matches!(err, CrmError::RemoteApi { .. }));
    }

    #[test]
    fn test_non_2xx_is_remote_error_with_body() {
        let err = CrmResponse::from_envelope(403, "Forbidden").unwrap_err();
        assert_eq!(
            err,
            CrmError::RemoteApi {
                status: Some(403),
                message: "Forbidden".into()
            }
        );
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(matches!(
            CrmResponse::from_envelope(200, "<html>oops</html>"),
            Err(CrmError::MalformedResponse(_))
        ));
        assert!(matches!(
            CrmResponse::from_envelope(200, r#"{"count":0}"#),
            Err(CrmError::MalformedResponse(_))
        ));
    }
}
