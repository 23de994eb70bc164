//! Sync configuration
//!
//! `SyncConfig` is built once, from the settings store or by hand, and then
//! shared read-only by every component.

use std::collections::HashMap;
use std::fmt;

use chrono::Duration;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::SyncError;
use crate::idempotency::default_claim_ttl;
use crate::mapping::FieldMappingTable;
use crate::ports::SettingsStore;

/// Settings key holding the CRM site base URL
pub const SETTING_BASE_URL: &str = "wc_civicrm_url";
/// Settings key holding the API credential
pub const SETTING_AUTH_TOKEN: &str = "wc_civicrm_auth_token";
/// Settings key holding the field mapping table
pub const SETTING_FIELD_MAPPINGS: &str = "wc_civicrm_field_mappings";

/// Static values every contribution starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionDefaults {
    pub financial_type_id: i64,
    /// 1 is "Completed"
    pub contribution_status_id: i64,
    pub is_pay_later: bool,
}

impl Default for ContributionDefaults {
    fn default() -> Self {
        Self {
            financial_type_id: 1,
            contribution_status_id: 1,
            is_pay_later: false,
        }
    }
}

/// Maps shop payment method codes to CRM payment instrument ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInstrumentTable {
    instruments: HashMap<String, i64>,
    fallback: i64,
}

static DEFAULT_INSTRUMENTS: Lazy<PaymentInstrumentTable> = Lazy::new(|| {
    PaymentInstrumentTable::new(1)
        .with("stripe", 1)
        .with("paypal", 2)
        .with("bacs", 4)
        .with("cod", 5)
});

impl Default for PaymentInstrumentTable {
    fn default() -> Self {
        DEFAULT_INSTRUMENTS.clone()
    }
}

impl PaymentInstrumentTable {
    /// Empty table resolving everything to `fallback`
    pub fn new(fallback: i64) -> Self {
        Self {
            instruments: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, method: &str, instrument_id: i64) -> Self {
        self.instruments
            .insert(method.trim().to_ascii_lowercase(), instrument_id);
        self
    }

    /// Instrument id for a payment method code; unknown codes get the fallback
    pub fn lookup(&self, method: Option<&str>) -> i64 {
        method
            .map(|m| m.trim().to_ascii_lowercase())
            .and_then(|m| self.instruments.get(&m).copied())
            .unwrap_or(self.fallback)
    }

    pub fn fallback(&self) -> i64 {
        self.fallback
    }
}

/// Everything the sync core needs to run
#[derive(Clone)]
pub struct SyncConfig {
    pub base_url: String,
    pub credential: String,
    pub field_mappings: FieldMappingTable,
    pub contribution_defaults: ContributionDefaults,
    pub payment_instruments: PaymentInstrumentTable,
    pub claim_ttl: Duration,
}

impl SyncConfig {
    /// Builds a config with default mappings; URL and credential are required
    pub fn new(base_url: impl Into<String>, credential: impl Into<String>) -> Result<Self, SyncError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let credential = credential.into().trim().to_string();

        let mut missing = Vec::new();
        if base_url.is_empty() {
            missing.push("base URL");
        }
        if credential.is_empty() {
            missing.push("credential");
        }
        if !missing.is_empty() {
            return Err(SyncError::Configuration(format!(
                "CRM {} not configured",
                missing.join(" and ")
            )));
        }

        Ok(Self {
            base_url,
            credential,
            field_mappings: FieldMappingTable::default_table(),
            contribution_defaults: ContributionDefaults::default(),
            payment_instruments: PaymentInstrumentTable::default(),
            claim_ttl: default_claim_ttl(),
        })
    }

    pub fn with_field_mappings(mut self, mappings: FieldMappingTable) -> Self {
        self.field_mappings = mappings;
        self
    }

    pub fn with_contribution_defaults(mut self, defaults: ContributionDefaults) -> Self {
        self.contribution_defaults = defaults;
        self
    }

    pub fn with_payment_instruments(mut self, table: PaymentInstrumentTable) -> Self {
        self.payment_instruments = table;
        self
    }

    pub fn with_claim_ttl(mut self, ttl: Duration) -> Self {
        self.claim_ttl = ttl;
        self
    }

    /// Reads URL, credential and mapping table from the settings store
    pub async fn load(store: &dyn SettingsStore) -> Result<Self, SyncError> {
        let base_url = text_setting(store, SETTING_BASE_URL).await?;
        let credential = text_setting(store, SETTING_AUTH_TOKEN).await?;
        let mut config = Self::new(base_url, credential)?;

        match store.get(SETTING_FIELD_MAPPINGS).await? {
            None | Some(Value::Null) => {
                debug!("No stored field mappings, using default table");
            }
            Some(Value::String(raw)) if raw.trim().is_empty() => {
                debug!("Empty stored field mappings, using default table");
            }
            Some(Value::String(raw)) => {
                let parsed: Value = serde_json::from_str(&raw).map_err(|e| {
                    SyncError::Configuration(format!("field mappings are not valid JSON: {e}"))
                })?;
                config.field_mappings = FieldMappingTable::from_json(parsed)?;
            }
            Some(value) => {
                config.field_mappings = FieldMappingTable::from_json(value)?;
            }
        }

        if config.field_mappings.is_empty() {
            error!("No usable stored field mappings; contacts cannot be resolved");
        }
        Ok(config)
    }

    /// Credential shortened for logs
    pub fn redacted_credential(&self) -> String {
        redact(&self.credential)
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("base_url", &self.base_url)
            .field("credential", &self.redacted_credential())
            .field("field_mappings", &self.field_mappings.len())
            .field("contribution_defaults", &self.contribution_defaults)
            .field("payment_instruments", &self.payment_instruments)
            .field("claim_ttl", &self.claim_ttl)
            .finish()
    }
}

/// First five characters followed by `...`
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(5).collect();
    format!("{prefix}...")
}

async fn text_setting(store: &dyn SettingsStore, key: &str) -> Result<String, SyncError> {
    Ok(match store.get(key).await? {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}
