//! Environment-backed settings
//!
//! Reads the CRM connection settings from `CRM_SYNC_*` environment
//! variables (and a local `.env` file when present):
//!
//! | Variable                   | Settings key                 |
//! |----------------------------|------------------------------|
//! | `CRM_SYNC_URL`             | `wc_civicrm_url`             |
//! | `CRM_SYNC_AUTH_TOKEN`      | `wc_civicrm_auth_token`      |
//! | `CRM_SYNC_FIELD_MAPPINGS`  | `wc_civicrm_field_mappings`  |

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use core_kernel::DomainPort;
use domain_sync::config::{SETTING_AUTH_TOKEN, SETTING_BASE_URL, SETTING_FIELD_MAPPINGS};
use domain_sync::{SettingsStore, SyncError};

use crate::transport::CrmTransportConfig;

pub const ENV_PREFIX: &str = "CRM_SYNC";

/// Raw settings as they appear in the environment
#[derive(Debug, Clone, Deserialize)]
pub struct EnvSettings {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// JSON mapping table, stored as text
    #[serde(default)]
    pub field_mappings: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_timeout_secs() -> u64 {
    CrmTransportConfig::default().timeout_secs
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            url: None,
            auth_token: None,
            field_mappings: None,
            timeout_secs: default_timeout_secs(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// `SettingsStore` over process environment variables
#[derive(Debug, Clone, Default)]
pub struct EnvSettingsStore {
    settings: EnvSettings,
}

impl EnvSettingsStore {
    /// Loads `.env` if present, then reads `CRM_SYNC_*` variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_source(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn from_source(source: config::Environment) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        Ok(Self { settings })
    }

    pub fn from_settings(settings: EnvSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EnvSettings {
        &self.settings
    }

    /// Transport settings from the environment; completeness is checked on first use
    pub fn transport_config(&self) -> CrmTransportConfig {
        CrmTransportConfig::new(
            self.settings.url.clone().unwrap_or_default(),
            self.settings.auth_token.clone().unwrap_or_default(),
        )
        .with_timeout_secs(self.settings.timeout_secs)
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        match key {
            SETTING_BASE_URL => self.settings.url.as_deref(),
            SETTING_AUTH_TOKEN => self.settings.auth_token.as_deref(),
            SETTING_FIELD_MAPPINGS => self.settings.field_mappings.as_deref(),
            _ => None,
        }
    }
}

impl DomainPort for EnvSettingsStore {}

#[async_trait]
impl SettingsStore for EnvSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError> {
        Ok(self.lookup(key).map(|v| Value::String(v.to_string())))
    }
}
