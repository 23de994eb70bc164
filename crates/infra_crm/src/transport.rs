//! HTTP CRM Transport
//!
//! `CrmTransport` implementation for the CiviCRM API4 AJAX endpoint
//! (`{base}/civicrm/ajax/api4/{Entity}/{action}`).
//!
//! # Wire format
//!
//! Every call is a `POST` carrying three headers:
//!
//! - `X-Civi-Auth: Bearer <token>`
//! - `X-Requested-With: XMLHttpRequest`
//! - `Accept: application/json`
//!
//! `get`, `create` and `update` send a form-encoded body with a single
//! `params` field holding the JSON parameters. `getFields` sends the
//! parameters as a JSON body.
//!
//! # Error Handling
//!
//! - Missing base URL or token -> `CrmError::Configuration`, before any I/O
//! - Connect failures -> `CrmError::Network` with `request_sent = false`
//! - Timeouts and broken connections -> `CrmError::Network` with `request_sent = true`
//! - Any body -> `CrmResponse::from_envelope`, which yields
//!   `MalformedResponse` or `RemoteApi` as appropriate
//!
//! A network failure is retried once when the request is a read, or when
//! the request provably never left the client. Writes that may have reached
//! the server are never repeated.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use core_kernel::{AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable};
use domain_sync::config::redact;
use domain_sync::{CrmAction, CrmEntity, CrmError, CrmRequest, CrmResponse, CrmTransport, SyncConfig};

/// API version reported by the connection test
pub const API_VERSION: &str = "4";

const AUTH_HEADER: &str = "X-Civi-Auth";
const REQUESTED_WITH_HEADER: &str = "X-Requested-With";

/// Configuration for the HTTP transport
#[derive(Clone)]
pub struct CrmTransportConfig {
    /// Site root, e.g. `https://crm.example.org`
    pub base_url: String,

    /// API key sent as a bearer token
    pub auth_token: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retry a failed request once when repeating it cannot duplicate a write
    pub retry_network_once: bool,
}

impl Default for CrmTransportConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_token: String::new(),
            timeout_secs: 30,
            retry_network_once: true,
        }
    }
}

impl CrmTransportConfig {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            auth_token: auth_token.into().trim().to_string(),
            ..Default::default()
        }
    }

    /// Transport settings for an already validated sync configuration
    pub fn from_sync_config(config: &SyncConfig) -> Self {
        Self::new(config.base_url.clone(), config.credential.clone())
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_retry_network_once(mut self, retry: bool) -> Self {
        self.retry_network_once = retry;
        self
    }

    fn check(&self) -> Result<(), CrmError> {
        match (self.base_url.is_empty(), self.auth_token.is_empty()) {
            (true, true) => Err(CrmError::configuration("CRM URL and API token are not configured")),
            (true, false) => Err(CrmError::configuration("CRM URL is not configured")),
            (false, true) => Err(CrmError::configuration("CRM API token is not configured")),
            (false, false) => Ok(()),
        }
    }
}

impl std::fmt::Debug for CrmTransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmTransportConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &redact(&self.auth_token))
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_network_once", &self.retry_network_once)
            .finish()
    }
}

/// Outcome of [`HttpCrmTransport::test_connection`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
    /// Rows returned by the connection check query
    pub contact_count: Option<usize>,
    pub api_version: &'static str,
}

/// reqwest-backed CRM transport
#[derive(Debug, Clone)]
pub struct HttpCrmTransport {
    config: CrmTransportConfig,
    client: reqwest::Client,
}

impl HttpCrmTransport {
    /// Builds the HTTP client; configuration completeness is checked per call
    pub fn new(config: CrmTransportConfig) -> Result<Self, CrmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CrmError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &CrmTransportConfig {
        &self.config
    }

    /// Absolute URL for a request
    pub fn endpoint(&self, request: &CrmRequest) -> String {
        format!("{}/{}", self.config.base_url, request.path())
    }

    /// Checks the CRM with a one-row contact lookup
    #[instrument(skip(self))]
    pub async fn test_connection(&self) -> ConnectionStatus {
        let check = CrmRequest::get(CrmEntity::Contact).select(["id"]).limit(1);

        match self.send(check).await {
            Ok(response) => {
                info!(rows = response.len(), "CRM connection test succeeded");
                ConnectionStatus {
                    connected: true,
                    message: "Successfully connected to CRM API".to_string(),
                    contact_count: Some(response.len()),
                    api_version: API_VERSION,
                }
            }
            Err(e) => {
                warn!(error = %e, "CRM connection test failed");
                ConnectionStatus {
                    connected: false,
                    message: format!("Could not connect to CRM API: {e}"),
                    contact_count: None,
                    api_version: API_VERSION,
                }
            }
        }
    }

    async fn send_once(&self, request: &CrmRequest) -> Result<CrmResponse, CrmError> {
        let endpoint = self.endpoint(request);
        let params = request.params();
        let started = Instant::now();

        debug!(
            method = "POST",
            entity = %request.entity(),
            action = %request.action(),
            endpoint = %endpoint,
            credential = %redact(&self.config.auth_token),
            "Sending CRM request"
        );

        let builder = self
            .client
            .post(&endpoint)
            .header(AUTH_HEADER, format!("Bearer {}", self.config.auth_token))
            .header(REQUESTED_WITH_HEADER, "XMLHttpRequest")
            .header(ACCEPT, "application/json");

        let builder = match request.action() {
            CrmAction::GetFields => builder.json(&params),
            _ => builder.form(&[("params", params.to_string())]),
        };

        let response = builder.send().await.map_err(|e| network_error(&endpoint, &e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            CrmError::network(endpoint.as_str(), format!("failed to read response body: {e}"), true)
        })?;

        debug!(
            entity = %request.entity(),
            action = %request.action(),
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = body.len(),
            "CRM response received"
        );

        CrmResponse::from_envelope(status, &body)
    }
}

/// Connect errors never reached the server; everything else might have
fn network_error(endpoint: &str, error: &reqwest::Error) -> CrmError {
    if error.is_builder() {
        return CrmError::configuration(format!("invalid CRM request for {endpoint}: {error}"));
    }
    let message = if error.is_timeout() {
        format!("request timed out: {error}")
    } else {
        error.to_string()
    };
    CrmError::network(endpoint, message, !error.is_connect())
}

impl DomainPort for HttpCrmTransport {}

#[async_trait]
impl CrmTransport for HttpCrmTransport {
    #[instrument(skip(self, request), fields(entity = %request.entity(), action = %request.action()))]
    async fn send(&self, request: CrmRequest) -> Result<CrmResponse, CrmError> {
        self.config.check()?;

        let first = self.send_once(&request).await;
        let retry = match &first {
            Err(CrmError::Network { request_sent, .. }) => {
                self.config.retry_network_once && (!request.action().is_write() || !*request_sent)
            }
            _ => false,
        };

        if retry {
            if let Err(e) = &first {
                warn!(error = %e, "CRM request failed, retrying once");
            }
            return self.send_once(&request).await;
        }

        if let Err(e) = &first {
            warn!(error = %e, "CRM request failed");
        }
        first
    }
}

#[async_trait]
impl HealthCheckable for HttpCrmTransport {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let status = self.test_connection().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let health = if status.connected {
            AdapterHealth::Healthy
        } else {
            AdapterHealth::Unhealthy
        };
        HealthCheckResult::new("crm-http-transport", health, latency_ms, Some(status.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CrmTransportConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.retry_network_once);
    }

    #[test]
    fn test_config_trims_url() {
        let config = CrmTransportConfig::new(" https://crm.example.org/ ", " token ");
        assert_eq!(config.base_url, "https://crm.example.org");
        assert_eq!(config.auth_token, "token");
    }

    #[test]
    fn test_config_check_names_missing_parts() {
        let err = CrmTransportConfig::new("", "abc").check().unwrap_err();
        assert_eq!(err, CrmError::configuration("CRM URL is not configured"));

        let err = CrmTransportConfig::new("https://crm.example.org", "").check().unwrap_err();
        assert!(err.to_string().contains("token"));

        assert!(CrmTransportConfig::new("https://crm.example.org", "abc").check().is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = CrmTransportConfig::new("https://crm.example.org", "supersecret");
        let shown = format!("{config:?}");
        assert!(shown.contains("super..."));
        assert!(!shown.contains("supersecret"));
    }

    #[test]
    fn test_endpoint_layout() {
        let transport =
            HttpCrmTransport::new(CrmTransportConfig::new("https://crm.example.org/", "t")).unwrap();
        let request = CrmRequest::get(CrmEntity::Email);
        assert_eq!(
            transport.endpoint(&request),
            "https://crm.example.org/civicrm/ajax/api4/Email/get"
        );
        assert_eq!(
            transport.endpoint(&CrmRequest::get_fields(CrmEntity::Contribution)),
            "https://crm.example.org/civicrm/ajax/api4/Contribution/getFields"
        );
    }
}
