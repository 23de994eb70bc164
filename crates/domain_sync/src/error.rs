//! Sync domain errors
//!
//! Two layers: `CrmError` is what a transport can fail with, `SyncError` is
//! everything the sync core can report. Every `CrmError` maps onto a
//! `SyncError` of the same kind so callers see the original classification.

use std::fmt;

use thiserror::Error;

use core_kernel::{CoreError, CrmContributionId, OrderId};

/// Errors raised by a CRM transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrmError {
    /// Base URL or credential missing; raised before any network call
    #[error("CRM configuration error: {0}")]
    Configuration(String),

    /// Connection or timeout failure
    #[error("Network error calling {endpoint}: {message}")]
    Network {
        endpoint: String,
        message: String,
        /// False when the request provably never reached the server
        request_sent: bool,
    },

    /// Body was not JSON, or lacked the keys every envelope must carry
    #[error("Malformed CRM response: {0}")]
    MalformedResponse(String),

    /// Explicit error payload or non-2xx status; message is the server's, verbatim
    #[error("CRM API error: {message}")]
    RemoteApi {
        status: Option<u16>,
        message: String,
    },
}

impl CrmError {
    pub fn configuration(message: impl Into<String>) -> Self {
        CrmError::Configuration(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        CrmError::MalformedResponse(message.into())
    }

    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        CrmError::RemoteApi {
            status,
            message: message.into(),
        }
    }

    pub fn network(endpoint: impl Into<String>, message: impl Into<String>, request_sent: bool) -> Self {
        CrmError::Network {
            endpoint: endpoint.into(),
            message: message.into(),
            request_sent,
        }
    }

    /// Returns true for failures a single identical retry may cure
    pub fn is_transient(&self) -> bool {
        matches!(self, CrmError::Network { .. })
    }

    /// Returns the remote message when this is an API-level rejection
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            CrmError::RemoteApi { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Classification of a sync failure, stable across error payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncErrorKind {
    Configuration,
    Network,
    MalformedResponse,
    RemoteApi,
    MissingRequiredField,
    InvalidOrder,
    AlreadySynced,
    ContactCreation,
    ContributionCreation,
    Store,
    Unrecorded,
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncErrorKind::Configuration => "configuration",
            SyncErrorKind::Network => "network",
            SyncErrorKind::MalformedResponse => "malformed_response",
            SyncErrorKind::RemoteApi => "remote_api",
            SyncErrorKind::MissingRequiredField => "missing_required_field",
            SyncErrorKind::InvalidOrder => "invalid_order",
            SyncErrorKind::AlreadySynced => "already_synced",
            SyncErrorKind::ContactCreation => "contact_creation",
            SyncErrorKind::ContributionCreation => "contribution_creation",
            SyncErrorKind::Store => "store",
            SyncErrorKind::Unrecorded => "unrecorded",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while synchronizing an order
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("Malformed CRM response: {0}")]
    MalformedResponse(String),

    #[error("CRM API error: {message}")]
    RemoteApi {
        status: Option<u16>,
        message: String,
    },

    #[error("Missing required fields: {}", fields.join(", "))]
    MissingRequiredField { fields: Vec<String> },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// Not a fault: the order already produced its contribution
    #[error("Order {order_id} is already synced")]
    AlreadySynced { order_id: OrderId },

    #[error("Failed to create contact: {0}")]
    ContactCreation(String),

    #[error("Failed to create contribution: {0}")]
    ContributionCreation(String),

    #[error("Sync record store error: {0}")]
    Store(String),

    /// The contribution exists in the CRM but the sync record could not be
    /// written. The claim is kept so no later delivery writes a second one.
    #[error("Contribution {contribution_id} was created but not recorded: {message}")]
    Unrecorded {
        contribution_id: CrmContributionId,
        message: String,
    },
}

impl SyncError {
    pub fn store(message: impl Into<String>) -> Self {
        SyncError::Store(message.into())
    }

    pub fn missing_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SyncError::MissingRequiredField {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::Configuration(_) => SyncErrorKind::Configuration,
            SyncError::Network { .. } => SyncErrorKind::Network,
            SyncError::MalformedResponse(_) => SyncErrorKind::MalformedResponse,
            SyncError::RemoteApi { .. } => SyncErrorKind::RemoteApi,
            SyncError::MissingRequiredField { .. } => SyncErrorKind::MissingRequiredField,
            SyncError::InvalidOrder(_) => SyncErrorKind::InvalidOrder,
            SyncError::AlreadySynced { .. } => SyncErrorKind::AlreadySynced,
            SyncError::ContactCreation(_) => SyncErrorKind::ContactCreation,
            SyncError::ContributionCreation(_) => SyncErrorKind::ContributionCreation,
            SyncError::Store(_) => SyncErrorKind::Store,
            SyncError::Unrecorded { .. } => SyncErrorKind::Unrecorded,
        }
    }

    /// Whether a caller-scheduled retry of the whole order could succeed.
    ///
    /// Configuration and data problems need a human, and so does a
    /// contribution that was written but never recorded.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            SyncErrorKind::Network
                | SyncErrorKind::MalformedResponse
                | SyncErrorKind::RemoteApi
                | SyncErrorKind::ContactCreation
                | SyncErrorKind::ContributionCreation
                | SyncErrorKind::Store
        )
    }
}

impl From<CrmError> for SyncError {
    fn from(error: CrmError) -> Self {
        match error {
            CrmError::Configuration(message) => SyncError::Configuration(message),
            CrmError::Network { endpoint, message, .. } => SyncError::Network { endpoint, message },
            CrmError::MalformedResponse(message) => SyncError::MalformedResponse(message),
            CrmError::RemoteApi { status, message } => SyncError::RemoteApi { status, message },
        }
    }
}

impl From<CoreError> for SyncError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Configuration(message) => SyncError::Configuration(message),
            CoreError::Validation(message) => SyncError::InvalidOrder(message),
            CoreError::Money(e) => SyncError::InvalidOrder(e.to_string()),
        }
    }
}
