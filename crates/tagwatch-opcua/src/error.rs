// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the tagwatch OPC UA client core.
//!
//! Errors are grouped by the domain that raised them. Every startup step
//! (discover, select, judge, open, bind) returns an explicit `Result`, and the
//! session-level entry points tag failures with the [`Stage`] they occurred in
//! so the top-level run can report a single diagnostic naming both the stage
//! and the server address.
//!
//! # Error Categories
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Discovery, endpoint selection, secure channel
//! ├── Session       - Session lifecycle misuse
//! ├── Security      - Certificate trust decisions
//! ├── Subscription  - Item registration, binding, delivery
//! ├── Configuration - Invalid client settings or node addresses
//! └── Timeout       - Bounded suspension points that expired
//! ```
//!
//! # Examples
//!
//! ```
//! use tagwatch_opcua::error::{OpcUaError, Stage, StageContext, SubscriptionError};
//!
//! let result: Result<(), OpcUaError> =
//!     Err(SubscriptionError::bind_failed("session is not open").into());
//!
//! let tagged = result.at_stage(Stage::Bind, "opc.tcp://10.0.0.5:4840").unwrap_err();
//! assert_eq!(tagged.stage, Stage::Bind);
//! assert!(tagged.to_string().contains("10.0.0.5"));
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

use crate::client::trust::ValidationFailure;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type for the OPC UA client core.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Discovery, endpoint and channel errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Session lifecycle errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Certificate trust errors.
    #[error("{0}")]
    Security(#[from] SecurityError),

    /// Subscription and delivery errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// Timeout errors.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

impl OpcUaError {
    /// Returns `true` if this is a delivery fault raised after a successful bind.
    pub fn is_delivery_fault(&self) -> bool {
        matches!(self, Self::Subscription(SubscriptionError::DeliveryFault { .. }))
    }

    /// Returns `true` if a certificate was rejected by the trust policy.
    pub fn is_certificate_rejected(&self) -> bool {
        matches!(self, Self::Security(SecurityError::CertificateRejected { .. }))
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Session(_) => ErrorSeverity::Error,
            Self::Security(_) => ErrorSeverity::Critical,
            Self::Subscription(e) => e.severity(),
            Self::Configuration(_) => ErrorSeverity::Critical,
            Self::Timeout(_) => ErrorSeverity::Error,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Session(_) => "session",
            Self::Security(_) => "security",
            Self::Subscription(_) => "subscription",
            Self::Configuration(_) => "configuration",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Returns a structured error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Security(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
            Self::Timeout(e) => e.error_code(),
        }
    }

    /// Returns recovery hints for the operator.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Connection(e) => e.recovery_hints(),
            Self::Session(_) => vec!["Open a new session; sessions are never reused after a fault"],
            Self::Security(e) => e.recovery_hints(),
            Self::Subscription(e) => e.recovery_hints(),
            Self::Configuration(_) => vec![
                "Check the parameter file",
                "Node addresses use the form ns=<index>;s=<name> or ns=<index>;i=<number>",
            ],
            Self::Timeout(_) => vec![
                "Check that the server is reachable from this host",
                "Increase the corresponding timeout option",
            ],
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();
        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Discovery, endpoint selection and secure channel errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Endpoint enumeration failed.
    #[error("Endpoint discovery failed at '{endpoint}': {message}")]
    DiscoveryFailed {
        /// Discovery address that was dialed.
        endpoint: String,
        /// Underlying cause.
        message: String,
    },

    /// No candidate matched the supported transport profile.
    #[error("No endpoint at '{endpoint}' offers transport profile '{transport_profile}'")]
    EndpointNotFound {
        /// Discovery address.
        endpoint: String,
        /// Required transport profile.
        transport_profile: String,
    },

    /// Secure channel or session creation failed.
    #[error("Handshake with '{endpoint}' failed: {message}")]
    HandshakeFailed {
        /// Endpoint URL.
        endpoint: String,
        /// Underlying cause.
        message: String,
    },

    /// Channel closed unexpectedly.
    #[error("Connection closed: {}", reason.as_deref().unwrap_or("no reason given"))]
    Closed {
        /// Reason for closure.
        reason: Option<String>,
    },

    /// No channel is open.
    #[error("Not connected to OPC UA server")]
    NotConnected,
}

impl ConnectionError {
    /// Creates a discovery failure.
    pub fn discovery_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DiscoveryFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates an endpoint-not-found error.
    pub fn endpoint_not_found(
        endpoint: impl Into<String>,
        transport_profile: impl Into<String>,
    ) -> Self {
        Self::EndpointNotFound {
            endpoint: endpoint.into(),
            transport_profile: transport_profile.into(),
        }
    }

    /// Creates a handshake failure.
    pub fn handshake_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a closed-channel error.
    pub fn closed(reason: Option<String>) -> Self {
        Self::Closed { reason }
    }

    /// Returns the severity of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotConnected | Self::Closed { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::DiscoveryFailed { .. } => 1,
            Self::EndpointNotFound { .. } => 2,
            Self::HandshakeFailed { .. } => 3,
            Self::Closed { .. } => 4,
            Self::NotConnected => 5,
        };
        ErrorCode::new(1, code)
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::DiscoveryFailed { .. } => vec![
                "Verify the endpoint host and port in the parameter file",
                "Check that the OPC UA server is running",
            ],
            Self::EndpointNotFound { .. } => {
                vec!["The server must expose an opc.tcp endpoint (uatcp-uasc-uabinary)"]
            }
            Self::HandshakeFailed { .. } => vec![
                "Check the server's security configuration",
                "Inspect the server log for rejected client certificates",
            ],
            Self::Closed { .. } | Self::NotConnected => vec!["Restart the client"],
        }
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Session lifecycle errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session is not open.
    #[error("Session is not open (state: {state})")]
    NotOpen {
        /// Current state name.
        state: String,
    },

    /// A session is already live for this manager.
    #[error("A session is already open")]
    AlreadyOpen,
}

impl SessionError {
    /// Creates a not-open error.
    pub fn not_open(state: impl fmt::Display) -> Self {
        Self::NotOpen {
            state: state.to_string(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::NotOpen { .. } => 1,
            Self::AlreadyOpen => 2,
        };
        ErrorCode::new(2, code)
    }
}

// =============================================================================
// SecurityError
// =============================================================================

/// Certificate trust errors.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// The trust policy declined a peer certificate.
    #[error("Certificate '{subject}' [{thumbprint}] rejected: {failure}")]
    CertificateRejected {
        /// Certificate subject.
        subject: String,
        /// SHA-1 thumbprint, hex encoded.
        thumbprint: String,
        /// Validation failure that triggered the decision.
        failure: ValidationFailure,
    },

    /// The certificate store could not be read or written.
    #[error("Certificate store error at '{path}': {message}")]
    CertificateStore {
        /// Store path.
        path: String,
        /// Error message.
        message: String,
    },
}

impl SecurityError {
    /// Creates a certificate rejection.
    pub fn certificate_rejected(
        subject: impl Into<String>,
        thumbprint: impl Into<String>,
        failure: ValidationFailure,
    ) -> Self {
        Self::CertificateRejected {
            subject: subject.into(),
            thumbprint: thumbprint.into(),
            failure,
        }
    }

    /// Creates a certificate store error.
    pub fn store(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CertificateStore {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::CertificateRejected { .. } => 1,
            Self::CertificateStore { .. } => 2,
        };
        ErrorCode::new(3, code)
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::CertificateRejected { failure, .. } if failure.is_untrusted() => vec![
                "Copy the server certificate into <pki>/trusted",
                "Or start with --auto-accept-untrusted to trust it on first use",
            ],
            Self::CertificateRejected { .. } => vec![
                "Renew or reissue the server certificate",
                "Check that the server host name matches the certificate",
            ],
            Self::CertificateStore { .. } => vec!["Check permissions on the PKI directory"],
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription, monitored item and delivery errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Items cannot be added after bind.
    #[error("Subscription is already bound; cannot add item '{tag}'")]
    AlreadyBound {
        /// Tag that was being added.
        tag: String,
    },

    /// Tag name registered twice.
    #[error("Monitored item '{tag}' already exists")]
    DuplicateItem {
        /// Tag name.
        tag: String,
    },

    /// Tag name not registered.
    #[error("Monitored item '{tag}' not found")]
    ItemNotFound {
        /// Tag name.
        tag: String,
    },

    /// Bind was attempted without items.
    #[error("Subscription has no monitored items")]
    NoItems,

    /// The subscription could not be attached to the session.
    #[error("Subscription bind failed: {reason}")]
    BindFailed {
        /// Reason.
        reason: String,
    },

    /// The server refused a monitored item.
    #[error("Server rejected monitored item '{tag}' ({node_id}): {status}")]
    ItemRejected {
        /// Tag name.
        tag: String,
        /// Node address.
        node_id: String,
        /// Status code name.
        status: String,
    },

    /// Channel failure after a successful bind.
    #[error("Notification delivery stopped: {reason}")]
    DeliveryFault {
        /// Reason reported by the channel.
        reason: String,
    },
}

impl SubscriptionError {
    /// Creates a bind failure.
    pub fn bind_failed(reason: impl Into<String>) -> Self {
        Self::BindFailed {
            reason: reason.into(),
        }
    }

    /// Creates a delivery fault.
    pub fn delivery_fault(reason: impl Into<String>) -> Self {
        Self::DeliveryFault {
            reason: reason.into(),
        }
    }

    /// Returns the severity of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::AlreadyBound { .. } | Self::DuplicateItem { .. } | Self::ItemNotFound { .. } => {
                ErrorSeverity::Warning
            }
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::AlreadyBound { .. } => 1,
            Self::DuplicateItem { .. } => 2,
            Self::ItemNotFound { .. } => 3,
            Self::NoItems => 4,
            Self::BindFailed { .. } => 5,
            Self::ItemRejected { .. } => 6,
            Self::DeliveryFault { .. } => 7,
        };
        ErrorCode::new(4, code)
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::ItemRejected { .. } => vec!["Check that the node address exists on the server"],
            Self::NoItems => vec!["Add at least one tag line to the parameter file"],
            Self::DeliveryFault { .. } => vec!["Check network stability and restart the client"],
            _ => vec![],
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Client configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Node address could not be parsed.
    #[error("Invalid node id '{node_id}': {reason}")]
    InvalidNodeId {
        /// The offending address.
        node_id: String,
        /// Reason.
        reason: String,
    },

    /// Endpoint URL could not be parsed.
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint {
        /// The offending URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// A field holds an unusable value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Reason.
        reason: String,
    },

    /// A required field is missing.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Field name.
        field: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::InvalidNodeId { .. } => 1,
            Self::InvalidEndpoint { .. } => 2,
            Self::InvalidValue { .. } => 3,
            Self::MissingField { .. } => 4,
        };
        ErrorCode::new(5, code)
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// Expired suspension points.
#[derive(Debug, Error)]
pub enum TimeoutError {
    /// Endpoint discovery took too long.
    #[error("Endpoint discovery timed out after {duration:?}")]
    Discovery {
        /// Budget that elapsed.
        duration: Duration,
    },

    /// Secure channel and session creation took too long.
    #[error("Session creation timed out after {duration:?}")]
    Session {
        /// Budget that elapsed.
        duration: Duration,
    },
}

impl TimeoutError {
    /// Creates a discovery timeout.
    pub fn discovery(duration: Duration) -> Self {
        Self::Discovery { duration }
    }

    /// Creates a session timeout.
    pub fn session(duration: Duration) -> Self {
        Self::Session { duration }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::Discovery { .. } => 1,
            Self::Session { .. } => 2,
        };
        ErrorCode::new(6, code)
    }
}

// =============================================================================
// Stage
// =============================================================================

/// Startup and runtime stage in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Endpoint enumeration.
    Discovery,
    /// Choosing one endpoint among the candidates.
    EndpointSelection,
    /// Certificate trust decision.
    Trust,
    /// Secure channel and session creation.
    Handshake,
    /// Creating the subscription on an open session.
    Subscribe,
    /// Registering monitored items and activating the subscription.
    Bind,
    /// Streaming notifications after bind.
    Delivery,
    /// Closing the subscription and session.
    Close,
}

impl Stage {
    /// Returns the stage name used in diagnostics.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::EndpointSelection => "endpoint selection",
            Self::Trust => "certificate trust",
            Self::Handshake => "session handshake",
            Self::Subscribe => "subscription create",
            Self::Bind => "subscription bind",
            Self::Delivery => "notification delivery",
            Self::Close => "session close",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An [`OpcUaError`] tagged with the stage and server address it belongs to.
#[derive(Debug, Error)]
#[error("{stage} failed for {endpoint}: {source}")]
pub struct StageError {
    /// Stage that failed.
    pub stage: Stage,
    /// Server address involved.
    pub endpoint: String,
    /// Underlying error.
    #[source]
    pub source: OpcUaError,
}

impl StageError {
    /// Creates a stage error.
    pub fn new(stage: Stage, endpoint: impl Into<String>, source: impl Into<OpcUaError>) -> Self {
        Self {
            stage,
            endpoint: endpoint.into(),
            source: source.into(),
        }
    }

    /// Returns the underlying error.
    pub fn inner(&self) -> &OpcUaError {
        &self.source
    }
}

/// Extension trait for tagging results with their stage.
pub trait StageContext<T> {
    /// Tags the error, if any, with `stage` and `endpoint`.
    fn at_stage(self, stage: Stage, endpoint: &str) -> Result<T, StageError>;
}

impl<T, E> StageContext<T> for Result<T, E>
where
    E: Into<OpcUaError>,
{
    fn at_stage(self, stage: Stage, endpoint: &str) -> Result<T, StageError> {
        self.map_err(|e| {
            let error = StageError::new(stage, endpoint, e);
            tracing::debug!(stage = %stage, endpoint = endpoint, error = %error.source, "Stage failed");
            error
        })
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Action may be required.
    Warning,
    /// Action required.
    Error,
    /// The run cannot continue.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code.
///
/// Format: `UA-XXYY` where XX is the category and YY the specific error.
///
/// Categories: 1 connection, 2 session, 3 security, 4 subscription,
/// 5 configuration, 6 timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category.
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with OpcUaError.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::new(1, 5).to_string(), "UA-0105");
        assert_eq!(
            OpcUaError::from(SubscriptionError::NoItems).error_code().to_string(),
            "UA-0404"
        );
    }

    #[test]
    fn test_stage_error_names_stage_and_endpoint() {
        let result: OpcUaResult<()> = Err(ConnectionError::discovery_failed(
            "opc.tcp://10.0.0.5:4840",
            "connection refused",
        )
        .into());

        let error = result
            .at_stage(Stage::Discovery, "opc.tcp://10.0.0.5:4840")
            .unwrap_err();
        let message = error.to_string();
        assert!(message.starts_with("discovery failed for opc.tcp://10.0.0.5:4840"));
        assert!(message.contains("connection refused"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_at_stage_accepts_domain_errors() {
        let result: Result<(), TimeoutError> = Err(TimeoutError::session(Duration::from_secs(15)));
        let error = result.at_stage(Stage::Handshake, "opc.tcp://host:4840").unwrap_err();
        assert!(matches!(error.inner(), OpcUaError::Timeout(TimeoutError::Session { .. })));
    }

    #[test]
    fn test_category_and_severity() {
        let rejected = OpcUaError::from(SecurityError::certificate_rejected(
            "CN=server",
            "AB",
            ValidationFailure::Expired,
        ));
        assert_eq!(rejected.category(), "security");
        assert_eq!(rejected.severity(), ErrorSeverity::Critical);
        assert!(rejected.is_certificate_rejected());

        let fault = OpcUaError::from(SubscriptionError::delivery_fault("keep-alive lost"));
        assert!(fault.is_delivery_fault());
        assert_eq!(fault.tracing_level(), Level::ERROR);
    }

    #[test]
    fn test_untrusted_rejection_hints_mention_opt_in() {
        let error = SecurityError::certificate_rejected("CN=s", "00", ValidationFailure::Untrusted);
        assert!(error
            .recovery_hints()
            .iter()
            .any(|h| h.contains("--auto-accept-untrusted")));
    }

    #[test]
    fn test_timeout_message() {
        let timeout = TimeoutError::discovery(Duration::from_secs(10));
        assert!(timeout.to_string().contains("10s"));
        assert_eq!(timeout.error_code().to_string(), "UA-0601");
    }
}
