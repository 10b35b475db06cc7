// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA types shared by the client core.
//!
//! - **NodeId**: node identifiers with `ns=<index>;<type>=<id>` parsing
//! - **SecurityMode/Policy** and **TransportProfile**: what an endpoint offers
//! - **Variant/StatusCode/DataValue**: value samples delivered to sinks
//! - **ClientConfig**: client settings with builder and validation
//! - **SubscriptionSettings**: publishing and monitored item parameters
//!
//! # Examples
//!
//! ```
//! use tagwatch_opcua::types::{ClientConfig, NodeId};
//!
//! let node: NodeId = "ns=2;s=T1".parse().unwrap();
//! assert_eq!(node.namespace_index, 2);
//!
//! let config = ClientConfig::builder()
//!     .discovery_url("opc.tcp://10.0.0.5:4840")
//!     .build()
//!     .unwrap();
//! assert_eq!(config.host(), "10.0.0.5");
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, OpcUaError, OpcUaResult};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node Identifier.
///
/// # Examples
///
/// ```
/// use tagwatch_opcua::types::NodeId;
///
/// let parsed: NodeId = "ns=2;s=Line1.Temperature".parse().unwrap();
/// assert_eq!(parsed, NodeId::string(2, "Line1.Temperature"));
/// assert_eq!(parsed.to_string(), "ns=2;s=Line1.Temperature");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Returns the node ID in OPC UA string format.
    ///
    /// The namespace prefix is omitted for namespace 0.
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses a NodeId from OPC UA string format.
    ///
    /// Supported formats:
    /// - `ns=2;i=1001` (numeric)
    /// - `ns=2;s=MyNode` (string)
    /// - `ns=2;g=550e8400-e29b-41d4-a716-446655440000` (GUID)
    /// - `ns=2;b=SGVsbG8=` (opaque, base64 encoded)
    /// - `i=1001`, `s=MyNode` (namespace 0)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid =
            |reason: String| -> OpcUaError { ConfigurationError::invalid_node_id(s, reason).into() };

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("missing identifier after namespace".into()))?;
                let ns: u16 = ns
                    .parse()
                    .map_err(|_| invalid(format!("invalid namespace index '{}'", ns)))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            NodeIdentifier::Numeric(
                id.parse()
                    .map_err(|_| invalid(format!("invalid numeric identifier '{}'", id)))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            if id.is_empty() {
                return Err(invalid("empty string identifier".into()));
            }
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            NodeIdentifier::Guid(
                Uuid::parse_str(id).map_err(|e| invalid(format!("invalid GUID: {}", e)))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            NodeIdentifier::Opaque(
                BASE64
                    .decode(id)
                    .map_err(|e| invalid(format!("invalid base64: {}", e)))?,
            )
        } else {
            return Err(invalid(
                "unknown identifier type, expected i=, s=, g= or b=".into(),
            ));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

/// OPC UA node identifier types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),

    /// String identifier.
    String(String),

    /// GUID identifier.
    Guid(Uuid),

    /// Opaque identifier.
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Messages are neither signed nor encrypted.
    #[default]
    None,

    /// Messages are signed.
    Sign,

    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns `true` if this mode requires a client application certificate.
    #[inline]
    pub const fn requires_certificate(&self) -> bool {
        matches!(self, Self::Sign | Self::SignAndEncrypt)
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// SecurityPolicy
// =============================================================================

/// OPC UA security policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// No security policy.
    #[default]
    None,

    /// Basic128Rsa15 (deprecated).
    Basic128Rsa15,

    /// Basic256 (deprecated).
    Basic256,

    /// Basic256Sha256.
    Basic256Sha256,

    /// Aes128Sha256RsaOaep.
    Aes128Sha256RsaOaep,

    /// Aes256Sha256RsaPss.
    Aes256Sha256RsaPss,

    /// A policy URI this client does not know.
    Unknown(String),
}

impl SecurityPolicy {
    /// Returns the OPC UA policy URI.
    pub fn uri(&self) -> &str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic128Rsa15 => "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15",
            Self::Basic256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
            Self::Unknown(uri) => uri,
        }
    }

    /// Creates from a policy URI.
    pub fn from_uri(uri: &str) -> Self {
        match uri.rsplit_once('#').map(|(_, name)| name) {
            Some("None") => Self::None,
            Some("Basic128Rsa15") => Self::Basic128Rsa15,
            Some("Basic256") => Self::Basic256,
            Some("Basic256Sha256") => Self::Basic256Sha256,
            Some("Aes128_Sha256_RsaOaep") => Self::Aes128Sha256RsaOaep,
            Some("Aes256_Sha256_RsaPss") => Self::Aes256Sha256RsaPss,
            _ => Self::Unknown(uri.to_string()),
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(uri) => write!(f, "{}", uri),
            other => write!(
                f,
                "{}",
                other.uri().rsplit_once('#').map(|(_, n)| n).unwrap_or("?")
            ),
        }
    }
}

// =============================================================================
// TransportProfile
// =============================================================================

/// Transport profile advertised by an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportProfile {
    /// Binary encoding over opc.tcp, the only profile this client speaks.
    UaTcp,
    /// HTTPS with binary encoding.
    HttpsBinary,
    /// WebSocket with binary encoding.
    WssBinary,
    /// Any other profile URI.
    Other(String),
}

impl TransportProfile {
    /// Profile URI for opc.tcp binary.
    pub const UA_TCP_URI: &'static str =
        "http://opcfoundation.org/UA-Profile/Transport/uatcp-uasc-uabinary";
    const HTTPS_BINARY_URI: &'static str =
        "http://opcfoundation.org/UA-Profile/Transport/https-uabinary";
    const WSS_BINARY_URI: &'static str =
        "http://opcfoundation.org/UA-Profile/Transport/wss-uasc-uabinary";

    /// Creates from a profile URI.
    ///
    /// An empty URI is treated as opc.tcp, which is what servers that leave the
    /// field unset actually serve.
    pub fn from_uri(uri: &str) -> Self {
        match uri {
            "" | Self::UA_TCP_URI => Self::UaTcp,
            Self::HTTPS_BINARY_URI => Self::HttpsBinary,
            Self::WSS_BINARY_URI => Self::WssBinary,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the profile URI.
    pub fn uri(&self) -> &str {
        match self {
            Self::UaTcp => Self::UA_TCP_URI,
            Self::HttpsBinary => Self::HTTPS_BINARY_URI,
            Self::WssBinary => Self::WSS_BINARY_URI,
            Self::Other(uri) => uri,
        }
    }

    /// Returns `true` for the opc.tcp binary profile.
    #[inline]
    pub fn is_ua_tcp(&self) -> bool {
        matches!(self, Self::UaTcp)
    }
}

impl fmt::Display for TransportProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

// =============================================================================
// Variant
// =============================================================================

/// A value carried by a data change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    /// No value.
    Null,
    /// Boolean.
    Boolean(bool),
    /// Signed 8-bit integer.
    SByte(i8),
    /// Unsigned 8-bit integer.
    Byte(u8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// String.
    String(String),
    /// Date and time.
    DateTime(DateTime<Utc>),
    /// GUID.
    Guid(Uuid),
    /// Byte string.
    ByteString(Vec<u8>),
    /// Array of values.
    Array(Vec<Variant>),
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Guid(v) => write!(f, "{}", v),
            Self::ByteString(v) => write!(f, "{}", BASE64.encode(v)),
            Self::Array(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// Severity encoded in the top two bits of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusSeverity {
    /// The value is usable.
    Good,
    /// The value is usable with reservations.
    Uncertain,
    /// The value is not usable.
    Bad,
}

/// OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: Self = Self(0x0000_0000);
    /// Unexpected error.
    pub const BAD_UNEXPECTED_ERROR: Self = Self(0x8001_0000);
    /// Communication error.
    pub const BAD_COMMUNICATION_ERROR: Self = Self(0x8005_0000);
    /// Timeout.
    pub const BAD_TIMEOUT: Self = Self(0x800A_0000);
    /// Certificate malformed.
    pub const BAD_CERTIFICATE_INVALID: Self = Self(0x8012_0000);
    /// Security checks failed.
    pub const BAD_SECURITY_CHECKS_FAILED: Self = Self(0x8013_0000);
    /// Certificate expired or not yet valid.
    pub const BAD_CERTIFICATE_TIME_INVALID: Self = Self(0x8014_0000);
    /// Issuer certificate expired or not yet valid.
    pub const BAD_CERTIFICATE_ISSUER_TIME_INVALID: Self = Self(0x8015_0000);
    /// Certificate host name mismatch.
    pub const BAD_CERTIFICATE_HOST_NAME_INVALID: Self = Self(0x8016_0000);
    /// Certificate application URI mismatch.
    pub const BAD_CERTIFICATE_URI_INVALID: Self = Self(0x8017_0000);
    /// Certificate used for a purpose it does not allow.
    pub const BAD_CERTIFICATE_USE_NOT_ALLOWED: Self = Self(0x8018_0000);
    /// Certificate not in the trusted store.
    pub const BAD_CERTIFICATE_UNTRUSTED: Self = Self(0x801A_0000);
    /// Revocation status unknown.
    pub const BAD_CERTIFICATE_REVOCATION_UNKNOWN: Self = Self(0x801B_0000);
    /// Certificate revoked.
    pub const BAD_CERTIFICATE_REVOKED: Self = Self(0x801D_0000);
    /// Session closed.
    pub const BAD_SESSION_CLOSED: Self = Self(0x8026_0000);
    /// Node id syntax invalid.
    pub const BAD_NODE_ID_INVALID: Self = Self(0x8033_0000);
    /// Node id unknown to the server.
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    /// Secure channel closed.
    pub const BAD_SECURE_CHANNEL_CLOSED: Self = Self(0x8086_0000);
    /// Not connected.
    pub const BAD_NOT_CONNECTED: Self = Self(0x808A_0000);
    /// Connection closed.
    pub const BAD_CONNECTION_CLOSED: Self = Self(0x80AE_0000);
    /// Certificate chain incomplete.
    pub const BAD_CERTIFICATE_CHAIN_INCOMPLETE: Self = Self(0x810D_0000);
    /// Last usable value.
    pub const UNCERTAIN_LAST_USABLE_VALUE: Self = Self(0x4090_0000);

    const INFO_TYPE_MASK: u32 = 0x0000_0C00;
    const INFO_TYPE_DATA_VALUE: u32 = 0x0000_0400;
    const OVERFLOW_BIT: u32 = 0x0000_0080;

    /// Returns the raw code.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns the code with info bits cleared.
    #[inline]
    pub const fn sub_code(&self) -> u32 {
        self.0 & 0xFFFF_0000
    }

    /// Returns the severity.
    pub const fn severity(&self) -> StatusSeverity {
        match self.0 >> 30 {
            0 => StatusSeverity::Good,
            1 => StatusSeverity::Uncertain,
            _ => StatusSeverity::Bad,
        }
    }

    /// Returns `true` for good codes.
    #[inline]
    pub const fn is_good(&self) -> bool {
        matches!(self.severity(), StatusSeverity::Good)
    }

    /// Returns `true` for bad codes.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        matches!(self.severity(), StatusSeverity::Bad)
    }

    /// Returns `true` when the server dropped values from the item's queue.
    pub const fn is_overflow(&self) -> bool {
        self.0 & Self::INFO_TYPE_MASK == Self::INFO_TYPE_DATA_VALUE
            && self.0 & Self::OVERFLOW_BIT != 0
    }

    /// Returns the symbolic name for well-known codes.
    pub fn name(&self) -> Option<&'static str> {
        let name = match self.sub_code() {
            0x0000_0000 => "Good",
            0x8001_0000 => "BadUnexpectedError",
            0x8005_0000 => "BadCommunicationError",
            0x800A_0000 => "BadTimeout",
            0x8012_0000 => "BadCertificateInvalid",
            0x8013_0000 => "BadSecurityChecksFailed",
            0x8014_0000 => "BadCertificateTimeInvalid",
            0x8015_0000 => "BadCertificateIssuerTimeInvalid",
            0x8016_0000 => "BadCertificateHostNameInvalid",
            0x8017_0000 => "BadCertificateUriInvalid",
            0x8018_0000 => "BadCertificateUseNotAllowed",
            0x801A_0000 => "BadCertificateUntrusted",
            0x801B_0000 => "BadCertificateRevocationUnknown",
            0x801D_0000 => "BadCertificateRevoked",
            0x8026_0000 => "BadSessionClosed",
            0x8031_0000 => "BadNoCommunication",
            0x8032_0000 => "BadWaitingForInitialData",
            0x8033_0000 => "BadNodeIdInvalid",
            0x8034_0000 => "BadNodeIdUnknown",
            0x8086_0000 => "BadSecureChannelClosed",
            0x808A_0000 => "BadNotConnected",
            0x808D_0000 => "BadOutOfService",
            0x80AE_0000 => "BadConnectionClosed",
            0x810D_0000 => "BadCertificateChainIncomplete",
            0x408F_0000 => "UncertainNoCommunicationLastUsableValue",
            0x4090_0000 => "UncertainLastUsableValue",
            0x4093_0000 => "UncertainSensorNotAccurate",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) if self.is_overflow() => write!(f, "{} (Overflow)", name),
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// A timestamped, status-qualified value sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    /// The value.
    pub value: Variant,

    /// Timestamp assigned by the data source.
    pub source_timestamp: Option<DateTime<Utc>>,

    /// Timestamp assigned by the server.
    pub server_timestamp: Option<DateTime<Utc>>,

    /// Quality of the value.
    pub status: StatusCode,
}

impl DataValue {
    /// Creates a good value with the given source timestamp.
    pub fn new(value: Variant, source_timestamp: DateTime<Utc>) -> Self {
        Self {
            value,
            source_timestamp: Some(source_timestamp),
            server_timestamp: None,
            status: StatusCode::GOOD,
        }
    }

    /// Sets the status code.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

// =============================================================================
// ClientConfig
// =============================================================================

/// Client settings consumed by the session manager.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tagwatch_opcua::types::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .discovery_url("opc.tcp://plc.local:4840")
///     .auto_accept_untrusted(true)
///     .operation_timeout(Duration::from_secs(5))
///     .build()
///     .unwrap();
///
/// assert!(config.auto_accept_untrusted);
/// assert_eq!(config.session_timeout, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Discovery URL (`opc.tcp://host:port`).
    pub discovery_url: String,

    /// Application name presented to the server.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Application URI presented to the server.
    #[serde(default = "default_application_uri")]
    pub application_uri: String,

    /// Session name.
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// Requested session timeout.
    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Budget for secure channel and session creation.
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Budget for endpoint discovery.
    #[serde(default = "default_discovery_timeout", with = "humantime_serde")]
    pub discovery_timeout: Duration,

    /// PKI directory (own, private, trusted, rejected).
    #[serde(default = "default_pki_dir")]
    pub pki_dir: PathBuf,

    /// Accept certificates whose only fault is being absent from the trusted store.
    #[serde(default)]
    pub auto_accept_untrusted: bool,

    /// Create a self-signed application certificate when none exists.
    #[serde(default)]
    pub generate_certificate: bool,

    /// Subscription settings.
    #[serde(default)]
    pub subscription: SubscriptionSettings,
}

fn default_application_name() -> String {
    "Tagwatch OPC UA Client".to_string()
}

fn default_application_uri() -> String {
    "urn:localhost:tagwatch:client".to_string()
}

fn default_session_name() -> String {
    "tagwatch".to_string()
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_discovery_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_pki_dir() -> PathBuf {
    PathBuf::from("pki")
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Builds the discovery URL for a host and port.
    pub fn url_for(host: &str, port: u16) -> String {
        format!("opc.tcp://{}:{}", host, port)
    }

    /// Returns the host part of the discovery URL.
    pub fn host(&self) -> &str {
        url_host(&self.discovery_url).unwrap_or_default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> OpcUaResult<()> {
        if url_host(&self.discovery_url).map_or(true, str::is_empty) {
            return Err(ConfigurationError::invalid_endpoint(
                &self.discovery_url,
                "expected opc.tcp://<host>[:<port>]",
            )
            .into());
        }
        for (field, value) in [
            ("session_timeout", self.session_timeout),
            ("operation_timeout", self.operation_timeout),
            ("discovery_timeout", self.discovery_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigurationError::invalid_value(field, "must be non-zero").into());
            }
        }
        self.subscription.validate()
    }
}

/// Returns the host component of an `opc.tcp://host:port/path` URL.
pub(crate) fn url_host(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("opc.tcp://")?;
    let authority = rest.split('/').next().unwrap_or(rest);
    if let Some(bracketed) = authority.strip_prefix('[') {
        return bracketed.split(']').next();
    }
    Some(authority.split(':').next().unwrap_or(authority))
}

// =============================================================================
// ClientConfigBuilder
// =============================================================================

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    discovery_url: Option<String>,
    application_name: Option<String>,
    application_uri: Option<String>,
    session_name: Option<String>,
    session_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
    discovery_timeout: Option<Duration>,
    pki_dir: Option<PathBuf>,
    auto_accept_untrusted: bool,
    generate_certificate: bool,
    subscription: Option<SubscriptionSettings>,
}

impl ClientConfigBuilder {
    /// Sets the discovery URL.
    pub fn discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = Some(url.into());
        self
    }

    /// Sets the discovery URL from host and port.
    pub fn server(self, host: &str, port: u16) -> Self {
        self.discovery_url(ClientConfig::url_for(host, port))
    }

    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the application URI.
    pub fn application_uri(mut self, uri: impl Into<String>) -> Self {
        self.application_uri = Some(uri.into());
        self
    }

    /// Sets the session name.
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    /// Sets the requested session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Sets the secure channel and session creation budget.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Sets the discovery budget.
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = Some(timeout);
        self
    }

    /// Sets the PKI directory.
    pub fn pki_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pki_dir = Some(dir.into());
        self
    }

    /// Enables trust on first use for untrusted server certificates.
    pub fn auto_accept_untrusted(mut self, accept: bool) -> Self {
        self.auto_accept_untrusted = accept;
        self
    }

    /// Enables generation of a self-signed application certificate.
    pub fn generate_certificate(mut self, generate: bool) -> Self {
        self.generate_certificate = generate;
        self
    }

    /// Sets subscription settings.
    pub fn subscription(mut self, settings: SubscriptionSettings) -> Self {
        self.subscription = Some(settings);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> OpcUaResult<ClientConfig> {
        let discovery_url = self
            .discovery_url
            .ok_or_else(|| ConfigurationError::missing_field("discovery_url"))?;

        let config = ClientConfig {
            discovery_url,
            application_name: self.application_name.unwrap_or_else(default_application_name),
            application_uri: self.application_uri.unwrap_or_else(default_application_uri),
            session_name: self.session_name.unwrap_or_else(default_session_name),
            session_timeout: self.session_timeout.unwrap_or_else(default_session_timeout),
            operation_timeout: self
                .operation_timeout
                .unwrap_or_else(default_operation_timeout),
            discovery_timeout: self
                .discovery_timeout
                .unwrap_or_else(default_discovery_timeout),
            pki_dir: self.pki_dir.unwrap_or_else(default_pki_dir),
            auto_accept_untrusted: self.auto_accept_untrusted,
            generate_certificate: self.generate_certificate,
            subscription: self.subscription.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// SubscriptionSettings
// =============================================================================

/// Subscription and monitored item parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    /// Publishing interval.
    #[serde(default = "default_publishing_interval", with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Publishing intervals without a publish request before the server drops the subscription.
    #[serde(default = "default_lifetime_count")]
    pub lifetime_count: u32,

    /// Publishing intervals without data before the server sends a keep-alive.
    #[serde(default = "default_keepalive_count")]
    pub keepalive_count: u32,

    /// Maximum notifications per publish (0 = unlimited).
    #[serde(default)]
    pub max_notifications_per_publish: u32,

    /// Relative priority.
    #[serde(default)]
    pub priority: u8,

    /// Publishing enabled.
    #[serde(default = "default_true")]
    pub publishing_enabled: bool,

    /// Item sampling interval; `None` samples at the publishing interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_interval: Option<Duration>,

    /// Server-side queue length per item.
    #[serde(default = "default_queue_size")]
    pub queue_size: u32,

    /// Drop the oldest queued value on overflow.
    #[serde(default = "default_true")]
    pub discard_oldest: bool,
}

fn default_publishing_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_lifetime_count() -> u32 {
    60
}

fn default_keepalive_count() -> u32 {
    10
}

fn default_queue_size() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            publishing_interval: default_publishing_interval(),
            lifetime_count: default_lifetime_count(),
            keepalive_count: default_keepalive_count(),
            max_notifications_per_publish: 0,
            priority: 0,
            publishing_enabled: true,
            sampling_interval: None,
            queue_size: default_queue_size(),
            discard_oldest: true,
        }
    }
}

impl SubscriptionSettings {
    /// Creates settings with a custom publishing interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            publishing_interval: interval,
            ..Default::default()
        }
    }

    /// Returns the effective sampling interval.
    pub fn effective_sampling_interval(&self) -> Duration {
        self.sampling_interval.unwrap_or(self.publishing_interval)
    }

    /// Validates the settings.
    pub fn validate(&self) -> OpcUaResult<()> {
        if self.publishing_interval.is_zero() {
            return Err(
                ConfigurationError::invalid_value("publishing_interval", "must be non-zero").into(),
            );
        }
        if self.keepalive_count == 0 {
            return Err(ConfigurationError::invalid_value("keepalive_count", "must be > 0").into());
        }
        if self.lifetime_count < self.keepalive_count.saturating_mul(3) {
            return Err(ConfigurationError::invalid_value(
                "lifetime_count",
                format!(
                    "must be at least 3 x keepalive_count ({})",
                    self.keepalive_count.saturating_mul(3)
                ),
            )
            .into());
        }
        if self.queue_size == 0 {
            return Err(ConfigurationError::invalid_value("queue_size", "must be > 0").into());
        }
        Ok(())
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
