// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport abstraction layer.
//!
//! The session manager and subscription registry talk to the wire only through
//! [`OpcUaTransport`]. The production implementation wraps the `opcua` crate;
//! tests drive the lifecycle with an in-memory transport.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::trust::{CertificateGate, PeerCertificate};
use crate::error::OpcUaResult;
use crate::types::{
    DataValue, NodeId, SecurityMode, SecurityPolicy, StatusCode, SubscriptionSettings,
    TransportProfile,
};

// =============================================================================
// Endpoint candidates
// =============================================================================

/// Server identity returned alongside an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Server application URI.
    pub application_uri: String,
    /// Server application name.
    pub application_name: String,
    /// Discovery URLs advertised by the server.
    pub discovery_urls: Vec<String>,
}

/// One endpoint advertised by the discovery service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCandidate {
    /// Endpoint URL.
    pub endpoint_url: String,
    /// Transport profile.
    pub transport_profile: TransportProfile,
    /// Message security mode.
    pub security_mode: SecurityMode,
    /// Security policy.
    pub security_policy: SecurityPolicy,
    /// Server-assigned relative security level.
    pub security_level: u8,
    /// Server identity.
    pub server: ServerDescriptor,
    /// Server certificate, when the endpoint carries one.
    pub server_certificate: Option<PeerCertificate>,
    /// Position in the discovery response.
    pub discovery_index: usize,
}

impl EndpointCandidate {
    /// Creates an opc.tcp candidate with no security and no certificate.
    pub fn new(endpoint_url: impl Into<String>, security_level: u8) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            transport_profile: TransportProfile::UaTcp,
            security_mode: SecurityMode::None,
            security_policy: SecurityPolicy::None,
            security_level,
            server: ServerDescriptor::default(),
            server_certificate: None,
            discovery_index: 0,
        }
    }

    /// Sets the transport profile.
    pub fn with_profile(mut self, profile: TransportProfile) -> Self {
        self.transport_profile = profile;
        self
    }

    /// Sets security mode and policy.
    pub fn with_security(mut self, mode: SecurityMode, policy: SecurityPolicy) -> Self {
        self.security_mode = mode;
        self.security_policy = policy;
        self
    }

    /// Sets the server certificate.
    pub fn with_certificate(mut self, cert: PeerCertificate) -> Self {
        self.server_certificate = Some(cert);
        self
    }

    /// Sets the server descriptor.
    pub fn with_server(mut self, server: ServerDescriptor) -> Self {
        self.server = server;
        self
    }
}

// =============================================================================
// Session request/info
// =============================================================================

/// Parameters for opening a channel and session on a selected endpoint.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Endpoint to connect to.
    pub endpoint: EndpointCandidate,
    /// Session name.
    pub session_name: String,
    /// Requested session timeout.
    pub session_timeout: Duration,
    /// Client application name.
    pub application_name: String,
    /// Client application URI.
    pub application_uri: String,
}

/// Facts about an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session name.
    pub session_name: String,
    /// Endpoint URL the session runs on.
    pub endpoint_url: String,
    /// Message security mode.
    pub security_mode: SecurityMode,
    /// Security policy.
    pub security_policy: SecurityPolicy,
    /// Endpoint security level.
    pub security_level: u8,
    /// Timeout granted by the server.
    pub revised_timeout: Duration,
}

// =============================================================================
// Monitored items
// =============================================================================

/// Server-side parameters for one monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemRequest {
    /// Handle the server echoes in every notification for this item.
    pub client_handle: u32,
    /// Node to monitor.
    pub node_id: NodeId,
    /// Sampling interval.
    pub sampling_interval: Duration,
    /// Queue size.
    pub queue_size: u32,
    /// Discard policy.
    pub discard_oldest: bool,
}

impl MonitoredItemRequest {
    /// Creates a request using the item parameters of `settings`.
    pub fn new(client_handle: u32, node_id: NodeId, settings: &SubscriptionSettings) -> Self {
        Self {
            client_handle,
            node_id,
            sampling_interval: settings.effective_sampling_interval(),
            queue_size: settings.queue_size,
            discard_oldest: settings.discard_oldest,
        }
    }
}

/// Server response for one monitored item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredItemResult {
    /// Client handle of the request.
    pub client_handle: u32,
    /// Result status.
    pub status: StatusCode,
    /// Server-assigned item id.
    pub server_item_id: u32,
}

// =============================================================================
// Events
// =============================================================================

/// Asynchronous event pushed by the transport after the session opens.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Values for one monitored item, in server order.
    DataChange {
        /// Subscription the item belongs to.
        subscription_id: u32,
        /// Client handle of the item.
        client_handle: u32,
        /// Values in the order the server delivered them.
        values: Vec<DataValue>,
    },

    /// The channel failed (keep-alive loss, socket error, session closed by server).
    Fault {
        /// Reason reported by the stack.
        reason: String,
    },
}

/// Sender half handed to the transport when the channel opens.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half owned by the session and claimed by the dispatcher.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Creates an event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// =============================================================================
// OpcUaTransport
// =============================================================================

/// Wire-level operations the client core needs.
///
/// Implementations use interior mutability; one transport serves one session
/// at a time.
#[async_trait]
pub trait OpcUaTransport: Send + Sync + 'static {
    /// Loads (or generates, when configured) the application instance
    /// certificate. Returns `false` when none is available.
    async fn load_application_certificate(&self) -> OpcUaResult<bool>;

    /// Queries the discovery service at `discovery_url`.
    ///
    /// Endpoints are returned in server order, with URLs exactly as advertised.
    async fn discover(&self, discovery_url: &str) -> OpcUaResult<Vec<EndpointCandidate>>;

    /// Opens a secure channel and activates a session.
    ///
    /// Every server certificate presented during the session's life must pass
    /// `gate`. Data changes and channel faults are pushed into `events`.
    async fn open_channel(
        &self,
        request: SessionRequest,
        gate: CertificateGate,
        events: EventSender,
    ) -> OpcUaResult<SessionInfo>;

    /// Closes the session and channel.
    async fn close_channel(&self) -> OpcUaResult<()>;

    /// Creates a subscription and returns its server id.
    async fn create_subscription(&self, settings: &SubscriptionSettings) -> OpcUaResult<u32>;

    /// Registers monitored items. Results are in request order.
    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<MonitoredItemResult>>;

    /// Deletes a subscription and its items.
    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_request_uses_publishing_interval_for_sampling() {
        let settings = SubscriptionSettings::with_interval(Duration::from_millis(250));
        let request = MonitoredItemRequest::new(1, NodeId::string(2, "T1"), &settings);
        assert_eq!(request.sampling_interval, Duration::from_millis(250));
        assert_eq!(request.queue_size, 10);
        assert!(request.discard_oldest);
    }

    #[test]
    fn test_candidate_builder() {
        let candidate = EndpointCandidate::new("opc.tcp://h:4840", 3)
            .with_security(SecurityMode::SignAndEncrypt, SecurityPolicy::Basic256Sha256);
        assert!(candidate.transport_profile.is_ua_tcp());
        assert!(candidate.security_mode.requires_certificate());
        assert!(candidate.server_certificate.is_none());
    }
}
