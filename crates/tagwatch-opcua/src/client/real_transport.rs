// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! opc.tcp transport backed by the `opcua` crate.
//!
//! The `opcua` client API is blocking. Discovery and the handshake run on the
//! blocking pool so the caller's timeouts stay effective; subscription calls are
//! short request/response exchanges and run inline like the rest of the stack.
//!
//! # Example
//!
//! ```rust,ignore
//! use tagwatch_opcua::{ClientConfig, SessionManager, UaTcpTransport};
//!
//! let config = ClientConfig::builder().server("plc01", 4840).build()?;
//! let transport = Arc::new(UaTcpTransport::new(&config)?);
//! let manager = SessionManager::new(config, transport);
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use opcua::client::prelude::*;
use opcua::crypto::X509;
use opcua::sync::RwLock as OpcUaRwLock;

use super::transport::{
    EndpointCandidate, EventSender, MonitoredItemRequest, MonitoredItemResult, OpcUaTransport,
    ServerDescriptor, SessionInfo, SessionRequest, TransportEvent,
};
use super::trust::{CertificateGate, PeerCertificate};
use crate::error::{ConfigurationError, ConnectionError, OpcUaError, OpcUaResult, SubscriptionError};
use crate::types::{
    url_host, ClientConfig, DataValue, NodeId, NodeIdentifier, SecurityMode, SecurityPolicy,
    StatusCode, SubscriptionSettings, TransportProfile, Variant,
};

type SharedSession = Arc<OpcUaRwLock<Session>>;

// =============================================================================
// UaTcpTransport
// =============================================================================

/// Production transport over opc.tcp.
pub struct UaTcpTransport {
    client: Arc<Mutex<Client>>,
    pki_dir: PathBuf,
    session: Mutex<Option<SharedSession>>,
    runner: Mutex<Option<tokio::sync::oneshot::Sender<SessionCommand>>>,
    events: Mutex<Option<EventSender>>,
}

impl UaTcpTransport {
    /// Builds the underlying client from `config`.
    ///
    /// The stack never trusts server certificates on its own; every decision
    /// is made by the [`CertificateGate`] and recorded in the PKI directory.
    pub fn new(config: &ClientConfig) -> OpcUaResult<Self> {
        let client = ClientBuilder::new()
            .application_name(config.application_name.as_str())
            .application_uri(config.application_uri.as_str())
            .pki_dir(config.pki_dir.clone())
            .create_sample_keypair(config.generate_certificate)
            .trust_server_certs(false)
            .session_retry_limit(0)
            .session_timeout(config.session_timeout.as_millis().min(u32::MAX as u128) as u32)
            .client()
            .ok_or_else(|| {
                OpcUaError::Configuration(ConfigurationError::invalid_value(
                    "client",
                    "the opcua client configuration is invalid",
                ))
            })?;

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            pki_dir: config.pki_dir.clone(),
            session: Mutex::new(None),
            runner: Mutex::new(None),
            events: Mutex::new(None),
        })
    }

    fn get_session(&self) -> OpcUaResult<SharedSession> {
        self.session
            .lock()
            .clone()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }

    fn to_opcua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
        match &node_id.identifier {
            NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(node_id.namespace_index, *v),
            NodeIdentifier::String(v) => {
                opcua::types::NodeId::new(node_id.namespace_index, v.clone())
            }
            NodeIdentifier::Guid(v) => {
                opcua::types::NodeId::new(node_id.namespace_index, opcua::types::Guid::from(*v))
            }
            NodeIdentifier::Opaque(v) => opcua::types::NodeId::new(
                node_id.namespace_index,
                opcua::types::ByteString::from(v.as_slice()),
            ),
        }
    }

    fn from_opcua_variant(variant: &opcua::types::Variant) -> Variant {
        use opcua::types::Variant as UaVariant;

        match variant {
            UaVariant::Empty => Variant::Null,
            UaVariant::Boolean(v) => Variant::Boolean(*v),
            UaVariant::SByte(v) => Variant::SByte(*v),
            UaVariant::Byte(v) => Variant::Byte(*v),
            UaVariant::Int16(v) => Variant::Int16(*v),
            UaVariant::UInt16(v) => Variant::UInt16(*v),
            UaVariant::Int32(v) => Variant::Int32(*v),
            UaVariant::UInt32(v) => Variant::UInt32(*v),
            UaVariant::Int64(v) => Variant::Int64(*v),
            UaVariant::UInt64(v) => Variant::UInt64(*v),
            UaVariant::Float(v) => Variant::Float(*v),
            UaVariant::Double(v) => Variant::Double(*v),
            UaVariant::String(v) => Variant::String(v.as_ref().to_string()),
            UaVariant::DateTime(v) => Self::from_opcua_datetime(v)
                .map(Variant::DateTime)
                .unwrap_or(Variant::Null),
            UaVariant::Guid(v) => Variant::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
            UaVariant::ByteString(v) => Variant::ByteString(v.value.clone().unwrap_or_default()),
            UaVariant::Array(arr) => {
                Variant::Array(arr.values.iter().map(Self::from_opcua_variant).collect())
            }
            other => Variant::String(format!("{:?}", other)),
        }
    }

    /// Returns `None` for timestamps chrono cannot represent.
    fn from_opcua_datetime(value: &opcua::types::DateTime) -> Option<chrono::DateTime<chrono::Utc>> {
        let dt = value.as_chrono();
        let converted = chrono::DateTime::from_timestamp(dt.timestamp(), dt.timestamp_subsec_nanos());
        if converted.is_none() {
            debug!(ticks = value.checked_ticks(), "Dropping unrepresentable timestamp");
        }
        converted
    }

    fn from_opcua_data_value(value: &opcua::types::DataValue) -> DataValue {
        DataValue {
            value: value
                .value
                .as_ref()
                .map(Self::from_opcua_variant)
                .unwrap_or(Variant::Null),
            source_timestamp: value.source_timestamp.as_ref().and_then(Self::from_opcua_datetime),
            server_timestamp: value.server_timestamp.as_ref().and_then(Self::from_opcua_datetime),
            status: StatusCode(value.status.map(|s| s.bits()).unwrap_or(0)),
        }
    }

    fn security_mode(mode: MessageSecurityMode) -> SecurityMode {
        match mode {
            MessageSecurityMode::Sign => SecurityMode::Sign,
            MessageSecurityMode::SignAndEncrypt => SecurityMode::SignAndEncrypt,
            _ => SecurityMode::None,
        }
    }

    /// Reads the fields the trust gate needs from a DER certificate.
    fn peer_certificate(der: &[u8], dialed_host: &str, application_uri: &str) -> PeerCertificate {
        let mut cert = PeerCertificate {
            der: der.to_vec(),
            subject: String::new(),
            thumbprint: String::new(),
            not_before: None,
            not_after: None,
            host_names: Vec::new(),
            application_uri: None,
        };

        // Unparseable certificates keep empty fields and fail validation as malformed.
        let Ok(x509) = X509::from_der(der) else {
            return cert;
        };

        cert.subject = x509.common_name().unwrap_or_default();
        cert.thumbprint = x509.thumbprint().as_hex_string().to_lowercase();
        cert.not_before = x509
            .not_before()
            .ok()
            .and_then(|t| chrono::DateTime::from_timestamp(t.timestamp(), 0));
        cert.not_after = x509
            .not_after()
            .ok()
            .and_then(|t| chrono::DateTime::from_timestamp(t.timestamp(), 0));

        // Alternate names are not exposed, so check the host that was dialed.
        if !dialed_host.is_empty() && x509.is_hostname_valid(dialed_host).is_good() {
            cert.host_names.push(dialed_host.to_string());
        } else if !cert.subject.is_empty() {
            cert.host_names.push(cert.subject.clone());
        }
        if !application_uri.is_empty() && x509.is_application_uri_valid(application_uri).is_good() {
            cert.application_uri = Some(application_uri.to_string());
        }

        cert
    }

    fn candidate(endpoint: &EndpointDescription, dialed_host: &str) -> EndpointCandidate {
        let application_uri = endpoint.server.application_uri.as_ref().to_string();
        let server = ServerDescriptor {
            application_uri: application_uri.clone(),
            application_name: endpoint.server.application_name.text.as_ref().to_string(),
            discovery_urls: endpoint
                .server
                .discovery_urls
                .as_ref()
                .map(|urls| urls.iter().map(|u| u.as_ref().to_string()).collect())
                .unwrap_or_default(),
        };

        let mut candidate =
            EndpointCandidate::new(endpoint.endpoint_url.as_ref(), endpoint.security_level)
                .with_profile(TransportProfile::from_uri(endpoint.transport_profile_uri.as_ref()))
                .with_security(
                    Self::security_mode(endpoint.security_mode),
                    SecurityPolicy::from_uri(endpoint.security_policy_uri.as_ref()),
                )
                .with_server(server);

        if let Some(der) = endpoint.server_certificate.value.as_ref().filter(|d| !d.is_empty()) {
            candidate = candidate.with_certificate(Self::peer_certificate(
                der,
                dialed_host,
                &application_uri,
            ));
        }
        candidate
    }

    fn to_endpoint_description(candidate: &EndpointCandidate) -> EndpointDescription {
        let mode = match candidate.security_mode {
            SecurityMode::None => MessageSecurityMode::None,
            SecurityMode::Sign => MessageSecurityMode::Sign,
            SecurityMode::SignAndEncrypt => MessageSecurityMode::SignAndEncrypt,
        };
        (
            candidate.endpoint_url.as_str(),
            candidate.security_policy.uri(),
            mode,
        )
            .into()
    }

    fn install_callbacks(session: &SharedSession, events: EventSender) {
        let mut session = session.write();

        let on_status = events.clone();
        session.set_connection_status_callback(ConnectionStatusCallback::new(
            move |connected| {
                if !connected {
                    let _ = on_status.send(TransportEvent::Fault {
                        reason: "connection lost".to_string(),
                    });
                }
            },
        ));

        session.set_session_closed_callback(SessionClosedCallback::new(move |status| {
            let _ = events.send(TransportEvent::Fault {
                reason: format!("session closed by server: {}", status),
            });
        }));
    }
}

impl std::fmt::Debug for UaTcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UaTcpTransport")
            .field("pki_dir", &self.pki_dir)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OpcUaTransport for UaTcpTransport {
    async fn load_application_certificate(&self) -> OpcUaResult<bool> {
        let cert = self.pki_dir.join("own").join("cert.der");
        let present = tokio::fs::try_exists(&cert).await.unwrap_or(false);
        debug!(path = %cert.display(), present = present, "Application certificate lookup");
        Ok(present)
    }

    async fn discover(&self, discovery_url: &str) -> OpcUaResult<Vec<EndpointCandidate>> {
        let client = self.client.clone();
        let url = discovery_url.to_string();

        let endpoints = tokio::task::spawn_blocking(move || {
            client.lock().get_server_endpoints_from_url(url.as_str())
        })
        .await
        .map_err(|e| ConnectionError::discovery_failed(discovery_url, e.to_string()))?
        .map_err(|status| ConnectionError::discovery_failed(discovery_url, status.to_string()))?;

        let dialed_host = url_host(discovery_url).unwrap_or_default();
        Ok(endpoints
            .iter()
            .map(|e| Self::candidate(e, dialed_host))
            .collect())
    }

    async fn open_channel(
        &self,
        request: SessionRequest,
        gate: CertificateGate,
        events: EventSender,
    ) -> OpcUaResult<SessionInfo> {
        if let Some(cert) = &request.endpoint.server_certificate {
            gate.judge(cert)?;
        }

        info!(endpoint = %request.endpoint.endpoint_url, "Connecting to OPC UA server");

        let client = self.client.clone();
        let description = Self::to_endpoint_description(&request.endpoint);
        let endpoint_url = request.endpoint.endpoint_url.clone();

        let connected = tokio::task::spawn_blocking(move || {
            client
                .lock()
                .connect_to_endpoint(description, IdentityToken::Anonymous)
        })
        .await
        .map_err(|e| ConnectionError::handshake_failed(&endpoint_url, e.to_string()))
        .and_then(|r| {
            r.map_err(|status| ConnectionError::handshake_failed(&endpoint_url, status.to_string()))
        });

        let session = match connected {
            Ok(session) => session,
            Err(e) => {
                debug!(error = %e, "Handshake failed");
                return Err(e.into());
            }
        };

        Self::install_callbacks(&session, events.clone());
        *self.runner.lock() = Some(Session::run_async(session.clone()));
        *self.session.lock() = Some(session);
        *self.events.lock() = Some(events);

        Ok(SessionInfo {
            session_name: request.session_name,
            endpoint_url: request.endpoint.endpoint_url.clone(),
            security_mode: request.endpoint.security_mode,
            security_policy: request.endpoint.security_policy.clone(),
            security_level: request.endpoint.security_level,
            revised_timeout: request.session_timeout,
        })
    }

    async fn close_channel(&self) -> OpcUaResult<()> {
        let session = self.session.lock().take();
        if let Some(runner) = self.runner.lock().take() {
            let _ = runner.send(SessionCommand::Stop);
        }
        self.events.lock().take();

        if let Some(session) = session {
            tokio::task::spawn_blocking(move || session.read().disconnect())
                .await
                .map_err(|e| ConnectionError::closed(Some(e.to_string())))?;
        }

        trace!("Channel closed");
        Ok(())
    }

    async fn create_subscription(&self, settings: &SubscriptionSettings) -> OpcUaResult<u32> {
        let session = self.get_session()?;
        let events = self
            .events
            .lock()
            .clone()
            .ok_or(ConnectionError::NotConnected)?;

        trace!(interval = ?settings.publishing_interval, "Creating subscription");

        // The server id is only known after the call returns.
        let subscription_id = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let callback_id = subscription_id.clone();

        let id = session
            .read()
            .create_subscription(
                settings.publishing_interval.as_secs_f64() * 1000.0,
                settings.lifetime_count,
                settings.keepalive_count,
                settings.max_notifications_per_publish,
                settings.priority,
                true,
                DataChangeCallback::new(move |items| {
                    let subscription_id = callback_id.load(std::sync::atomic::Ordering::Acquire);
                    for item in items.iter() {
                        let values = item
                            .values()
                            .iter()
                            .map(UaTcpTransport::from_opcua_data_value)
                            .collect();
                        let _ = events.send(TransportEvent::DataChange {
                            subscription_id,
                            client_handle: item.client_handle(),
                            values,
                        });
                    }
                }),
            )
            .map_err(|status| SubscriptionError::bind_failed(status.to_string()))?;

        subscription_id.store(id, std::sync::atomic::Ordering::Release);
        info!(subscription_id = id, "Created subscription");
        Ok(id)
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<MonitoredItemResult>> {
        let session = self.get_session()?;

        let requests: Vec<MonitoredItemCreateRequest> = items
            .iter()
            .map(|item| MonitoredItemCreateRequest {
                item_to_monitor: ReadValueId {
                    node_id: Self::to_opcua_node_id(&item.node_id),
                    attribute_id: AttributeId::Value as u32,
                    index_range: opcua::types::UAString::null(),
                    data_encoding: opcua::types::QualifiedName::null(),
                },
                monitoring_mode: MonitoringMode::Reporting,
                requested_parameters: MonitoringParameters {
                    client_handle: item.client_handle,
                    sampling_interval: item.sampling_interval.as_secs_f64() * 1000.0,
                    filter: ExtensionObject::null(),
                    queue_size: item.queue_size,
                    discard_oldest: item.discard_oldest,
                },
            })
            .collect();

        trace!(subscription_id = subscription_id, count = items.len(), "Creating monitored items");

        let results = session
            .read()
            .create_monitored_items(subscription_id, TimestampsToReturn::Both, &requests)
            .map_err(|status| SubscriptionError::bind_failed(status.to_string()))?;

        Ok(items
            .iter()
            .zip(results.iter())
            .map(|(item, result)| MonitoredItemResult {
                client_handle: item.client_handle,
                status: StatusCode(result.status_code.bits()),
                server_item_id: result.monitored_item_id,
            })
            .collect())
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        let session = self.get_session()?;
        trace!(subscription_id = subscription_id, "Deleting subscription");

        match session.read().delete_subscription(subscription_id) {
            Ok(status) if !status.is_good() => {
                warn!(subscription_id = subscription_id, status = %status, "Server refused subscription delete");
            }
            Ok(_) => {}
            Err(status) => {
                return Err(SubscriptionError::bind_failed(status.to_string()).into());
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
