// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session and subscription lifecycle tests against an in-memory transport.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use tagwatch_opcua::client::{
    CertificateGate, CertificateValidationError, EventSender, MonitoredItemRequest,
    MonitoredItemResult, SessionInfo, SessionRequest,
};
use tagwatch_opcua::{
    ChannelSink, ClientConfig, ConfigurationError, DataValue, EndpointCandidate, OpcUaError,
    OpcUaResult, OpcUaTransport, PeerCertificate, SessionError, SessionManager, SessionState, Stage,
    StatusCode, Subscription, SubscriptionError, SubscriptionSettings, SubscriptionState,
    SessionHandle, TimeoutError, TransportEvent, TransportProfile, TrustDecision, TrustPolicy,
    ValueEvent, Variant,
};

// =============================================================================
// Mock Transport
// =============================================================================

const SUBSCRIPTION_ID: u32 = 7;

/// In-memory server: advertises fixed endpoints and records every call.
struct MockTransport {
    endpoints: Mutex<Vec<EndpointCandidate>>,
    have_certificate: AtomicBool,
    hang_discovery: AtomicBool,
    hang_open: AtomicBool,
    rejected_nodes: Mutex<HashSet<String>>,
    events: Mutex<Option<EventSender>>,
    opened: Mutex<Vec<SessionRequest>>,
    deleted: Mutex<Vec<u32>>,
    closes: AtomicUsize,
    next_item_id: AtomicU32,
}

impl MockTransport {
    fn new(endpoints: Vec<EndpointCandidate>) -> Arc<Self> {
        Arc::new(Self {
            endpoints: Mutex::new(endpoints),
            have_certificate: AtomicBool::new(true),
            hang_discovery: AtomicBool::new(false),
            hang_open: AtomicBool::new(false),
            rejected_nodes: Mutex::new(HashSet::new()),
            events: Mutex::new(None),
            opened: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            next_item_id: AtomicU32::new(100),
        })
    }

    fn single() -> Arc<Self> {
        Self::new(vec![EndpointCandidate::new("opc.tcp://plc01:4840", 1)])
    }

    fn reject_node(&self, node: &str) {
        self.rejected_nodes.lock().insert(node.to_string());
    }

    fn push(&self, event: TransportEvent) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(event);
        }
    }

    fn push_values(&self, client_handle: u32, values: Vec<DataValue>) {
        self.push(TransportEvent::DataChange {
            subscription_id: SUBSCRIPTION_ID,
            client_handle,
            values,
        });
    }
}

#[async_trait]
impl OpcUaTransport for MockTransport {
    async fn load_application_certificate(&self) -> OpcUaResult<bool> {
        Ok(self.have_certificate.load(Ordering::SeqCst))
    }

    async fn discover(&self, _discovery_url: &str) -> OpcUaResult<Vec<EndpointCandidate>> {
        if self.hang_discovery.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(self.endpoints.lock().clone())
    }

    async fn open_channel(
        &self,
        request: SessionRequest,
        _gate: CertificateGate,
        events: EventSender,
    ) -> OpcUaResult<SessionInfo> {
        if self.hang_open.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let info = SessionInfo {
            session_name: request.session_name.clone(),
            endpoint_url: request.endpoint.endpoint_url.clone(),
            security_mode: request.endpoint.security_mode,
            security_policy: request.endpoint.security_policy.clone(),
            security_level: request.endpoint.security_level,
            revised_timeout: request.session_timeout,
        };
        *self.events.lock() = Some(events);
        self.opened.lock().push(request);
        Ok(info)
    }

    async fn close_channel(&self) -> OpcUaResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.events.lock().take();
        Ok(())
    }

    async fn create_subscription(&self, _settings: &SubscriptionSettings) -> OpcUaResult<u32> {
        Ok(SUBSCRIPTION_ID)
    }

    async fn create_monitored_items(
        &self,
        _subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<MonitoredItemResult>> {
        let rejected = self.rejected_nodes.lock();
        Ok(items
            .iter()
            .map(|item| MonitoredItemResult {
                client_handle: item.client_handle,
                status: if rejected.contains(&item.node_id.to_opc_string()) {
                    StatusCode::BAD_NODE_ID_UNKNOWN
                } else {
                    StatusCode::GOOD
                },
                server_item_id: self.next_item_id.fetch_add(1, Ordering::SeqCst),
            })
            .collect())
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        self.deleted.lock().push(subscription_id);
        Ok(())
    }
}

/// Counts decisions and answers with a fixed verdict.
struct CountingPolicy {
    decision: TrustDecision,
    calls: AtomicUsize,
}

impl CountingPolicy {
    fn new(decision: TrustDecision) -> Arc<Self> {
        Arc::new(Self {
            decision,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TrustPolicy for CountingPolicy {
    fn decide(&self, _cert: &PeerCertificate, _error: &CertificateValidationError) -> TrustDecision {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.decision
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn config(pki: &tempfile::TempDir) -> ClientConfig {
    ClientConfig::builder()
        .server("plc01", 4840)
        .pki_dir(pki.path())
        .discovery_timeout(Duration::from_secs(2))
        .subscription(SubscriptionSettings::with_interval(Duration::from_millis(100)))
        .build()
        .unwrap()
}

fn server_cert() -> PeerCertificate {
    PeerCertificate {
        der: vec![0x30, 0x82, 0x02, 0x11, 0x42],
        subject: "PLC01 Server".to_string(),
        thumbprint: "9c1f0e77".to_string(),
        not_before: None,
        not_after: None,
        host_names: Vec::new(),
        application_uri: None,
    }
}

fn sample(value: f64, second: u32) -> DataValue {
    let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, second).unwrap();
    DataValue::new(Variant::Double(value), ts)
}

async fn wait_for_state<T: OpcUaTransport>(session: &SessionHandle<T>, expected: SessionState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.state().await != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session never reached the expected state");
}

async fn next_event(rx: &mut tokio::sync::mpsc::Receiver<ValueEvent>) -> ValueEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no value delivered")
        .expect("value channel closed")
}

// =============================================================================
// Session tests
// =============================================================================

#[tokio::test]
async fn test_open_and_close_session() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    let manager = SessionManager::new(config(&pki), transport.clone());

    let session = manager.open().await.unwrap();
    assert_eq!(session.state().await, SessionState::Open);
    assert_eq!(session.endpoint_url(), "opc.tcp://plc01:4840");
    assert_eq!(transport.opened.lock()[0].session_name, "tagwatch");

    manager.close(session).await.unwrap();
    assert_eq!(manager.state().await, SessionState::Closed);
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    assert_eq!(manager.stats().opens(), 1);
    assert_eq!(manager.stats().closes(), 1);
}

#[tokio::test]
async fn test_second_open_is_refused_while_live() {
    let pki = tempfile::tempdir().unwrap();
    let manager = SessionManager::new(config(&pki), MockTransport::single());

    let session = manager.open().await.unwrap();
    let error = manager.open().await.unwrap_err();
    assert_eq!(error.stage, Stage::Handshake);
    assert!(matches!(
        error.inner(),
        OpcUaError::Session(SessionError::AlreadyOpen)
    ));
    assert_eq!(session.state().await, SessionState::Open);

    manager.close(session).await.unwrap();
    let again = manager.open().await.unwrap();
    manager.close(again).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_discovery_timeout_is_tagged_and_faults() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    transport.hang_discovery.store(true, Ordering::SeqCst);
    let manager = SessionManager::new(config(&pki), transport.clone());

    let error = manager.open().await.unwrap_err();
    assert_eq!(error.stage, Stage::Discovery);
    assert_eq!(error.endpoint, "opc.tcp://plc01:4840");
    assert!(matches!(
        error.inner(),
        OpcUaError::Timeout(TimeoutError::Discovery { .. })
    ));
    assert_eq!(manager.state().await, SessionState::Faulted);
    assert_eq!(manager.stats().failures(), 1);

    transport.hang_discovery.store(false, Ordering::SeqCst);
    let session = manager.open().await.unwrap();
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout_is_tagged_and_cleaned_up() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    transport.hang_open.store(true, Ordering::SeqCst);
    let mut config = config(&pki);
    config.operation_timeout = Duration::from_secs(3);
    let manager = SessionManager::new(config, transport.clone());

    let error = manager.open().await.unwrap_err();
    assert_eq!(error.stage, Stage::Handshake);
    assert_eq!(error.endpoint, "opc.tcp://plc01:4840");
    assert!(matches!(
        error.inner(),
        OpcUaError::Timeout(TimeoutError::Session { duration }) if *duration == Duration::from_secs(3)
    ));
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state().await, SessionState::Faulted);
    assert_eq!(manager.stats().failures(), 1);
    assert_eq!(manager.stats().opens(), 0);
}

#[tokio::test]
async fn test_invalid_settings_fail_before_connecting() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    let mut config = config(&pki);
    config.discovery_timeout = Duration::ZERO;
    let manager = SessionManager::new(config, transport.clone());

    let error = manager.open().await.unwrap_err();
    assert!(matches!(
        error.inner(),
        OpcUaError::Configuration(ConfigurationError::InvalidValue { .. })
    ));
    assert!(transport.opened.lock().is_empty());
    assert_eq!(manager.state().await, SessionState::Faulted);
}

#[tokio::test]
async fn test_no_tcp_endpoint_fails_selection() {
    let pki = tempfile::tempdir().unwrap();
    let https = EndpointCandidate::new("https://plc01:443", 3).with_profile(TransportProfile::HttpsBinary);
    let manager = SessionManager::new(config(&pki), MockTransport::new(vec![https]));

    let error = manager.open().await.unwrap_err();
    assert_eq!(error.stage, Stage::EndpointSelection);
    assert_eq!(manager.state().await, SessionState::Faulted);
}

#[tokio::test]
async fn test_loopback_endpoint_is_rewritten_to_dialed_host() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::new(vec![EndpointCandidate::new(
        "opc.tcp://localhost:4840/UA/Server",
        1,
    )]);
    let manager = SessionManager::new(config(&pki), transport.clone());

    let session = manager.open().await.unwrap();
    assert_eq!(session.endpoint_url(), "opc.tcp://plc01:4840/UA/Server");
    assert_eq!(
        transport.opened.lock()[0].endpoint.endpoint_url,
        "opc.tcp://plc01:4840/UA/Server"
    );
    manager.close(session).await.unwrap();
}

#[tokio::test]
async fn test_selection_depends_on_local_certificate() {
    let pki = tempfile::tempdir().unwrap();
    let endpoints = vec![
        EndpointCandidate::new("opc.tcp://plc01:4840/none", 0),
        EndpointCandidate::new("opc.tcp://plc01:4840/secure", 3),
    ];
    let transport = MockTransport::new(endpoints);
    let manager = SessionManager::new(config(&pki), transport.clone());

    let session = manager.open().await.unwrap();
    assert_eq!(session.endpoint_url(), "opc.tcp://plc01:4840/secure");
    manager.close(session).await.unwrap();

    transport.have_certificate.store(false, Ordering::SeqCst);
    let session = manager.open().await.unwrap();
    assert_eq!(session.endpoint_url(), "opc.tcp://plc01:4840/none");
    manager.close(session).await.unwrap();
}

// =============================================================================
// Trust tests
// =============================================================================

#[tokio::test]
async fn test_untrusted_certificate_rejected_by_default() {
    let pki = tempfile::tempdir().unwrap();
    let endpoint = EndpointCandidate::new("opc.tcp://plc01:4840", 1).with_certificate(server_cert());
    let manager = SessionManager::new(config(&pki), MockTransport::new(vec![endpoint]));

    let error = manager.open().await.unwrap_err();
    assert_eq!(error.stage, Stage::Trust);
    assert!(error.inner().is_certificate_rejected());
    assert!(pki
        .path()
        .join("rejected")
        .join(server_cert().file_name())
        .exists());
}

#[tokio::test]
async fn test_policy_consulted_once_then_store_decides() {
    let pki = tempfile::tempdir().unwrap();
    let endpoint = EndpointCandidate::new("opc.tcp://plc01:4840", 1).with_certificate(server_cert());
    let transport = MockTransport::new(vec![endpoint]);
    let policy = CountingPolicy::new(TrustDecision::Accept);
    let manager = SessionManager::with_policy(config(&pki), transport, policy.clone());

    let session = manager.open().await.unwrap();
    assert_eq!(policy.calls(), 1);
    assert!(pki
        .path()
        .join("trusted")
        .join(server_cert().file_name())
        .exists());
    manager.close(session).await.unwrap();

    let session = manager.open().await.unwrap();
    assert_eq!(policy.calls(), 1);
    manager.close(session).await.unwrap();
}

// =============================================================================
// Subscription tests
// =============================================================================

#[tokio::test]
async fn test_end_to_end_delivery() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    let manager = SessionManager::new(config(&pki), transport.clone());
    let session = manager.open().await.unwrap();

    let mut subscription = Subscription::create(&session, manager.config().subscription.clone())
        .await
        .unwrap();
    subscription.add_item("Temp", "ns=2;s=Line1.Temp").unwrap();
    let (sink, mut rx) = ChannelSink::with_channel(16);
    subscription.set_default_handler(Arc::new(sink));
    subscription.bind().await.unwrap();
    assert_eq!(subscription.state(), SubscriptionState::Bound);
    assert_eq!(subscription.subscription_id(), Some(SUBSCRIPTION_ID));

    transport.push_values(1, vec![sample(42.5, 0)]);
    let event = next_event(&mut rx).await;
    assert_eq!(event.tag, "Temp");
    assert_eq!(event.value.value, Variant::Double(42.5));
    assert!(event.value.status.is_good());
    assert_eq!(subscription.last_value("Temp"), Some(sample(42.5, 0)));
    assert_eq!(subscription.items()[0].server_item_id, Some(100));

    subscription.close().await.unwrap();
    assert_eq!(*transport.deleted.lock(), vec![SUBSCRIPTION_ID]);
    manager.close(session).await.unwrap();
}

#[tokio::test]
async fn test_values_arrive_in_server_order() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    let manager = SessionManager::new(config(&pki), transport.clone());
    let session = manager.open().await.unwrap();

    let mut subscription = Subscription::create(&session, SubscriptionSettings::default())
        .await
        .unwrap();
    subscription.add_item("Pressure", "ns=2;i=1001").unwrap();
    subscription.add_item("Flow", "ns=2;i=1002").unwrap();
    let (pressure, mut pressure_rx) = ChannelSink::with_channel(16);
    let (flow, mut flow_rx) = ChannelSink::with_channel(16);
    subscription.set_notification_handler("Pressure", Arc::new(pressure)).unwrap();
    subscription.set_notification_handler("Flow", Arc::new(flow)).unwrap();
    subscription.bind().await.unwrap();

    transport.push_values(1, vec![sample(1.0, 1), sample(2.0, 2)]);
    transport.push_values(2, vec![sample(9.0, 1)]);
    transport.push_values(1, vec![sample(3.0, 3)]);

    for expected in [1.0, 2.0, 3.0] {
        let event = next_event(&mut pressure_rx).await;
        assert_eq!(event.tag, "Pressure");
        assert_eq!(event.value.value, Variant::Double(expected));
    }
    assert_eq!(next_event(&mut flow_rx).await.value.value, Variant::Double(9.0));
    assert_eq!(subscription.stats().delivered(), 4);

    subscription.close().await.unwrap();
    manager.close(session).await.unwrap();
}

#[tokio::test]
async fn test_unknown_handle_and_overflow_are_counted() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    let manager = SessionManager::new(config(&pki), transport.clone());
    let session = manager.open().await.unwrap();

    let mut subscription = Subscription::create(&session, SubscriptionSettings::default())
        .await
        .unwrap();
    subscription.add_item("Temp", "ns=2;s=Temp").unwrap();
    let (sink, mut rx) = ChannelSink::with_channel(16);
    subscription.set_default_handler(Arc::new(sink));
    subscription.bind().await.unwrap();

    transport.push_values(99, vec![sample(0.0, 0)]);
    transport.push_values(1, vec![sample(5.0, 0).with_status(StatusCode(0x0000_0480))]);

    let event = next_event(&mut rx).await;
    assert!(event.value.status.is_overflow());
    assert_eq!(subscription.stats().unknown_handles(), 1);
    assert_eq!(subscription.stats().overflows(), 1);

    subscription.close().await.unwrap();
    manager.close(session).await.unwrap();
}

#[tokio::test]
async fn test_add_item_after_bind_is_refused() {
    let pki = tempfile::tempdir().unwrap();
    let manager = SessionManager::new(config(&pki), MockTransport::single());
    let session = manager.open().await.unwrap();

    let mut subscription = Subscription::create(&session, SubscriptionSettings::default())
        .await
        .unwrap();
    subscription.add_item("Temp", "ns=2;s=Temp").unwrap();
    assert!(matches!(
        subscription.add_item("Temp", "ns=2;s=Other"),
        Err(OpcUaError::Subscription(SubscriptionError::DuplicateItem { .. }))
    ));
    subscription.bind().await.unwrap();

    assert!(matches!(
        subscription.add_item("Level", "ns=2;s=Level"),
        Err(OpcUaError::Subscription(SubscriptionError::AlreadyBound { .. }))
    ));
    assert_eq!(subscription.items().len(), 1);
    assert_eq!(subscription.items()[0].display_name, "Temp");
    assert!(matches!(
        subscription.set_notification_handler("Level", Arc::new(ChannelSink::with_channel(1).0)),
        Err(OpcUaError::Subscription(SubscriptionError::ItemNotFound { .. }))
    ));

    subscription.close().await.unwrap();
    manager.close(session).await.unwrap();
}

#[tokio::test]
async fn test_bind_without_items_fails() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    let manager = SessionManager::new(config(&pki), transport.clone());
    let session = manager.open().await.unwrap();

    let mut subscription = Subscription::create(&session, SubscriptionSettings::default())
        .await
        .unwrap();
    let error = subscription.bind().await.unwrap_err();
    assert!(matches!(
        error,
        OpcUaError::Subscription(SubscriptionError::BindFailed { .. })
    ));
    assert!(transport.deleted.lock().is_empty());

    subscription.close().await.unwrap();
    manager.close(session).await.unwrap();
}

#[tokio::test]
async fn test_rejected_item_rolls_back_bind() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    transport.reject_node("ns=2;s=Missing");
    let manager = SessionManager::new(config(&pki), transport.clone());
    let session = manager.open().await.unwrap();

    let mut subscription = Subscription::create(&session, SubscriptionSettings::default())
        .await
        .unwrap();
    subscription.add_item("Temp", "ns=2;s=Temp").unwrap();
    subscription.add_item("Ghost", "ns=2;s=Missing").unwrap();

    let error = subscription.bind().await.unwrap_err();
    assert!(matches!(
        error,
        OpcUaError::Subscription(SubscriptionError::BindFailed { .. })
    ));
    assert!(error.to_string().contains("Ghost"));
    assert_eq!(*transport.deleted.lock(), vec![SUBSCRIPTION_ID]);
    assert_eq!(subscription.state(), SubscriptionState::Unbound);
    assert_eq!(session.state().await, SessionState::Open);

    subscription.close().await.unwrap();
    manager.close(session).await.unwrap();
}

#[tokio::test]
async fn test_channel_fault_stops_delivery() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    let manager = SessionManager::new(config(&pki), transport.clone());
    let session = manager.open().await.unwrap();

    let mut subscription = Subscription::create(&session, SubscriptionSettings::default())
        .await
        .unwrap();
    subscription.add_item("Temp", "ns=2;s=Temp").unwrap();
    let (sink, mut rx) = ChannelSink::with_channel(16);
    subscription.set_default_handler(Arc::new(sink));
    subscription.bind().await.unwrap();

    transport.push_values(1, vec![sample(1.0, 0)]);
    next_event(&mut rx).await;

    transport.push(TransportEvent::Fault {
        reason: "keep-alive timeout".to_string(),
    });
    let fault = tokio::time::timeout(Duration::from_secs(5), subscription.delivery_fault())
        .await
        .unwrap();
    assert!(fault.is_delivery_fault());
    assert!(fault.to_string().contains("keep-alive timeout"));
    assert_eq!(session.state().await, SessionState::Faulted);
    assert_eq!(subscription.state(), SubscriptionState::Closed);

    transport.push_values(1, vec![sample(2.0, 1)]);
    tokio::task::yield_now().await;
    assert!(rx.try_recv().is_err());
    assert_eq!(subscription.stats().delivered(), 1);

    subscription.close().await.unwrap();
    assert!(transport.deleted.lock().is_empty());
    manager.close(session).await.unwrap();
    assert_eq!(manager.state().await, SessionState::Closed);
    assert_eq!(manager.stats().faults(), 1);
}

#[tokio::test]
async fn test_create_requires_open_session() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    let manager = SessionManager::new(config(&pki), transport.clone());
    let session = manager.open().await.unwrap();

    let mut subscription = Subscription::create(&session, SubscriptionSettings::default())
        .await
        .unwrap();
    subscription.add_item("Temp", "ns=2;s=Temp").unwrap();
    subscription.bind().await.unwrap();
    transport.push(TransportEvent::Fault {
        reason: "socket closed".to_string(),
    });
    subscription.delivery_fault().await;

    let error = Subscription::create(&session, SubscriptionSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        OpcUaError::Session(SessionError::NotOpen { .. })
    ));

    subscription.close().await.unwrap();
    manager.close(session).await.unwrap();
}

#[tokio::test]
async fn test_channel_fault_before_bind_faults_session() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    let manager = SessionManager::new(config(&pki), transport.clone());
    let session = manager.open().await.unwrap();

    let mut subscription = Subscription::create(&session, SubscriptionSettings::default())
        .await
        .unwrap();
    subscription.add_item("Temp", "ns=2;s=Temp").unwrap();

    transport.push(TransportEvent::Fault {
        reason: "keep-alive lost".to_string(),
    });
    wait_for_state(&session, SessionState::Faulted).await;
    assert_eq!(manager.stats().faults(), 1);

    let error = subscription.bind().await.unwrap_err();
    assert!(matches!(
        error,
        OpcUaError::Subscription(SubscriptionError::BindFailed { ref reason }) if reason == "session is Faulted"
    ));
    assert_eq!(subscription.state(), SubscriptionState::Unbound);
    assert!(transport.deleted.lock().is_empty());

    let error = Subscription::create(&session, SubscriptionSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        OpcUaError::Session(SessionError::NotOpen { .. })
    ));

    subscription.close().await.unwrap();
    manager.close(session).await.unwrap();
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state().await, SessionState::Closed);
}

#[tokio::test]
async fn test_clean_close_is_not_counted_as_fault() {
    let pki = tempfile::tempdir().unwrap();
    let transport = MockTransport::single();
    let manager = SessionManager::new(config(&pki), transport.clone());
    let session = manager.open().await.unwrap();

    manager.close(session).await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(manager.stats().faults(), 0);
    assert_eq!(manager.state().await, SessionState::Closed);
}
