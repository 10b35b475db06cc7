// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session management.
//!
//! ```text
//!            open()                 ok
//!  Closed ───────────► Opening ───────────► Open ──── close() ────► Closed
//!                         │                   │
//!                    any failure        channel fault
//!                         ▼                   ▼
//!                      Faulted ◄──────────────┘
//! ```
//!
//! A [`SessionManager`] hands out at most one live [`SessionHandle`]. The
//! handle is the only owner of the session; subscriptions borrow it, and
//! [`SessionManager::close`] consumes it.
//!
//! From `open` on, a watcher task reads the transport's event stream. A
//! channel fault moves the session to `Faulted` whether or not a
//! subscription is bound; every event is then forwarded to the dispatcher.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::endpoint::EndpointResolver;
use super::transport::{
    event_channel, EventReceiver, EventSender, OpcUaTransport, SessionInfo, SessionRequest,
    TransportEvent,
};
use super::trust::{CertificateGate, StoreValidator, TrustOnFirstUse, TrustPolicy, TrustStore};
use crate::error::{
    ConnectionError, OpcUaResult, SessionError, Stage, StageContext, StageError, TimeoutError,
};
use crate::types::ClientConfig;

// =============================================================================
// SessionState
// =============================================================================

/// State of an OPC UA session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session.
    #[default]
    Closed,

    /// Discovery, trust and handshake in progress.
    Opening,

    /// Session is active.
    Open,

    /// Open failed or the channel was lost.
    Faulted,
}

impl SessionState {
    /// Returns `true` if the session is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if the session has faulted.
    #[inline]
    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Opening => write!(f, "Opening"),
            Self::Open => write!(f, "Open"),
            Self::Faulted => write!(f, "Faulted"),
        }
    }
}

type StateCallback = Arc<dyn Fn(SessionState, SessionState) + Send + Sync>;

// =============================================================================
// SessionShared
// =============================================================================

/// Session state shared by the handle, the channel watcher and the dispatcher.
pub(crate) struct SessionShared {
    state: RwLock<SessionState>,
    endpoint: String,
    on_state_change: Option<StateCallback>,
    stats: Arc<SessionStats>,
}

impl SessionShared {
    fn new(endpoint: String, on_state_change: Option<StateCallback>, stats: Arc<SessionStats>) -> Self {
        Self {
            state: RwLock::new(SessionState::Closed),
            endpoint,
            on_state_change,
            stats,
        }
    }

    pub(crate) async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) async fn set_state(&self, new_state: SessionState) {
        let old_state = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, new_state)
        };

        if old_state != new_state {
            tracing::trace!(
                endpoint = %self.endpoint,
                old_state = %old_state,
                new_state = %new_state,
                "Session state changed"
            );

            if let Some(callback) = &self.on_state_change {
                callback(old_state, new_state);
            }
        }
    }

    /// Moves an open session to `Faulted`. Returns `false` if it was not open.
    pub(crate) async fn fault(&self, reason: &str) -> bool {
        {
            let state = self.state.read().await;
            if !state.is_open() {
                return false;
            }
        }
        tracing::error!(endpoint = %self.endpoint, reason = reason, "Session faulted");
        self.stats.record_fault();
        self.set_state(SessionState::Faulted).await;
        true
    }
}

/// Reads the transport events for the life of the session.
///
/// Faults are applied to `shared` before they are forwarded, so the session
/// leaves `Open` even when nothing consumes `forward`.
async fn watch_channel(shared: Arc<SessionShared>, mut events: EventReceiver, forward: EventSender) {
    let reason = loop {
        match events.recv().await {
            Some(TransportEvent::Fault { reason }) => break reason,
            Some(event) => {
                // The receiver is gone once a bound subscription has closed.
                let _ = forward.send(event);
            }
            None => break "event channel closed".to_string(),
        }
    };

    shared.fault(&reason).await;
    let _ = forward.send(TransportEvent::Fault { reason });
}

// =============================================================================
// SessionHandle
// =============================================================================

/// Owner of one open session.
///
/// Not `Clone`. Subscriptions borrow it for their whole life, so the session
/// cannot be closed while one is alive.
pub struct SessionHandle<T: OpcUaTransport> {
    transport: Arc<T>,
    shared: Arc<SessionShared>,
    info: SessionInfo,
    events: Mutex<Option<EventReceiver>>,
    watcher: JoinHandle<()>,
    live: Arc<AtomicBool>,
}

impl<T: OpcUaTransport> SessionHandle<T> {
    /// Returns the session state.
    pub async fn state(&self) -> SessionState {
        self.shared.state().await
    }

    /// Returns session facts.
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Returns the endpoint URL.
    pub fn endpoint_url(&self) -> &str {
        &self.info.endpoint_url
    }

    pub(crate) fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    /// Takes the event stream. Only the first subscription to bind gets it.
    pub(crate) fn take_events(&self) -> Option<EventReceiver> {
        self.events.lock().take()
    }

    /// Returns an event stream that was taken but not used.
    pub(crate) fn restore_events(&self, events: EventReceiver) {
        *self.events.lock() = Some(events);
    }
}

impl<T: OpcUaTransport> Drop for SessionHandle<T> {
    fn drop(&mut self) {
        self.watcher.abort();
        self.live.store(false, Ordering::Release);
    }
}

impl<T: OpcUaTransport> fmt::Debug for SessionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SessionManager
// =============================================================================

/// Opens and closes the single session of a client.
///
/// # Examples
///
/// ```rust,ignore
/// let manager = SessionManager::new(config, Arc::new(UaTcpTransport::new(&config)?));
/// let session = manager.open().await?;
/// // ... subscribe ...
/// manager.close(session).await?;
/// ```
pub struct SessionManager<T: OpcUaTransport> {
    config: ClientConfig,
    transport: Arc<T>,
    policy: Arc<dyn TrustPolicy>,
    live: Arc<AtomicBool>,
    current: Mutex<Option<Arc<SessionShared>>>,
    stats: Arc<SessionStats>,
    on_state_change: Option<StateCallback>,
}

impl<T: OpcUaTransport> SessionManager<T> {
    /// Creates a manager with the trust-on-first-use policy from `config`.
    pub fn new(config: ClientConfig, transport: Arc<T>) -> Self {
        let policy = Arc::new(TrustOnFirstUse::new(config.auto_accept_untrusted));
        Self::with_policy(config, transport, policy)
    }

    /// Creates a manager with a custom trust policy.
    pub fn with_policy(
        config: ClientConfig,
        transport: Arc<T>,
        policy: Arc<dyn TrustPolicy>,
    ) -> Self {
        Self {
            config,
            transport,
            policy,
            live: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
            stats: Arc::new(SessionStats::new()),
            on_state_change: None,
        }
    }

    /// Sets a callback for state changes.
    ///
    /// Applies to sessions opened after the call.
    pub fn set_state_change_callback<F>(&mut self, callback: F)
    where
        F: Fn(SessionState, SessionState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(callback));
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the state of the most recent session.
    pub async fn state(&self) -> SessionState {
        let current = self.current.lock().clone();
        match current {
            Some(shared) => shared.state().await,
            None => SessionState::Closed,
        }
    }

    /// Returns the session statistics.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Builds the certificate gate for the configured PKI directory.
    pub fn certificate_gate(&self) -> CertificateGate {
        let validator = StoreValidator::new(TrustStore::new(&self.config.pki_dir))
            .with_expected_host(self.config.host());
        CertificateGate::new(validator, self.policy.clone())
    }

    /// Opens a session: discovery, endpoint selection, trust and handshake.
    ///
    /// Fails with [`SessionError::AlreadyOpen`] while a handle is live. Any
    /// other failure leaves the attempt `Faulted`; call `open` again to retry.
    pub async fn open(&self) -> Result<SessionHandle<T>, StageError> {
        let url = self.config.discovery_url.clone();

        if self
            .live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StageError::new(Stage::Handshake, url, SessionError::AlreadyOpen));
        }

        self.stats.record_attempt();
        let shared = Arc::new(SessionShared::new(
            url.clone(),
            self.on_state_change.clone(),
            self.stats.clone(),
        ));
        *self.current.lock() = Some(shared.clone());
        shared.set_state(SessionState::Opening).await;

        match self.establish(&shared).await {
            Ok((info, events)) => {
                shared.set_state(SessionState::Open).await;
                self.stats.record_open();
                let (forward_tx, forward_rx) = event_channel();
                let watcher = tokio::spawn(watch_channel(shared.clone(), events, forward_tx));
                tracing::info!(
                    endpoint = %info.endpoint_url,
                    session = %info.session_name,
                    security_mode = %info.security_mode,
                    revised_timeout = ?info.revised_timeout,
                    "OPC UA session opened"
                );
                Ok(SessionHandle {
                    transport: self.transport.clone(),
                    shared,
                    info,
                    events: Mutex::new(Some(forward_rx)),
                    watcher,
                    live: self.live.clone(),
                })
            }
            Err(error) => {
                shared.set_state(SessionState::Faulted).await;
                self.stats.record_failure();
                self.live.store(false, Ordering::Release);
                error.inner().log(&format!("open session at {}", url));
                Err(error)
            }
        }
    }

    async fn establish(
        &self,
        shared: &SessionShared,
    ) -> Result<(SessionInfo, EventReceiver), StageError> {
        let url = shared.endpoint();

        self.config.validate().at_stage(Stage::Discovery, url)?;

        let have_certificate = self
            .transport
            .load_application_certificate()
            .await
            .at_stage(Stage::Handshake, url)?;
        if !have_certificate {
            tracing::warn!("Missing application certificate, using unsecured connection");
        }

        let gate = self.certificate_gate();
        let resolver =
            EndpointResolver::new(self.transport.clone(), self.config.discovery_timeout, gate.clone());
        let endpoint = resolver.resolve(url, have_certificate).await?;
        let endpoint_url = endpoint.endpoint_url.clone();

        let request = SessionRequest {
            endpoint,
            session_name: self.config.session_name.clone(),
            session_timeout: self.config.session_timeout,
            application_name: self.config.application_name.clone(),
            application_uri: self.config.application_uri.clone(),
        };

        let (events_tx, events_rx) = event_channel();
        let timeout = self.config.operation_timeout;
        let info = match tokio::time::timeout(
            timeout,
            self.transport.open_channel(request, gate, events_tx),
        )
        .await
        {
            Ok(result) => result.at_stage(Stage::Handshake, &endpoint_url)?,
            Err(_) => {
                // The transport may still be finishing the handshake.
                if let Err(e) = self.transport.close_channel().await {
                    tracing::debug!(error = %e, "Cleanup after handshake timeout failed");
                }
                return Err(StageError::new(
                    Stage::Handshake,
                    endpoint_url,
                    TimeoutError::session(timeout),
                ));
            }
        };

        Ok((info, events_rx))
    }

    /// Closes the session.
    ///
    /// A faulted session is closed too, so the transport can release resources.
    pub async fn close(&self, handle: SessionHandle<T>) -> OpcUaResult<()> {
        // Stop watching first; the transport drops its sender while closing.
        handle.watcher.abort();
        let state = handle.state().await;
        let result = match state {
            SessionState::Open => self.transport.close_channel().await,
            SessionState::Faulted => {
                if let Err(e) = self.transport.close_channel().await {
                    tracing::debug!(error = %e, "Closing faulted channel failed");
                }
                Ok(())
            }
            SessionState::Closed | SessionState::Opening => Err(ConnectionError::NotConnected.into()),
        };

        handle.shared.set_state(SessionState::Closed).await;
        self.stats.record_close();
        tracing::info!(endpoint = %handle.info.endpoint_url, "OPC UA session closed");
        drop(handle);
        result
    }
}

impl<T: OpcUaTransport> fmt::Debug for SessionManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("endpoint", &self.config.discovery_url)
            .finish()
    }
}

// =============================================================================
// SessionStats
// =============================================================================

/// Statistics for session operations.
#[derive(Debug, Default)]
pub struct SessionStats {
    attempts: AtomicU64,
    opens: AtomicU64,
    failures: AtomicU64,
    faults: AtomicU64,
    closes: AtomicU64,
}

impl SessionStats {
    /// Creates new session statistics.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_open(&self) {
        self.opens.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    fn record_close(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of open attempts.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Returns the number of sessions opened.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    /// Returns the number of failed open attempts.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Returns the number of channel faults on open sessions.
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    /// Returns the number of sessions closed.
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state() {
        assert!(SessionState::Open.is_open());
        assert!(SessionState::Faulted.is_faulted());
        assert!(!SessionState::Opening.is_open());
        assert_eq!(SessionState::default(), SessionState::Closed);
        assert_eq!(SessionState::Faulted.to_string(), "Faulted");
    }

    #[tokio::test]
    async fn test_shared_state_callback_and_fault() {
        use std::sync::atomic::AtomicUsize;

        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();
        let callback: StateCallback = Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let stats = Arc::new(SessionStats::new());
        let shared = SessionShared::new("opc.tcp://h:4840".into(), Some(callback), stats.clone());

        assert!(!shared.fault("not open yet").await);
        shared.set_state(SessionState::Open).await;
        shared.set_state(SessionState::Open).await;
        assert!(shared.fault("keep-alive lost").await);

        assert_eq!(shared.state().await, SessionState::Faulted);
        assert_eq!(changes.load(Ordering::SeqCst), 2);
        assert_eq!(stats.faults(), 1);
    }

    #[test]
    fn test_session_stats() {
        let stats = SessionStats::new();
        stats.record_attempt();
        stats.record_open();
        stats.record_close();
        assert_eq!(stats.attempts(), 1);
        assert_eq!(stats.opens(), 1);
        assert_eq!(stats.closes(), 1);
        assert_eq!(stats.failures(), 0);
    }
}
