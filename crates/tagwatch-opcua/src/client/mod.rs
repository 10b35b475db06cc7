// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      SessionManager                             │
//! │        (open: discover → select → trust → handshake)            │
//! └─────────────────────────────────────────────────────────────────┘
//!          │ EndpointResolver            │ SessionHandle (owned)
//!          ▼                             ▼
//! ┌──────────────────────┐   ┌──────────────────────────────────────┐
//! │   CertificateGate    │   │     Subscription<'session>           │
//! │ (validator + policy) │   │  (items, bind, delivery_fault)       │
//! └──────────────────────┘   └──────────────────────────────────────┘
//!                                        │
//!                                        ▼
//!                       ┌──────────────────────────────────┐
//!                       │      NotificationDispatcher      │
//!                       │  (client handle → sink table)    │
//!                       └──────────────────────────────────┘
//!                                        │
//!                                        ▼
//!                                NotificationSink
//! ```
//!
//! Everything below the manager talks to the server through
//! [`OpcUaTransport`].

mod dispatch;
pub mod endpoint;
mod session;
pub mod sink;
pub mod subscription;
pub mod transport;
pub mod trust;

#[cfg(feature = "real-transport")]
mod real_transport;

pub use dispatch::DispatchStats;
pub use endpoint::{normalize_url, select_endpoint, EndpointResolver};
pub use session::{SessionHandle, SessionManager, SessionState, SessionStats};
pub use sink::{ChannelSink, ConsoleSink, FnSink, NotificationSink, ValueEvent};
pub use subscription::{MonitoredItem, MonitoredItemId, Subscription, SubscriptionState};
pub use transport::{
    event_channel, EndpointCandidate, EventReceiver, EventSender, MonitoredItemRequest,
    MonitoredItemResult, OpcUaTransport, ServerDescriptor, SessionInfo, SessionRequest,
    TransportEvent,
};
pub use trust::{
    CertificateGate, CertificateValidationError, PeerCertificate, StoreValidator, TrustDecision,
    TrustOnFirstUse, TrustPolicy, TrustStore, ValidationFailure,
};

#[cfg(feature = "real-transport")]
pub use real_transport::UaTcpTransport;
