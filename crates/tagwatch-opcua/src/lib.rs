// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA telemetry client core for tagwatch.
//!
//! Connects to one OPC UA server, opens one session, subscribes to a fixed set
//! of tags and streams value changes to a [`NotificationSink`].
//!
//! # Features
//!
//! - Endpoint discovery with loopback address rewriting
//! - Endpoint selection by transport profile and security level
//! - Certificate validation with an opt-in trust-on-first-use policy
//! - Single owned session with a fault-aware state machine
//! - All-or-nothing subscription bind with per-item notification handlers
//!
//! # Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Discovery, endpoint selection, handshake
//! ├── Session       - Session lifecycle errors
//! ├── Security      - Certificate rejection and store errors
//! ├── Subscription  - Item registration, bind and delivery
//! ├── Configuration - Invalid settings and node ids
//! └── Timeout       - Discovery and handshake budgets
//! ```
//!
//! Startup errors are tagged with the [`Stage`] that failed through
//! [`StageError`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tagwatch_opcua::{ClientConfig, ConsoleSink, SessionManager, Subscription, UaTcpTransport};
//!
//! let config = ClientConfig::builder().server("10.0.0.5", 4840).build()?;
//! let transport = Arc::new(UaTcpTransport::new(&config)?);
//! let manager = SessionManager::new(config.clone(), transport);
//!
//! let session = manager.open().await?;
//! let mut subscription = Subscription::create(&session, config.subscription.clone()).await?;
//! subscription.add_item("Temp", "ns=2;s=T1")?;
//! subscription.set_default_handler(Arc::new(ConsoleSink::stdout()));
//! subscription.bind().await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod types;

pub use error::{
    ConfigurationError, ConnectionError, ErrorCode, ErrorSeverity, OpcUaError, OpcUaResult,
    SecurityError, SessionError, Stage, StageContext, StageError, SubscriptionError, TimeoutError,
};

pub use types::{
    ClientConfig, ClientConfigBuilder, DataValue, NodeId, NodeIdentifier, SecurityMode,
    SecurityPolicy, StatusCode, StatusSeverity, SubscriptionSettings, TransportProfile, Variant,
};

pub use client::{
    ChannelSink, ConsoleSink, EndpointCandidate, EndpointResolver, MonitoredItem,
    MonitoredItemId, NotificationSink, OpcUaTransport, PeerCertificate, SessionHandle,
    SessionManager, SessionState, Subscription, SubscriptionState, TransportEvent,
    TrustDecision, TrustOnFirstUse, TrustPolicy, ValidationFailure, ValueEvent,
};

#[cfg(feature = "real-transport")]
pub use client::UaTcpTransport;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
