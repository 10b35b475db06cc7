// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription registry.
//!
//! A [`Subscription`] collects one monitored item per tag, then binds them to
//! the server in one step. After bind the item set is frozen and values flow
//! through the dispatcher to the registered sinks.
//!
//! ```text
//!  create ──► add_item × N ──► set_notification_handler ──► bind ──► (values) ──► close
//!  Unbound                                                   Bound                Closed
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let mut subscription = Subscription::create(&session, settings).await?;
//! subscription.add_item("Temp", "ns=2;s=T1")?;
//! subscription.set_default_handler(Arc::new(ConsoleSink::stdout()));
//! subscription.bind().await?;
//!
//! let fault = subscription.delivery_fault().await;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::dispatch::{DispatchStats, DispatcherHandle, HandlerTable, NotificationDispatcher};
use super::session::SessionHandle;
use super::sink::NotificationSink;
use super::transport::{MonitoredItemRequest, OpcUaTransport};
use crate::error::{OpcUaError, OpcUaResult, SessionError, SubscriptionError};
use crate::types::{DataValue, NodeId, SubscriptionSettings};

// =============================================================================
// SubscriptionState
// =============================================================================

/// State of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Items may still be added.
    #[default]
    Unbound,

    /// Registered with the server and delivering values.
    Bound,

    /// Closed explicitly or by a session fault.
    Closed,
}

impl SubscriptionState {
    /// Returns `true` while values are being delivered.
    #[inline]
    pub const fn is_bound(&self) -> bool {
        matches!(self, Self::Bound)
    }

    /// Returns `true` once closed.
    #[inline]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbound => write!(f, "Unbound"),
            Self::Bound => write!(f, "Bound"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// MonitoredItem
// =============================================================================

/// Local identifier of a monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonitoredItemId(pub u32);

impl MonitoredItemId {
    /// Returns the raw ID value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MonitoredItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mi-{}", self.0)
    }
}

/// One tag being monitored.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItem {
    /// Local identifier.
    pub id: MonitoredItemId,
    /// Handle the server echoes in notifications.
    pub client_handle: u32,
    /// Tag name.
    pub display_name: String,
    /// Node address as configured.
    pub node_address: String,
    /// Parsed node address.
    pub node_id: NodeId,
    /// Server-assigned id, set by bind.
    pub server_item_id: Option<u32>,
    /// Most recent value delivered.
    pub last_notification: Option<DataValue>,
}

// =============================================================================
// Subscription
// =============================================================================

/// One subscription on a session, bounded by the session's lifetime.
pub struct Subscription<'s, T: OpcUaTransport> {
    session: &'s SessionHandle<T>,
    settings: SubscriptionSettings,
    items: Vec<MonitoredItem>,
    table: Arc<HandlerTable>,
    state: SubscriptionState,
    subscription_id: Option<u32>,
    fault_tx: Option<watch::Sender<Option<String>>>,
    fault_rx: watch::Receiver<Option<String>>,
    dispatcher: Option<DispatcherHandle>,
    stats: Arc<DispatchStats>,
}

impl<'s, T: OpcUaTransport> Subscription<'s, T> {
    /// Creates an unbound subscription on an open session.
    pub async fn create(
        session: &'s SessionHandle<T>,
        settings: SubscriptionSettings,
    ) -> OpcUaResult<Self> {
        let state = session.state().await;
        if !state.is_open() {
            return Err(SessionError::not_open(state).into());
        }
        settings.validate()?;

        tracing::debug!(
            endpoint = %session.endpoint_url(),
            publishing_interval = ?settings.publishing_interval,
            "Subscription created"
        );

        let (fault_tx, fault_rx) = watch::channel(None);
        Ok(Self {
            session,
            settings,
            items: Vec::new(),
            table: Arc::new(HandlerTable::default()),
            state: SubscriptionState::Unbound,
            subscription_id: None,
            fault_tx: Some(fault_tx),
            fault_rx,
            dispatcher: None,
            stats: Arc::new(DispatchStats::default()),
        })
    }

    /// Returns the current state.
    pub fn state(&self) -> SubscriptionState {
        if self.fault_rx.borrow().is_some() {
            SubscriptionState::Closed
        } else {
            self.state
        }
    }

    /// Returns the settings.
    pub fn settings(&self) -> &SubscriptionSettings {
        &self.settings
    }

    /// Returns the server subscription id once bound.
    pub fn subscription_id(&self) -> Option<u32> {
        self.subscription_id
    }

    /// Returns delivery counters.
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Returns the monitored items in insertion order.
    pub fn items(&self) -> Vec<MonitoredItem> {
        self.items
            .iter()
            .map(|item| MonitoredItem {
                last_notification: self.table.last_value(item.client_handle),
                ..item.clone()
            })
            .collect()
    }

    /// Returns the most recent value for `tag_name`.
    pub fn last_value(&self, tag_name: &str) -> Option<DataValue> {
        self.find(tag_name)
            .and_then(|item| self.table.last_value(item.client_handle))
    }

    fn find(&self, tag_name: &str) -> Option<&MonitoredItem> {
        self.items.iter().find(|item| item.display_name == tag_name)
    }

    /// Adds a monitored item for `tag_name`.
    pub fn add_item(&mut self, tag_name: &str, node_address: &str) -> OpcUaResult<MonitoredItemId> {
        if self.state() != SubscriptionState::Unbound {
            return Err(SubscriptionError::AlreadyBound {
                tag: tag_name.to_string(),
            }
            .into());
        }
        if self.find(tag_name).is_some() {
            return Err(SubscriptionError::DuplicateItem {
                tag: tag_name.to_string(),
            }
            .into());
        }

        let node_id: NodeId = node_address.parse()?;
        let handle = self.items.len() as u32 + 1;
        let id = MonitoredItemId(handle);

        self.table.insert(handle, tag_name.to_string());
        self.items.push(MonitoredItem {
            id,
            client_handle: handle,
            display_name: tag_name.to_string(),
            node_address: node_address.to_string(),
            node_id,
            server_item_id: None,
            last_notification: None,
        });

        tracing::debug!(tag = tag_name, node = node_address, item = %id, "Monitored item added");
        Ok(id)
    }

    /// Registers the sink for one item.
    pub fn set_notification_handler(
        &self,
        tag_name: &str,
        sink: Arc<dyn NotificationSink>,
    ) -> OpcUaResult<()> {
        let item = self.find(tag_name).ok_or_else(|| SubscriptionError::ItemNotFound {
            tag: tag_name.to_string(),
        })?;
        self.table.set_sink(item.client_handle, sink);
        Ok(())
    }

    /// Registers the sink used by items without their own.
    pub fn set_default_handler(&self, sink: Arc<dyn NotificationSink>) {
        self.table.set_default_sink(sink);
    }

    /// Creates the server subscription and its items, then starts delivery.
    ///
    /// All or nothing: if any step fails the server subscription is deleted
    /// and the subscription stays unbound.
    pub async fn bind(&mut self) -> OpcUaResult<()> {
        match self.state() {
            SubscriptionState::Unbound => {}
            SubscriptionState::Bound => {
                return Err(SubscriptionError::bind_failed("subscription is already bound").into())
            }
            SubscriptionState::Closed => {
                return Err(SubscriptionError::bind_failed("subscription is closed").into())
            }
        }

        let session_state = self.session.state().await;
        if !session_state.is_open() {
            return Err(
                SubscriptionError::bind_failed(format!("session is {}", session_state)).into(),
            );
        }
        if self.items.is_empty() {
            return Err(SubscriptionError::bind_failed(SubscriptionError::NoItems.to_string()).into());
        }

        let transport = self.session.transport();
        let subscription_id = transport
            .create_subscription(&self.settings)
            .await
            .map_err(|e| SubscriptionError::bind_failed(format!("create subscription: {}", e)))?;

        let server_ids = match self.register_items(subscription_id).await {
            Ok(ids) => ids,
            Err(e) => {
                self.discard(subscription_id).await;
                return Err(e);
            }
        };

        let Some(events) = self.session.take_events() else {
            self.discard(subscription_id).await;
            return Err(
                SubscriptionError::bind_failed("session already has a bound subscription").into(),
            );
        };
        let Some(fault_tx) = self.fault_tx.take() else {
            self.session.restore_events(events);
            self.discard(subscription_id).await;
            return Err(SubscriptionError::bind_failed("subscription was already bound").into());
        };

        for (item, server_id) in self.items.iter_mut().zip(server_ids) {
            item.server_item_id = Some(server_id);
        }

        let dispatcher = NotificationDispatcher::new(
            subscription_id,
            events,
            self.table.clone(),
            self.session.shared().clone(),
            fault_tx,
            self.stats.clone(),
        );
        self.dispatcher = Some(dispatcher.spawn());
        self.subscription_id = Some(subscription_id);
        self.state = SubscriptionState::Bound;

        tracing::info!(
            subscription_id = subscription_id,
            items = self.items.len(),
            publishing_interval = ?self.settings.publishing_interval,
            "Subscription bound"
        );
        Ok(())
    }

    async fn register_items(&self, subscription_id: u32) -> OpcUaResult<Vec<u32>> {
        let requests: Vec<_> = self
            .items
            .iter()
            .map(|item| {
                MonitoredItemRequest::new(item.client_handle, item.node_id.clone(), &self.settings)
            })
            .collect();

        let results = self
            .session
            .transport()
            .create_monitored_items(subscription_id, &requests)
            .await
            .map_err(|e| SubscriptionError::bind_failed(format!("create monitored items: {}", e)))?;

        if results.len() != self.items.len() {
            return Err(SubscriptionError::bind_failed(format!(
                "server returned {} results for {} items",
                results.len(),
                self.items.len()
            ))
            .into());
        }

        let mut ids = Vec::with_capacity(results.len());
        for (item, result) in self.items.iter().zip(results) {
            if !result.status.is_good() {
                let rejected = SubscriptionError::ItemRejected {
                    tag: item.display_name.clone(),
                    node_id: item.node_address.clone(),
                    status: result.status.to_string(),
                };
                return Err(SubscriptionError::bind_failed(rejected.to_string()).into());
            }
            ids.push(result.server_item_id);
        }
        Ok(ids)
    }

    async fn discard(&self, subscription_id: u32) {
        if let Err(e) = self
            .session
            .transport()
            .delete_subscription(subscription_id)
            .await
        {
            tracing::warn!(
                subscription_id = subscription_id,
                error = %e,
                "Failed to delete subscription after bind failure"
            );
        }
    }

    /// Resolves when delivery stops because the session faulted.
    ///
    /// Never resolves for a subscription that is closed without a fault.
    pub async fn delivery_fault(&self) -> OpcUaError {
        let mut rx = self.fault_rx.clone();
        let reason = {
            let current = rx.wait_for(Option::is_some).await;
            current.ok().map(|r| r.clone().unwrap_or_default())
        };
        match reason {
            Some(reason) => SubscriptionError::delivery_fault(reason).into(),
            None => std::future::pending().await,
        }
    }

    /// Stops delivery and deletes the server subscription.
    pub async fn close(mut self) -> OpcUaResult<()> {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.stop().await;
        }

        let session_open = self.session.state().await.is_open();
        let result = match self.subscription_id.take() {
            Some(id) if session_open => self.session.transport().delete_subscription(id).await,
            _ => Ok(()),
        };

        self.state = SubscriptionState::Closed;
        tracing::info!(
            endpoint = %self.session.endpoint_url(),
            delivered = self.stats.delivered(),
            "Subscription closed"
        );
        result
    }
}

impl<T: OpcUaTransport> fmt::Debug for Subscription<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("state", &self.state())
            .field("subscription_id", &self.subscription_id)
            .field("items", &self.items.len())
            .finish()
    }
}
