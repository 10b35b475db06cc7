// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Notification dispatch.
//!
//! ```text
//! session watcher ──TransportEvent──► NotificationDispatcher ──► HandlerTable[client_handle] ──► sink
//!                                             │
//!                                  Fault / channel closed
//!                                             ▼
//!                             subscription Closed, fault published
//! ```
//!
//! One dispatcher task runs per bound subscription. It is the only reader of
//! the stream the session watcher forwards, so values for one item reach its
//! sink in the order the server sent them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::session::SessionShared;
use super::sink::NotificationSink;
use super::transport::{EventReceiver, TransportEvent};
use crate::types::DataValue;

// =============================================================================
// HandlerTable
// =============================================================================

/// A registered item as seen by the dispatcher.
#[derive(Clone)]
pub(crate) struct HandlerEntry {
    pub(crate) tag: String,
    pub(crate) sink: Option<Arc<dyn NotificationSink>>,
    pub(crate) last_value: Option<DataValue>,
}

#[derive(Default)]
struct TableInner {
    entries: HashMap<u32, HandlerEntry>,
    default_sink: Option<Arc<dyn NotificationSink>>,
}

/// Client handle to handler mapping.
#[derive(Default)]
pub(crate) struct HandlerTable {
    inner: RwLock<TableInner>,
}

impl HandlerTable {
    pub(crate) fn insert(&self, client_handle: u32, tag: String) {
        self.inner.write().entries.insert(
            client_handle,
            HandlerEntry {
                tag,
                sink: None,
                last_value: None,
            },
        );
    }

    pub(crate) fn set_sink(&self, client_handle: u32, sink: Arc<dyn NotificationSink>) -> bool {
        match self.inner.write().entries.get_mut(&client_handle) {
            Some(entry) => {
                entry.sink = Some(sink);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_default_sink(&self, sink: Arc<dyn NotificationSink>) {
        self.inner.write().default_sink = Some(sink);
    }

    pub(crate) fn last_value(&self, client_handle: u32) -> Option<DataValue> {
        self.inner
            .read()
            .entries
            .get(&client_handle)
            .and_then(|e| e.last_value.clone())
    }

    /// Returns the tag and effective sink for a handle.
    fn route(&self, client_handle: u32) -> Option<(String, Option<Arc<dyn NotificationSink>>)> {
        let inner = self.inner.read();
        inner.entries.get(&client_handle).map(|entry| {
            let sink = entry.sink.clone().or_else(|| inner.default_sink.clone());
            (entry.tag.clone(), sink)
        })
    }

    fn record(&self, client_handle: u32, value: &DataValue) {
        if let Some(entry) = self.inner.write().entries.get_mut(&client_handle) {
            entry.last_value = Some(value.clone());
        }
    }
}

// =============================================================================
// DispatchStats
// =============================================================================

/// Delivery counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    overflows: AtomicU64,
    unknown_handles: AtomicU64,
    unhandled: AtomicU64,
}

impl DispatchStats {
    /// Values handed to a sink.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Values carrying the overflow bit.
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Events for client handles not in the table.
    pub fn unknown_handles(&self) -> u64 {
        self.unknown_handles.load(Ordering::Relaxed)
    }

    /// Values for items with no sink and no default sink.
    pub fn unhandled(&self) -> u64 {
        self.unhandled.load(Ordering::Relaxed)
    }
}

// =============================================================================
// NotificationDispatcher
// =============================================================================

/// Routes transport events to the per-item sinks.
pub(crate) struct NotificationDispatcher {
    subscription_id: u32,
    events: EventReceiver,
    table: Arc<HandlerTable>,
    session: Arc<SessionShared>,
    fault: watch::Sender<Option<String>>,
    stats: Arc<DispatchStats>,
}

/// Running dispatcher task.
pub(crate) struct DispatcherHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stops the task and waits for it to finish.
    pub(crate) async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::debug!(error = %e, "Dispatcher task ended abnormally");
        }
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        if self.stop.is_some() {
            self.task.abort();
        }
    }
}

impl NotificationDispatcher {
    pub(crate) fn new(
        subscription_id: u32,
        events: EventReceiver,
        table: Arc<HandlerTable>,
        session: Arc<SessionShared>,
        fault: watch::Sender<Option<String>>,
        stats: Arc<DispatchStats>,
    ) -> Self {
        Self {
            subscription_id,
            events,
            table,
            session,
            fault,
            stats,
        }
    }

    /// Spawns the dispatch loop.
    pub(crate) fn spawn(self) -> DispatcherHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(stop_rx));
        DispatcherHandle {
            stop: Some(stop_tx),
            task,
        }
    }

    async fn run(mut self, mut stop: oneshot::Receiver<()>) {
        tracing::debug!(subscription_id = self.subscription_id, "Dispatcher started");

        let reason = loop {
            let event = tokio::select! {
                biased;
                _ = &mut stop => {
                    tracing::debug!(subscription_id = self.subscription_id, "Dispatcher stopped");
                    return;
                }
                event = self.events.recv() => event,
            };

            match event {
                Some(TransportEvent::DataChange {
                    subscription_id,
                    client_handle,
                    values,
                }) => {
                    if subscription_id != self.subscription_id {
                        tracing::debug!(
                            subscription_id = subscription_id,
                            "Ignoring event for another subscription"
                        );
                        continue;
                    }
                    self.deliver(client_handle, values).await;
                }
                Some(TransportEvent::Fault { reason }) => break reason,
                None => break "event channel closed".to_string(),
            }
        };

        self.session.fault(&reason).await;
        tracing::error!(
            subscription_id = self.subscription_id,
            reason = %reason,
            "Notification delivery stopped"
        );
        self.fault.send_replace(Some(reason));
    }

    async fn deliver(&self, client_handle: u32, values: Vec<DataValue>) {
        let Some((tag, sink)) = self.table.route(client_handle) else {
            self.stats.unknown_handles.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(client_handle = client_handle, "Notification for unknown client handle");
            return;
        };

        for value in &values {
            if value.status.is_overflow() {
                self.stats.overflows.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(tag = %tag, status = %value.status, "Server queue overflow, values were lost");
            }

            self.table.record(client_handle, value);

            match &sink {
                Some(sink) => {
                    sink.on_value(&tag, value).await;
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    self.stats.unhandled.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(tag = %tag, "No handler registered");
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sink::FnSink;
    use crate::types::{StatusCode, Variant};

    #[test]
    fn test_route_falls_back_to_default_sink() {
        let table = HandlerTable::default();
        table.insert(1, "A".into());
        table.insert(2, "B".into());

        assert!(table.route(1).unwrap().1.is_none());

        let sink: Arc<dyn NotificationSink> = Arc::new(FnSink::new(|_: &str, _: &DataValue| {}));
        table.set_default_sink(sink.clone());
        assert!(table.set_sink(2, sink));
        assert!(!table.set_sink(9, Arc::new(FnSink::new(|_: &str, _: &DataValue| {}))));

        let (tag, routed) = table.route(1).unwrap();
        assert_eq!(tag, "A");
        assert!(routed.is_some());
        assert!(table.route(3).is_none());
    }

    #[test]
    fn test_record_keeps_last_value() {
        let table = HandlerTable::default();
        table.insert(1, "A".into());
        let value = DataValue::new(Variant::Int32(7), chrono::Utc::now())
            .with_status(StatusCode::GOOD);
        table.record(1, &value);
        assert_eq!(table.last_value(1), Some(value));
        assert_eq!(table.last_value(2), None);
    }
}
