// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Consumers of value-change notifications.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::types::DataValue;

// =============================================================================
// NotificationSink
// =============================================================================

/// Receives every value delivered for the items it is registered on.
///
/// Called from the dispatcher task. Implementations must return quickly and
/// hand long-running work off to another task.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Called once per delivered value, in server order for each item.
    async fn on_value(&self, tag_name: &str, value: &DataValue);
}

// =============================================================================
// ConsoleSink
// =============================================================================

/// Writes `{tag}: {value}, {source timestamp}, {status}` lines.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    /// Creates a sink writing to stdout.
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Creates a sink writing to `writer`.
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }

    /// Formats one notification line.
    pub fn format_line(tag_name: &str, value: &DataValue) -> String {
        let timestamp = value
            .source_timestamp
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        format!("{}: {}, {}, {}", tag_name, value.value, timestamp, value.status)
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl NotificationSink for ConsoleSink {
    async fn on_value(&self, tag_name: &str, value: &DataValue) {
        let line = Self::format_line(tag_name, value);
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            tracing::warn!(error = %e, "Failed to write notification");
        }
    }
}

// =============================================================================
// ChannelSink
// =============================================================================

/// A value forwarded by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValueEvent {
    /// Tag name.
    pub tag: String,
    /// Delivered value.
    pub value: DataValue,
}

/// Forwards values over a bounded channel without waiting.
///
/// Values that do not fit are dropped, logged and counted.
#[derive(Debug)]
pub struct ChannelSink {
    sender: mpsc::Sender<ValueEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Creates a sink over an existing sender.
    pub fn new(sender: mpsc::Sender<ValueEvent>) -> Self {
        Self {
            sender,
            dropped: AtomicU64::new(0),
        }
    }

    /// Creates a sink and its receiver.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<ValueEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Returns the number of values dropped.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn on_value(&self, tag_name: &str, value: &DataValue) {
        let event = ValueEvent {
            tag: tag_name.to_string(),
            value: value.clone(),
        };
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(tag = tag_name, dropped = dropped, "Value channel full, dropping value");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(tag = tag_name, "Value channel closed");
            }
        }
    }
}

// =============================================================================
// FnSink
// =============================================================================

/// Adapts a closure into a sink.
pub struct FnSink<F>(F);

impl<F> FnSink<F>
where
    F: Fn(&str, &DataValue) + Send + Sync,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> NotificationSink for FnSink<F>
where
    F: Fn(&str, &DataValue) + Send + Sync,
{
    async fn on_value(&self, tag_name: &str, value: &DataValue) {
        (self.0)(tag_name, value)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StatusCode, Variant};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sample() -> DataValue {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        DataValue::new(Variant::Double(42.5), ts)
    }

    #[tokio::test]
    async fn test_console_sink_line_format() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::with_writer(buf.clone());
        sink.on_value("Temp", &sample()).await;

        let mut no_ts = sample().with_status(StatusCode::UNCERTAIN_LAST_USABLE_VALUE);
        no_ts.source_timestamp = None;
        sink.on_value("Temp", &no_ts).await;

        let text = String::from_utf8(buf.0.lock().clone()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Temp: 42.5, 2025-03-01T12:00:00+00:00, Good");
        assert_eq!(lines[1], "Temp: 42.5, -, UncertainLastUsableValue");
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_and_counts_drops() {
        let (sink, mut rx) = ChannelSink::with_channel(1);
        sink.on_value("A", &sample()).await;
        sink.on_value("B", &sample()).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.tag, "A");
        assert_eq!(sink.dropped(), 1);
    }

    #[tokio::test]
    async fn test_fn_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink = FnSink::new(move |tag: &str, _: &DataValue| captured.lock().push(tag.to_string()));
        sink.on_value("X", &sample()).await;
        assert_eq!(*seen.lock(), vec!["X".to_string()]);
    }
}
