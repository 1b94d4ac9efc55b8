//! In-process link implementation.

use super::{
    ChangeSink, ChannelHandle, ChannelSpec, ChannelStatus, LifecycleCallback, LinkSignal,
    RealtimeLink, StatusSink,
};
use crate::types::ChangeNotification;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

struct OpenChannel {
    spec: ChannelSpec,
    on_change: ChangeSink,
    on_status: StatusSink,
    acked: bool,
}

#[derive(Default)]
struct LinkInner {
    connected: bool,
    auto_ack: bool,
    failing_connects: u32,
    connect_calls: u32,
    channels: BTreeMap<u64, OpenChannel>,
}

/// A [`RealtimeLink`] living entirely in memory.
///
/// Connections succeed unless failures were queued with
/// [`fail_next_connects`](MemoryLink::fail_next_connects). Channels are
/// acknowledged as soon as the link is connected unless the link was built
/// with [`manual_ack`](MemoryLink::manual_ack). Change notifications are
/// pushed in with [`emit`](MemoryLink::emit) (every matching channel, as a
/// hosted backend would fan out) or [`emit_to`](MemoryLink::emit_to) (one
/// channel).
///
/// Callbacks are always invoked with no internal lock held.
pub struct MemoryLink {
    inner: Mutex<LinkInner>,
    lifecycle: Mutex<Vec<LifecycleCallback>>,
    next_channel: AtomicU64,
}

impl MemoryLink {
    /// Link that acknowledges channels automatically.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LinkInner {
                auto_ack: true,
                ..Default::default()
            }),
            lifecycle: Mutex::new(Vec::new()),
            next_channel: AtomicU64::new(1),
        }
    }

    /// Link whose channels stay pending until [`ack`](MemoryLink::ack).
    pub fn manual_ack() -> Self {
        let link = Self::new();
        link.inner.lock().auto_ack = false;
        link
    }

    /// Make the next `n` calls to `connect` fail with an error signal.
    pub fn fail_next_connects(&self, n: u32) {
        self.inner.lock().failing_connects = n;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    /// Number of times `connect` was called.
    pub fn connect_calls(&self) -> u32 {
        self.inner.lock().connect_calls
    }

    /// Number of open channels, acknowledged or not.
    pub fn channel_count(&self) -> usize {
        self.inner.lock().channels.len()
    }

    /// Open channels listening on `table`, in opening order.
    pub fn channels_for(&self, table: &str) -> Vec<ChannelHandle> {
        self.inner
            .lock()
            .channels
            .iter()
            .filter(|(_, c)| c.spec.table == table)
            .map(|(id, _)| ChannelHandle(*id))
            .collect()
    }

    /// Spec of an open channel.
    pub fn channel_spec(&self, handle: ChannelHandle) -> Option<ChannelSpec> {
        self.inner
            .lock()
            .channels
            .get(&handle.0)
            .map(|c| c.spec.clone())
    }

    /// Acknowledge a pending channel. Returns false if unknown or already acked.
    pub fn ack(&self, handle: ChannelHandle) -> bool {
        let sink = {
            let mut inner = self.inner.lock();
            match inner.channels.get_mut(&handle.0) {
                Some(channel) if !channel.acked => {
                    channel.acked = true;
                    channel.on_status.clone()
                }
                _ => return false,
            }
        };
        sink(ChannelStatus::Subscribed);
        true
    }

    /// Reject a pending channel with an error status and drop it.
    pub fn reject(&self, handle: ChannelHandle, message: &str) -> bool {
        let Some(channel) = self.inner.lock().channels.remove(&handle.0) else {
            return false;
        };
        (channel.on_status)(ChannelStatus::ChannelError(message.to_string()));
        true
    }

    /// Drop the connection as if the server closed it.
    pub fn simulate_close(&self, reason: Option<&str>) {
        self.drop_connection();
        self.signal(LinkSignal::Close {
            reason: reason.map(str::to_string),
        });
    }

    /// Drop the connection as if a transport error occurred.
    pub fn simulate_error(&self, message: &str) {
        self.drop_connection();
        self.signal(LinkSignal::Error {
            message: message.to_string(),
        });
    }

    /// Deliver a notification to every acknowledged channel whose spec
    /// matches it. Returns the number of channels it was delivered to.
    pub fn emit(&self, notification: ChangeNotification) -> usize {
        let sinks: Vec<ChangeSink> = self
            .inner
            .lock()
            .channels
            .values()
            .filter(|c| c.acked && c.spec.matches(&notification))
            .map(|c| c.on_change.clone())
            .collect();

        for sink in &sinks {
            sink(notification.clone());
        }
        sinks.len()
    }

    /// Deliver a notification on one acknowledged channel, bypassing filters.
    pub fn emit_to(&self, handle: ChannelHandle, notification: ChangeNotification) -> bool {
        let sink = match self.inner.lock().channels.get(&handle.0) {
            Some(c) if c.acked => c.on_change.clone(),
            _ => return false,
        };
        sink(notification);
        true
    }

    fn drop_connection(&self) {
        let mut inner = self.inner.lock();
        inner.connected = false;
        for channel in inner.channels.values_mut() {
            channel.acked = false;
        }
    }

    fn signal(&self, signal: LinkSignal) {
        let callbacks: Vec<LifecycleCallback> = self.lifecycle.lock().clone();
        for callback in callbacks {
            callback(signal.clone());
        }
    }
}

impl Default for MemoryLink {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeLink for MemoryLink {
    fn connect(&self) {
        let pending_acks = {
            let mut inner = self.inner.lock();
            inner.connect_calls += 1;
            if inner.failing_connects > 0 {
                inner.failing_connects -= 1;
                None
            } else {
                inner.connected = true;
                let auto_ack = inner.auto_ack;
                let sinks: Vec<StatusSink> = inner
                    .channels
                    .values_mut()
                    .filter(|c| auto_ack && !c.acked)
                    .map(|c| {
                        c.acked = true;
                        c.on_status.clone()
                    })
                    .collect();
                Some(sinks)
            }
        };

        match pending_acks {
            None => self.signal(LinkSignal::Error {
                message: "connection refused".to_string(),
            }),
            Some(sinks) => {
                self.signal(LinkSignal::Open);
                for sink in sinks {
                    sink(ChannelStatus::Subscribed);
                }
            }
        }
    }

    fn disconnect(&self) {
        let was_connected = {
            let mut inner = self.inner.lock();
            std::mem::replace(&mut inner.connected, false)
        };
        if was_connected {
            self.drop_connection();
            self.signal(LinkSignal::Close {
                reason: Some("client disconnect".to_string()),
            });
        }
    }

    fn on_lifecycle(&self, callback: LifecycleCallback) {
        self.lifecycle.lock().push(callback);
    }

    fn open_channel(
        &self,
        spec: ChannelSpec,
        on_change: ChangeSink,
        on_status: StatusSink,
    ) -> ChannelHandle {
        let id = self.next_channel.fetch_add(1, Ordering::SeqCst);
        let ack_now = {
            let mut inner = self.inner.lock();
            let ack_now = inner.auto_ack && inner.connected;
            inner.channels.insert(
                id,
                OpenChannel {
                    spec,
                    on_change,
                    on_status: on_status.clone(),
                    acked: ack_now,
                },
            );
            ack_now
        };
        if ack_now {
            on_status(ChannelStatus::Subscribed);
        }
        ChannelHandle(id)
    }

    fn close_channel(&self, handle: ChannelHandle) {
        if let Some(channel) = self.inner.lock().channels.remove(&handle.0) {
            tracing::trace!(channel = %channel.spec.name, "memory link channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use serde_json::json;
    use std::sync::Arc;

    fn recorder() -> (ChangeSink, Arc<PlMutex<Vec<ChangeNotification>>>) {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: ChangeSink = Arc::new(move |n| sink_seen.lock().push(n));
        (sink, seen)
    }

    #[test]
    fn test_channels_ack_on_connect() {
        let link = MemoryLink::new();
        let statuses = Arc::new(PlMutex::new(Vec::new()));
        let s = statuses.clone();
        let (sink, _) = recorder();

        link.open_channel(
            ChannelSpec::new("a", "bookings"),
            sink,
            Arc::new(move |st| s.lock().push(st)),
        );
        assert!(statuses.lock().is_empty());

        link.connect();
        assert_eq!(*statuses.lock(), vec![ChannelStatus::Subscribed]);
    }

    #[test]
    fn test_failed_connect_signals_error() {
        let link = MemoryLink::new();
        let signals = Arc::new(PlMutex::new(Vec::new()));
        let s = signals.clone();
        link.on_lifecycle(Arc::new(move |sig| s.lock().push(sig)));

        link.fail_next_connects(1);
        link.connect();
        link.connect();

        let signals = signals.lock();
        assert!(matches!(signals[0], LinkSignal::Error { .. }));
        assert_eq!(signals[1], LinkSignal::Open);
        assert!(link.is_connected());
    }

    #[test]
    fn test_emit_only_to_matching_acked_channels() {
        let link = MemoryLink::new();
        link.connect();

        let (bookings, bookings_seen) = recorder();
        let (clients, clients_seen) = recorder();
        link.open_channel(ChannelSpec::new("a", "bookings"), bookings, Arc::new(|_| {}));
        link.open_channel(ChannelSpec::new("b", "clients"), clients, Arc::new(|_| {}));

        let delivered = link.emit(ChangeNotification::insert("bookings", json!({"id": "b1"})));

        assert_eq!(delivered, 1);
        assert_eq!(bookings_seen.lock().len(), 1);
        assert!(clients_seen.lock().is_empty());
    }

    #[test]
    fn test_disconnect_when_down_is_silent() {
        let link = MemoryLink::new();
        let signals = Arc::new(PlMutex::new(Vec::new()));
        let s = signals.clone();
        link.on_lifecycle(Arc::new(move |sig| s.lock().push(sig)));

        link.disconnect();
        assert!(signals.lock().is_empty());

        link.connect();
        link.disconnect();
        assert_eq!(signals.lock().len(), 2);
    }
}
