//! Subscription registry and per-channel change routing.

use crate::journal::{ErrorLogEntry, SyncLog};
use crate::link::{ChangeSink, ChannelHandle, ChannelSpec, ChannelStatus, RealtimeLink, StatusSink};
use crate::types::ChangeNotification;
use crossbeam_channel::{bounded, TrySendError};
use parking_lot::RwLock;
use serde_json::json;
use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::types::{
    ChangeCallback, ChannelSubscription, SubscriptionFilter, SubscriptionId, SubscriptionInfo,
    SubscriptionSpec,
};

/// Internal subscription state.
struct Entry {
    table: String,
    filter: SubscriptionFilter,
    callback: ChangeCallback,
    /// Set once `open_channel` returns.
    channel: Option<ChannelHandle>,
    /// Whether the channel acknowledged the subscription.
    active: bool,
}

impl Entry {
    fn info(&self, id: SubscriptionId) -> SubscriptionInfo {
        SubscriptionInfo {
            id,
            table: self.table.clone(),
            filter: self.filter.clone(),
            active: self.active,
        }
    }
}

struct RegistryInner {
    link: Arc<dyn RealtimeLink>,
    log: Arc<dyn SyncLog>,
    /// Subscriptions by ID, pending or active.
    entries: RwLock<HashMap<SubscriptionId, Entry>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

/// Registry of table subscriptions, each backed by its own link channel.
///
/// An entry is created when [`subscribe`](Self::subscribe) is called and
/// becomes active once the link acknowledges its channel. Notifications
/// arriving on a channel are routed to that subscription's callback only.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new(link: Arc<dyn RealtimeLink>, log: Arc<dyn SyncLog>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                link,
                log,
                entries: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Watch `table` and invoke `callback` for every change notification its
    /// channel delivers.
    ///
    /// The identifier is returned right away; the subscription only counts
    /// as active after the link acknowledges the channel.
    pub fn subscribe<F>(&self, table: &str, filter: SubscriptionFilter, callback: F) -> SubscriptionId
    where
        F: Fn(ChangeNotification) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.open(id, table.to_string(), filter, Arc::new(callback));
        id
    }

    /// Watch `table` and queue notifications on a bounded channel.
    pub fn subscribe_channel(
        &self,
        table: &str,
        filter: SubscriptionFilter,
        buffer_size: usize,
    ) -> ChannelSubscription {
        let id = self.next_id();
        let (sender, receiver) = bounded(buffer_size);
        let registry = Arc::downgrade(&self.inner);

        let callback: ChangeCallback = Arc::new(move |notification| {
            let reason = match sender.try_send(notification) {
                Ok(()) => return,
                Err(TrySendError::Full(_)) => "buffer overflow",
                Err(TrySendError::Disconnected(_)) => "receiver dropped",
            };
            tracing::warn!(subscription = %id, reason, "dropping channel subscription");
            if let Some(inner) = registry.upgrade() {
                SubscriptionRegistry { inner }.unsubscribe(id);
            }
        });

        self.open(id, table.to_string(), filter, callback);
        ChannelSubscription { id, receiver }
    }

    /// Close the subscription's channel and remove it.
    ///
    /// Returns false if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.entries.write().remove(&id);
        match removed {
            Some(entry) => {
                if let Some(channel) = entry.channel {
                    self.inner.link.close_channel(channel);
                }
                tracing::debug!(subscription = %id, table = %entry.table, "unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Close every channel and clear the registry. Returns how many
    /// subscriptions were removed.
    pub fn unsubscribe_all(&self) -> usize {
        let drained: Vec<(SubscriptionId, Entry)> = self.inner.entries.write().drain().collect();
        for (_, entry) in &drained {
            if let Some(channel) = entry.channel {
                self.inner.link.close_channel(channel);
            }
        }
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "cleared subscription registry");
        }
        drained.len()
    }

    /// Every registered subscription, pending ones included, in creation order.
    pub fn snapshot(&self) -> Vec<SubscriptionSpec> {
        let mut specs: Vec<SubscriptionSpec> = self
            .inner
            .entries
            .read()
            .iter()
            .map(|(id, e)| SubscriptionSpec {
                id: *id,
                table: e.table.clone(),
                filter: e.filter.clone(),
                callback: e.callback.clone(),
            })
            .collect();
        specs.sort_by_key(|s| s.id);
        specs
    }

    /// Re-open channels for previously snapshotted subscriptions, keeping
    /// their identifiers, callbacks and filters.
    pub fn restore(&self, specs: Vec<SubscriptionSpec>) {
        for spec in specs {
            if self.inner.entries.read().contains_key(&spec.id) {
                tracing::warn!(subscription = %spec.id, "subscription already registered, skipping restore");
                continue;
            }
            self.open(spec.id, spec.table, spec.filter, spec.callback);
        }
    }

    /// Give every registered subscription a fresh channel around `reconnect`.
    ///
    /// Entries stay registered throughout. Their old channels are detached
    /// under one write lock, `reconnect` runs with no lock held, and each
    /// entry still present afterwards is re-opened under its original id.
    /// Subscriptions added in the meantime keep the channel they opened;
    /// ones removed in the meantime stay removed. Returns how many channels
    /// were re-opened.
    pub fn replay<F: FnOnce()>(&self, reconnect: F) -> usize {
        let (mut ids, stale) = {
            let mut entries = self.inner.entries.write();
            let mut ids = Vec::with_capacity(entries.len());
            let mut stale = Vec::new();
            for (id, entry) in entries.iter_mut() {
                entry.active = false;
                stale.extend(entry.channel.take());
                ids.push(*id);
            }
            (ids, stale)
        };
        ids.sort();
        for channel in stale {
            self.inner.link.close_channel(channel);
        }

        reconnect();

        let mut reopened = 0;
        for id in ids {
            let detached = self
                .inner
                .entries
                .read()
                .get(&id)
                .filter(|e| e.channel.is_none())
                .map(|e| (e.table.clone(), e.filter.clone()));
            match detached {
                Some((table, filter)) => {
                    self.attach_channel(id, &table, &filter);
                    reopened += 1;
                }
                None => tracing::debug!(subscription = %id, "subscription left during replay"),
            }
        }
        reopened
    }

    /// Number of active (acknowledged) subscriptions.
    pub fn len(&self) -> usize {
        self.inner.entries.read().values().filter(|e| e.active).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of subscriptions still waiting for acknowledgement.
    pub fn pending_len(&self) -> usize {
        self.inner.entries.read().values().filter(|e| !e.active).count()
    }

    /// Whether the id is registered, pending or active.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.inner.entries.read().contains_key(&id)
    }

    pub fn is_active(&self, id: SubscriptionId) -> bool {
        self.inner
            .entries
            .read()
            .get(&id)
            .map(|e| e.active)
            .unwrap_or(false)
    }

    pub fn get(&self, id: SubscriptionId) -> Option<SubscriptionInfo> {
        self.inner.entries.read().get(&id).map(|e| e.info(id))
    }

    /// Distinct tables with at least one subscription, sorted.
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self
            .inner
            .entries
            .read()
            .values()
            .map(|e| e.table.clone())
            .collect();
        tables.sort();
        tables.dedup();
        tables
    }

    /// All subscriptions in creation order.
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<SubscriptionInfo> = self
            .inner
            .entries
            .read()
            .iter()
            .map(|(id, e)| e.info(*id))
            .collect();
        infos.sort_by_key(|i| i.id);
        infos
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn open(&self, id: SubscriptionId, table: String, filter: SubscriptionFilter, callback: ChangeCallback) {
        // The entry must exist before the link can acknowledge it; links may
        // report status from inside `open_channel`.
        self.inner.entries.write().insert(
            id,
            Entry {
                table: table.clone(),
                filter: filter.clone(),
                callback,
                channel: None,
                active: false,
            },
        );
        self.attach_channel(id, &table, &filter);
    }

    /// Open a link channel for an existing entry and store its handle.
    fn attach_channel(&self, id: SubscriptionId, table: &str, filter: &SubscriptionFilter) {
        let spec = ChannelSpec {
            name: format!("{}-changes-{}", table, id.0),
            schema: filter.schema.clone(),
            table: table.to_string(),
            event: filter.event,
            filter: filter.filter.clone(),
        };

        let on_change: ChangeSink = {
            let registry = Arc::downgrade(&self.inner);
            Arc::new(move |notification| route(&registry, id, notification))
        };
        let on_status: StatusSink = {
            let registry = Arc::downgrade(&self.inner);
            Arc::new(move |status| on_channel_status(&registry, id, status))
        };

        let handle = self.inner.link.open_channel(spec, on_change, on_status);

        let orphaned = {
            let mut entries = self.inner.entries.write();
            match entries.get_mut(&id) {
                Some(entry) if entry.channel.is_none() => {
                    entry.channel = Some(handle);
                    false
                }
                _ => true,
            }
        };
        if orphaned {
            // Removed, or given another channel, while this one was opening.
            self.inner.link.close_channel(handle);
        }
    }
}

/// Deliver one notification to the subscription that owns the channel.
fn route(registry: &Weak<RegistryInner>, id: SubscriptionId, notification: ChangeNotification) {
    let Some(inner) = registry.upgrade() else {
        return;
    };
    let Some((callback, table)) = inner
        .entries
        .read()
        .get(&id)
        .map(|e| (e.callback.clone(), e.table.clone()))
    else {
        tracing::trace!(subscription = %id, "notification for removed subscription dropped");
        return;
    };

    let kind = notification.kind;
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(notification))) {
        let message = panic_message(&*panic);
        tracing::error!(subscription = %id, table = %table, error = %message, "subscription callback panicked");
        inner.log.record_error(
            ErrorLogEntry::new(
                "subscription.callback",
                message,
                json!({ "subscription_id": id.0, "table": table, "event": kind.as_str() }),
            )
            .with_stack(panic_stack()),
        );
    }
}

fn on_channel_status(registry: &Weak<RegistryInner>, id: SubscriptionId, status: ChannelStatus) {
    let Some(inner) = registry.upgrade() else {
        return;
    };

    match status {
        ChannelStatus::Subscribed => {
            if let Some(entry) = inner.entries.write().get_mut(&id) {
                entry.active = true;
                tracing::debug!(subscription = %id, table = %entry.table, "subscription active");
            }
        }
        failure => {
            let message = match &failure {
                ChannelStatus::ChannelError(m) => m.clone(),
                ChannelStatus::TimedOut => "subscribe timed out".to_string(),
                _ => "channel closed".to_string(),
            };

            let mut entries = inner.entries.write();
            let Some(entry) = entries.get_mut(&id) else {
                return;
            };

            if entry.active {
                // Channel lost after acknowledgement; kept for replay.
                entry.active = false;
                tracing::warn!(subscription = %id, table = %entry.table, error = %message, "subscription channel lost");
            } else if failure != ChannelStatus::Closed {
                let table = entry.table.clone();
                let channel = entry.channel;
                entries.remove(&id);
                drop(entries);

                if let Some(channel) = channel {
                    inner.link.close_channel(channel);
                }
                tracing::warn!(subscription = %id, table = %table, error = %message, "subscription rejected");
                inner.log.record_error(ErrorLogEntry::new(
                    "subscription.subscribe",
                    message,
                    json!({ "subscription_id": id.0, "table": table }),
                ));
            }
        }
    }
}

/// Call stack at the point a panic was caught, for the error log.
pub(crate) fn panic_stack() -> String {
    Backtrace::force_capture().to_string()
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}
