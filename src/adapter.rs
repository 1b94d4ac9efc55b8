//! Consumer-facing binding surface.

use crate::connection::{LinkState, ListenerHandle};
use crate::events::{EventEnvelope, EventHandler, HandlerHandle, HandlerResult, TriggerOutcome};
use crate::realtime::Realtime;
use crate::subscriptions::{SubscriptionFilter, SubscriptionId};
use crate::types::ChangeNotification;
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Per-consumer handle onto a shared [`Realtime`].
///
/// Remembers the subscriptions, event handlers and state listeners it
/// registered. [`close`](Self::close), also run on drop, removes exactly
/// those and never another consumer's.
pub struct RealtimeAdapter {
    realtime: Arc<Realtime>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    handlers: Mutex<Vec<HandlerHandle>>,
    listeners: Mutex<Vec<ListenerHandle>>,
}

impl RealtimeAdapter {
    pub fn new(realtime: Arc<Realtime>) -> Self {
        Self {
            realtime,
            subscriptions: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Watch every change on `table`.
    pub fn subscribe_to_table<F>(&self, table: &str, callback: F) -> SubscriptionId
    where
        F: Fn(ChangeNotification) + Send + Sync + 'static,
    {
        self.subscribe_to_table_with(table, SubscriptionFilter::default(), callback)
    }

    /// Watch changes on `table` matching `filter`.
    pub fn subscribe_to_table_with<F>(
        &self,
        table: &str,
        filter: SubscriptionFilter,
        callback: F,
    ) -> SubscriptionId
    where
        F: Fn(ChangeNotification) + Send + Sync + 'static,
    {
        let id = self.realtime.registry().subscribe(table, filter, callback);
        self.subscriptions.lock().push(id);
        id
    }

    /// Remove a subscription. Returns false if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.lock().retain(|owned| *owned != id);
        self.realtime.registry().unsubscribe(id)
    }

    /// Remove every subscription this adapter created. Returns how many
    /// were still registered.
    pub fn unsubscribe_all(&self) -> usize {
        let owned: Vec<SubscriptionId> = std::mem::take(&mut *self.subscriptions.lock());
        owned
            .into_iter()
            .filter(|id| self.realtime.registry().unsubscribe(*id))
            .count()
    }

    /// Register a bus handler for `event`.
    pub fn on(&self, event: &str, handler: EventHandler) -> HandlerHandle {
        let handle = self.realtime.bus().on(event, handler);
        self.handlers.lock().push(handle.clone());
        handle
    }

    /// Register an async closure as a bus handler for `event`.
    pub fn on_fn<F, Fut>(&self, event: &str, handler: F) -> HandlerHandle
    where
        F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handle = self.realtime.bus().on_fn(event, handler);
        self.handlers.lock().push(handle.clone());
        handle
    }

    pub async fn trigger(&self, event: &str, payload: Value) -> TriggerOutcome {
        self.realtime.bus().trigger(event, payload).await
    }

    pub async fn send_webhook(&self, event: &str, payload: Value) -> bool {
        self.realtime.webhook().send(event, payload).await
    }

    /// Observe connection state; called immediately with the current state.
    pub fn on_connection_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(LinkState) + Send + Sync + 'static,
    {
        let handle = self.realtime.tracker().add_listener(listener);
        self.listeners.lock().push(handle.clone());
        handle
    }

    pub fn connection_state(&self) -> LinkState {
        self.realtime.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == LinkState::Connected
    }

    /// Subscriptions created through this adapter and not yet removed by it.
    pub fn owned_subscriptions(&self) -> Vec<SubscriptionId> {
        self.subscriptions.lock().clone()
    }

    pub fn realtime(&self) -> &Arc<Realtime> {
        &self.realtime
    }

    /// Tear down everything this adapter registered.
    pub fn close(&self) {
        let subscriptions = self.unsubscribe_all();
        let handlers: Vec<HandlerHandle> = std::mem::take(&mut *self.handlers.lock());
        for handle in &handlers {
            handle.unsubscribe();
        }
        for listener in std::mem::take(&mut *self.listeners.lock()) {
            listener.remove();
        }
        tracing::debug!(subscriptions, handlers = handlers.len(), "adapter closed");
    }
}

impl Drop for RealtimeAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

impl Realtime {
    /// A new consumer handle sharing this instance.
    pub fn adapter(self: &Arc<Self>) -> RealtimeAdapter {
        RealtimeAdapter::new(self.clone())
    }
}
