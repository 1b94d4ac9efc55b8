//! Composition root tying all realtime components together.

use crate::bindings::{bridge_table, register_default_bindings, BindingContext, TableBridge};
use crate::config::RealtimeConfig;
use crate::connection::{ConnectionTracker, LinkState, ReconnectController};
use crate::error::{RealtimeError, Result};
use crate::events::{EventBus, HandlerHandle};
use crate::journal::{RowStoreLog, SyncLog};
use crate::link::RealtimeLink;
use crate::rows::RowStore;
use crate::subscriptions::{SubscriptionId, SubscriptionRegistry};
use crate::webhook::{HttpTransport, WebhookDispatcher, WebhookTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// The realtime synchronization layer.
///
/// Construct one per process and share it (`Arc<Realtime>`) between
/// consumers; each consumer gets its own [`RealtimeAdapter`](crate::RealtimeAdapter)
/// through [`adapter`](Realtime::adapter). Owns:
/// - the connection state and reconnection controller
/// - the subscription registry
/// - the event bus with the default trigger bindings
/// - the webhook dispatcher
pub struct Realtime {
    config: RealtimeConfig,
    link: Arc<dyn RealtimeLink>,
    tracker: ConnectionTracker,
    registry: SubscriptionRegistry,
    controller: ReconnectController,
    bus: EventBus,
    webhook: WebhookDispatcher,
    log: Arc<dyn SyncLog>,
    runtime: Handle,
    bindings: Vec<HandlerHandle>,
}

impl Realtime {
    /// Build with an HTTP webhook transport and logs written to `store`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: RealtimeConfig,
        link: Arc<dyn RealtimeLink>,
        store: Arc<dyn RowStore>,
    ) -> Result<Self> {
        let transport = HttpTransport::new(Duration::from_millis(config.webhook.timeout_ms))?;
        let log = RowStoreLog::new(store.clone(), config.tables.clone())?;
        Self::with_parts(config, link, store, Arc::new(transport), Arc::new(log))
    }

    /// Build from explicit collaborators.
    pub fn with_parts(
        config: RealtimeConfig,
        link: Arc<dyn RealtimeLink>,
        store: Arc<dyn RowStore>,
        transport: Arc<dyn WebhookTransport>,
        log: Arc<dyn SyncLog>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| RealtimeError::NoRuntime(e.to_string()))?;

        let tracker = ConnectionTracker::new();
        let registry = SubscriptionRegistry::new(link.clone(), log.clone());
        let controller = ReconnectController::new(
            config.reconnect.clone(),
            tracker.clone(),
            registry.clone(),
            link.clone(),
        )?;
        controller.attach();

        let bus = EventBus::new(log.clone());
        let webhook = WebhookDispatcher::new(&config.webhook, transport, log.clone());
        let bindings = register_default_bindings(
            &bus,
            BindingContext {
                store,
                webhook: webhook.clone(),
                log: log.clone(),
                tables: config.tables.clone(),
            },
        );

        tracing::debug!(
            webhook = webhook.endpoint().unwrap_or("<none>"),
            max_attempts = config.reconnect.max_attempts,
            "realtime layer initialized"
        );

        Ok(Self {
            config,
            link,
            tracker,
            registry,
            controller,
            bus,
            webhook,
            log,
            runtime,
            bindings,
        })
    }

    /// Connect the link. Also lifts reconnect exhaustion and resets the
    /// attempt counter.
    pub fn connect(&self) {
        self.controller.reset();
        self.tracker.set_state(LinkState::Connecting);
        self.link.connect();
    }

    /// Disconnect the link without triggering automatic reconnection.
    pub fn disconnect(&self) {
        self.controller.suspend();
        self.link.disconnect();
        self.tracker.set_state(LinkState::Disconnected);
    }

    /// Trigger bus events from changes on a table.
    pub fn bridge(&self, bridge: TableBridge) -> SubscriptionId {
        bridge_table(&self.registry, &self.bus, &self.runtime, bridge)
    }

    /// Close every subscription channel and disconnect.
    pub fn shutdown(&self) {
        let closed = self.registry.unsubscribe_all();
        self.disconnect();
        tracing::info!(subscriptions = closed, "realtime layer shut down");
    }

    pub fn state(&self) -> LinkState {
        self.tracker.state()
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn controller(&self) -> &ReconnectController {
        &self.controller
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn webhook(&self) -> &WebhookDispatcher {
        &self.webhook
    }

    pub fn log(&self) -> &Arc<dyn SyncLog> {
        &self.log
    }

    /// Handlers registered by the default trigger bindings.
    pub fn bindings(&self) -> &[HandlerHandle] {
        &self.bindings
    }
}
