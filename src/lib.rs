//! # Realtime Sync
//!
//! Realtime synchronization layer between an application and a hosted
//! database backend that pushes row-level change notifications over a
//! persistent link.
//!
//! ## Core Concepts
//!
//! - **Connection**: Tracked link state plus bounded exponential-backoff reconnection
//! - **Subscriptions**: Per-table change callbacks, replayed after every reconnect
//! - **Events**: A named in-process bus with failure-isolated handlers
//! - **Webhooks**: Best-effort forwarding of events to one external endpoint
//! - **Bindings**: Fixed reactions to record and party events
//!
//! ## Example
//!
//! ```ignore
//! use realtime_sync::{MemoryLink, MemoryRowStore, Realtime, RealtimeConfig};
//!
//! let config = RealtimeConfig::default().with_webhook_endpoint("https://hooks.example.com/in");
//! let realtime = Arc::new(Realtime::new(config, Arc::new(link), Arc::new(store))?);
//! realtime.connect();
//!
//! let adapter = realtime.adapter();
//! adapter.subscribe_to_table("bookings", |change| {
//!     println!("{} on {}", change.kind, change.table);
//! });
//!
//! adapter.trigger("record_created", json!({"table": "bookings", "record": booking})).await;
//! ```

pub mod adapter;
pub mod bindings;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod journal;
pub mod link;
pub mod realtime;
pub mod rows;
pub mod subscriptions;
pub mod types;
pub mod webhook;

// Re-exports
pub use adapter::RealtimeAdapter;
pub use bindings::{
    register_default_bindings, BindingContext, TableBridge, PARTY_CREATED, RECORD_CREATED,
    RECORD_STATUS_CHANGED,
};
pub use config::{RealtimeConfig, ReconnectPolicy, TableNames, WebhookConfig};
pub use connection::{ConnectionTracker, LinkState, ListenerHandle, ReconnectController, RetryState};
pub use error::{RealtimeError, Result};
pub use events::{EventBus, EventEnvelope, EventHandler, HandlerHandle, HandlerResult, TriggerOutcome};
pub use journal::{
    DeliveryOutcome, ErrorLogEntry, MemoryLog, RowStoreLog, SyncLog, SyncLogEntry, SyncStatus,
    WebhookDeliveryRecord,
};
pub use link::{ChannelHandle, ChannelSpec, ChannelStatus, LinkSignal, MemoryLink, RealtimeLink};
pub use realtime::Realtime;
pub use rows::{MemoryRowStore, RowStore};
pub use subscriptions::{
    ChannelSubscription, SubscriptionFilter, SubscriptionId, SubscriptionInfo, SubscriptionRegistry,
};
pub use types::*;
pub use webhook::{HttpTransport, WebhookBody, WebhookDispatcher, WebhookTransport};
