//! Table subscriptions over the realtime link.
//!
//! This module provides the subscription registry and change routing:
//! - One link channel per subscription, scoped to a table, event kind and
//!   optional row filter
//! - Notifications routed only to the subscription whose channel produced
//!   them, with per-callback panic isolation
//! - In-place replay of every subscription after a reconnect
//! - Bounded channel subscriptions with slow-subscriber dropping
//!
//! # Example
//!
//! ```ignore
//! let registry = SubscriptionRegistry::new(link, log);
//!
//! let id = registry.subscribe("bookings", SubscriptionFilter::default(), |change| {
//!     println!("{} on {}: {:?}", change.kind, change.table, change.new_row);
//! });
//!
//! // Later
//! registry.unsubscribe(id);
//! ```

mod manager;
mod types;

pub(crate) use manager::{panic_message, panic_stack};
pub use manager::SubscriptionRegistry;
pub use types::{
    ChangeCallback, ChannelSubscription, SubscriptionFilter, SubscriptionId, SubscriptionInfo,
    SubscriptionSpec,
};
