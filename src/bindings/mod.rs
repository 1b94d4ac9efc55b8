//! Trigger bindings: fixed event bus handlers reacting to domain events.
//!
//! - `record_created`: notify the related party, forward to the webhook
//! - `record_status_changed`: notify on an actual status change, always
//!   forward old and new status to the webhook
//! - `party_created`: one-time welcome notification, forward to the webhook
//!
//! [`bridge_table`] wires a table subscription to these events so row
//! changes arriving over the link trigger them.

mod bridge;
mod triggers;

pub use bridge::{bridge_table, TableBridge};
pub use triggers::{
    register_default_bindings, BindingContext, PARTY_CREATED, RECORD_CREATED,
    RECORD_STATUS_CHANGED,
};
