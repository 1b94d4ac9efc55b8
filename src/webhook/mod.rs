//! Outbound webhook notifications.
//!
//! [`WebhookDispatcher`] serializes an event and payload, POSTs it through a
//! [`WebhookTransport`] and records every attempt in the delivery log.
//! Failures are returned as `false` and never retried here.

mod dispatcher;
mod transport;

pub use dispatcher::WebhookDispatcher;
pub use transport::{HttpTransport, WebhookBody, WebhookTransport};
