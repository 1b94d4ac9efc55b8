//! Durable audit logging port.
//!
//! Every best-effort write the realtime layer makes for later audit goes
//! through [`SyncLog`]: sync outcomes, errors and webhook delivery attempts.
//! Writes are fire-and-forget; a sink that fails to persist an entry only
//! reports it through `tracing`.
//!
//! - [`RowStoreLog`] appends to log tables in a [`RowStore`](crate::rows::RowStore).
//! - [`MemoryLog`] keeps entries in memory.

mod sinks;
mod types;

pub use sinks::{MemoryLog, RowStoreLog};
pub use types::{DeliveryOutcome, ErrorLogEntry, SyncLogEntry, SyncStatus, WebhookDeliveryRecord};

/// Append-only sink for audit entries.
pub trait SyncLog: Send + Sync {
    /// Record the outcome of a row write.
    fn record_sync(&self, entry: SyncLogEntry);

    /// Record a failure the layer absorbed.
    fn record_error(&self, entry: ErrorLogEntry);

    /// Record a webhook delivery attempt.
    fn record_delivery(&self, record: WebhookDeliveryRecord);
}
