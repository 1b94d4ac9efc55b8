//! Subscription types for table-level change watching.

use crate::types::{ChangeKind, ChangeNotification};
use std::fmt;
use std::sync::Arc;

/// Callback receiving the change notifications of one subscription.
pub type ChangeCallback = Arc<dyn Fn(ChangeNotification) + Send + Sync>;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Filter criteria for a table subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionFilter {
    /// Event kinds to receive. Default: `Any`
    pub event: ChangeKind,

    /// Server-side row filter such as `status=eq.pending` (None = all rows).
    pub filter: Option<String>,

    /// Database schema. Default: `public`
    pub schema: String,
}

impl Default for SubscriptionFilter {
    fn default() -> Self {
        Self {
            event: ChangeKind::Any,
            filter: None,
            schema: "public".to_string(),
        }
    }
}

impl SubscriptionFilter {
    /// Only notifications of `kind`.
    pub fn events(kind: ChangeKind) -> Self {
        Self {
            event: kind,
            ..Default::default()
        }
    }

    /// Only rows matching `expr`.
    pub fn rows(expr: impl Into<String>) -> Self {
        Self {
            filter: Some(expr.into()),
            ..Default::default()
        }
    }

    pub fn with_event(mut self, kind: ChangeKind) -> Self {
        self.event = kind;
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
}

/// Everything needed to re-create a subscription against a fresh link.
#[derive(Clone)]
pub struct SubscriptionSpec {
    pub id: SubscriptionId,
    pub table: String,
    pub filter: SubscriptionFilter,
    pub callback: ChangeCallback,
}

impl fmt::Debug for SubscriptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSpec")
            .field("id", &self.id)
            .field("table", &self.table)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a registry entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub table: String,
    pub filter: SubscriptionFilter,
    /// Whether the channel acknowledged the subscription.
    pub active: bool,
}

/// A subscription whose notifications are queued on a bounded channel.
///
/// If the buffer fills up (or the receiver is dropped) the subscription is
/// removed from the registry.
pub struct ChannelSubscription {
    pub id: SubscriptionId,
    /// Channel to receive notifications.
    pub receiver: crossbeam_channel::Receiver<ChangeNotification>,
}

impl ChannelSubscription {
    /// Receive the next notification (blocking).
    pub fn recv(&self) -> Result<ChangeNotification, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a notification (non-blocking).
    pub fn try_recv(&self) -> Result<ChangeNotification, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ChangeNotification, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
