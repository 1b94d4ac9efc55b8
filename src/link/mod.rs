//! The realtime link primitive.
//!
//! The core never talks to a transport directly. It depends on the
//! [`RealtimeLink`] trait: lifecycle signals (`open`, `close`, `error`),
//! `connect`/`disconnect`, and per-channel change delivery with a
//! subscription status callback. [`MemoryLink`] is an in-process
//! implementation used by tests and embedders without a hosted backend.

mod filter;
mod memory;

pub use filter::{FilterExpr, FilterOp};
pub use memory::MemoryLink;

use crate::types::{ChangeKind, ChangeNotification};
use std::fmt;
use std::sync::Arc;

/// Lifecycle signal emitted by the link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkSignal {
    Open,
    Close { reason: Option<String> },
    Error { message: String },
}

/// Status reported for a single channel's subscribe request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

/// Opaque handle to an open channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandle(pub u64);

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// What a channel listens to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Channel name, unique per subscription.
    pub name: String,
    pub schema: String,
    pub table: String,
    pub event: ChangeKind,
    /// Server-side row filter such as `client_id=eq.c1`.
    pub filter: Option<String>,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: "public".to_string(),
            table: table.into(),
            event: ChangeKind::Any,
            filter: None,
        }
    }

    /// Whether a notification would be delivered on this channel by a
    /// backend honouring table, event kind and row filter.
    pub fn matches(&self, notification: &ChangeNotification) -> bool {
        if notification.table != self.table || !self.event.accepts(notification.kind) {
            return false;
        }
        match self.filter.as_deref().map(FilterExpr::parse) {
            None => true,
            Some(Some(expr)) => notification.row().map(|r| expr.matches(r)).unwrap_or(false),
            // An unparseable filter matches nothing.
            Some(None) => false,
        }
    }
}

/// Callback receiving lifecycle signals.
pub type LifecycleCallback = Arc<dyn Fn(LinkSignal) + Send + Sync>;

/// Callback receiving change notifications for one channel.
pub type ChangeSink = Arc<dyn Fn(ChangeNotification) + Send + Sync>;

/// Callback receiving the subscribe status of one channel.
pub type StatusSink = Arc<dyn Fn(ChannelStatus) + Send + Sync>;

/// A multiplexed, bidirectional live-data link.
///
/// Methods are non-blocking: the outcome of `connect` arrives through the
/// lifecycle callbacks and the outcome of `open_channel` through the
/// channel's status sink. Implementations may invoke callbacks
/// synchronously from within these methods.
pub trait RealtimeLink: Send + Sync {
    /// Start (or restart) the connection.
    fn connect(&self);

    /// Tear the connection down.
    fn disconnect(&self);

    /// Register a lifecycle observer.
    fn on_lifecycle(&self, callback: LifecycleCallback);

    /// Open a channel scoped to `spec`.
    fn open_channel(&self, spec: ChannelSpec, on_change: ChangeSink, on_status: StatusSink)
        -> ChannelHandle;

    /// Close a channel. Unknown handles are ignored.
    fn close_channel(&self, handle: ChannelHandle);
}
