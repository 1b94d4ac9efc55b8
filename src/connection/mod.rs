//! Link supervision.
//!
//! - [`ConnectionTracker`] owns the single process-wide [`LinkState`] and
//!   broadcasts every transition to its listeners.
//! - [`ReconnectController`] reacts to link lifecycle signals, schedules
//!   bounded exponential-backoff retries and replays the subscription
//!   registry once a fresh link is up.

mod reconnect;
mod state;

pub use reconnect::{ReconnectController, RetryState};
pub use state::{ConnectionTracker, LinkState, ListenerHandle, StateListener};
