//! In-process event bus for domain-level triggers.
//!
//! Decoupled from the link: domain code calls [`EventBus::trigger`] with a
//! named event and a payload, and every handler registered for that name
//! runs concurrently against a normalized [`EventEnvelope`].

mod bus;
mod types;

pub use bus::{EventBus, EventHandler, HandlerHandle, HandlerResult, TriggerOutcome};
pub use types::EventEnvelope;
