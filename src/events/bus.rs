//! Named-event bus with concurrent, failure-isolated fan-out.

use super::types::EventEnvelope;
use crate::error::RealtimeError;
use crate::journal::{ErrorLogEntry, SyncLog};
use crate::subscriptions::{panic_message, panic_stack};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// What a handler returns.
pub type HandlerResult = std::result::Result<(), RealtimeError>;

/// An event handler. The returned future is driven by `trigger`.
pub type EventHandler = Arc<dyn Fn(EventEnvelope) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Summary of a `trigger` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TriggerOutcome {
    /// Handlers that were run.
    pub handlers: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

struct BusInner {
    /// Handlers per event, in registration order.
    handlers: RwLock<HashMap<String, Vec<(u64, EventHandler)>>>,
    next_id: AtomicU64,
    log: Arc<dyn SyncLog>,
}

/// In-process registry of named application events.
///
/// Handlers registered for an event are launched in registration order when
/// it is triggered and run concurrently; their completion order is not
/// defined. The same handler may be registered more than once and then runs
/// once per registration.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new(log: Arc<dyn SyncLog>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                log,
            }),
        }
    }

    /// Append a handler to `event`'s list.
    pub fn on(&self, event: &str, handler: EventHandler) -> HandlerHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));

        HandlerHandle {
            event: event.to_string(),
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Register an async closure as a handler.
    pub fn on_fn<F, Fut>(&self, event: &str, handler: F) -> HandlerHandle
    where
        F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on(event, Arc::new(move |envelope| handler(envelope).boxed()))
    }

    /// Run every handler registered for `event` and wait for all of them.
    ///
    /// A handler that errors or panics is logged and counted; it never
    /// affects its siblings or the caller.
    pub async fn trigger(&self, event: &str, payload: Value) -> TriggerOutcome {
        let handlers: Vec<(u64, EventHandler)> = self
            .inner
            .handlers
            .read()
            .get(event)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::debug!(event, "no handlers registered");
            return TriggerOutcome::default();
        }

        let envelope = EventEnvelope::normalize(event, payload);
        let runs = handlers.into_iter().map(|(id, handler)| {
            let envelope = envelope.clone();
            async move {
                // Panics carry the stack at the catch site; returned errors don't.
                let outcome = match catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
                    Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                        Ok(result) => result.map_err(|e| (e.to_string(), None)),
                        Err(panic) => Err((panic_message(&*panic), Some(panic_stack()))),
                    },
                    Err(panic) => Err((panic_message(&*panic), Some(panic_stack()))),
                };
                (id, outcome)
            }
        });

        let results = join_all(runs).await;

        let mut summary = TriggerOutcome {
            handlers: results.len(),
            failed: 0,
        };
        for (id, outcome) in results {
            if let Err((message, stack)) = outcome {
                summary.failed += 1;
                tracing::error!(event, handler = id, error = %message, "event handler failed");
                let mut entry = ErrorLogEntry::new(
                    "event.handler",
                    message,
                    json!({ "event": event, "handler_id": id, "table": envelope.table }),
                );
                if let Some(stack) = stack {
                    entry = entry.with_stack(stack);
                }
                self.inner.log.record_error(entry);
            }
        }
        summary
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.inner
            .handlers
            .read()
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Events with at least one handler, sorted.
    pub fn events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.inner.handlers.read().keys().cloned().collect();
        events.sort();
        events
    }
}

/// Removes exactly the handler registration it was returned for.
#[derive(Clone, Debug)]
pub struct HandlerHandle {
    event: String,
    id: u64,
    bus: Weak<BusInner>,
}

impl HandlerHandle {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove the handler. Returns false if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        let Some(inner) = self.bus.upgrade() else {
            return false;
        };
        let mut handlers = inner.handlers.write();
        let Some(list) = handlers.get_mut(&self.event) else {
            return false;
        };

        let before = list.len();
        list.retain(|(id, _)| *id != self.id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&self.event);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::MemoryLog;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn bus() -> (EventBus, Arc<MemoryLog>) {
        let log = Arc::new(MemoryLog::new());
        (EventBus::new(log.clone()), log)
    }

    #[tokio::test]
    async fn test_failing_handler_is_isolated() {
        let (bus, log) = bus();
        let ran = Arc::new(Mutex::new(false));

        bus.on_fn("record_created", |_| async { Err(RealtimeError::handler("boom")) });
        let r = ran.clone();
        bus.on_fn("record_created", move |_| {
            let r = r.clone();
            async move {
                *r.lock() = true;
                Ok(())
            }
        });

        let outcome = bus.trigger("record_created", json!({"id": "b1"})).await;

        assert!(*ran.lock());
        assert_eq!(outcome, TriggerOutcome { handlers: 2, failed: 1 });
        assert_eq!(log.errors()[0].action, "event.handler");
        assert!(log.errors()[0].stack.is_none());
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let (bus, log) = bus();
        let ran = Arc::new(Mutex::new(0));

        fn explode() -> HandlerResult {
            panic!("handler exploded")
        }

        bus.on_fn("evt", |_| async { explode() });
        let r = ran.clone();
        bus.on_fn("evt", move |_| {
            let r = r.clone();
            async move {
                *r.lock() += 1;
                Ok(())
            }
        });

        let outcome = bus.trigger("evt", json!({})).await;
        assert_eq!(outcome.failed, 1);
        assert_eq!(*ran.lock(), 1);

        let errors = log.errors();
        assert_eq!(errors[0].message, "handler exploded");
        assert!(errors[0].stack.as_deref().is_some_and(|s| !s.is_empty()));
    }

    #[tokio::test]
    async fn test_handlers_launch_in_registration_order() {
        let (bus, _) = bus();
        let started = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3u64 {
            let started = started.clone();
            bus.on_fn("evt", move |_| {
                let started = started.clone();
                async move {
                    started.lock().push(n);
                    // Later handlers finish first
                    tokio::time::sleep(Duration::from_millis(30 - n * 10)).await;
                    Ok(())
                }
            });
        }

        bus.trigger("evt", json!({})).await;
        assert_eq!(*started.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_duplicate_registration_runs_twice() {
        let (bus, _) = bus();
        let count = Arc::new(Mutex::new(0));

        let c = count.clone();
        let handler: EventHandler = Arc::new(move |_| {
            let c = c.clone();
            async move {
                *c.lock() += 1;
                Ok(())
            }
            .boxed()
        });
        bus.on("evt", handler.clone());
        let second = bus.on("evt", handler);

        bus.trigger("evt", json!({})).await;
        assert_eq!(*count.lock(), 2);

        // Unsubscribing removes only that registration
        assert!(second.unsubscribe());
        assert!(!second.unsubscribe());
        bus.trigger("evt", json!({})).await;
        assert_eq!(*count.lock(), 3);
    }

    #[tokio::test]
    async fn test_trigger_without_handlers() {
        let (bus, _) = bus();
        let outcome = bus.trigger("nothing", json!({})).await;
        assert_eq!(outcome, TriggerOutcome::default());
        assert!(bus.events().is_empty());
    }

    #[tokio::test]
    async fn test_handlers_receive_envelope() {
        let (bus, _) = bus();
        let seen = Arc::new(Mutex::new(None));

        let s = seen.clone();
        bus.on_fn("record_created", move |env| {
            let s = s.clone();
            async move {
                *s.lock() = Some(env);
                Ok(())
            }
        });

        bus.trigger("record_created", json!({"table": "bookings", "record": {"id": "b1"}}))
            .await;

        let env = seen.lock().clone().unwrap();
        assert_eq!(env.event, "record_created");
        assert_eq!(env.table, "bookings");
        assert_eq!(env.record, json!({"id": "b1"}));
    }
}
