//! Consumer adapter ownership and teardown.

mod common;

use common::{configured, harness};
use parking_lot::Mutex;
use realtime_sync::{ChangeNotification, LinkState};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn counter() -> (Arc<AtomicUsize>, impl Fn(ChangeNotification) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    (count, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn test_closing_one_adapter_leaves_others_intact() {
    let h = harness(configured());
    h.realtime.connect();

    let first = h.realtime.adapter();
    let second = h.realtime.adapter();

    let (first_count, cb) = counter();
    first.subscribe_to_table("bookings", cb);
    let (second_count, cb) = counter();
    let kept = second.subscribe_to_table("bookings", cb);

    first.close();

    assert_eq!(h.realtime.registry().len(), 1);
    assert!(h.realtime.registry().contains(kept));

    h.link.emit(ChangeNotification::insert("bookings", json!({"id": "b1"})));
    assert_eq!(first_count.load(Ordering::SeqCst), 0);
    assert_eq!(second_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropping_adapter_removes_its_registrations() {
    let h = harness(configured());
    h.realtime.connect();
    let default_handlers = h.realtime.bus().handler_count("record_created");
    let listeners = h.realtime.tracker().listener_count();

    {
        let adapter = h.realtime.adapter();
        adapter.subscribe_to_table("bookings", |_| {});
        adapter.subscribe_to_table("clients", |_| {});
        adapter.on_fn("record_created", |_| async { Ok(()) });
        adapter.on_connection_change(|_| {});

        assert_eq!(h.realtime.registry().len(), 2);
        assert_eq!(h.realtime.bus().handler_count("record_created"), default_handlers + 1);
    }

    assert!(h.realtime.registry().is_empty());
    assert_eq!(h.link.channel_count(), 0);
    assert_eq!(h.realtime.bus().handler_count("record_created"), default_handlers);
    assert_eq!(h.realtime.tracker().listener_count(), listeners);
}

#[tokio::test]
async fn test_adapter_unsubscribe_is_idempotent() {
    let h = harness(configured());
    h.realtime.connect();
    let adapter = h.realtime.adapter();

    let id = adapter.subscribe_to_table("bookings", |_| {});
    assert_eq!(adapter.owned_subscriptions(), vec![id]);

    assert!(adapter.unsubscribe(id));
    assert!(!adapter.unsubscribe(id));
    assert!(adapter.owned_subscriptions().is_empty());
    assert_eq!(adapter.unsubscribe_all(), 0);
}

#[tokio::test]
async fn test_adapter_observes_connection_state() {
    let h = harness(configured());
    let adapter = h.realtime.adapter();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    adapter.on_connection_change(move |state| s.lock().push(state));
    assert!(!adapter.is_connected());

    h.realtime.connect();
    assert!(adapter.is_connected());
    assert_eq!(adapter.connection_state(), LinkState::Connected);
    assert_eq!(
        *seen.lock(),
        vec![LinkState::Disconnected, LinkState::Connecting, LinkState::Connected]
    );
}

#[tokio::test]
async fn test_adapter_forwards_trigger_and_webhook() {
    let h = harness(configured());
    let adapter = h.realtime.adapter();

    let ran = Arc::new(AtomicUsize::new(0));
    let r = ran.clone();
    adapter.on_fn("custom_event", move |env| {
        let r = r.clone();
        async move {
            assert_eq!(env.record, json!({"n": 1}));
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let outcome = adapter.trigger("custom_event", json!({"n": 1})).await;
    assert_eq!(outcome.handlers, 1);
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    assert!(adapter.send_webhook("custom_event", json!({"n": 1})).await);
    assert_eq!(h.transport.events(), vec!["custom_event".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_adapter_closed_while_reconnecting_stays_closed() {
    let h = harness(configured());
    h.realtime.connect();

    let adapter = h.realtime.adapter();
    let (count, cb) = counter();
    let id = adapter.subscribe_to_table("bookings", cb);

    // Closed from the Connected transition the retry itself produces
    let slot = Arc::new(Mutex::new(Some(adapter)));
    let armed = Arc::new(AtomicBool::new(false));
    let (s, a) = (slot.clone(), armed.clone());
    let _listener = h.realtime.tracker().add_listener(move |state| {
        if state == LinkState::Connected && a.load(Ordering::SeqCst) {
            if let Some(adapter) = s.lock().take() {
                adapter.close();
            }
        }
    });

    armed.store(true, Ordering::SeqCst);
    h.link.simulate_close(Some("network"));
    tokio::time::sleep(Duration::from_millis(2001)).await;

    assert_eq!(h.realtime.state(), LinkState::Connected);
    assert!(slot.lock().is_none());
    assert!(!h.realtime.registry().contains(id));
    assert_eq!(h.link.channel_count(), 0);

    h.link.emit(ChangeNotification::insert("bookings", json!({"id": "b1"})));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_adapter_unsubscribe_while_reconnecting() {
    let h = harness(configured());
    h.realtime.connect();

    let adapter = Arc::new(h.realtime.adapter());
    let (dropped_count, cb) = counter();
    let dropped = adapter.subscribe_to_table("bookings", cb);
    let (kept_count, cb) = counter();
    let kept = adapter.subscribe_to_table("bookings", cb);

    let removed = Arc::new(Mutex::new(None));
    let armed = Arc::new(AtomicBool::new(false));
    let (ad, r, a) = (Arc::downgrade(&adapter), removed.clone(), armed.clone());
    let _listener = h.realtime.tracker().add_listener(move |state| {
        if state == LinkState::Connected && a.swap(false, Ordering::SeqCst) {
            if let Some(adapter) = ad.upgrade() {
                *r.lock() = Some(adapter.unsubscribe(dropped));
            }
        }
    });

    armed.store(true, Ordering::SeqCst);
    h.link.simulate_close(Some("network"));
    tokio::time::sleep(Duration::from_millis(2001)).await;

    assert_eq!(*removed.lock(), Some(true));
    assert_eq!(adapter.owned_subscriptions(), vec![kept]);
    assert!(!h.realtime.registry().contains(dropped));
    assert!(h.realtime.registry().is_active(kept));
    assert_eq!(h.link.channel_count(), 1);

    h.link.emit(ChangeNotification::insert("bookings", json!({"id": "b1"})));
    assert_eq!(dropped_count.load(Ordering::SeqCst), 0);
    assert_eq!(kept_count.load(Ordering::SeqCst), 1);
}
