//! Connection state broadcast and reconnection behavior.

mod common;

use common::{configured, harness};
use parking_lot::Mutex;
use proptest::prelude::*;
use realtime_sync::{LinkState, ReconnectPolicy, RetryState};
use std::sync::Arc;
use std::time::Duration;

fn recorder() -> (Arc<Mutex<Vec<LinkState>>>, impl Fn(LinkState) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |state| sink.lock().push(state))
}

// --- State Broadcast ---

#[tokio::test(start_paused = true)]
async fn test_listeners_follow_connect_and_close() {
    let h = harness(configured());
    let (first, listener) = recorder();
    h.realtime.tracker().add_listener(listener);
    let (second, listener) = recorder();
    h.realtime.tracker().add_listener(listener);

    h.realtime.connect();
    assert_eq!(h.realtime.state(), LinkState::Connected);

    h.link.simulate_close(Some("server restart"));

    let expected = vec![
        LinkState::Disconnected,
        LinkState::Connecting,
        LinkState::Connected,
        LinkState::Disconnected,
        LinkState::Connecting,
    ];
    assert_eq!(*first.lock(), expected);
    assert_eq!(*second.lock(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_removed_listener_stops_receiving() {
    let h = harness(configured());
    let (seen, listener) = recorder();
    let handle = h.realtime.tracker().add_listener(listener);

    assert!(handle.remove());
    h.realtime.connect();

    assert_eq!(*seen.lock(), vec![LinkState::Disconnected]);
}

// --- Backoff ---

#[tokio::test(start_paused = true)]
async fn test_backoff_sequence_until_exhausted() {
    let h = harness(configured());
    let controller = h.realtime.controller();
    h.link.fail_next_connects(10);

    h.realtime.connect();
    assert_eq!(controller.last_delay(), Some(Duration::from_millis(2000)));

    let mut delays = vec![2000u64];
    for _ in 0..4 {
        let pending = controller.last_delay().unwrap();
        tokio::time::sleep(pending + Duration::from_millis(1)).await;
        delays.push(controller.last_delay().unwrap().as_millis() as u64);
    }
    assert_eq!(delays, vec![2000, 4000, 8000, 16000, 30000]);
    assert_eq!(controller.attempts(), 5);

    // Fifth retry fails too; no further timer is armed.
    tokio::time::sleep(Duration::from_millis(30_001)).await;
    assert_eq!(controller.retry_state(), RetryState::Exhausted);
    assert_eq!(h.link.connect_calls(), 6);
    assert_eq!(h.realtime.state(), LinkState::Error);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.link.connect_calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_lifts_exhaustion() {
    let policy = ReconnectPolicy {
        max_attempts: 1,
        ..Default::default()
    };
    let h = harness(configured().with_reconnect(policy));
    h.link.fail_next_connects(2);

    h.realtime.connect();
    tokio::time::sleep(Duration::from_millis(2001)).await;
    assert_eq!(h.realtime.controller().retry_state(), RetryState::Exhausted);

    h.realtime.connect();
    assert_eq!(h.realtime.state(), LinkState::Connected);
    assert_eq!(h.realtime.controller().attempts(), 0);
    assert_eq!(h.realtime.controller().retry_state(), RetryState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_successful_retry_resets_attempts() {
    let h = harness(configured());
    h.realtime.connect();

    h.link.simulate_error("reset by peer");
    assert_eq!(h.realtime.state(), LinkState::Connecting);
    assert_eq!(h.realtime.controller().attempts(), 1);

    tokio::time::sleep(Duration::from_millis(2001)).await;
    assert_eq!(h.realtime.state(), LinkState::Connected);
    assert_eq!(h.realtime.controller().attempts(), 0);

    // Next failure starts the sequence from the first delay again
    h.link.simulate_close(None);
    assert_eq!(
        h.realtime.controller().last_delay(),
        Some(Duration::from_millis(2000))
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_does_not_reconnect() {
    let h = harness(configured());
    h.realtime.connect();

    h.realtime.disconnect();
    assert_eq!(h.realtime.state(), LinkState::Disconnected);
    assert_eq!(h.realtime.controller().retry_state(), RetryState::Idle);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.link.connect_calls(), 1);
    assert_eq!(h.realtime.state(), LinkState::Disconnected);
}

// --- Policy Properties ---

proptest! {
    #[test]
    fn prop_delay_is_capped_and_non_decreasing(
        base in 1u64..5_000,
        max in 1u64..120_000,
        attempt in 0u32..80,
    ) {
        let policy = ReconnectPolicy { max_attempts: 5, base_delay_ms: base, max_delay_ms: max };
        let here = policy.delay_for(attempt);
        let next = policy.delay_for(attempt + 1);

        prop_assert!(here <= Duration::from_millis(max));
        prop_assert!(here <= next);
    }

    #[test]
    fn prop_delay_doubles_below_cap(base in 1u64..1_000, attempt in 0u32..10) {
        let policy = ReconnectPolicy { max_attempts: 5, base_delay_ms: base, max_delay_ms: u64::MAX };
        prop_assert_eq!(
            policy.delay_for(attempt + 1),
            policy.delay_for(attempt) * 2
        );
    }
}
