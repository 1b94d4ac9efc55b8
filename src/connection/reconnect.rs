//! Bounded exponential-backoff reconnection.
//!
//! The controller is an explicit state machine:
//!
//! ```text
//! Idle --(close/error, attempts < max)--> Scheduled(attempt, delay) --(timer)--> Idle
//!   \--(close/error, attempts >= max)--> Exhausted --(manual connect)--> Idle
//! ```
//!
//! Only one retry timer is ever outstanding. Arming a new one aborts the
//! previous timer, and a generation counter discards a timer that fired
//! while it was being replaced.

use super::state::{ConnectionTracker, LinkState};
use crate::config::ReconnectPolicy;
use crate::error::{RealtimeError, Result};
use crate::link::{LinkSignal, RealtimeLink};
use crate::subscriptions::SubscriptionRegistry;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Observable retry state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryState {
    /// No retry pending.
    Idle,
    /// A retry timer is armed.
    Scheduled { attempt: u32, delay: Duration },
    /// The attempt budget is spent; only a manual connect resumes retries.
    Exhausted,
}

struct ControllerState {
    attempts: u32,
    retry: RetryState,
    timer: Option<JoinHandle<()>>,
    /// Bumped every time a timer is armed or cancelled.
    generation: u64,
    /// Set by an intentional disconnect; suppresses automatic retries.
    suspended: bool,
    last_delay: Option<Duration>,
}

impl ControllerState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
        if matches!(self.retry, RetryState::Scheduled { .. }) {
            self.retry = RetryState::Idle;
        }
    }
}

struct ControllerInner {
    policy: ReconnectPolicy,
    tracker: ConnectionTracker,
    registry: SubscriptionRegistry,
    link: Arc<dyn RealtimeLink>,
    runtime: Handle,
    state: Mutex<ControllerState>,
}

/// Drives [`LinkState`] from link lifecycle signals and re-establishes the
/// link after failures.
///
/// On a retry every registered subscription is detached from its old channel
/// and re-opened against the fresh link with its original id, filter and
/// callback. Entries are never removed during the replay.
#[derive(Clone)]
pub struct ReconnectController {
    inner: Arc<ControllerInner>,
}

impl ReconnectController {
    /// Must be called from within a tokio runtime; retry timers are spawned
    /// onto it.
    pub fn new(
        policy: ReconnectPolicy,
        tracker: ConnectionTracker,
        registry: SubscriptionRegistry,
        link: Arc<dyn RealtimeLink>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| RealtimeError::NoRuntime(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(ControllerInner {
                policy,
                tracker,
                registry,
                link,
                runtime,
                state: Mutex::new(ControllerState {
                    attempts: 0,
                    retry: RetryState::Idle,
                    timer: None,
                    generation: 0,
                    suspended: false,
                    last_delay: None,
                }),
            }),
        })
    }

    /// Subscribe this controller to the link's lifecycle signals.
    pub fn attach(&self) {
        let controller = Arc::downgrade(&self.inner);
        self.inner.link.on_lifecycle(Arc::new(move |signal| {
            if let Some(inner) = controller.upgrade() {
                ReconnectController { inner }.handle_signal(signal);
            }
        }));
    }

    pub fn handle_signal(&self, signal: LinkSignal) {
        match signal {
            LinkSignal::Open => self.handle_open(),
            LinkSignal::Close { reason } => self.handle_close(reason.as_deref()),
            LinkSignal::Error { message } => self.handle_error(&message),
        }
    }

    /// Link is up: reset the attempt counter and cancel any pending retry.
    pub fn handle_open(&self) {
        {
            let mut st = self.inner.state.lock();
            st.attempts = 0;
            st.cancel_timer();
            st.retry = RetryState::Idle;
        }
        tracing::info!("realtime link connected");
        self.inner.tracker.set_state(LinkState::Connected);
    }

    pub fn handle_close(&self, reason: Option<&str>) {
        tracing::warn!(reason = reason.unwrap_or("unknown"), "realtime link closed");
        self.inner.tracker.set_state(LinkState::Disconnected);
        if !self.is_suspended() {
            self.schedule_reconnect();
        }
    }

    pub fn handle_error(&self, message: &str) {
        tracing::warn!(error = %message, "realtime link error");
        self.inner.tracker.set_state(LinkState::Error);
        if !self.is_suspended() {
            self.schedule_reconnect();
        }
    }

    /// Arm the next retry timer. Returns false once the attempt budget is
    /// spent, in which case no timer is armed.
    pub fn schedule_reconnect(&self) -> bool {
        let (attempt, delay) = {
            let mut st = self.inner.state.lock();
            st.cancel_timer();

            if st.attempts >= self.inner.policy.max_attempts {
                st.retry = RetryState::Exhausted;
                drop(st);
                tracing::warn!(
                    max_attempts = self.inner.policy.max_attempts,
                    "max reconnection attempts reached, giving up"
                );
                return false;
            }

            st.attempts += 1;
            let attempt = st.attempts;
            let delay = self.inner.policy.delay_for(attempt);
            let generation = st.generation;

            let controller = Arc::downgrade(&self.inner);
            st.timer = Some(self.inner.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                fire(controller, generation);
            }));
            st.retry = RetryState::Scheduled { attempt, delay };
            st.last_delay = Some(delay);
            (attempt, delay)
        };

        tracing::info!(
            attempt,
            max_attempts = self.inner.policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnection"
        );
        self.inner.tracker.set_state(LinkState::Connecting);
        true
    }

    /// Clear the attempt counter and exhaustion, cancel any pending retry and
    /// re-enable automatic retries. Used by a manual connect.
    pub fn reset(&self) {
        let mut st = self.inner.state.lock();
        st.cancel_timer();
        st.attempts = 0;
        st.retry = RetryState::Idle;
        st.suspended = false;
        st.last_delay = None;
    }

    /// Stop automatic retries until the next [`reset`](Self::reset).
    pub fn suspend(&self) {
        let mut st = self.inner.state.lock();
        st.cancel_timer();
        st.suspended = true;
    }

    pub fn attempts(&self) -> u32 {
        self.inner.state.lock().attempts
    }

    pub fn retry_state(&self) -> RetryState {
        self.inner.state.lock().retry
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self.retry_state(), RetryState::Scheduled { .. })
    }

    /// Delay of the most recently armed timer.
    pub fn last_delay(&self) -> Option<Duration> {
        self.inner.state.lock().last_delay
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.state.lock().suspended
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.inner.policy
    }
}

/// Timer expiry: replay the registry against a fresh link.
fn fire(controller: Weak<ControllerInner>, generation: u64) {
    let Some(inner) = controller.upgrade() else {
        return;
    };

    {
        let mut st = inner.state.lock();
        if st.generation != generation || st.suspended {
            return;
        }
        st.timer = None;
        st.retry = RetryState::Idle;
    }

    tracing::debug!("reconnecting link");
    let replayed = inner.registry.replay(|| inner.link.connect());
    tracing::debug!(subscriptions = replayed, "subscriptions replayed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::MemoryLog;
    use crate::link::MemoryLink;

    fn setup(policy: ReconnectPolicy) -> (Arc<MemoryLink>, ConnectionTracker, ReconnectController) {
        let link = Arc::new(MemoryLink::new());
        let tracker = ConnectionTracker::new();
        let registry = SubscriptionRegistry::new(link.clone(), Arc::new(MemoryLog::new()));
        let controller =
            ReconnectController::new(policy, tracker.clone(), registry, link.clone()).unwrap();
        controller.attach();
        (link, tracker, controller)
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_resets_counter() {
        let (link, tracker, controller) = setup(ReconnectPolicy::default());

        link.connect();
        link.simulate_close(Some("server restart"));
        assert_eq!(controller.attempts(), 1);
        assert_eq!(tracker.state(), LinkState::Connecting);

        tokio::time::sleep(Duration::from_millis(2001)).await;

        assert_eq!(tracker.state(), LinkState::Connected);
        assert_eq!(controller.attempts(), 0);
        assert_eq!(controller.retry_state(), RetryState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_schedule_replaces_pending_timer() {
        let (link, _tracker, controller) = setup(ReconnectPolicy::default());

        link.simulate_error("reset by peer");
        link.simulate_error("reset by peer");

        assert_eq!(
            controller.retry_state(),
            RetryState::Scheduled {
                attempt: 2,
                delay: Duration::from_millis(4000)
            }
        );

        // Only the second timer fires.
        tokio::time::sleep(Duration::from_millis(4001)).await;
        assert_eq!(link.connect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspended_controller_does_not_retry() {
        let (link, tracker, controller) = setup(ReconnectPolicy::default());
        link.connect();

        controller.suspend();
        link.simulate_close(None);

        assert_eq!(tracker.state(), LinkState::Disconnected);
        assert_eq!(controller.retry_state(), RetryState::Idle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(link.connect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempt_budget_exhausts_immediately() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        let (link, tracker, controller) = setup(policy);

        link.simulate_error("refused");

        assert_eq!(controller.retry_state(), RetryState::Exhausted);
        assert_eq!(tracker.state(), LinkState::Error);
    }

    #[test]
    fn test_requires_runtime() {
        let link = Arc::new(MemoryLink::new());
        let registry = SubscriptionRegistry::new(link.clone(), Arc::new(MemoryLog::new()));
        let result = ReconnectController::new(
            ReconnectPolicy::default(),
            ConnectionTracker::new(),
            registry,
            link,
        );
        assert!(matches!(result, Err(RealtimeError::NoRuntime(_))));
    }
}
