//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use realtime_sync::{
    MemoryLink, MemoryLog, MemoryRowStore, Realtime, RealtimeConfig, RealtimeError, Result,
    WebhookBody, WebhookTransport,
};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

pub const ENDPOINT: &str = "https://hooks.test/realtime";

/// Transport that records every POST and answers with a fixed status.
pub struct RecordingTransport {
    calls: Mutex<Vec<(String, WebhookBody)>>,
    status: AtomicU16,
    unreachable: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            status: AtomicU16::new(200),
            unreachable: Mutex::new(false),
        }
    }

    pub fn respond_with(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn go_offline(&self) {
        *self.unreachable.lock() = true;
    }

    pub fn calls(&self) -> Vec<(String, WebhookBody)> {
        self.calls.lock().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, b)| b.event.clone()).collect()
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn post(&self, url: &str, body: &WebhookBody) -> Result<u16> {
        self.calls.lock().push((url.to_string(), body.clone()));
        if *self.unreachable.lock() {
            return Err(RealtimeError::Transport("connection refused".to_string()));
        }
        Ok(self.status.load(Ordering::SeqCst))
    }
}

pub struct Harness {
    pub realtime: Arc<Realtime>,
    pub link: Arc<MemoryLink>,
    pub store: Arc<MemoryRowStore>,
    pub transport: Arc<RecordingTransport>,
    pub log: Arc<MemoryLog>,
}

/// Build a realtime layer over in-memory collaborators. Must run inside a
/// tokio runtime.
pub fn harness(config: RealtimeConfig) -> Harness {
    init_tracing();
    let link = Arc::new(MemoryLink::new());
    let store = Arc::new(MemoryRowStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let log = Arc::new(MemoryLog::new());

    let realtime = Realtime::with_parts(
        config,
        link.clone(),
        store.clone(),
        transport.clone(),
        log.clone(),
    )
    .unwrap();

    Harness {
        realtime: Arc::new(realtime),
        link,
        store,
        transport,
        log,
    }
}

pub fn configured() -> RealtimeConfig {
    RealtimeConfig::default().with_webhook_endpoint(ENDPOINT)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("realtime_sync=debug")
        .try_init();
}
