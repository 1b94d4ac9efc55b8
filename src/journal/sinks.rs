//! [`SyncLog`] implementations.

use super::types::{ErrorLogEntry, SyncLogEntry, WebhookDeliveryRecord};
use super::SyncLog;
use crate::config::TableNames;
use crate::error::{RealtimeError, Result};
use crate::rows::RowStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Appends entries to log tables of a row store.
///
/// Each write is spawned onto the runtime captured at construction and never
/// awaited by the caller.
pub struct RowStoreLog {
    store: Arc<dyn RowStore>,
    tables: TableNames,
    runtime: Handle,
}

impl RowStoreLog {
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<dyn RowStore>, tables: TableNames) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| RealtimeError::NoRuntime(e.to_string()))?;
        Ok(Self {
            store,
            tables,
            runtime,
        })
    }

    fn append<T: Serialize>(&self, table: &str, entry: &T) {
        let row = match serde_json::to_value(entry) {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(table, error = %e, "failed to serialize log entry");
                return;
            }
        };

        let store = self.store.clone();
        let table = table.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = store.insert(&table, row).await {
                tracing::warn!(table = %table, error = %e, "failed to write log entry");
            }
        });
    }
}

impl SyncLog for RowStoreLog {
    fn record_sync(&self, entry: SyncLogEntry) {
        self.append(&self.tables.sync_log, &entry);
    }

    fn record_error(&self, entry: ErrorLogEntry) {
        tracing::error!(action = %entry.action, message = %entry.message, "recorded error");
        self.append(&self.tables.error_log, &entry);
    }

    fn record_delivery(&self, record: WebhookDeliveryRecord) {
        self.append(&self.tables.delivery_log, &record);
    }
}

/// In-memory append-only log.
#[derive(Default)]
pub struct MemoryLog {
    syncs: Mutex<Vec<SyncLogEntry>>,
    errors: Mutex<Vec<ErrorLogEntry>>,
    deliveries: Mutex<Vec<WebhookDeliveryRecord>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn syncs(&self) -> Vec<SyncLogEntry> {
        self.syncs.lock().clone()
    }

    pub fn errors(&self) -> Vec<ErrorLogEntry> {
        self.errors.lock().clone()
    }

    pub fn deliveries(&self) -> Vec<WebhookDeliveryRecord> {
        self.deliveries.lock().clone()
    }
}

impl SyncLog for MemoryLog {
    fn record_sync(&self, entry: SyncLogEntry) {
        self.syncs.lock().push(entry);
    }

    fn record_error(&self, entry: ErrorLogEntry) {
        tracing::error!(action = %entry.action, message = %entry.message, "recorded error");
        self.errors.lock().push(entry);
    }

    fn record_delivery(&self, record: WebhookDeliveryRecord) {
        self.deliveries.lock().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{DeliveryOutcome, SyncStatus};
    use crate::rows::MemoryRowStore;
    use crate::types::Timestamp;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_row_store_log_appends_rows() {
        let store = Arc::new(MemoryRowStore::new());
        let log = RowStoreLog::new(store.clone(), TableNames::default()).unwrap();

        log.record_sync(SyncLogEntry::new("notifications", "insert", Some("7".into()), SyncStatus::Success));
        log.record_delivery(WebhookDeliveryRecord {
            event: "record_created".to_string(),
            payload: "{}".to_string(),
            timestamp: Timestamp::now(),
            outcome: DeliveryOutcome::Failure {
                error: "status 500".to_string(),
            },
        });

        // Writes are spawned; give them a moment.
        for _ in 0..50 {
            if store.rows("sync_logs").len() == 1 && store.rows("webhook_deliveries").len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let sync = store.rows("sync_logs");
        assert_eq!(sync[0]["table_name"], "notifications");
        assert_eq!(sync[0]["status"], "success");

        let deliveries = store.rows("webhook_deliveries");
        assert_eq!(deliveries[0]["outcome"], "failure");
        assert_eq!(deliveries[0]["error"], "status 500");
    }

    #[tokio::test]
    async fn test_row_store_log_swallows_write_failures() {
        let store = Arc::new(MemoryRowStore::new());
        store.fail_table("error_logs");
        let log = RowStoreLog::new(store.clone(), TableNames::default()).unwrap();

        log.record_error(ErrorLogEntry::new("test", "boom", json!({})));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(store.rows("error_logs").is_empty());
    }

    #[test]
    fn test_row_store_log_needs_runtime() {
        let store = Arc::new(MemoryRowStore::new());
        let result = RowStoreLog::new(store, TableNames::default());
        assert!(matches!(result, Err(RealtimeError::NoRuntime(_))));
    }
}
