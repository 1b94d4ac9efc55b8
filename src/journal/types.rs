//! Audit log entry types. All are immutable once built.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a row write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Failure,
}

/// One row of the sync outcome log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub table_name: String,
    pub operation: String,
    pub record_id: Option<String>,
    pub status: SyncStatus,
    pub timestamp: Timestamp,
}

impl SyncLogEntry {
    pub fn new(
        table: impl Into<String>,
        operation: impl Into<String>,
        record_id: Option<String>,
        status: SyncStatus,
    ) -> Self {
        Self {
            table_name: table.into(),
            operation: operation.into(),
            record_id,
            status,
            timestamp: Timestamp::now(),
        }
    }
}

/// One row of the error log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    /// Tag naming what was being attempted, e.g. `webhook.send`.
    pub action: String,
    pub message: String,
    pub stack: Option<String>,
    pub context: Value,
    pub timestamp: Timestamp,
}

impl ErrorLogEntry {
    pub fn new(action: impl Into<String>, message: impl Into<String>, context: Value) -> Self {
        Self {
            action: action.into(),
            message: message.into(),
            stack: None,
            context,
            timestamp: Timestamp::now(),
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// Result of a single webhook delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Success { status: u16 },
    Failure { error: String },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success { .. })
    }
}

/// One row of the webhook delivery log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebhookDeliveryRecord {
    pub event: String,
    /// JSON text of the delivered body's payload.
    pub payload: String,
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}
