//! Turns table change notifications into event bus triggers.

use super::triggers::{PARTY_CREATED, RECORD_CREATED, RECORD_STATUS_CHANGED};
use crate::events::EventBus;
use crate::subscriptions::{SubscriptionFilter, SubscriptionId, SubscriptionRegistry};
use crate::types::ChangeKind;
use serde_json::{json, Value};
use tokio::runtime::Handle;

/// Which bus event each change kind on a table triggers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableBridge {
    pub table: String,
    pub on_insert: Option<String>,
    pub on_update: Option<String>,
    pub on_delete: Option<String>,
}

impl TableBridge {
    /// Inserts trigger `record_created`, updates `record_status_changed`.
    pub fn records(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            on_insert: Some(RECORD_CREATED.to_string()),
            on_update: Some(RECORD_STATUS_CHANGED.to_string()),
            on_delete: None,
        }
    }

    /// Inserts trigger `party_created`.
    pub fn parties(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            on_insert: Some(PARTY_CREATED.to_string()),
            on_update: None,
            on_delete: None,
        }
    }

    fn event_for(&self, kind: ChangeKind) -> Option<&str> {
        match kind {
            ChangeKind::Insert => self.on_insert.as_deref(),
            ChangeKind::Update => self.on_update.as_deref(),
            ChangeKind::Delete => self.on_delete.as_deref(),
            ChangeKind::Any => None,
        }
    }
}

/// Subscribe to the bridge's table; each mapped change triggers its event on
/// `runtime` without blocking the link.
pub fn bridge_table(
    registry: &SubscriptionRegistry,
    bus: &EventBus,
    runtime: &Handle,
    bridge: TableBridge,
) -> SubscriptionId {
    let bus = bus.clone();
    let runtime = runtime.clone();
    let table = bridge.table.clone();

    registry.subscribe(&table, SubscriptionFilter::default(), move |change| {
        let Some(event) = bridge.event_for(change.kind) else {
            return;
        };
        let event = event.to_string();
        let payload = json!({
            "table": bridge.table,
            "record": change.new_row.clone().or_else(|| change.old_row.clone()).unwrap_or(Value::Null),
            "old_record": change.old_row,
        });

        let bus = bus.clone();
        runtime.spawn(async move {
            bus.trigger(&event, payload).await;
        });
    })
}
