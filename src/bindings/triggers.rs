//! The fixed trigger bindings.
//!
//! Every binding has the same shape: guard condition, best-effort local side
//! effect (errors logged, never returned), then a webhook forward.

use crate::config::TableNames;
use crate::events::{EventBus, EventEnvelope, HandlerHandle, HandlerResult};
use crate::journal::{ErrorLogEntry, SyncLog, SyncLogEntry, SyncStatus};
use crate::rows::RowStore;
use crate::types::{Row, Timestamp};
use crate::webhook::WebhookDispatcher;
use serde_json::{json, Value};
use std::sync::Arc;

pub const RECORD_CREATED: &str = "record_created";
pub const RECORD_STATUS_CHANGED: &str = "record_status_changed";
pub const PARTY_CREATED: &str = "party_created";

/// Collaborators shared by all bindings.
#[derive(Clone)]
pub struct BindingContext {
    pub store: Arc<dyn RowStore>,
    pub webhook: WebhookDispatcher,
    pub log: Arc<dyn SyncLog>,
    pub tables: TableNames,
}

/// Register `record_created`, `record_status_changed` and `party_created`.
pub fn register_default_bindings(bus: &EventBus, ctx: BindingContext) -> Vec<HandlerHandle> {
    let ctx = Arc::new(ctx);
    let mut handles = Vec::with_capacity(3);

    let c = ctx.clone();
    handles.push(bus.on_fn(RECORD_CREATED, move |env| {
        let c = c.clone();
        async move { on_record_created(&c, env).await }
    }));

    let c = ctx.clone();
    handles.push(bus.on_fn(RECORD_STATUS_CHANGED, move |env| {
        let c = c.clone();
        async move { on_record_status_changed(&c, env).await }
    }));

    let c = ctx;
    handles.push(bus.on_fn(PARTY_CREATED, move |env| {
        let c = c.clone();
        async move { on_party_created(&c, env).await }
    }));

    handles
}

async fn on_record_created(ctx: &BindingContext, env: EventEnvelope) -> HandlerResult {
    if let Some(party) = find_party(ctx, &env, RECORD_CREATED).await {
        let row = notification_row(
            &env,
            &party,
            RECORD_CREATED,
            "New booking received",
            format!("Record {} was created", env.record_id().unwrap_or_default()),
        );
        create_notification(ctx, row).await;
    }

    ctx.webhook
        .send(RECORD_CREATED, json!({ "table": env.table, "record": env.record }))
        .await;
    Ok(())
}

async fn on_record_status_changed(ctx: &BindingContext, env: EventEnvelope) -> HandlerResult {
    let old_status = env.old_field("status").cloned().unwrap_or(Value::Null);
    let new_status = env.field("status").cloned().unwrap_or(Value::Null);
    let changed = env.old_record.is_some() && old_status != new_status;

    if changed {
        if let Some(party) = find_party(ctx, &env, RECORD_STATUS_CHANGED).await {
            let row = notification_row(
                &env,
                &party,
                RECORD_STATUS_CHANGED,
                "Booking status updated",
                format!("Status changed from {} to {}", render(&old_status), render(&new_status)),
            );
            create_notification(ctx, row).await;
        }
    } else {
        tracing::debug!(table = %env.table, record = ?env.record_id(), "status unchanged, no notification");
    }

    ctx.webhook
        .send(
            RECORD_STATUS_CHANGED,
            json!({
                "table": env.table,
                "record_id": env.record_id(),
                "old_status": old_status,
                "new_status": new_status,
                "record": env.record,
            }),
        )
        .await;
    Ok(())
}

async fn on_party_created(ctx: &BindingContext, env: EventEnvelope) -> HandlerResult {
    match env.field("id").cloned() {
        Some(party_id) => {
            if already_welcomed(ctx, &party_id).await {
                tracing::debug!(party = %party_id, "welcome notification already sent");
            } else {
                let row = notification_row(
                    &env,
                    &env.record,
                    PARTY_CREATED,
                    "Welcome",
                    "Thanks for signing up".to_string(),
                );
                create_notification(ctx, row).await;
            }
        }
        None => {
            tracing::warn!(table = %env.table, "party record without id, skipping welcome");
        }
    }

    ctx.webhook
        .send(PARTY_CREATED, json!({ "table": env.table, "record": env.record }))
        .await;
    Ok(())
}

/// Look up the party a record belongs to. Any failure is logged and yields None.
async fn find_party(ctx: &BindingContext, env: &EventEnvelope, action: &str) -> Option<Row> {
    let tables = &ctx.tables;
    let Some(party_id) = env.field(&tables.party_key).filter(|v| !v.is_null()) else {
        tracing::debug!(action, key = %tables.party_key, "record has no party reference");
        return None;
    };

    match ctx.store.select_one(&tables.parties, "id", party_id).await {
        Ok(Some(party)) => Some(party),
        Ok(None) => {
            tracing::warn!(action, party = %party_id, "related party not found, skipping notification");
            None
        }
        Err(e) => {
            tracing::warn!(action, party = %party_id, error = %e, "party lookup failed, skipping notification");
            ctx.log.record_error(ErrorLogEntry::new(
                format!("{}.party_lookup", action),
                e.to_string(),
                json!({ "party_id": party_id, "table": env.table, "record_id": env.record_id() }),
            ));
            None
        }
    }
}

async fn already_welcomed(ctx: &BindingContext, party_id: &Value) -> bool {
    match ctx
        .store
        .select(&ctx.tables.notifications, "party_id", party_id)
        .await
    {
        Ok(rows) => rows.iter().any(|r| r.get("kind") == Some(&json!(PARTY_CREATED))),
        Err(e) => {
            // Unknown; prefer sending over silently skipping.
            tracing::warn!(party = %party_id, error = %e, "could not check for earlier welcome");
            false
        }
    }
}

fn notification_row(env: &EventEnvelope, party: &Row, kind: &str, title: &str, message: String) -> Row {
    json!({
        "kind": kind,
        "recipient": party.get("email").cloned().unwrap_or(Value::Null),
        "party_id": party.get("id").cloned().unwrap_or(Value::Null),
        "related_table": env.table,
        "related_id": env.record_id(),
        "title": title,
        "message": message,
        "status": "pending",
        "created_at": Timestamp::now(),
    })
}

/// Insert a notification row and record the outcome. Returns whether it was written.
async fn create_notification(ctx: &BindingContext, row: Row) -> bool {
    let table = &ctx.tables.notifications;
    match ctx.store.insert(table, row).await {
        Ok(stored) => {
            let id = stored.get("id").map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            ctx.log
                .record_sync(SyncLogEntry::new(table.as_str(), "insert", id, SyncStatus::Success));
            true
        }
        Err(e) => {
            tracing::warn!(table = %table, error = %e, "failed to create notification");
            ctx.log
                .record_sync(SyncLogEntry::new(table.as_str(), "insert", None, SyncStatus::Failure));
            ctx.log.record_error(ErrorLogEntry::new(
                "notifications.create",
                e.to_string(),
                json!({ "table": table }),
            ));
            false
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
