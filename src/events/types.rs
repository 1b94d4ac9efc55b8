//! Event envelope passed to bus handlers.

use crate::types::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized payload of a triggered event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    pub table: String,
    pub record: Row,
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_record: Option<Row>,
}

impl EventEnvelope {
    /// Build an envelope from either an already-enveloped payload
    /// (`{table, record, schema?, old_record?}`), a change-notification shaped
    /// payload (`{table?, new, old?}`) or a bare record.
    pub fn normalize(event: &str, payload: Value) -> Self {
        let table = string_field(&payload, "table").unwrap_or_default();
        let schema = string_field(&payload, "schema").unwrap_or_else(|| "public".to_string());

        let (record, old_record) = match payload {
            Value::Object(mut fields) if fields.contains_key("record") => {
                let record = fields.remove("record").unwrap_or(Value::Null);
                (record, non_null(fields.remove("old_record")))
            }
            Value::Object(mut fields) if fields.contains_key("new") => {
                let record = fields.remove("new").unwrap_or(Value::Null);
                (record, non_null(fields.remove("old")))
            }
            raw => (raw, None),
        };

        Self {
            event: event.to_string(),
            table,
            record,
            schema,
            old_record,
        }
    }

    /// A field of the new record.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.record.get(name)
    }

    /// A field of the old record.
    pub fn old_field(&self, name: &str) -> Option<&Value> {
        self.old_record.as_ref().and_then(|r| r.get(name))
    }

    /// The record's `id`, rendered as a string.
    pub fn record_id(&self) -> Option<String> {
        self.field("id").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

fn string_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn non_null(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}
