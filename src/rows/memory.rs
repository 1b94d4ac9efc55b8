//! In-memory row store.

use super::RowStore;
use crate::error::{RealtimeError, Result};
use crate::types::Row;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Tables held in memory, with per-table fault injection.
///
/// Rows inserted without an `id` get a generated numeric one.
pub struct MemoryRowStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    failing: Mutex<HashSet<String>>,
    next_id: AtomicU64,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append rows without going through `insert` (no id generation, no faults).
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Snapshot of a table's rows in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    /// Make every call touching `table` fail until [`heal_table`](Self::heal_table).
    pub fn fail_table(&self, table: &str) {
        self.failing.lock().insert(table.to_string());
    }

    pub fn heal_table(&self, table: &str) {
        self.failing.lock().remove(table);
    }

    fn check(&self, table: &str) -> Result<()> {
        if self.failing.lock().contains(table) {
            return Err(RealtimeError::store(table, "simulated failure"));
        }
        Ok(())
    }
}

impl Default for MemoryRowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn insert(&self, table: &str, mut row: Row) -> Result<Row> {
        self.check(table)?;
        let Some(fields) = row.as_object_mut() else {
            return Err(RealtimeError::store(table, "row must be a JSON object"));
        };
        if !fields.contains_key("id") {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            fields.insert("id".to_string(), Value::from(id));
        }

        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn select(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>> {
        self.check(table)?;
        Ok(self
            .tables
            .lock()
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.get(column) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, table: &str, id: &Value, patch: Row) -> Result<Row> {
        self.check(table)?;
        let mut tables = self.tables.lock();
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| r.get("id") == Some(id)))
            .ok_or_else(|| RealtimeError::RowNotFound {
                table: table.to_string(),
                key: id.to_string(),
            })?;

        if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
            for (k, v) in fields {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(row.clone())
    }
}
