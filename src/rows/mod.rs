//! Row store port.
//!
//! The hosted backend's row-level tables, reduced to the calls the trigger
//! bindings and the log sink make. Callers always check the error case and
//! log-and-continue rather than propagate.

mod memory;

pub use memory::MemoryRowStore;

use crate::error::Result;
use crate::types::Row;
use async_trait::async_trait;
use serde_json::Value;

/// Insert/select/update on named tables.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert a row and return it as stored.
    async fn insert(&self, table: &str, row: Row) -> Result<Row>;

    /// All rows whose `column` equals `value`.
    async fn select(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>>;

    /// First row whose `column` equals `value`.
    async fn select_one(&self, table: &str, column: &str, value: &Value) -> Result<Option<Row>> {
        Ok(self.select(table, column, value).await?.into_iter().next())
    }

    /// Merge `patch` into the row with the given `id` and return the result.
    async fn update(&self, table: &str, id: &Value, patch: Row) -> Result<Row>;
}
