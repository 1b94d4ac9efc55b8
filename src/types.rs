//! Core types shared across the realtime layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A row image as delivered by the backend.
pub type Row = Value;

/// Wall-clock timestamp (milliseconds since the Unix epoch).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Timestamp(millis)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of row change carried by a notification, also used as a
/// subscription's event filter (`Any` matches every kind).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    #[default]
    #[serde(rename = "*")]
    Any,
}

impl ChangeKind {
    /// Whether a filter of this kind accepts a notification of `other`.
    pub fn accepts(self, other: ChangeKind) -> bool {
        self == ChangeKind::Any || self == other
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
            ChangeKind::Any => "*",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single insert/update/delete event delivered over a subscription's channel.
///
/// `new` is present for inserts and updates, `old` for updates and deletes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub table: String,
    #[serde(rename = "new", default, skip_serializing_if = "Option::is_none")]
    pub new_row: Option<Row>,
    #[serde(rename = "old", default, skip_serializing_if = "Option::is_none")]
    pub old_row: Option<Row>,
}

impl ChangeNotification {
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Self {
            kind: ChangeKind::Insert,
            table: table.into(),
            new_row: Some(row),
            old_row: None,
        }
    }

    pub fn update(table: impl Into<String>, old: Row, new: Row) -> Self {
        Self {
            kind: ChangeKind::Update,
            table: table.into(),
            new_row: Some(new),
            old_row: Some(old),
        }
    }

    pub fn delete(table: impl Into<String>, old: Row) -> Self {
        Self {
            kind: ChangeKind::Delete,
            table: table.into(),
            new_row: None,
            old_row: Some(old),
        }
    }

    /// The most recent row image: `new` when present, otherwise `old`.
    pub fn row(&self) -> Option<&Row> {
        self.new_row.as_ref().or(self.old_row.as_ref())
    }
}
