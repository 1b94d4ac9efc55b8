//! Error types for the realtime layer.

use thiserror::Error;

/// Main error type for realtime operations.
///
/// Link, handler and webhook failures never surface through the public
/// realtime API; they show up as state transitions, `false` returns or log
/// rows. This type covers construction, configuration and the collaborator
/// ports whose failures the core logs and absorbs.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Row store error on table {table}: {message}")]
    Store { table: String, message: String },

    #[error("Row not found in {table}: {key}")]
    RowNotFound { table: String, key: String },

    #[error("Webhook transport error: {0}")]
    Transport(String),

    #[error("Webhook endpoint returned status {status}: {message}")]
    WebhookStatus { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Handler error: {0}")]
    Handler(String),
}

impl RealtimeError {
    /// Build a row store error for `table`.
    pub fn store(table: impl Into<String>, message: impl Into<String>) -> Self {
        RealtimeError::Store {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Build a handler error from any displayable value.
    pub fn handler(message: impl std::fmt::Display) -> Self {
        RealtimeError::Handler(message.to_string())
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for RealtimeError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => RealtimeError::WebhookStatus {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => RealtimeError::Transport(e.to_string()),
        }
    }
}

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;
