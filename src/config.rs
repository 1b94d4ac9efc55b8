//! Configuration for the realtime layer.

use crate::error::{RealtimeError, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Link reconnection policy.
    pub reconnect: ReconnectPolicy,

    /// Outbound webhook settings.
    pub webhook: WebhookConfig,

    /// Row store table names used by trigger bindings and the log sink.
    pub tables: TableNames,
}

impl RealtimeConfig {
    /// Parse a JSON document; missing fields fall back to their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: RealtimeConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `REALTIME_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = RealtimeConfig::default();

        if let Ok(url) = std::env::var("REALTIME_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                config.webhook.endpoint = Some(url.trim().to_string());
            }
        }
        if let Some(v) = env_number("REALTIME_RECONNECT_MAX_ATTEMPTS")? {
            config.reconnect.max_attempts = v;
        }
        if let Some(v) = env_number("REALTIME_RECONNECT_BASE_MS")? {
            config.reconnect.base_delay_ms = v;
        }
        if let Some(v) = env_number("REALTIME_RECONNECT_MAX_MS")? {
            config.reconnect.max_delay_ms = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_webhook_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.webhook.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_tables(mut self, tables: TableNames) -> Self {
        self.tables = tables;
        self
    }

    /// Reject settings the reconnect loop or dispatcher cannot work with.
    pub fn validate(&self) -> Result<()> {
        let r = &self.reconnect;
        if r.base_delay_ms == 0 {
            return Err(RealtimeError::InvalidConfig(
                "reconnect.base_delay_ms must be greater than zero".to_string(),
            ));
        }
        if r.max_delay_ms < r.base_delay_ms {
            return Err(RealtimeError::InvalidConfig(format!(
                "reconnect.max_delay_ms ({}) is below base_delay_ms ({})",
                r.max_delay_ms, r.base_delay_ms
            )));
        }
        if let Some(ref endpoint) = self.webhook.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(RealtimeError::InvalidConfig(format!(
                    "webhook.endpoint must be an http(s) URL, got {:?}",
                    endpoint
                )));
            }
        }
        Ok(())
    }
}

fn env_number<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_number(key, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

/// Out-of-range values are rejected, never truncated.
fn parse_number<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| RealtimeError::InvalidConfig(format!("{}={:?}: {}", key, raw, e)))
}

/// Exponential backoff policy for link reconnection.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Automatic attempts before giving up. Default: 5
    pub max_attempts: u32,

    /// Delay unit in milliseconds. Default: 1000
    pub base_delay_ms: u64,

    /// Upper bound on any single delay. Default: 30000
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt: `min(base * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Outbound webhook settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Delivery target. `None` turns every send into a logged no-op.
    pub endpoint: Option<String>,

    /// Per-request timeout in milliseconds. Default: 10000
    pub timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 10_000,
        }
    }
}

/// Table names in the row store.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TableNames {
    /// Related parties looked up by `record_created`.
    pub parties: String,
    /// Foreign key column on a record pointing at its party.
    pub party_key: String,
    /// User-facing notifications.
    pub notifications: String,
    /// Append-only sync outcome log.
    pub sync_log: String,
    /// Append-only error log.
    pub error_log: String,
    /// Append-only webhook delivery log.
    pub delivery_log: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            parties: "clients".to_string(),
            party_key: "client_id".to_string(),
            notifications: "notifications".to_string(),
            sync_log: "sync_logs".to_string(),
            error_log: "error_logs".to_string(),
            delivery_log: "webhook_deliveries".to_string(),
        }
    }
}
