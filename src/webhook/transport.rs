//! Outbound HTTP transport for webhook bodies.

use crate::error::Result;
use crate::types::Timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// JSON body POSTed to the webhook endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebhookBody {
    pub event: String,
    pub payload: Value,
    pub timestamp: Timestamp,
}

/// Performs the POST. Returns the HTTP status of any response received;
/// `Err` only for failures without a response (connect, timeout, ...).
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, url: &str, body: &WebhookBody) -> Result<u16>;
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Use an existing client (shared connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, url: &str, body: &WebhookBody) -> Result<u16> {
        tracing::debug!(url, event = %body.event, "POST webhook");
        let response = self.client.post(url).json(body).send().await?;
        Ok(response.status().as_u16())
    }
}
