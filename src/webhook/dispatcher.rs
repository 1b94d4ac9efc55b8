//! Webhook dispatcher: one POST per call, every attempt logged.

use super::transport::{WebhookBody, WebhookTransport};
use crate::config::WebhookConfig;
use crate::error::RealtimeError;
use crate::journal::{DeliveryOutcome, ErrorLogEntry, SyncLog, WebhookDeliveryRecord};
use crate::types::Timestamp;
use serde_json::{json, Value};
use std::sync::Arc;

/// Delivers named events to the configured endpoint.
///
/// There is no retry and no idempotency key: a caller that retries a failed
/// send may cause duplicate deliveries.
#[derive(Clone)]
pub struct WebhookDispatcher {
    endpoint: Option<String>,
    transport: Arc<dyn WebhookTransport>,
    log: Arc<dyn SyncLog>,
}

impl WebhookDispatcher {
    pub fn new(config: &WebhookConfig, transport: Arc<dyn WebhookTransport>, log: Arc<dyn SyncLog>) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            transport,
            log,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// POST `{event, payload, timestamp}` to the endpoint.
    ///
    /// Returns true only on a 2xx response. Without an endpoint this is a
    /// logged no-op returning false.
    pub async fn send(&self, event: &str, payload: Value) -> bool {
        let Some(endpoint) = self.endpoint.as_deref() else {
            tracing::warn!(event, "webhook endpoint not configured, skipping delivery");
            return false;
        };

        let payload_text = payload.to_string();
        let body = WebhookBody {
            event: event.to_string(),
            payload,
            timestamp: Timestamp::now(),
        };

        let result = match self.transport.post(endpoint, &body).await {
            Ok(status) if (200..300).contains(&status) => Ok(status),
            Ok(status) => Err(RealtimeError::WebhookStatus {
                status,
                message: format!("webhook endpoint responded with {}", status),
            }),
            Err(e) => Err(e),
        };

        match result {
            Ok(status) => {
                tracing::debug!(event, status, "webhook delivered");
                self.log.record_delivery(WebhookDeliveryRecord {
                    event: body.event,
                    payload: payload_text,
                    timestamp: body.timestamp,
                    outcome: DeliveryOutcome::Success { status },
                });
                true
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(event, endpoint, error = %message, "webhook delivery failed");

                let status = match e {
                    RealtimeError::WebhookStatus { status, .. } => Some(status),
                    _ => None,
                };
                self.log.record_error(ErrorLogEntry::new(
                    "webhook.send",
                    message.clone(),
                    json!({ "event": event, "endpoint": endpoint, "status": status }),
                ));
                self.log.record_delivery(WebhookDeliveryRecord {
                    event: body.event,
                    payload: payload_text,
                    timestamp: body.timestamp,
                    outcome: DeliveryOutcome::Failure { error: message },
                });
                false
            }
        }
    }
}
