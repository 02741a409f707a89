//! Ops alerting for delivery problems.
//!
//! Bounce and complaint events are posted as JSON to a configured webhook
//! URL (a Slack-style incoming hook). With no URL configured the sink logs
//! and drops.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::webhook::WebhookEvent;

/// Posts delivery-problem alerts to an ops webhook.
#[derive(Clone)]
pub struct AlertSink {
    client: Client,
    url: Option<String>,
}

#[derive(Serialize)]
struct AlertPayload<'a> {
    text: String,
    #[serde(rename = "type")]
    kind: &'a str,
    email_id: Option<&'a str>,
    from: Option<&'a str>,
    to: Option<&'a str>,
    subject: Option<&'a str>,
}

impl AlertSink {
    /// Create a sink. `url` of `None` disables delivery.
    pub fn new(url: Option<String>, timeout_ms: u64) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| GatewayError::Provider(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }

    /// Post an alert for the given event.
    pub async fn send_alert(&self, event: &WebhookEvent) -> Result<(), GatewayError> {
        let url = match &self.url {
            Some(url) => url,
            None => {
                debug!(kind = %event.kind, "alert_sink_disabled");
                return Ok(());
            }
        };

        let payload = AlertPayload {
            text: alert_text(event),
            kind: event.kind.as_str(),
            email_id: event.email_id(),
            from: event.from_addr(),
            to: event.first_recipient(),
            subject: event.subject(),
        };

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Provider(format!(
                "alert webhook returned {}",
                response.status()
            )));
        }

        info!(kind = %event.kind, "alert_sent");
        Ok(())
    }
}

fn alert_text(event: &WebhookEvent) -> String {
    format!(
        "{}: \"{}\" to {}",
        event.kind,
        event.subject().unwrap_or("(no subject)"),
        event.first_recipient().unwrap_or("unknown recipient"),
    )
}
