//! Typed events decoded from verified webhook deliveries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// Event kinds the provider notifies about.
///
/// The set is closed; kinds this gateway does not know are preserved as
/// `Unknown` and acknowledged without processing, so the provider never
/// sees a retryable error for event types we don't understand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Sent,
    Delivered,
    DeliveryDelayed,
    Bounced,
    Complained,
    Opened,
    Clicked,
    Received,
    Unknown(String),
}

impl EventKind {
    /// Wire name of the event kind.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Sent => "email.sent",
            EventKind::Delivered => "email.delivered",
            EventKind::DeliveryDelayed => "email.delivery_delayed",
            EventKind::Bounced => "email.bounced",
            EventKind::Complained => "email.complained",
            EventKind::Opened => "email.opened",
            EventKind::Clicked => "email.clicked",
            EventKind::Received => "email.received",
            EventKind::Unknown(raw) => raw,
        }
    }

    /// Whether this kind signals that delivery has fired for the email,
    /// which moves a tracked scheduled send out of `Pending`.
    pub fn marks_delivery(&self) -> bool {
        matches!(self, EventKind::Sent | EventKind::Delivered)
    }
}

impl From<String> for EventKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "email.sent" => EventKind::Sent,
            "email.delivered" => EventKind::Delivered,
            "email.delivery_delayed" => EventKind::DeliveryDelayed,
            "email.bounced" => EventKind::Bounced,
            "email.complained" => EventKind::Complained,
            "email.opened" => EventKind::Opened,
            "email.clicked" => EventKind::Clicked,
            "email.received" => EventKind::Received,
            _ => EventKind::Unknown(raw),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verified, decoded webhook event.
///
/// Only successful verification produces one of these; `received_at` is
/// derived from the verified timestamp header, never from the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub kind: EventKind,
    pub data: Value,
    pub received_at: DateTime<Utc>,
}

/// On-the-wire envelope of a provider event.
#[derive(Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl WebhookEvent {
    /// Decode a raw payload that already passed signature verification.
    pub fn decode(payload: &[u8], received_at: DateTime<Utc>) -> Result<Self, GatewayError> {
        let envelope: EventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;

        Ok(WebhookEvent {
            kind: EventKind::from(envelope.kind),
            data: envelope.data,
            received_at,
        })
    }

    /// Provider-assigned id of the email this event refers to.
    pub fn email_id(&self) -> Option<&str> {
        self.data.get("email_id").and_then(Value::as_str)
    }

    /// Sender address, when the payload carries one.
    pub fn from_addr(&self) -> Option<&str> {
        self.data.get("from").and_then(Value::as_str)
    }

    /// First recipient address. The provider sends `to` as an array.
    pub fn first_recipient(&self) -> Option<&str> {
        self.data
            .get("to")
            .and_then(Value::as_array)
            .and_then(|recipients| recipients.first())
            .and_then(Value::as_str)
    }

    /// Email subject, when the payload carries one.
    pub fn subject(&self) -> Option<&str> {
        self.data.get("subject").and_then(Value::as_str)
    }
}
