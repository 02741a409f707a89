//! Verified-event dispatch.
//!
//! Routes each decoded event by kind. Bounces and complaints raise an ops
//! alert; the rest of the delivery lifecycle is logged. Unknown kinds are
//! acknowledged and ignored so the provider never retries event types this
//! consumer doesn't understand.

pub mod notify;

use tracing::{info, warn};

use crate::error::GatewayError;
use crate::webhook::{EventKind, WebhookEvent};

pub use notify::AlertSink;

/// What dispatch did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Bounce/complaint routed to the ops alert sink
    Alerted,
    /// Delivery-lifecycle event recorded in the logs
    Logged,
    /// Unknown kind, acknowledged and dropped
    Ignored,
}

/// Dispatch a verified event to its handler.
pub async fn dispatch_event(
    event: &WebhookEvent,
    alerts: &AlertSink,
) -> Result<EventOutcome, GatewayError> {
    match &event.kind {
        EventKind::Bounced | EventKind::Complained => {
            warn!(
                kind = %event.kind,
                email_id = event.email_id().unwrap_or("unknown"),
                recipient = event.first_recipient().unwrap_or("unknown"),
                "event_delivery_problem"
            );
            alerts.send_alert(event).await?;
            Ok(EventOutcome::Alerted)
        }
        EventKind::Unknown(kind) => {
            info!(kind = %kind, "event_kind_ignored");
            Ok(EventOutcome::Ignored)
        }
        _ => {
            info!(
                kind = %event.kind,
                email_id = event.email_id().unwrap_or("unknown"),
                "event_recorded"
            );
            Ok(EventOutcome::Logged)
        }
    }
}
