//! Error types for the gateway.
//!
//! Every variant is recoverable at the request boundary and maps to a
//! specific client-visible status code in the web layer. Verification and
//! validation failures carry no partial side effects.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// One or more of the required webhook signature headers is absent.
    #[error("missing webhook signature headers")]
    MissingHeaders,

    /// The webhook signing secret is not configured on this deployment.
    #[error("webhook signing secret not configured")]
    MissingSecret,

    /// No signature candidate matched the computed MAC.
    #[error("webhook signature verification failed")]
    InvalidSignature,

    /// The webhook timestamp is unparseable or outside the replay window.
    #[error("webhook timestamp invalid or outside tolerance")]
    StaleTimestamp,

    /// The body passed signature verification but is not a valid event.
    #[error("webhook payload is not a valid event: {0}")]
    MalformedPayload(String),

    /// `scheduled_at` is unparseable, in the past, or more than the
    /// maximum window ahead of the current time.
    #[error("invalid schedule window: {0}")]
    InvalidScheduleWindow(String),

    /// Scheduling combined with batch delivery or attachments.
    #[error("incompatible send options: {0}")]
    IncompatibleOptions(&'static str),

    /// No scheduled send in a cancellable state exists for this id.
    #[error("no pending scheduled send: {0}")]
    NotFound(String),

    /// The upstream email provider rejected the call or was unreachable.
    #[error("provider error: {0}")]
    Provider(String),
}
