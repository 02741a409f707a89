//! Webhook verification module.
//!
//! Inbound webhook deliveries are authenticated here before anything else
//! touches them:
//! - `verifier` checks the three signature headers and the HMAC over the
//!   raw body, then decodes the payload into a typed event
//! - `events` defines the event kinds and the decoded event type
//!
//! Dispatch of event-specific logic lives in the `dispatch` module; the
//! verifier itself has no side effects.

pub mod events;
pub mod verifier;

pub use events::{EventKind, WebhookEvent};
pub use verifier::{SignatureHeaders, WebhookVerifier};
