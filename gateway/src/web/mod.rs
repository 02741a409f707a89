//! Web server module.
//!
//! This module provides a thin web server that:
//! - Receives provider webhooks, verifies the signature over the raw
//!   body, and enqueues the decoded event to RabbitMQ
//! - Exposes the send/schedule/cancel/update surface toward the provider
//!
//! Event dispatch happens in the background processor; webhook responses
//! only confirm verification and enqueueing.

pub mod handlers;

pub use handlers::{
    cancel_scheduled, health, receive_webhook, send_batch, send_email, update_scheduled,
    AppState, ErrorBody, HealthResponse, SendAck, WebhookAck,
};
