//! Mailgate - transactional email gateway.
//!
//! This library provides shared modules for the two Mailgate binaries:
//! - `mailgate-web`: Web server for the send/schedule surface and for
//!   receiving and verifying provider webhooks
//! - `mailgate-processor`: Processor dispatching verified events
//!
//! ## Architecture
//!
//! ```text
//! Provider webhooks → Web Server → email_events → Processor → alerts/logs
//! Send requests     → Web Server → Provider API
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod provider;
pub mod queue;
pub mod schedule;
pub mod web;
pub mod webhook;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{dispatch_event, AlertSink, EventOutcome};
pub use error::GatewayError;
pub use provider::{
    Attachment, EmailProvider, HttpEmailProvider, MockProvider, SendReceipt, SendRequest,
};
pub use queue::{Publisher, EVENTS_QUEUE};
pub use schedule::{
    ScheduleState, ScheduleStore, ScheduledSend, ScheduledSendController, MAX_SCHEDULE_DAYS,
};
pub use web::AppState;
pub use webhook::{EventKind, SignatureHeaders, WebhookEvent, WebhookVerifier};
