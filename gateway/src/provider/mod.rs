//! Email provider gateway.
//!
//! All delivery goes through the [`EmailProvider`] trait so handlers and
//! the scheduling controller never touch a concrete client. Production
//! uses the HTTP implementation; tests inject [`MockProvider`].
//!
//! Retries and backoff toward the provider are deliberately absent;
//! failures surface to the caller as-is.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

pub use http::HttpEmailProvider;
pub use mock::MockProvider;

/// A single email to deliver, immediately or at `scheduled_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    /// Sender address
    pub from: String,
    /// Recipient addresses
    pub to: Vec<String>,
    /// Email subject
    pub subject: String,
    /// HTML body content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Plain text body content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Provider-side template reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Reply-to address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Attachments; incompatible with scheduling and batch delivery
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// ISO-8601 instant for deferred delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
}

/// File attached to an email. Content is base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content: String,
}

/// Provider acknowledgement of an accepted email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Provider-assigned opaque identifier
    pub id: String,
}

/// The upstream transactional email API.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Submit a single email for delivery.
    async fn send(&self, request: &SendRequest) -> Result<SendReceipt, GatewayError>;

    /// Submit multiple independent emails in one request.
    async fn send_batch(&self, requests: &[SendRequest]) -> Result<Vec<SendReceipt>, GatewayError>;

    /// Cancel a scheduled email that has not been delivered yet.
    async fn cancel(&self, email_id: &str) -> Result<(), GatewayError>;

    /// Move a scheduled email to a new delivery instant.
    async fn reschedule(
        &self,
        email_id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_request_omits_empty_optionals() {
        let request = SendRequest {
            from: "sender@example.com".to_string(),
            to: vec!["recipient@example.com".to_string()],
            subject: "Hello".to_string(),
            html: Some("<p>Hi</p>".to_string()),
            text: None,
            template: None,
            reply_to: None,
            attachments: Vec::new(),
            scheduled_at: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"html\""));
        assert!(!json.contains("\"text\""));
        assert!(!json.contains("\"attachments\""));
        assert!(!json.contains("\"scheduled_at\""));
    }

    #[test]
    fn test_send_request_deserializes_minimal_body() {
        let json = r#"{
            "from": "sender@example.com",
            "to": ["recipient@example.com"],
            "subject": "Hello"
        }"#;

        let request: SendRequest = serde_json::from_str(json).unwrap();
        assert!(request.attachments.is_empty());
        assert!(request.scheduled_at.is_none());
    }
}
