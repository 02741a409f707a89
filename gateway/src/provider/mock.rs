//! In-memory fake provider for tests and local runs without an API key.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::GatewayError;

use super::{EmailProvider, SendReceipt, SendRequest};

/// Records every call and hands out generated ids, so tests can assert on
/// what reached the provider without any network.
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    sent: Vec<SendRequest>,
    cancelled: Vec<String>,
    rescheduled: Vec<(String, DateTime<Utc>)>,
    missing: HashSet<String>,
    fail_message: Option<String>,
}

impl MockProvider {
    /// All send requests received so far, batch entries included.
    pub async fn sent(&self) -> Vec<SendRequest> {
        self.state.lock().await.sent.clone()
    }

    /// Ids passed to `cancel`.
    pub async fn cancelled(&self) -> Vec<String> {
        self.state.lock().await.cancelled.clone()
    }

    /// Reschedule calls received so far.
    pub async fn rescheduled(&self) -> Vec<(String, DateTime<Utc>)> {
        self.state.lock().await.rescheduled.clone()
    }

    /// Make cancel/reschedule report this id as unknown, like a provider 404.
    pub async fn mark_missing(&self, email_id: &str) {
        self.state.lock().await.missing.insert(email_id.to_string());
    }

    /// Make every following call fail with a provider error.
    pub async fn fail_with(&self, message: &str) {
        self.state.lock().await.fail_message = Some(message.to_string());
    }

    async fn check_failure(&self) -> Result<(), GatewayError> {
        match &self.state.lock().await.fail_message {
            Some(message) => Err(GatewayError::Provider(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EmailProvider for MockProvider {
    async fn send(&self, request: &SendRequest) -> Result<SendReceipt, GatewayError> {
        self.check_failure().await?;
        let id = Uuid::new_v4().to_string();
        self.state.lock().await.sent.push(request.clone());
        Ok(SendReceipt { id })
    }

    async fn send_batch(&self, requests: &[SendRequest]) -> Result<Vec<SendReceipt>, GatewayError> {
        self.check_failure().await?;
        let mut state = self.state.lock().await;
        let mut receipts = Vec::with_capacity(requests.len());
        for request in requests {
            state.sent.push(request.clone());
            receipts.push(SendReceipt {
                id: Uuid::new_v4().to_string(),
            });
        }
        Ok(receipts)
    }

    async fn cancel(&self, email_id: &str) -> Result<(), GatewayError> {
        self.check_failure().await?;
        let mut state = self.state.lock().await;
        if state.missing.contains(email_id) {
            return Err(GatewayError::NotFound(email_id.to_string()));
        }
        state.cancelled.push(email_id.to_string());
        Ok(())
    }

    async fn reschedule(
        &self,
        email_id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        self.check_failure().await?;
        let mut state = self.state.lock().await;
        if state.missing.contains(email_id) {
            return Err(GatewayError::NotFound(email_id.to_string()));
        }
        state.rescheduled.push((email_id.to_string(), scheduled_at));
        Ok(())
    }
}
