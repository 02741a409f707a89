//! HTTP client for the upstream email provider API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::error::GatewayError;

use super::{EmailProvider, SendReceipt, SendRequest};

/// reqwest-backed [`EmailProvider`] talking to the provider REST API.
pub struct HttpEmailProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Deserialize)]
struct BatchResponse {
    data: Vec<SendResponse>,
}

#[derive(Serialize)]
struct RescheduleBody {
    scheduled_at: String,
}

impl HttpEmailProvider {
    /// Create a provider client.
    ///
    /// `base_url` must parse as an absolute URL; a trailing slash is
    /// tolerated.
    pub fn new(base_url: &str, api_key: &str, timeout_ms: u64) -> Result<Self, GatewayError> {
        Url::parse(base_url)
            .map_err(|e| GatewayError::Provider(format!("invalid provider base URL: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| GatewayError::Provider(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Map a non-success provider response to a gateway error.
    async fn error_for(response: Response, email_id: Option<&str>) -> GatewayError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return GatewayError::NotFound(email_id.unwrap_or("unknown").to_string());
        }

        let body = response.text().await.unwrap_or_default();
        let preview = body.get(..200).unwrap_or(&body);
        GatewayError::Provider(format!("provider returned {}: {}", status, preview))
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send(&self, request: &SendRequest) -> Result<SendReceipt, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("emails"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, None).await);
        }

        let accepted: SendResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        info!(email_id = %accepted.id, "provider_send_accepted");
        Ok(SendReceipt { id: accepted.id })
    }

    async fn send_batch(&self, requests: &[SendRequest]) -> Result<Vec<SendReceipt>, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("emails/batch"))
            .bearer_auth(&self.api_key)
            .json(requests)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, None).await);
        }

        let accepted: BatchResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        info!(count = accepted.data.len(), "provider_batch_accepted");
        Ok(accepted
            .data
            .into_iter()
            .map(|entry| SendReceipt { id: entry.id })
            .collect())
    }

    async fn cancel(&self, email_id: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.endpoint(&format!("emails/{}/cancel", email_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, Some(email_id)).await);
        }

        info!(email_id = %email_id, "provider_cancel_accepted");
        Ok(())
    }

    async fn reschedule(
        &self,
        email_id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let body = RescheduleBody {
            scheduled_at: scheduled_at.to_rfc3339(),
        };

        let response = self
            .client
            .patch(self.endpoint(&format!("emails/{}", email_id)))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, Some(email_id)).await);
        }

        info!(
            email_id = %email_id,
            scheduled_at = %body.scheduled_at,
            "provider_reschedule_accepted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let result = HttpEmailProvider::new("not a url", "key", 1000);
        assert!(matches!(result, Err(GatewayError::Provider(_))));
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let provider = HttpEmailProvider::new("https://api.example.com/", "key", 1000).unwrap();
        assert_eq!(
            provider.endpoint("emails/batch"),
            "https://api.example.com/emails/batch"
        );
    }
}
