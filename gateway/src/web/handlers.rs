//! HTTP endpoint handlers.
//!
//! Webhook receipt only verifies, applies the delivery transition for
//! tracked scheduled sends, and enqueues; everything else runs behind the
//! queue. The send surface validates locally before the provider is
//! contacted, so incompatible options never cost a network round trip.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::GatewayError;
use crate::provider::{EmailProvider, SendRequest};
use crate::queue::Publisher;
use crate::schedule::{validate_batch, ScheduleStore, ScheduledSend, ScheduledSendController};
use crate::webhook::{SignatureHeaders, WebhookVerifier};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<WebhookVerifier>,
    pub controller: Arc<ScheduledSendController>,
    pub provider: Arc<dyn EmailProvider>,
    pub publisher: Publisher,
}

impl AppState {
    pub fn new(config: Config, provider: Arc<dyn EmailProvider>, publisher: Publisher) -> Self {
        let verifier = WebhookVerifier::new(
            config.webhook_secret.as_deref(),
            config.webhook_tolerance_secs,
        );
        let controller = ScheduledSendController::new(provider.clone(), ScheduleStore::new());

        Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            controller: Arc::new(controller),
            provider,
            publisher,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Error response body.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(error: GatewayError) -> ApiError {
    let status = match &error {
        GatewayError::MissingSecret => StatusCode::INTERNAL_SERVER_ERROR,
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Provider(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Webhook Receipt
// =============================================================================

/// Webhook acknowledgement body.
#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(rename = "type")]
    pub kind: String,
}

fn signature_headers(headers: &HeaderMap) -> SignatureHeaders<'_> {
    SignatureHeaders {
        id: headers.get("svix-id").and_then(|v| v.to_str().ok()),
        timestamp: headers.get("svix-timestamp").and_then(|v| v.to_str().ok()),
        signature: headers.get("svix-signature").and_then(|v| v.to_str().ok()),
    }
}

/// Provider webhook endpoint.
///
/// The body arrives as the raw string so the signature is computed over
/// the exact bytes the provider signed.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<WebhookAck>), ApiError> {
    let signature = signature_headers(&headers);

    let event = state
        .verifier
        .verify(body.as_bytes(), &signature)
        .map_err(|e| {
            warn!(error = %e, body_length = body.len(), "webhook_rejected");
            error_response(e)
        })?;

    info!(
        kind = %event.kind,
        email_id = event.email_id().unwrap_or("unknown"),
        "webhook_verified"
    );

    // Delivery fired for a tracked scheduled send: move it out of Pending
    // before the event goes to the background processor.
    if event.kind.marks_delivery() {
        if let Some(email_id) = event.email_id() {
            state.controller.mark_sent(email_id).await;
        }
    }

    if let Err(e) = state.publisher.publish_event(&event).await {
        error!(error = %e, kind = %event.kind, "event_publish_failed");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "failed to enqueue event".to_string(),
            }),
        ));
    }

    Ok((
        StatusCode::OK,
        Json(WebhookAck {
            received: true,
            kind: event.kind.to_string(),
        }),
    ))
}

// =============================================================================
// Send / Schedule
// =============================================================================

/// Acknowledgement for an accepted email.
#[derive(Serialize)]
pub struct SendAck {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Acknowledgement for an accepted batch.
#[derive(Serialize)]
pub struct BatchAck {
    pub data: Vec<SendAck>,
}

/// Send an email, immediately or deferred when `scheduled_at` is present.
pub async fn send_email(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Result<(StatusCode, Json<SendAck>), ApiError> {
    info!(
        subject = %request.subject,
        recipients = request.to.len(),
        scheduled = request.scheduled_at.is_some(),
        attachments = request.attachments.len(),
        "send_requested"
    );

    if request.scheduled_at.is_some() {
        let send = state
            .controller
            .schedule(&request)
            .await
            .map_err(error_response)?;
        return Ok((
            StatusCode::OK,
            Json(SendAck {
                id: send.id,
                scheduled_at: Some(send.scheduled_at),
            }),
        ));
    }

    let receipt = state
        .provider
        .send(&request)
        .await
        .map_err(error_response)?;

    Ok((
        StatusCode::OK,
        Json(SendAck {
            id: receipt.id,
            scheduled_at: None,
        }),
    ))
}

/// Submit multiple independent emails in one request.
///
/// Batch delivery is incompatible with scheduling and attachments; the
/// combination is rejected here, before the provider sees the request.
pub async fn send_batch(
    State(state): State<AppState>,
    Json(requests): Json<Vec<SendRequest>>,
) -> Result<(StatusCode, Json<BatchAck>), ApiError> {
    info!(count = requests.len(), "batch_send_requested");

    validate_batch(&requests).map_err(error_response)?;

    let receipts = state
        .provider
        .send_batch(&requests)
        .await
        .map_err(error_response)?;

    Ok((
        StatusCode::OK,
        Json(BatchAck {
            data: receipts
                .into_iter()
                .map(|receipt| SendAck {
                    id: receipt.id,
                    scheduled_at: None,
                })
                .collect(),
        }),
    ))
}

// =============================================================================
// Cancel / Update
// =============================================================================

/// Body for moving a scheduled send to a new instant.
#[derive(Deserialize)]
pub struct UpdateScheduleRequest {
    pub scheduled_at: String,
}

/// Cancel a scheduled send.
pub async fn cancel_scheduled(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ScheduledSend>), ApiError> {
    let send = state.controller.cancel(&id).await.map_err(|e| {
        warn!(email_id = %id, error = %e, "cancel_rejected");
        error_response(e)
    })?;

    Ok((StatusCode::OK, Json(send)))
}

/// Move a scheduled send to a new delivery instant.
pub async fn update_scheduled(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduledSend>), ApiError> {
    let send = state
        .controller
        .update(&id, &request.scheduled_at)
        .await
        .map_err(|e| {
            warn!(email_id = %id, error = %e, "update_rejected");
            error_response(e)
        })?;

    Ok((StatusCode::OK, Json(send)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;
    use crate::schedule::ScheduleState;
    use chrono::Duration;

    fn state_with_secret(secret: Option<&str>) -> (AppState, MockProvider) {
        let provider = MockProvider::default();
        let config = Config {
            amqp_url: "amqp://localhost:5672".to_string(),
            port: 0,
            webhook_secret: secret.map(|s| s.to_string()),
            webhook_tolerance_secs: 300,
            provider_api_key: None,
            provider_base_url: "https://api.example.com".to_string(),
            alert_webhook_url: None,
            request_timeout_ms: 1000,
            worker_concurrency: 4,
        };
        let publisher = Publisher::new(config.amqp_url.clone());
        let state = AppState::new(config, Arc::new(provider.clone()), publisher);
        (state, provider)
    }

    fn in_minutes(minutes: i64) -> String {
        (Utc::now() + Duration::minutes(minutes)).to_rfc3339()
    }

    fn request(scheduled_at: Option<String>) -> SendRequest {
        SendRequest {
            from: "sender@example.com".to_string(),
            to: vec!["recipient@example.com".to_string()],
            subject: "Hello".to_string(),
            html: Some("<p>Hi</p>".to_string()),
            text: None,
            template: None,
            reply_to: None,
            attachments: Vec::new(),
            scheduled_at,
        }
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (GatewayError::MissingHeaders, StatusCode::BAD_REQUEST),
            (GatewayError::MissingSecret, StatusCode::INTERNAL_SERVER_ERROR),
            (GatewayError::InvalidSignature, StatusCode::BAD_REQUEST),
            (GatewayError::StaleTimestamp, StatusCode::BAD_REQUEST),
            (
                GatewayError::MalformedPayload("x".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::InvalidScheduleWindow("x".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::IncompatibleOptions("x"),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::NotFound("x".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                GatewayError::Provider("x".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, expected) in cases {
            let (status, _) = error_response(error);
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_signature_headers_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("svix-id", "msg_1".parse().unwrap());
        headers.insert("svix-timestamp", "1700000000".parse().unwrap());

        let extracted = signature_headers(&headers);
        assert_eq!(extracted.id, Some("msg_1"));
        assert_eq!(extracted.timestamp, Some("1700000000"));
        assert_eq!(extracted.signature, None);
    }

    #[tokio::test]
    async fn test_webhook_rejects_missing_headers() {
        let (state, _) = state_with_secret(Some("test-secret"));

        let result = receive_webhook(
            State(state),
            HeaderMap::new(),
            r#"{"type":"email.sent","data":{}}"#.to_string(),
        )
        .await;

        let (status, _) = result.err().unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let (state, _) = state_with_secret(Some("test-secret"));

        let mut headers = HeaderMap::new();
        headers.insert("svix-id", "msg_1".parse().unwrap());
        headers.insert(
            "svix-timestamp",
            Utc::now().timestamp().to_string().parse().unwrap(),
        );
        headers.insert("svix-signature", "v1,bm90LXRoZS1tYWM=".parse().unwrap());

        let result = receive_webhook(
            State(state),
            headers,
            r#"{"type":"email.sent","data":{}}"#.to_string(),
        )
        .await;

        let (status, _) = result.err().unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_missing_secret_is_server_error() {
        let (state, _) = state_with_secret(None);

        let mut headers = HeaderMap::new();
        headers.insert("svix-id", "msg_1".parse().unwrap());
        headers.insert(
            "svix-timestamp",
            Utc::now().timestamp().to_string().parse().unwrap(),
        );
        headers.insert("svix-signature", "v1,AAAA".parse().unwrap());

        let result = receive_webhook(
            State(state),
            headers,
            r#"{"type":"email.sent","data":{}}"#.to_string(),
        )
        .await;

        let (status, _) = result.err().unwrap();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_send_immediate_returns_provider_id() {
        let (state, provider) = state_with_secret(None);

        let (status, Json(ack)) = send_email(State(state), Json(request(None)))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert!(ack.scheduled_at.is_none());
        assert!(!ack.id.is_empty());
        assert_eq!(provider.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_send_scheduled_tracks_pending() {
        let (state, _) = state_with_secret(None);
        let controller = state.controller.clone();

        let (_, Json(ack)) = send_email(
            State(state),
            Json(request(Some(in_minutes(5)))),
        )
        .await
        .unwrap();

        assert!(ack.scheduled_at.is_some());
        let cancelled = controller.cancel(&ack.id).await.unwrap();
        assert_eq!(cancelled.state, ScheduleState::Cancelled);
    }

    #[tokio::test]
    async fn test_send_scheduled_past_is_rejected() {
        let (state, provider) = state_with_secret(None);

        let result = send_email(
            State(state),
            Json(request(Some(in_minutes(-1)))),
        )
        .await;

        let (status, _) = result.err().unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(provider.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_with_scheduling_is_rejected() {
        let (state, provider) = state_with_secret(None);

        let result = send_batch(
            State(state),
            Json(vec![request(None), request(Some(in_minutes(5)))]),
        )
        .await;

        let (status, _) = result.err().unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(provider.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_accepts_plain_sends() {
        let (state, provider) = state_with_secret(None);

        let (status, Json(ack)) = send_batch(
            State(state),
            Json(vec![request(None), request(None)]),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack.data.len(), 2);
        assert_eq!(provider.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_unknown_is_not_found() {
        let (state, _) = state_with_secret(None);

        let result = cancel_scheduled(State(state), Path("no-such-id".to_string())).await;

        let (status, _) = result.err().unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_moves_schedule() {
        let (state, _) = state_with_secret(None);

        let (_, Json(ack)) = send_email(
            State(state.clone()),
            Json(request(Some(in_minutes(5)))),
        )
        .await
        .unwrap();

        let (status, Json(updated)) = update_scheduled(
            State(state),
            Path(ack.id.clone()),
            Json(UpdateScheduleRequest {
                scheduled_at: in_minutes(120),
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated.state, ScheduleState::Pending);
        assert!(Some(updated.scheduled_at) > ack.scheduled_at);
    }
}
