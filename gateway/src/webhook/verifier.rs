//! Webhook signature verification.
//!
//! The provider signs each delivery with HMAC-SHA256 over
//! `{id}.{timestamp}.{payload}` and sends the MAC base64-encoded in the
//! `svix-signature` header, tagged with a version prefix. The signature is
//! computed over the exact body bytes, so verification must happen before
//! any re-serialization.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::error::GatewayError;
use crate::webhook::events::WebhookEvent;

type HmacSha256 = Hmac<Sha256>;

/// Signature version this gateway understands.
const SIGNATURE_VERSION: &str = "v1";

/// The three signature headers of a webhook delivery, as extracted from
/// the request. Absent headers stay `None` so the precondition check can
/// report them before any cryptographic work.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureHeaders<'a> {
    /// `svix-id`: opaque delivery identifier
    pub id: Option<&'a str>,
    /// `svix-timestamp`: sender-supplied Unix time in seconds
    pub timestamp: Option<&'a str>,
    /// `svix-signature`: space-separated, version-tagged MAC candidates
    pub signature: Option<&'a str>,
}

impl<'a> SignatureHeaders<'a> {
    fn require(&self) -> Result<(&'a str, &'a str, &'a str), GatewayError> {
        match (self.id, self.timestamp, self.signature) {
            (Some(id), Some(timestamp), Some(signature)) => Ok((id, timestamp, signature)),
            _ => Err(GatewayError::MissingHeaders),
        }
    }
}

/// Verifies inbound webhook deliveries and decodes them into typed events.
///
/// Verification is pure: nothing is dispatched, logged as handled, or
/// otherwise acted on until the headers, the replay window, and the MAC
/// all check out.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<Vec<u8>>,
    tolerance_secs: u64,
}

impl WebhookVerifier {
    /// Create a verifier from the configured signing secret.
    ///
    /// The secret is provisioned out-of-band, usually base64 with a
    /// `whsec_` prefix. A missing secret still yields a verifier so the
    /// header precondition can run first; verification then fails with
    /// `MissingSecret`.
    pub fn new(secret: Option<&str>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.map(decode_secret),
            tolerance_secs,
        }
    }

    /// Verify a delivery and decode it into a [`WebhookEvent`].
    ///
    /// `payload` must be the unmodified request body bytes.
    pub fn verify(
        &self,
        payload: &[u8],
        headers: &SignatureHeaders<'_>,
    ) -> Result<WebhookEvent, GatewayError> {
        // Preconditions short-circuit before any MAC is computed.
        let (id, timestamp, signature) = headers.require()?;
        let secret = self.secret.as_deref().ok_or(GatewayError::MissingSecret)?;

        let received_at = self.check_timestamp(timestamp)?;

        // MAC over the exact bytes: {id}.{timestamp}.{payload}
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| GatewayError::InvalidSignature)?;
        mac.update(id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = BASE64.encode(mac.finalize().into_bytes());

        // The header may carry several candidates; each is "<version>,<mac>".
        // Any matching v1 candidate accepts the delivery.
        let matched = signature
            .split_whitespace()
            .filter_map(|candidate| candidate.split_once(','))
            .filter(|(version, _)| *version == SIGNATURE_VERSION)
            .any(|(_, mac)| constant_time_eq(expected.as_bytes(), mac.as_bytes()));

        if !matched {
            warn!(
                delivery_id = %id,
                candidate_count = signature.split_whitespace().count(),
                "webhook_signature_mismatch"
            );
            return Err(GatewayError::InvalidSignature);
        }

        WebhookEvent::decode(payload, received_at)
    }

    /// Reject timestamps outside the replay window.
    ///
    /// Skew is checked in both directions, so a delivery "from the future"
    /// is treated the same as a stale one.
    fn check_timestamp(&self, timestamp: &str) -> Result<DateTime<Utc>, GatewayError> {
        let webhook_time: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| GatewayError::StaleTimestamp)?;

        let now = Utc::now().timestamp();
        let skew = (now - webhook_time).unsigned_abs();
        if skew > self.tolerance_secs {
            warn!(
                webhook_time = webhook_time,
                skew_seconds = skew,
                tolerance_seconds = self.tolerance_secs,
                "webhook_timestamp_outside_tolerance"
            );
            return Err(GatewayError::StaleTimestamp);
        }

        DateTime::from_timestamp(webhook_time, 0).ok_or(GatewayError::StaleTimestamp)
    }
}

/// Decode a signing secret: strip the `whsec_` prefix and base64-decode,
/// falling back to the raw bytes for secrets provisioned unencoded.
fn decode_secret(secret: &str) -> Vec<u8> {
    let trimmed = secret.strip_prefix("whsec_").unwrap_or(secret);
    BASE64
        .decode(trimmed)
        .unwrap_or_else(|_| trimmed.as_bytes().to_vec())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::events::EventKind;

    // Contains '-', so the base64 fallback keeps it as raw bytes.
    const SECRET: &str = "test-signing-secret";
    const PAYLOAD: &[u8] = br#"{"type":"email.bounced","data":{"email_id":"abc123"}}"#;

    fn sign(key: &[u8], id: &str, timestamp: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(key).unwrap();
        mac.update(id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("v1,{}", BASE64.encode(mac.finalize().into_bytes()))
    }

    fn now_str() -> String {
        Utc::now().timestamp().to_string()
    }

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(Some(SECRET), 300)
    }

    #[test]
    fn test_verify_valid_delivery() {
        let timestamp = now_str();
        let signature = sign(SECRET.as_bytes(), "msg_1", &timestamp, PAYLOAD);
        let headers = SignatureHeaders {
            id: Some("msg_1"),
            timestamp: Some(&timestamp),
            signature: Some(&signature),
        };

        let event = verifier().verify(PAYLOAD, &headers).unwrap();

        assert_eq!(event.kind, EventKind::Bounced);
        assert_eq!(event.email_id(), Some("abc123"));
    }

    #[test]
    fn test_verify_received_at_comes_from_header() {
        let timestamp = now_str();
        let signature = sign(SECRET.as_bytes(), "msg_1", &timestamp, PAYLOAD);
        let headers = SignatureHeaders {
            id: Some("msg_1"),
            timestamp: Some(&timestamp),
            signature: Some(&signature),
        };

        let event = verifier().verify(PAYLOAD, &headers).unwrap();

        assert_eq!(
            event.received_at.timestamp().to_string(),
            timestamp,
        );
    }

    #[test]
    fn test_verify_missing_headers() {
        let timestamp = now_str();
        let signature = sign(SECRET.as_bytes(), "msg_1", &timestamp, PAYLOAD);

        let cases = [
            SignatureHeaders {
                id: None,
                timestamp: Some(&timestamp),
                signature: Some(&signature),
            },
            SignatureHeaders {
                id: Some("msg_1"),
                timestamp: None,
                signature: Some(&signature),
            },
            SignatureHeaders {
                id: Some("msg_1"),
                timestamp: Some(&timestamp),
                signature: None,
            },
        ];

        for headers in cases {
            let result = verifier().verify(PAYLOAD, &headers);
            assert!(matches!(result, Err(GatewayError::MissingHeaders)));
        }
    }

    #[test]
    fn test_verify_missing_secret() {
        let timestamp = now_str();
        let signature = sign(SECRET.as_bytes(), "msg_1", &timestamp, PAYLOAD);
        let headers = SignatureHeaders {
            id: Some("msg_1"),
            timestamp: Some(&timestamp),
            signature: Some(&signature),
        };

        let result = WebhookVerifier::new(None, 300).verify(PAYLOAD, &headers);

        assert!(matches!(result, Err(GatewayError::MissingSecret)));
    }

    #[test]
    fn test_verify_missing_headers_reported_before_missing_secret() {
        let headers = SignatureHeaders::default();
        let result = WebhookVerifier::new(None, 300).verify(PAYLOAD, &headers);
        assert!(matches!(result, Err(GatewayError::MissingHeaders)));
    }

    #[test]
    fn test_verify_tampered_signature() {
        let timestamp = now_str();
        let mut signature = sign(SECRET.as_bytes(), "msg_1", &timestamp, PAYLOAD);
        // Flip one character of the MAC.
        let last = signature.pop().unwrap();
        signature.push(if last == 'A' { 'B' } else { 'A' });

        let headers = SignatureHeaders {
            id: Some("msg_1"),
            timestamp: Some(&timestamp),
            signature: Some(&signature),
        };

        let result = verifier().verify(PAYLOAD, &headers);
        assert!(matches!(result, Err(GatewayError::InvalidSignature)));
    }

    #[test]
    fn test_verify_tampered_payload() {
        let timestamp = now_str();
        let signature = sign(SECRET.as_bytes(), "msg_1", &timestamp, PAYLOAD);
        let headers = SignatureHeaders {
            id: Some("msg_1"),
            timestamp: Some(&timestamp),
            signature: Some(&signature),
        };

        let tampered = br#"{"type":"email.bounced","data":{"email_id":"abc124"}}"#;
        let result = verifier().verify(tampered, &headers);
        assert!(matches!(result, Err(GatewayError::InvalidSignature)));
    }

    #[test]
    fn test_verify_any_candidate_matches() {
        let timestamp = now_str();
        let valid = sign(SECRET.as_bytes(), "msg_1", &timestamp, PAYLOAD);
        let header_value = format!("v1,bm90LXRoZS1tYWM= {} v2,AAAA", valid);
        let headers = SignatureHeaders {
            id: Some("msg_1"),
            timestamp: Some(&timestamp),
            signature: Some(&header_value),
        };

        assert!(verifier().verify(PAYLOAD, &headers).is_ok());
    }

    #[test]
    fn test_verify_other_version_tags_ignored() {
        let timestamp = now_str();
        // Correct MAC but tagged with an unsupported version.
        let signature = sign(SECRET.as_bytes(), "msg_1", &timestamp, PAYLOAD)
            .replacen("v1,", "v2,", 1);
        let headers = SignatureHeaders {
            id: Some("msg_1"),
            timestamp: Some(&timestamp),
            signature: Some(&signature),
        };

        let result = verifier().verify(PAYLOAD, &headers);
        assert!(matches!(result, Err(GatewayError::InvalidSignature)));
    }

    #[test]
    fn test_verify_stale_timestamp() {
        let stale = (Utc::now().timestamp() - 301).to_string();
        let signature = sign(SECRET.as_bytes(), "msg_1", &stale, PAYLOAD);
        let headers = SignatureHeaders {
            id: Some("msg_1"),
            timestamp: Some(&stale),
            signature: Some(&signature),
        };

        let result = verifier().verify(PAYLOAD, &headers);
        assert!(matches!(result, Err(GatewayError::StaleTimestamp)));
    }

    #[test]
    fn test_verify_future_timestamp() {
        let future = (Utc::now().timestamp() + 301).to_string();
        let signature = sign(SECRET.as_bytes(), "msg_1", &future, PAYLOAD);
        let headers = SignatureHeaders {
            id: Some("msg_1"),
            timestamp: Some(&future),
            signature: Some(&signature),
        };

        let result = verifier().verify(PAYLOAD, &headers);
        assert!(matches!(result, Err(GatewayError::StaleTimestamp)));
    }

    #[test]
    fn test_verify_unparseable_timestamp() {
        let headers = SignatureHeaders {
            id: Some("msg_1"),
            timestamp: Some("not-a-number"),
            signature: Some("v1,AAAA"),
        };

        let result = verifier().verify(PAYLOAD, &headers);
        assert!(matches!(result, Err(GatewayError::StaleTimestamp)));
    }

    #[test]
    fn test_verify_malformed_payload_after_valid_signature() {
        let timestamp = now_str();
        let body = b"not json";
        let signature = sign(SECRET.as_bytes(), "msg_1", &timestamp, body);
        let headers = SignatureHeaders {
            id: Some("msg_1"),
            timestamp: Some(&timestamp),
            signature: Some(&signature),
        };

        let result = verifier().verify(body, &headers);
        assert!(matches!(result, Err(GatewayError::MalformedPayload(_))));
    }

    #[test]
    fn test_base64_secret_with_prefix() {
        let raw_key = b"super-secret-key";
        let encoded = format!("whsec_{}", BASE64.encode(raw_key));
        let verifier = WebhookVerifier::new(Some(&encoded), 300);

        let timestamp = now_str();
        let signature = sign(raw_key, "msg_1", &timestamp, PAYLOAD);
        let headers = SignatureHeaders {
            id: Some("msg_1"),
            timestamp: Some(&timestamp),
            signature: Some(&signature),
        };

        assert!(verifier.verify(PAYLOAD, &headers).is_ok());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
