//! Scheduled send lifecycle.
//!
//! Deferred delivery follows a strict temporal contract: the instant must
//! lie strictly in the future and at most [`MAX_SCHEDULE_DAYS`] days ahead,
//! evaluated at call time. The 7-day boundary is inclusive. Scheduling is
//! mutually exclusive with attachments and with batch delivery, and both
//! combinations are rejected locally before the provider is contacted.

pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::provider::{EmailProvider, SendRequest};

pub use store::{ScheduleState, ScheduleStore, ScheduledSend};

/// Maximum days a send may be deferred. The boundary is inclusive.
pub const MAX_SCHEDULE_DAYS: i64 = 7;

/// Parse and validate a `scheduled_at` value against the schedule window.
///
/// Accepts `now < scheduled_at <= now + 7 days`. An unparseable value is
/// an invalid window too; the temporal contract cannot be evaluated for it.
pub fn validate_schedule_window(
    raw: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, GatewayError> {
    let scheduled_at = DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| {
            GatewayError::InvalidScheduleWindow(format!("not a valid ISO-8601 instant: {}", raw))
        })?;

    if scheduled_at <= now {
        return Err(GatewayError::InvalidScheduleWindow(format!(
            "{} is not in the future",
            raw
        )));
    }

    if scheduled_at > now + Duration::days(MAX_SCHEDULE_DAYS) {
        return Err(GatewayError::InvalidScheduleWindow(format!(
            "{} is more than {} days ahead",
            raw, MAX_SCHEDULE_DAYS
        )));
    }

    Ok(scheduled_at)
}

/// Reject batch submissions that carry per-email options incompatible with
/// batch delivery. Checked before any provider call.
pub fn validate_batch(requests: &[SendRequest]) -> Result<(), GatewayError> {
    for request in requests {
        if request.scheduled_at.is_some() {
            return Err(GatewayError::IncompatibleOptions(
                "batch delivery cannot be combined with scheduling",
            ));
        }
        if !request.attachments.is_empty() {
            return Err(GatewayError::IncompatibleOptions(
                "batch delivery cannot be combined with attachments",
            ));
        }
    }
    Ok(())
}

/// Enforces the temporal and mutual-exclusion rules for deferred delivery.
///
/// Stateless per call apart from the shared registry; safe to invoke from
/// concurrent handlers. Conflicting calls on one id serialize on the
/// registry's write lock, last writer wins, and a call that loses to a
/// terminal transition observes the terminal state.
pub struct ScheduledSendController {
    provider: Arc<dyn EmailProvider>,
    store: ScheduleStore,
}

impl ScheduledSendController {
    pub fn new(provider: Arc<dyn EmailProvider>, store: ScheduleStore) -> Self {
        Self { provider, store }
    }

    /// Accept a deferred send.
    ///
    /// Validates options and the schedule window, forwards to the
    /// provider, and records the accepted send as `Pending` under the
    /// provider-assigned id. Validation failures leave no side effects.
    pub async fn schedule(&self, request: &SendRequest) -> Result<ScheduledSend, GatewayError> {
        let raw = request.scheduled_at.as_deref().ok_or_else(|| {
            GatewayError::InvalidScheduleWindow("scheduled_at is required".to_string())
        })?;

        if !request.attachments.is_empty() {
            return Err(GatewayError::IncompatibleOptions(
                "scheduling cannot be combined with attachments",
            ));
        }

        let scheduled_at = validate_schedule_window(raw, Utc::now())?;

        let receipt = self.provider.send(request).await?;
        let send = self.store.insert_pending(&receipt.id, scheduled_at).await;

        info!(
            email_id = %send.id,
            scheduled_at = %send.scheduled_at.to_rfc3339(),
            "schedule_accepted"
        );
        Ok(send)
    }

    /// Cancel a pending send.
    ///
    /// Cancelling an already-cancelled send is a no-op success, so
    /// operational tooling can re-run safely. A send that was already
    /// delivered, or an unknown id, is `NotFound`.
    pub async fn cancel(&self, id: &str) -> Result<ScheduledSend, GatewayError> {
        match self.store.get(id).await {
            None => Err(GatewayError::NotFound(id.to_string())),
            Some(send) if send.state == ScheduleState::Sent => {
                Err(GatewayError::NotFound(id.to_string()))
            }
            Some(send) if send.state == ScheduleState::Cancelled => {
                debug!(email_id = %id, "cancel_noop_already_cancelled");
                Ok(send)
            }
            Some(_) => {
                self.provider.cancel(id).await?;
                // Re-check under the write lock: delivery may have fired
                // between the read and the provider call.
                let cancelled = self
                    .store
                    .mark_cancelled(id)
                    .await
                    .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
                info!(email_id = %id, "schedule_cancelled");
                Ok(cancelled)
            }
        }
    }

    /// Move a pending send to a new delivery instant.
    ///
    /// Window validation matches [`ScheduledSendController::schedule`];
    /// terminal and unknown ids are `NotFound`. State stays `Pending`.
    pub async fn update(&self, id: &str, raw: &str) -> Result<ScheduledSend, GatewayError> {
        let scheduled_at = validate_schedule_window(raw, Utc::now())?;

        match self.store.get(id).await {
            Some(send) if send.state == ScheduleState::Pending => {
                self.provider.reschedule(id, scheduled_at).await?;
                let updated = self
                    .store
                    .reschedule(id, scheduled_at)
                    .await
                    .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
                info!(
                    email_id = %id,
                    scheduled_at = %scheduled_at.to_rfc3339(),
                    "schedule_updated"
                );
                Ok(updated)
            }
            _ => Err(GatewayError::NotFound(id.to_string())),
        }
    }

    /// Record that delivery fired for a tracked id.
    ///
    /// Driven by verified `email.sent` / `email.delivered` events; the
    /// controller never decides the delivery moment itself. Untracked ids
    /// and terminal entries are ignored.
    pub async fn mark_sent(&self, id: &str) -> Option<ScheduledSend> {
        let marked = self.store.mark_sent(id).await;
        match &marked {
            Some(send) => info!(email_id = %send.id, "schedule_delivery_recorded"),
            None => debug!(email_id = %id, "delivery_event_for_untracked_id"),
        }
        marked
    }
}
