//! In-memory registry of scheduled sends.
//!
//! The provider remains the source of truth for delivery; this registry
//! tracks the lifecycle the gateway has observed so terminal states are
//! enforced locally. All transitions happen under the write lock, so
//! concurrent conflicting calls serialize and the last writer wins.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Lifecycle state of a scheduled send.
///
/// `Sent` and `Cancelled` are terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    Pending,
    Sent,
    Cancelled,
}

impl std::fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleState::Pending => f.write_str("pending"),
            ScheduleState::Sent => f.write_str("sent"),
            ScheduleState::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A deferred email the gateway has accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledSend {
    /// Provider-assigned opaque identifier
    pub id: String,
    /// Instant the provider will deliver at
    pub scheduled_at: DateTime<Utc>,
    /// Current lifecycle state
    pub state: ScheduleState,
}

/// Clone-shared map of scheduled sends keyed by provider id.
#[derive(Clone, Default)]
pub struct ScheduleStore {
    inner: Arc<RwLock<HashMap<String, ScheduledSend>>>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly accepted send as `Pending`.
    pub async fn insert_pending(
        &self,
        id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> ScheduledSend {
        let send = ScheduledSend {
            id: id.to_string(),
            scheduled_at,
            state: ScheduleState::Pending,
        };
        self.inner
            .write()
            .await
            .insert(id.to_string(), send.clone());
        send
    }

    /// Snapshot of a tracked send.
    pub async fn get(&self, id: &str) -> Option<ScheduledSend> {
        self.inner.read().await.get(id).cloned()
    }

    /// Transition `Pending -> Cancelled`.
    ///
    /// Returns the resulting entry; an already-`Cancelled` entry is
    /// returned unchanged so cancellation stays idempotent. `None` means
    /// the id is untracked or already `Sent`.
    pub async fn mark_cancelled(&self, id: &str) -> Option<ScheduledSend> {
        let mut entries = self.inner.write().await;
        let send = entries.get_mut(id)?;
        match send.state {
            ScheduleState::Pending => {
                send.state = ScheduleState::Cancelled;
                Some(send.clone())
            }
            ScheduleState::Cancelled => Some(send.clone()),
            ScheduleState::Sent => None,
        }
    }

    /// Transition `Pending -> Sent`, applied when a delivery event for a
    /// tracked id arrives. Terminal entries are left untouched.
    pub async fn mark_sent(&self, id: &str) -> Option<ScheduledSend> {
        let mut entries = self.inner.write().await;
        let send = entries.get_mut(id)?;
        match send.state {
            ScheduleState::Pending => {
                send.state = ScheduleState::Sent;
                Some(send.clone())
            }
            _ => None,
        }
    }

    /// Record a new delivery instant for a still-`Pending` send.
    pub async fn reschedule(
        &self,
        id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Option<ScheduledSend> {
        let mut entries = self.inner.write().await;
        let send = entries.get_mut(id)?;
        match send.state {
            ScheduleState::Pending => {
                send.scheduled_at = scheduled_at;
                Some(send.clone())
            }
            _ => None,
        }
    }
}
