//! Plugin event bus.
//!
//! The orchestrator emits one event kind today, `privacy_activated`,
//! fired whenever a session's tier is raised, and the host fans it out to
//! UI surfaces. Delivery is fire-and-forget: an event bus with no
//! subscribers drops events silently.

use crate::tier::SensitivityTier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Event name for tier-raising outcomes.
pub const PRIVACY_ACTIVATED: &str = "privacy_activated";

/// A privacy event published to the host.
#[derive(Debug, Clone, Serialize)]
pub struct PrivacyEvent {
    pub event: &'static str,
    pub tier: SensitivityTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub reason: String,
    pub session_key: String,
    pub timestamp: DateTime<Utc>,
}

impl PrivacyEvent {
    pub fn activated(
        tier: SensitivityTier,
        reason: impl Into<String>,
        session_key: impl Into<String>,
    ) -> Self {
        Self {
            event: PRIVACY_ACTIVATED,
            tier,
            provider: None,
            model: None,
            reason: reason.into(),
            session_key: session_key.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.model = Some(model.into());
        self
    }
}

/// Sink for privacy events. The host supplies its own, or subscribes to
/// the broadcast bus below.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PrivacyEvent);
}

/// Broadcast-backed bus; clones of the event go to every live subscriber.
pub struct BroadcastEventBus {
    tx: broadcast::Sender<PrivacyEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PrivacyEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventSink for BroadcastEventBus {
    fn emit(&self, event: &PrivacyEvent) {
        tracing::debug!(
            tier = %event.tier,
            session = %event.session_key,
            "{}: {}",
            event.event,
            event.reason
        );
        // No subscribers is fine.
        let _ = self.tx.send(event.clone());
    }
}
