//! Operation lifecycle events
//!
//! A `Queued` outcome tells the caller that completion is deferred. These
//! events let it reconcile that outcome once the processor gets to the
//! operation.

use chrono::{DateTime, Utc};
use fieldsync_domain::OperationId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Default buffer size for slow subscribers before they start lagging
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationEvent {
    Queued { id: OperationId, kind: String },
    Completed { id: OperationId, kind: String, output: Value },
    RetryScheduled {
        id: OperationId,
        kind: String,
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
        error: String,
    },
    PermanentlyFailed { id: OperationId, kind: String, error: String },
    Cancelled { id: OperationId },
    Acknowledged { id: OperationId },
}

impl OperationEvent {
    pub fn id(&self) -> &OperationId {
        match self {
            Self::Queued { id, .. }
            | Self::Completed { id, .. }
            | Self::RetryScheduled { id, .. }
            | Self::PermanentlyFailed { id, .. }
            | Self::Cancelled { id }
            | Self::Acknowledged { id } => id,
        }
    }

    /// True for events after which the operation is no longer retried
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. }
                | Self::PermanentlyFailed { .. }
                | Self::Cancelled { .. }
                | Self::Acknowledged { .. }
        )
    }
}

/// Broadcast channel shared by the gateway and the processor
#[derive(Debug, Clone)]
pub struct OperationEvents {
    sender: broadcast::Sender<OperationEvent>,
}

impl Default for OperationEvents {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl OperationEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers; nobody listening is fine
    pub fn emit(&self, event: OperationEvent) {
        if self.sender.send(event).is_err() {
            trace!("No operation event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let events = OperationEvents::default();
        let mut rx = events.subscribe();

        events.emit(OperationEvent::Cancelled { id: OperationId::from("a") });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.id().as_str(), "a");
        assert!(event.is_terminal());
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let events = OperationEvents::new(0);
        events.emit(OperationEvent::Queued { id: OperationId::from("a"), kind: "save".into() });
    }

    #[test]
    fn test_event_wire_format() {
        let event = OperationEvent::PermanentlyFailed {
            id: OperationId::from("a"),
            kind: "save".into(),
            error: "boom".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "permanently_failed");
        assert!(!OperationEvent::Queued { id: OperationId::from("a"), kind: "save".into() }
            .is_terminal());
    }
}
