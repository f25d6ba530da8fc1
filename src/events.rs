//! Lifecycle events
//!
//! The runtime reports registry changes and module transitions through an
//! [`EventPublisher`]. Publishing is fire-and-forget: the runtime never
//! waits on subscribers. [`EventBus`] is the default publisher, built on a
//! `tokio::sync::broadcast` channel so a slow subscriber only loses events,
//! it never stalls a worker.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::command::ModuleStatus;

/// Default broadcast buffer size for [`EventBus`].
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The index was rebuilt from discovery.
    PluginsReloaded { count: usize },
    /// Plugins were registered manually.
    PluginsAdded { identities: Vec<String> },
    /// Plugins were unregistered manually.
    PluginsRemoved { identities: Vec<String> },
    /// Metadata of a command descriptor changed.
    ModulesUpdated { identity: String },
    /// A module moved to a new lifecycle state.
    ModuleStatusChanged {
        module_id: Uuid,
        identity: String,
        status: ModuleStatus,
    },
    /// A module was canceled during preprocessing.
    ModuleCanceled {
        module_id: Uuid,
        identity: String,
        reason: String,
    },
    /// A module's command body failed.
    ModuleFailed {
        module_id: Uuid,
        identity: String,
        error: String,
    },
}

/// A timestamped lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl RuntimeEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

impl From<EventKind> for RuntimeEvent {
    fn from(kind: EventKind) -> Self {
        Self::new(kind)
    }
}

/// Receives lifecycle events. Implementations must not block.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: RuntimeEvent);
}

/// Publisher that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: RuntimeEvent) {}
}

/// Broadcast-backed publisher with any number of subscribers.
///
/// # Example
///
/// ```rust
/// use modrun::events::{EventBus, EventKind, EventPublisher};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
/// bus.publish(EventKind::PluginsReloaded { count: 3 }.into());
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.kind, EventKind::PluginsReloaded { count: 3 });
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RuntimeEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: RuntimeEvent) {
        // No subscribers is not an error.
        if self.sender.send(event).is_err() {
            tracing::trace!("Event dropped: no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_without_subscribers_does_not_fail() {
        let bus = EventBus::default();
        bus.publish(EventKind::PluginsReloaded { count: 0 }.into());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_bus_delivers_to_all_subscribers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(
            EventKind::PluginsAdded {
                identities: vec!["demo.Sum".to_string()],
            }
            .into(),
        );

        let ea = a.recv().await.unwrap();
        let eb = b.recv().await.unwrap();
        assert_eq!(ea.kind, eb.kind);
        assert!(matches!(ea.kind, EventKind::PluginsAdded { .. }));
    }

    #[test]
    fn test_slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for count in 0..5 {
            bus.publish(EventKind::PluginsReloaded { count }.into());
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = RuntimeEvent::new(EventKind::ModuleCanceled {
            module_id: Uuid::nil(),
            identity: "demo.Delay".to_string(),
            reason: "user abort".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "module_canceled");
        assert_eq!(json["reason"], "user abort");
        assert!(json["timestamp"].is_string());
    }
}
