//! Registry change notifications.
//!
//! Front ends subscribe to a broadcast channel instead of polling. Events
//! are sent after the change they describe is visible in the registry, so a
//! subscriber that reacts by reading a snapshot always sees it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use wled_types::DeviceId;

/// Events emitted by the refresh coordinator.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum RegistryEvent {
    /// A scan reported a device; `new` if it was not known before.
    Discovered {
        id: DeviceId,
        address: String,
        new: bool,
    },
    /// A device was added by address.
    Added { id: DeviceId, address: String },
    /// A refresh task started for a device.
    RefreshStarted { id: DeviceId },
    /// A refresh succeeded.
    Online { id: DeviceId },
    /// A refresh failed; the device keeps its last-known attributes.
    Offline { id: DeviceId, error: String },
    /// A user setting changed (hidden flag or custom name).
    Updated { id: DeviceId },
    /// A device was deleted.
    Removed { id: DeviceId },
    /// A discovery scan started.
    ScanStarted,
    /// A discovery scan finished.
    ScanCompleted { found: usize, new: usize },
    /// A discovery scan could not run.
    ScanFailed { error: String },
}

impl RegistryEvent {
    /// The device this event is about, if any.
    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            Self::Discovered { id, .. }
            | Self::Added { id, .. }
            | Self::RefreshStarted { id }
            | Self::Online { id }
            | Self::Offline { id, .. }
            | Self::Updated { id }
            | Self::Removed { id } => Some(id),
            Self::ScanStarted | Self::ScanCompleted { .. } | Self::ScanFailed { .. } => None,
        }
    }
}

/// Sender for registry events.
pub type EventSender = broadcast::Sender<RegistryEvent>;

/// Receiver for registry events.
pub type EventReceiver = broadcast::Receiver<RegistryEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: RegistryEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> DeviceId {
        DeviceId::new("aabbccddeeff").unwrap()
    }

    #[test]
    fn test_event_serialization() {
        let event = RegistryEvent::Offline {
            id: id(),
            error: "timeout".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"offline\""));
        assert!(json.contains("aabbccddeeff"));

        let back: RegistryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_device_id_accessor() {
        assert_eq!(RegistryEvent::Online { id: id() }.device_id(), Some(&id()));
        assert_eq!(RegistryEvent::ScanStarted.device_id(), None);
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_to_subscribers() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 1);

        dispatcher.send(RegistryEvent::ScanStarted);
        assert_eq!(rx.recv().await.unwrap(), RegistryEvent::ScanStarted);
    }

    #[test]
    fn test_send_without_receivers_is_silent() {
        let dispatcher = EventDispatcher::default();
        dispatcher.send(RegistryEvent::ScanStarted);
        assert_eq!(dispatcher.receiver_count(), 0);
    }
}
