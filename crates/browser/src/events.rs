//! Event Bus - Simple event system for session events
//!
//! Design: Type-safe events over a broadcast channel.
//! No dynamic dispatch overhead - use enums, not trait objects.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Session events that can be dispatched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowserEvent {
    Started,
    Stopped,
    NavigationStarted { url: String },
    NavigationComplete { url: String, title: String },
    NavigationFailed { url: String, reason: String },
    CollaboratorJoined { address: String },
    CollaboratorLeft { address: String, reason: String },
    PageReceived { url: String, title: String },
    SessionEnded { reason: String },
}

/// Simple event bus using tokio broadcast channel
pub struct EventBus {
    tx: broadcast::Sender<BrowserEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish an event
    pub fn publish(&self, event: BrowserEvent) {
        let _ = self.tx.send(event); // Ignore error if no subscribers
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<BrowserEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(BrowserEvent::Started);
        bus.publish(BrowserEvent::NavigationStarted {
            url: "http://a.test/".to_string(),
        });

        match rx.recv().await {
            Ok(BrowserEvent::Started) => {}
            _ => panic!("Expected Started event"),
        }
        assert_eq!(
            rx.recv().await.unwrap(),
            BrowserEvent::NavigationStarted {
                url: "http://a.test/".to_string()
            }
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        EventBus::new().publish(BrowserEvent::Stopped);
    }
}
