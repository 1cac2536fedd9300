//! Sync lifecycle events.
//!
//! The coordinator emits events for UI collaborators (progress indicators,
//! conflict inboxes). Subscribers receive every event emitted after they
//! subscribe; disconnected subscribers are pruned on the next emit.

use crate::stats::SyncStats;
use parking_lot::RwLock;
use tasknest_sync_protocol::ConflictRecord;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A sync lifecycle event.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A sync cycle started.
    Started,
    /// Progress within the current cycle.
    Progress {
        /// Completed units.
        current: usize,
        /// Total units in the phase.
        total: usize,
        /// Human-readable phase description.
        message: String,
    },
    /// A conflict was detected.
    Conflict(ConflictRecord),
    /// A sync cycle completed.
    Completed(SyncStats),
    /// A sync cycle failed.
    Failed(String),
}

/// Distributes sync events to subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<UnboundedSender<SyncEvent>>>,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event to every live subscriber.
    pub fn emit(&self, event: SyncEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(SyncEvent::Started);

        assert!(matches!(rx.try_recv().unwrap(), SyncEvent::Started));
    }

    #[test]
    fn multiple_subscribers_each_receive() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(SyncEvent::Progress {
            current: 1,
            total: 3,
            message: "pushing".into(),
        });

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(rx);
        bus.emit(SyncEvent::Started);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
