//! Event bus for broadcasting supervisor events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]:
//! [`Bus::publish`] never blocks and silently drops events when nobody is
//! subscribed, [`Bus::subscribe`] creates an independent receiver. Slow
//! subscribers observe a lag error from the broadcast channel rather than
//! back-pressuring the supervisor loop.

use tokio::sync::broadcast;

use super::Event;

/// Broadcast channel for supervisor events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all subscribers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Subscribes to the bus and returns a new receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
