//! # Latched single-slot event notification.
//!
//! An [`EventNotifier`] lets a producer that generates many events wake a
//! consumer without queueing them: the producer overwrites a latched value
//! and pokes a one-token channel, the consumer is woken once and reads only
//! the most recent value. Intermediate values are coalesced away.
//!
//! For filesystem presence/absence and "the archive was replaced", older
//! intermediate states have no meaning once a newer one exists, so the
//! consumer stays correct under event storms with O(1) memory.
//!
//! False-positive wakeups are legal: [`EventListener::take`] may return
//! `None` after a wakeup, and consumers must ignore that.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

/// Creates a connected notifier/listener pair.
pub fn channel<T>() -> (EventNotifier<T>, EventListener<T>) {
    let slot = Arc::new(Mutex::new(None));
    let (tx, rx) = mpsc::channel(1);
    (
        EventNotifier {
            slot: slot.clone(),
            token: Some(tx),
        },
        EventListener { slot, token: rx },
    )
}

/// Producer side: overwrites the latest value and wakes the listener.
pub struct EventNotifier<T> {
    slot: Arc<Mutex<Option<T>>>,
    token: Option<mpsc::Sender<()>>,
}

impl<T> EventNotifier<T> {
    /// Stores `val` as the latest value and pokes the wake channel.
    ///
    /// When a token is already pending the poke is a no-op, but the value
    /// is still overwritten, so the listener always observes the newest one.
    pub fn notify(&self, val: T) {
        *lock(&self.slot) = Some(val);
        if let Some(token) = &self.token {
            let _ = token.try_send(());
        }
    }

    /// Closes the wake channel. The listener's next wait returns `false`.
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        self.token = None;
    }
}

/// Consumer side: waits for a wakeup, then takes the latest value.
pub struct EventListener<T> {
    slot: Arc<Mutex<Option<T>>>,
    token: mpsc::Receiver<()>,
}

impl<T> std::fmt::Debug for EventListener<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListener").finish_non_exhaustive()
    }
}

impl<T> EventListener<T> {
    /// Waits for the next wakeup. Returns `false` once the producer stopped
    /// (or was dropped) and no tokens remain.
    pub async fn notified(&mut self) -> bool {
        self.token.recv().await.is_some()
    }

    /// Consumes and returns the latest value, if any arrived since the
    /// previous `take`.
    pub fn take(&self) -> Option<T> {
        lock(&self.slot).take()
    }
}

fn lock<T>(slot: &Mutex<Option<T>>) -> std::sync::MutexGuard<'_, Option<T>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
