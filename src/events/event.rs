//! # Runtime events emitted by the supervisor.
//!
//! [`EventKind`] classifies the supervisor lifecycle:
//! - **Input events**: what the handlers observed (activation flipped,
//!   configuration arrived, update finished, process started/ended).
//! - **Actions**: what the decision table did about it (start, kill,
//!   request an update).
//! - **Lifecycle**: shutdown request and tear-down.
//!
//! Every event carries a sequence number that increases monotonically, so
//! subscribers can order events delivered through independent channels.
//!
//! ## Example
//! ```
//! use entryvisor::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::ConfigChanged)
//!     .with_state("| active   | changed  | alive    |")
//!     .with_error("configuration was deleted");
//!
//! assert_eq!(ev.kind, EventKind::ConfigChanged);
//! assert!(ev.error.is_some());
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Input events ===
    /// The activation file appeared or disappeared.
    ActivationChanged,
    /// A new configuration archive arrived (or arriving failed).
    ConfigChanged,
    /// An update run finished and its result was consumed.
    ConfigUpdated,
    /// The payload reported its start.
    ProcessStarted,
    /// The payload ended.
    ProcessEnded,

    // === Actions ===
    /// A configuration update was requested from the handler.
    UpdateRequested,
    /// An update request was rejected by the handler.
    UpdateRejected,
    /// A payload start was issued.
    ProcessStarting,
    /// A kill signal was issued to the payload.
    ProcessKilling,

    // === Lifecycle ===
    /// An OS shutdown signal was received.
    ShutdownRequested,
    /// Handlers were closed and the payload killed.
    TornDown,
}

/// Supervisor event with optional metadata.
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (for logging only).
    pub at: SystemTime,
    /// Rendered state triple after the event was applied.
    pub state: Option<String>,
    /// Error message, if the event carries a failure.
    pub error: Option<String>,
    /// Free-form detail (changed file list, signal name, ...).
    pub detail: Option<String>,
    /// The kind of event.
    pub kind: EventKind,
}

impl Event {
    /// Creates a new event of the given kind with the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            state: None,
            error: None,
            detail: None,
            kind,
        }
    }

    /// Attaches the rendered state triple.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Attaches a free-form detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
