//! # Observer hook for supervisor events.
//!
//! The supervisor pumps every published [`Event`] through an [`Observer`].
//! [`TracingObserver`] is the built-in implementation: it renders events as
//! structured `tracing` records, choosing the severity from the event kind
//! and the presence of an error. Custom observers can forward events to
//! metrics or readiness endpoints instead.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};

/// Hook invoked for every supervisor event, in publish order.
#[async_trait]
pub trait Observer {
    async fn on_event(&self, event: &Event);
}

/// Logs events through `tracing`.
pub struct TracingObserver;

#[async_trait]
impl Observer for TracingObserver {
    async fn on_event(&self, e: &Event) {
        let kind = kind_label(e.kind);
        let state = e.state.as_deref().unwrap_or("");
        let detail = e.detail.as_deref().unwrap_or("");
        match (&e.error, e.kind) {
            (Some(err), EventKind::ProcessEnded) => {
                // The payload is dead either way; the error is informative.
                warn!(seq = e.seq, kind, state, detail, error = %err, "supervisor event");
            }
            (Some(err), EventKind::UpdateRejected) => {
                warn!(seq = e.seq, kind, state, detail, error = %err, "supervisor event");
            }
            (Some(err), _) => {
                error!(seq = e.seq, kind, state, detail, error = %err, "supervisor event");
            }
            (None, EventKind::ActivationChanged | EventKind::ConfigChanged) => {
                info!(seq = e.seq, kind, state, detail, "supervisor event");
            }
            (None, EventKind::ShutdownRequested | EventKind::TornDown) => {
                info!(seq = e.seq, kind, state, detail, "supervisor event");
            }
            (None, _) => {
                debug!(seq = e.seq, kind, state, detail, "supervisor event");
            }
        }
    }
}

fn kind_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::ActivationChanged => "activation_changed",
        EventKind::ConfigChanged => "config_changed",
        EventKind::ConfigUpdated => "config_updated",
        EventKind::ProcessStarted => "process_started",
        EventKind::ProcessEnded => "process_ended",
        EventKind::UpdateRequested => "update_requested",
        EventKind::UpdateRejected => "update_rejected",
        EventKind::ProcessStarting => "process_starting",
        EventKind::ProcessKilling => "process_killing",
        EventKind::ShutdownRequested => "shutdown_requested",
        EventKind::TornDown => "torn_down",
    }
}
