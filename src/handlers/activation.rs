//! # Activation handler.
//!
//! Translates presence/absence of a single activation file into a stream of
//! [`ActivationEvent`]s. The file's content is ignored; only existence
//! matters.
//!
//! The first event is emitted synchronously at construction so the
//! supervisor's initial state converges without waiting for a filesystem
//! event. Every later wakeup re-stats the file instead of trusting the
//! reported operation: under coalescing, a create followed by a remove can
//! collapse into a single wakeup, so the filesystem is the only
//! authoritative source.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::WatchError;
use crate::fs::FilesystemRef;
use crate::watcher::{FileOps, FileWatcher, WatcherEvent};

/// Current activation state, with an error if one was observed on the way.
///
/// `state` is always meaningful: it is re-read from the filesystem even
/// when `error` is set.
#[derive(Debug)]
pub struct ActivationEvent {
    /// True when the activation file exists.
    pub state: bool,
    /// Set when the watcher reported a failure.
    pub error: Option<WatchError>,
}

/// Watches the activation file and emits [`ActivationEvent`]s.
pub struct ActivationHandler {
    cancel: CancellationToken,
    // A user-initiated close must leave the event channel open but silent,
    // while a watcher-initiated close closes it normally. The worker's own
    // sender drops in both cases; this shared clone survives the first case
    // and is taken in the second.
    keepalive: Arc<Mutex<Option<mpsc::Sender<ActivationEvent>>>>,
}

impl ActivationHandler {
    /// Opens the handler and returns it together with its event channel.
    ///
    /// The channel already holds the initial event reflecting whether
    /// `path` currently exists.
    pub fn open(
        path: impl Into<PathBuf>,
        capacity: usize,
        fs: FilesystemRef,
    ) -> Result<(Self, mpsc::Receiver<ActivationEvent>), WatchError> {
        let path = path.into();
        let watcher = FileWatcher::open(&path, FileOps::CREATE | FileOps::REMOVE)?;
        let (events_tx, events_rx) = mpsc::channel(capacity.max(1));
        let keepalive = Arc::new(Mutex::new(Some(events_tx.clone())));
        let cancel = CancellationToken::new();

        let worker = Worker {
            path,
            fs,
            watcher,
            events_tx,
            keepalive: keepalive.clone(),
            cancel: cancel.clone(),
        };
        // The channel is fresh and has room, so this cannot be dropped.
        let _ = worker.events_tx.try_send(worker.event_for(WatcherEvent::initial()));
        tokio::spawn(worker.run());

        Ok((Self { cancel, keepalive }, events_rx))
    }

    /// Stops the worker and the watcher. Safe to call more than once.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

struct Worker {
    path: PathBuf,
    fs: FilesystemRef,
    watcher: FileWatcher,
    events_tx: mpsc::Sender<ActivationEvent>,
    keepalive: Arc<Mutex<Option<mpsc::Sender<ActivationEvent>>>>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.watcher.stop();
                    debug!(path = %self.path.display(), "activation handler was closed");
                    return;
                }
                woken = self.watcher.notified() => {
                    if !woken {
                        drop(self.keepalive.lock().unwrap_or_else(|e| e.into_inner()).take());
                        debug!(path = %self.path.display(), "activation events channel was closed");
                        return;
                    }
                    if let Some(ev) = self.watcher.take_event() {
                        self.handle(ev).await;
                    }
                }
            }
        }
    }

    async fn handle(&self, ev: WatcherEvent) {
        let event = self.event_for(ev);
        debug!(
            path = %self.path.display(),
            state = event.state,
            error = event.error.as_ref().map(|e| e.as_label()),
            "an activation event was sent"
        );
        let _ = self.events_tx.send(event).await;
    }

    fn event_for(&self, ev: WatcherEvent) -> ActivationEvent {
        ActivationEvent {
            state: self.fs.exists(&self.path),
            error: ev.error,
        }
    }
}
