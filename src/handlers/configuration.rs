//! # Configuration handler.
//!
//! Listens for a new configuration archive (which writers must only ever
//! move into place, and readers only hardlink), pins each arrival with a
//! hardlink so later writer renames cannot touch the inode being read, and
//! applies the pinned archive to the live directory on demand through an
//! injected update function.
//!
//! The arrival path (watcher → hardlink → `changed` event) and the apply
//! path (`update()` → update function → result event) meet in one worker:
//! arrivals observed while an update is running are latched by the watcher
//! and processed right after it, re-arming the "was changed" condition for
//! the next eligible `update()`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::hardlink_path_for;
use crate::error::{ConfigError, FsError, UpdateRejected, WatchError};
use crate::fs::FilesystemRef;
use crate::watcher::{FileOps, FileWatcher, WatcherEvent};

use super::update::{single_file_update, tarred_update, UpdateResult};

/// One event per archive arrival: `Ok` after a successful hardlink pin,
/// `Err` when the watcher failed, the archive was deleted, or pinning
/// failed. A later successful arrival recovers from any of these.
pub type ConfigChangedEvent = Result<(), ConfigError>;

/// Shared update closure executed on a blocking thread.
type UpdateFn<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Watches the configuration archive and applies updates on request.
pub struct ConfigurationHandler<T> {
    update_tx: mpsc::Sender<()>,
    result_tx: mpsc::Sender<T>,
    was_changed: Arc<AtomicBool>,
    update_running: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl ConfigurationHandler<UpdateResult> {
    /// Opens a handler for a tar archive that is extracted into `staging`
    /// and reconciled into `live` on every update.
    pub fn tarred(
        archive: impl Into<PathBuf>,
        staging: impl Into<PathBuf>,
        live: impl Into<PathBuf>,
        capacity: usize,
        fs: FilesystemRef,
    ) -> Result<
        (
            Self,
            mpsc::Receiver<ConfigChangedEvent>,
            mpsc::Receiver<UpdateResult>,
        ),
        WatchError,
    > {
        let archive = archive.into();
        let update_fn = Arc::new(tarred_update(
            hardlink_path_for(&archive),
            staging.into(),
            live.into(),
            fs.clone(),
        ));
        Self::with_update_fn(archive, update_fn, capacity, fs)
    }
}

impl ConfigurationHandler<Result<(), FsError>> {
    /// Opens a handler for a single configuration file that is copied over
    /// `target` on every update.
    pub fn single_file(
        archive: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        capacity: usize,
        fs: FilesystemRef,
    ) -> Result<
        (
            Self,
            mpsc::Receiver<ConfigChangedEvent>,
            mpsc::Receiver<Result<(), FsError>>,
        ),
        WatchError,
    > {
        let archive = archive.into();
        let update_fn = Arc::new(single_file_update(
            hardlink_path_for(&archive),
            target.into(),
            fs.clone(),
        ));
        Self::with_update_fn(archive, update_fn, capacity, fs)
    }
}

impl<T: Send + 'static> ConfigurationHandler<T> {
    /// Opens a handler with a caller-provided update function. Returns the
    /// handler together with the `changed` and update-result channels.
    ///
    /// If the archive already exists, a changed event is synthesized
    /// through the regular arrival path before the worker starts, so the
    /// consumer sees exactly the same protocol as for a later arrival.
    pub fn with_update_fn(
        archive: impl Into<PathBuf>,
        update_fn: UpdateFn<T>,
        capacity: usize,
        fs: FilesystemRef,
    ) -> Result<(Self, mpsc::Receiver<ConfigChangedEvent>, mpsc::Receiver<T>), WatchError> {
        let archive = archive.into();
        let hardlink = hardlink_path_for(&archive);
        let watcher = FileWatcher::open(&archive, FileOps::CREATE | FileOps::REMOVE)?;

        let (changed_tx, changed_rx) = mpsc::channel(capacity.max(1));
        let (update_tx, update_rx) = mpsc::channel(1);
        let (result_tx, result_rx) = mpsc::channel(1);
        let was_changed = Arc::new(AtomicBool::new(false));
        let update_running = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let handler = Self {
            update_tx,
            result_tx: result_tx.clone(),
            was_changed: was_changed.clone(),
            update_running: update_running.clone(),
            cancel: cancel.clone(),
        };
        let worker = Worker {
            archive,
            hardlink,
            fs,
            watcher,
            changed_tx,
            update_rx,
            result_tx,
            update_fn,
            was_changed,
            update_running,
            cancel,
        };
        if worker.fs.exists(&worker.archive) {
            let outcome = worker.arrival_outcome(WatcherEvent::initial());
            // The channel is fresh and has room, so this cannot be dropped.
            let _ = worker.changed_tx.try_send(outcome);
        }
        tokio::spawn(worker.run());

        Ok((handler, changed_rx, result_rx))
    }

    /// Requests exactly one application of the staged archive. Non-blocking;
    /// the outcome arrives on the update-result channel.
    pub fn update(&self) -> Result<(), UpdateRejected> {
        if self.cancel.is_cancelled() {
            return Err(UpdateRejected::Closed);
        }
        if !self.was_changed.load(Ordering::Acquire) {
            return Err(UpdateRejected::NoChange);
        }
        if self.update_running.load(Ordering::Acquire) {
            return Err(UpdateRejected::InFlight);
        }
        if self.result_tx.capacity() == 0 {
            return Err(UpdateRejected::ResultPending);
        }
        self.update_running.store(true, Ordering::Release);
        if self.update_tx.try_send(()).is_err() {
            self.update_running.store(false, Ordering::Release);
            return Err(UpdateRejected::InFlight);
        }
        Ok(())
    }

    /// Stops the worker. A pending update completes first, then the watcher
    /// is torn down and the hardlink removed. Safe to call more than once.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

struct Worker<T> {
    archive: PathBuf,
    hardlink: PathBuf,
    fs: FilesystemRef,
    watcher: FileWatcher,
    changed_tx: mpsc::Sender<ConfigChangedEvent>,
    update_rx: mpsc::Receiver<()>,
    result_tx: mpsc::Sender<T>,
    update_fn: UpdateFn<T>,
    was_changed: Arc<AtomicBool>,
    update_running: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> Worker<T> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    // A pending update request completes before the
                    // channels close.
                    if self.update_rx.try_recv().is_ok() {
                        self.run_update().await;
                    }
                    break;
                }
                woken = self.watcher.notified() => {
                    if !woken {
                        break;
                    }
                    if let Some(ev) = self.watcher.take_event() {
                        let outcome = self.arrival_outcome(ev);
                        debug!(
                            archive = %self.archive.display(),
                            error = outcome.as_ref().err().map(|e| e.as_label()),
                            "a changed event was sent"
                        );
                        let _ = self.changed_tx.send(outcome).await;
                    }
                }
                Some(()) = self.update_rx.recv() => self.run_update().await,
            }
        }
        self.watcher.stop();
        if let Err(e) = self.fs.delete_file(&self.hardlink) {
            let _ = self.changed_tx.send(Err(e.into())).await;
        }
        debug!(archive = %self.archive.display(), "configuration handler worker exited");
    }

    /// Pins the archive and reports the arrival. The hardlink routine
    /// deletes an existing pin first, so a replaced archive re-pins.
    fn arrival_outcome(&self, ev: WatcherEvent) -> ConfigChangedEvent {
        if let Some(error) = ev.error {
            return Err(ConfigError::Watch(error));
        }
        if ev.ops.intersects(FileOps::REMOVE) {
            return Err(ConfigError::Deleted);
        }
        self.fs.hardlink(&self.archive, &self.hardlink)?;
        self.was_changed.store(true, Ordering::Release);
        Ok(())
    }

    async fn run_update(&self) {
        let update_fn = self.update_fn.clone();
        let result = match tokio::task::spawn_blocking(move || update_fn()).await {
            Ok(result) => result,
            Err(join_error) => match join_error.try_into_panic() {
                Ok(panic) => std::panic::resume_unwind(panic),
                // The runtime is shutting down; nobody is listening.
                Err(_) => return,
            },
        };
        let _ = self.result_tx.send(result).await;
        self.was_changed.store(false, Ordering::Release);
        self.update_running.store(false, Ordering::Release);
        debug!(archive = %self.archive.display(), "an update result event was sent");
    }
}
