//! # Single-file watcher over the platform notification primitive.
//!
//! [`FileWatcher::open`] registers for events on the directory containing
//! the watched path, filters raw events down to those whose target is
//! exactly that path and whose operation intersects a configured
//! [`FileOps`] mask, and surfaces matches through the latched
//! [`notifier`](crate::notifier): per wakeup only the most recent
//! [`WatcherEvent`] is observable.
//!
//! Because of that coalescing the event's operation alone is never
//! authoritative (a create followed by a remove can collapse into one
//! wakeup); consumers re-read the truth from the filesystem after every
//! wakeup.
//!
//! Runtime errors from the underlying primitive are surfaced as events,
//! not retried.

use std::path::Path;

use bitflags::bitflags;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::WatchError;
use crate::notifier::{channel, EventListener};

bitflags! {
    /// Operations observable on a watched file. Combine with `|` to build
    /// a watch mask, e.g. `FileOps::CREATE | FileOps::REMOVE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileOps: u8 {
        const CREATE = 1 << 0;
        const WRITE = 1 << 1;
        const REMOVE = 1 << 2;
        const RENAME = 1 << 3;
        const CHMOD = 1 << 4;
    }
}

/// An event pushed by the watcher: the operation observed on the watched
/// file, or an error. When `error` is set, `ops` is empty.
#[derive(Debug)]
pub struct WatcherEvent {
    /// Which operation was observed on the watched file.
    pub ops: FileOps,
    /// Set when the underlying watcher failed.
    pub error: Option<WatchError>,
}

impl WatcherEvent {
    pub(crate) fn operation(ops: FileOps) -> Self {
        Self { ops, error: None }
    }

    pub(crate) fn failure(error: WatchError) -> Self {
        Self {
            ops: FileOps::empty(),
            error: Some(error),
        }
    }

    /// A synthetic no-op event, used to replay the initial filesystem
    /// state through the regular event path at handler construction.
    pub(crate) fn initial() -> Self {
        Self {
            ops: FileOps::empty(),
            error: None,
        }
    }
}

/// Watches one file and notifies when an operation from the mask occurs.
#[derive(Debug)]
pub struct FileWatcher {
    events: EventListener<WatcherEvent>,
    // Dropping the registration stops the backend and, transitively, the
    // notifier the event callback owns.
    _registration: RecommendedWatcher,
}

impl FileWatcher {
    /// Registers a watch for `path` limited to the `mask` operations.
    ///
    /// The parent directory must exist; the file itself may not, which is
    /// the normal situation for an activation flag.
    pub fn open(path: &Path, mask: FileOps) -> Result<Self, WatchError> {
        let open_err = |source| WatchError::Open {
            path: path.to_path_buf(),
            source,
        };

        let file_name = path
            .file_name()
            .ok_or_else(|| open_err(notify::Error::generic("watched path has no file name")))?;
        let dir = match path.parent() {
            Some(parent) if parent != Path::new("") => parent.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        // The backend reports absolute paths; resolve the directory once so
        // the exact-path filter compares like with like.
        let dir = dir
            .canonicalize()
            .map_err(|e| open_err(notify::Error::io(e)))?;
        let watched = dir.join(file_name);

        let (producer, events) = channel();
        let mut registration =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let ops = map_event_kind(&event.kind);
                    if ops.intersects(mask) && event.paths.iter().any(|p| p == &watched) {
                        producer.notify(WatcherEvent::operation(ops));
                    }
                }
                Err(source) => {
                    producer.notify(WatcherEvent::failure(WatchError::Runtime { source }));
                }
            })
            .map_err(open_err)?;
        registration
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(open_err)?;

        Ok(Self {
            events,
            _registration: registration,
        })
    }

    /// Waits for the next wakeup. Returns `false` once the watcher is gone.
    pub async fn notified(&mut self) -> bool {
        self.events.notified().await
    }

    /// Consumes the latest event. `None` marks a false-positive wakeup and
    /// must be ignored by the consumer.
    pub fn take_event(&self) -> Option<WatcherEvent> {
        self.events.take()
    }

    /// Tears down the registration and closes the notification channel.
    pub fn stop(self) {}
}

/// Maps the backend event classification onto [`FileOps`].
///
/// A rename into the watched path is a create from the reader's point of
/// view; a rename away from it is reported as a rename, matching the inode
/// still being live under its new name.
fn map_event_kind(kind: &EventKind) -> FileOps {
    match kind {
        EventKind::Create(_) => FileOps::CREATE,
        EventKind::Remove(_) => FileOps::REMOVE,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FileOps::CREATE,
        EventKind::Modify(ModifyKind::Name(_)) => FileOps::RENAME,
        EventKind::Modify(ModifyKind::Metadata(_)) => FileOps::CHMOD,
        EventKind::Modify(_) => FileOps::WRITE,
        _ => FileOps::empty(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use tempfile::tempdir;
    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(300);

    async fn next_event(watcher: &mut FileWatcher) -> WatcherEvent {
        loop {
            assert!(
                timeout(WAIT, watcher.notified())
                    .await
                    .expect("timed out waiting for a watcher event"),
                "watcher closed"
            );
            if let Some(ev) = watcher.take_event() {
                return ev;
            }
        }
    }

    #[tokio::test]
    async fn reports_create_on_the_watched_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("isactive");
        let mut watcher = FileWatcher::open(&path, FileOps::CREATE).expect("open");

        fs::write(&path, b"").expect("write");
        let ev = next_event(&mut watcher).await;
        assert!(ev.error.is_none());
        assert!(ev.ops.intersects(FileOps::CREATE));
    }

    #[tokio::test]
    async fn reports_remove_on_the_watched_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("isactive");
        fs::write(&path, b"").expect("write");
        let mut watcher =
            FileWatcher::open(&path, FileOps::CREATE | FileOps::REMOVE).expect("open");

        fs::remove_file(&path).expect("remove");
        let ev = next_event(&mut watcher).await;
        assert!(ev.ops.intersects(FileOps::REMOVE));
    }

    #[tokio::test]
    async fn rename_into_place_counts_as_create() {
        let dir = tempdir().expect("tempdir");
        let staged = dir.path().join("config.tar.tmp");
        let path = dir.path().join("config.tar");
        fs::write(&staged, b"archive").expect("write");
        let mut watcher = FileWatcher::open(&path, FileOps::CREATE).expect("open");

        fs::rename(&staged, &path).expect("rename");
        let ev = next_event(&mut watcher).await;
        assert!(ev.ops.intersects(FileOps::CREATE));
    }

    #[tokio::test]
    async fn filters_other_files_in_the_same_directory() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("watched");
        let mut watcher = FileWatcher::open(&path, FileOps::CREATE).expect("open");

        fs::write(dir.path().join("unrelated"), b"").expect("write");
        assert!(timeout(QUIET, watcher.notified()).await.is_err());
    }

    #[tokio::test]
    async fn filters_operations_outside_the_mask() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("watched");
        fs::write(&path, b"").expect("write");
        let mut watcher = FileWatcher::open(&path, FileOps::REMOVE).expect("open");

        fs::write(&path, b"grown").expect("write");
        assert!(timeout(QUIET, watcher.notified()).await.is_err());
    }

    #[test]
    fn open_fails_for_a_missing_directory() {
        let err = FileWatcher::open(Path::new("/definitely/not/here/file"), FileOps::CREATE)
            .expect_err("opened");
        assert!(matches!(err, WatchError::Open { .. }));
    }
}
