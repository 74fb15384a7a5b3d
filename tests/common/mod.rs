//! Shared helpers for the integration tests: tar fixtures, atomic archive
//! replacement, and bus-event waiting.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;

use tar::{Builder, EntryType, Header};
use tokio::sync::broadcast;
use tokio::time::timeout;

use entryvisor::{Event, EventKind};

pub const WAIT: Duration = Duration::from_secs(10);
pub const QUIET: Duration = Duration::from_millis(500);

/// Installs a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds a tar archive of regular files at `path`.
pub fn build_tar(path: &Path, entries: &[(&str, &[u8])]) {
    let mut builder = Builder::new(File::create(path).expect("create archive"));
    for (name, content) in entries {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, name, io::Cursor::new(content.to_vec()))
            .expect("append entry");
    }
    builder.finish().expect("finish archive");
}

/// Replaces `target` the way a configuration writer does: build elsewhere
/// on the same filesystem, then rename into place.
pub fn move_tar_in(target: &Path, entries: &[(&str, &[u8])]) {
    let staged = target.with_extension("incoming");
    build_tar(&staged, entries);
    fs::rename(&staged, target).expect("rename archive into place");
}

/// Waits until an event of `kind` arrives on the bus, returning it.
pub async fn wait_for(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    timeout(WAIT, async {
        loop {
            let ev = rx.recv().await.expect("event bus closed");
            if ev.kind == kind {
                return ev;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {kind:?}"))
}

/// Waits until an event matching the predicate arrives, returning it.
pub async fn wait_until(
    rx: &mut broadcast::Receiver<Event>,
    what: &str,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    timeout(WAIT, async {
        loop {
            let ev = rx.recv().await.expect("event bus closed");
            if pred(&ev) {
                return ev;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

/// Collects every event published within the quiet window.
pub async fn drain_for(rx: &mut broadcast::Receiver<Event>, window: Duration) -> Vec<Event> {
    let mut seen = Vec::new();
    let _ = timeout(window, async {
        while let Ok(ev) = rx.recv().await {
            seen.push(ev);
        }
    })
    .await;
    seen
}

/// Asserts that no event of the given kinds shows up within the quiet
/// window.
pub async fn assert_quiet(rx: &mut broadcast::Receiver<Event>, kinds: &[EventKind]) {
    for ev in drain_for(rx, QUIET).await {
        assert!(
            !kinds.contains(&ev.kind),
            "unexpected {:?} event: {ev:?}",
            ev.kind
        );
    }
}
