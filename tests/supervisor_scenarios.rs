//! End-to-end supervisor scenarios, driven through the watched filesystem
//! paths and observed through the event bus.

mod common;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::{tempdir, TempDir};
use tokio::sync::broadcast;

use entryvisor::fs::{Filesystem, FilesystemRef, RealFilesystem};
use entryvisor::{
    Config, Event, EventKind, FsError, PayloadSpec, Supervisor, TracingObserver,
};

use common::{assert_quiet, move_tar_in, wait_for, wait_until};

struct Env {
    _root: TempDir,
    cfg: Config,
}

impl Env {
    fn new() -> Self {
        common::init_logging();
        let root = tempdir().expect("tempdir");
        let cfg = Config::new(
            root.path().join("activation/isactive"),
            root.path().join("watched/config.tar"),
            root.path().join("staging"),
            root.path().join("live"),
        );
        cfg.ensure_dirs().expect("ensure dirs");
        Self { _root: root, cfg }
    }

    fn boot(&self) -> broadcast::Receiver<Event> {
        self.boot_with(RealFilesystem::arc())
    }

    fn boot_with(&self, fs: FilesystemRef) -> broadcast::Receiver<Event> {
        let supervisor =
            Supervisor::with_filesystem(self.cfg.clone(), payload(), TracingObserver, fs)
                .expect("boot supervisor");
        let events = supervisor.subscribe();
        tokio::spawn(supervisor.run());
        events
    }

    fn activate(&self) {
        fs::write(&self.cfg.activation_path, b"").expect("touch activation file");
    }

    fn deactivate(&self) {
        fs::remove_file(&self.cfg.activation_path).expect("remove activation file");
    }

    fn archive(&self) -> PathBuf {
        self.cfg.archive_path.clone()
    }
}

fn payload() -> PayloadSpec {
    PayloadSpec::new("/bin/sh").args(["-c", "sleep 30"])
}

fn state_of(ev: &Event) -> &str {
    ev.state.as_deref().unwrap_or("")
}

/// Drives a freshly booted supervisor to `(active, applied, alive)`.
async fn bring_to_running(env: &Env, events: &mut broadcast::Receiver<Event>) {
    move_tar_in(&env.archive(), &[("f1.conf", b"one"), ("f2.conf", b"two")]);
    wait_until(events, "successful config arrival", |ev| {
        ev.kind == EventKind::ConfigChanged && ev.error.is_none()
    })
    .await;
    wait_for(events, EventKind::UpdateRequested).await;
    let updated = wait_for(events, EventKind::ConfigUpdated).await;
    assert!(updated.error.is_none());
    assert!(state_of(&updated).contains("updated"));

    env.activate();
    wait_for(events, EventKind::ProcessStarting).await;
    let started = wait_for(events, EventKind::ProcessStarted).await;
    assert!(started.error.is_none());
    // "| active" rather than "active": the latter also matches "inactive".
    assert!(state_of(&started).contains("| active"));
    assert!(state_of(&started).contains("applied"));
    assert!(state_of(&started).contains("alive"));
}

#[tokio::test]
async fn cold_boot_without_signals_takes_no_action() {
    let env = Env::new();
    let mut events = env.boot();

    let initial = wait_for(&mut events, EventKind::ActivationChanged).await;
    assert!(initial.error.is_none());
    assert!(state_of(&initial).contains("inactive"));
    assert!(state_of(&initial).contains("notReady"));
    assert!(state_of(&initial).contains("dead"));

    assert_quiet(
        &mut events,
        &[
            EventKind::ProcessStarting,
            EventKind::ProcessStarted,
            EventKind::UpdateRequested,
        ],
    )
    .await;
}

#[tokio::test]
async fn activation_without_configuration_starts_nothing() {
    let env = Env::new();
    let mut events = env.boot();

    env.activate();
    let ev = wait_until(&mut events, "activation", |ev| {
        ev.kind == EventKind::ActivationChanged && state_of(ev).contains("| active")
    })
    .await;
    assert!(state_of(&ev).contains("notReady"));
    assert!(state_of(&ev).contains("dead"));

    assert_quiet(
        &mut events,
        &[EventKind::ProcessStarting, EventKind::ProcessStarted],
    )
    .await;
}

#[tokio::test]
async fn configuration_then_activation_starts_the_payload() {
    let env = Env::new();
    let mut events = env.boot();
    bring_to_running(&env, &mut events).await;
}

#[tokio::test]
async fn a_new_bundle_restarts_the_running_payload() {
    let env = Env::new();
    let mut events = env.boot();
    bring_to_running(&env, &mut events).await;

    move_tar_in(&env.archive(), &[("f1.conf", b"changed"), ("f2.conf", b"two")]);
    wait_for(&mut events, EventKind::UpdateRequested).await;
    let updated = wait_for(&mut events, EventKind::ConfigUpdated).await;
    assert!(state_of(&updated).contains("updated"));
    assert!(state_of(&updated).contains("alive"));

    // Restart across the commit boundary: kill, then an immediate start.
    wait_for(&mut events, EventKind::ProcessKilling).await;
    wait_for(&mut events, EventKind::ProcessStarting).await;
    let started = wait_for(&mut events, EventKind::ProcessStarted).await;
    assert!(state_of(&started).contains("applied"));
    assert!(state_of(&started).contains("alive"));
}

#[tokio::test]
async fn deactivation_kills_the_running_payload() {
    let env = Env::new();
    let mut events = env.boot();
    bring_to_running(&env, &mut events).await;

    env.deactivate();
    wait_until(&mut events, "deactivation", |ev| {
        ev.kind == EventKind::ActivationChanged && state_of(ev).contains("inactive")
    })
    .await;
    wait_for(&mut events, EventKind::ProcessKilling).await;

    // The kill shows up as an ended event with the fatal status attached;
    // the process axis still lands on dead.
    let ended = wait_for(&mut events, EventKind::ProcessEnded).await;
    assert!(state_of(&ended).contains("inactive"));
    assert!(state_of(&ended).contains("dead"));

    assert_quiet(&mut events, &[EventKind::ProcessStarting]).await;
}

#[tokio::test]
async fn a_failed_hardlink_is_retried_by_the_next_arrival() {
    let env = Env::new();
    let fail_next = Arc::new(AtomicBool::new(true));
    let mut events = env.boot_with(Arc::new(FailingHardlinkFs {
        real: RealFilesystem,
        fail_next: fail_next.clone(),
    }));

    move_tar_in(&env.archive(), &[("f1.conf", b"one")]);
    let failed = wait_for(&mut events, EventKind::ConfigChanged).await;
    assert!(failed.error.is_some());
    // The configuration axis did not move.
    assert!(state_of(&failed).contains("notReady"));
    assert_quiet(&mut events, &[EventKind::UpdateRequested]).await;

    // The writer re-delivers; this time the pin succeeds.
    move_tar_in(&env.archive(), &[("f1.conf", b"one")]);
    let changed = wait_until(&mut events, "successful config arrival", |ev| {
        ev.kind == EventKind::ConfigChanged && ev.error.is_none()
    })
    .await;
    assert!(state_of(&changed).contains("changed"));
    wait_for(&mut events, EventKind::UpdateRequested).await;
    let updated = wait_for(&mut events, EventKind::ConfigUpdated).await;
    assert!(updated.error.is_none());
    assert!(!fail_next.load(Ordering::SeqCst));
}

/// Real filesystem with one injected hardlink failure.
struct FailingHardlinkFs {
    real: RealFilesystem,
    fail_next: Arc<AtomicBool>,
}

impl Filesystem for FailingHardlinkFs {
    fn exists(&self, path: &Path) -> bool {
        self.real.exists(path)
    }

    fn hardlink(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(FsError::Hardlink {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source: io::Error::other("injected hardlink failure"),
            });
        }
        self.real.hardlink(from, to)
    }

    fn delete_file(&self, path: &Path) -> Result<(), FsError> {
        self.real.delete_file(path)
    }

    fn clear_dir(&self, dir: &Path) -> Result<(), FsError> {
        self.real.clear_dir(dir)
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.real.move_file(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.real.copy(from, to)
    }

    fn list_file_names(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        self.real.list_file_names(dir)
    }

    fn extract(&self, archive: &Path, to_dir: &Path) -> Result<(), FsError> {
        self.real.extract(archive, to_dir)
    }

    fn are_files_different(&self, first: &Path, second: &Path) -> Result<bool, FsError> {
        self.real.are_files_different(first, second)
    }
}
