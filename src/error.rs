//! # Error types used by the entryvisor runtime and handlers.
//!
//! Errors are grouped per subsystem:
//!
//! - [`WatchError`] failures of the underlying filesystem watcher.
//! - [`FsError`] failures of the filesystem primitives used by updates.
//! - [`ConfigError`] errors delivered on the configuration `changed` channel.
//! - [`UpdateRejected`] reasons an `update()` request was not accepted.
//! - [`ProcessError`] payload child-process failures.
//! - [`InitError`] fatal supervisor boot failures.
//!
//! All types provide an `as_label` method returning a short stable
//! snake_case label for logs.
//!
//! Handler-internal errors are not returned to the caller; they ride on the
//! next event sent upstream, so the supervisor learns of them through the
//! normal event path.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the filesystem watcher.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WatchError {
    /// The directory containing the watched path could not be registered.
    #[error("could not register a watch for {path:?}: {source}")]
    Open {
        /// The watched file path.
        path: PathBuf,
        source: notify::Error,
    },
    /// The underlying watcher reported an error after registration.
    #[error("watcher runtime error: {source}")]
    Runtime { source: notify::Error },
}

impl WatchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WatchError::Open { .. } => "watch_open",
            WatchError::Runtime { .. } => "watch_runtime",
        }
    }
}

/// Failures of the filesystem primitives driven by configuration updates.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FsError {
    #[error("could not hardlink {from:?} to {to:?}: {source}")]
    Hardlink {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("could not delete {path:?}: {source}")]
    Delete { path: PathBuf, source: io::Error },
    #[error("could not move {from:?} to {to:?}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("could not copy {from:?} to {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("could not clear directory {path:?}: {source}")]
    ClearDir { path: PathBuf, source: io::Error },
    #[error("could not list directory {path:?}: {source}")]
    ListDir { path: PathBuf, source: io::Error },
    /// An entry that is neither a regular file, a directory nor a symlink
    /// was found while listing a configuration tree.
    #[error("{path:?} is not a regular file or symlink")]
    UnlistableEntry { path: PathBuf },
    #[error("could not extract {archive:?}: {source}")]
    Extract {
        archive: PathBuf,
        source: io::Error,
    },
    /// The archive contains an entry type other than a regular file,
    /// directory, hardlink or symlink.
    #[error("{name:?} in {archive:?} is not a directory, regular file, hardlink or symlink")]
    UnsupportedEntry { archive: PathBuf, name: PathBuf },
    #[error("could not compare {first:?} and {second:?}: {source}")]
    DiffRead {
        first: PathBuf,
        second: PathBuf,
        source: io::Error,
    },
}

impl FsError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            FsError::Hardlink { .. } => "fs_hardlink",
            FsError::Delete { .. } => "fs_delete",
            FsError::Move { .. } => "fs_move",
            FsError::Copy { .. } => "fs_copy",
            FsError::ClearDir { .. } => "fs_clear_dir",
            FsError::ListDir { .. } => "fs_list_dir",
            FsError::UnlistableEntry { .. } => "fs_unlistable_entry",
            FsError::Extract { .. } => "fs_extract",
            FsError::UnsupportedEntry { .. } => "fs_unsupported_entry",
            FsError::DiffRead { .. } => "fs_diff_read",
        }
    }
}

/// Errors delivered on the configuration handler's `changed` channel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration archive was removed after arrival.
    #[error("configuration was deleted")]
    Deleted,
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error(transparent)]
    Fs(#[from] FsError),
}

impl ConfigError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Deleted => "config_deleted",
            ConfigError::Watch(e) => e.as_label(),
            ConfigError::Fs(e) => e.as_label(),
        }
    }
}

/// Reasons a configuration `update()` request is not accepted.
///
/// An accepted request triggers the update function exactly once; any of
/// these conditions makes the call a rejected no-op instead.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateRejected {
    #[error("can't update the configuration after the handler was closed")]
    Closed,
    #[error("update was called without configuration changes")]
    NoChange,
    #[error("update was called before the previous update finished")]
    InFlight,
    #[error("update was called before the previous update result was read")]
    ResultPending,
}

impl UpdateRejected {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            UpdateRejected::Closed => "update_rejected_closed",
            UpdateRejected::NoChange => "update_rejected_no_change",
            UpdateRejected::InFlight => "update_rejected_in_flight",
            UpdateRejected::ResultPending => "update_rejected_result_pending",
        }
    }
}

/// Payload child-process failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The payload command is not runnable (empty program name).
    #[error("can not create a process handler without a command")]
    InvalidCommand,
    /// Spawning the child failed.
    #[error("could not start the payload: {source}")]
    Start { source: io::Error },
    /// Waiting on the child failed.
    #[error("could not wait for the payload: {source}")]
    Wait { source: io::Error },
    /// The child exited with a non-zero status.
    #[error("payload exited with {status}")]
    Exit { status: std::process::ExitStatus },
    /// A signal was requested before the child had a pid.
    #[error("no running process to signal")]
    NoProcess,
    /// Signal delivery failed.
    #[error("could not send {signal} to pid {pid}: {errno}")]
    Signal {
        signal: &'static str,
        pid: i32,
        errno: nix::errno::Errno,
    },
}

impl ProcessError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::InvalidCommand => "process_invalid_command",
            ProcessError::Start { .. } => "process_start",
            ProcessError::Wait { .. } => "process_wait",
            ProcessError::Exit { .. } => "process_exit",
            ProcessError::NoProcess => "process_no_process",
            ProcessError::Signal { .. } => "process_signal",
        }
    }
}

/// Fatal supervisor boot failures. Everything after boot is delivered as
/// events and logged instead of propagated.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum InitError {
    #[error("could not create the activation handler: {0}")]
    Activation(#[source] WatchError),
    #[error("could not create the configuration handler: {0}")]
    Configuration(#[source] WatchError),
    #[error("could not create the process handler: {0}")]
    Process(#[source] ProcessError),
}
