//! # entryvisor
//!
//! **Entryvisor** is a container entrypoint supervision library.
//!
//! It runs inside a container image and manages the lifetime of one
//! long-running payload process in reaction to two externally-driven
//! signals delivered via the filesystem: an *activation flag* (should the
//! payload currently run?) and a *configuration bundle* (a tar archive,
//! atomically replaced by a writer, that must be applied atomically to an
//! on-disk directory).
//!
//! ## Features
//!
//! | Area              | Description                                                            | Key types / traits                          |
//! |-------------------|------------------------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Three-axis state machine deriving start/kill/restart/update actions.   | [`Supervisor`], [`State`]                    |
//! | **Activation**    | Presence/absence of a flag file as an event stream.                    | [`ActivationHandler`]                        |
//! | **Configuration** | Hardlink-pinned archive arrivals and atomic directory reconciliation.  | [`ConfigurationHandler`], [`UpdateResult`]   |
//! | **Payload**       | Child-process wrapper with start/end events and signals.               | [`ProcessHandler`], [`PayloadSpec`]          |
//! | **Observer API**  | Hook into supervisor lifecycle events (logging, metrics).              | [`Observer`], [`Event`], [`EventKind`]       |
//! | **Errors**        | Typed errors per subsystem, with stable log labels.                    | [`WatchError`], [`FsError`], [`ProcessError`]|
//!
//! Two atomicity guarantees hold throughout: a partially-applied bundle is
//! never exposed to the payload, and the payload never keeps running
//! across a configuration commit it did not start against (the supervisor
//! either defers the start or restarts across the commit boundary).
//!
//! ```no_run
//! use entryvisor::{Config, PayloadSpec, Supervisor, TracingObserver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::new(
//!         "/tmp/watched/activation/isactive",
//!         "/tmp/watched/configuration/config.tar",
//!         "/tmp/configuration/new",
//!         "/tmp/configuration/old",
//!     );
//!     cfg.ensure_dirs()?;
//!
//!     let payload = PayloadSpec::new("/usr/bin/payload").args(["--config", "/tmp/configuration/old"]);
//!     let supervisor = Supervisor::new(cfg, payload, TracingObserver)?;
//!     supervisor.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod config;
mod error;
mod events;
mod observer;
mod state;
mod supervisor;
mod watcher;

pub mod fs;
pub mod handlers;
pub mod notifier;

// ---- Public re-exports ----

pub use config::{Config, PayloadSpec};
pub use error::{
    ConfigError, FsError, InitError, ProcessError, UpdateRejected, WatchError,
};
pub use events::{Bus, Event, EventKind};
pub use handlers::{
    ActivationEvent, ActivationHandler, ConfigChangedEvent, ConfigurationHandler, Modification,
    ProcessHandler, UpdateResult,
};
pub use observer::{Observer, TracingObserver};
pub use state::{ActivationState, ConfigState, ProcessState, State};
pub use supervisor::Supervisor;
pub use watcher::{FileOps, FileWatcher, WatcherEvent};
