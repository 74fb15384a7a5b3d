//! # Lifecycle handlers consumed by the supervisor.
//!
//! Each handler owns one long-lived worker task that multiplexes its
//! upstream watcher's notifications with user-driven commands, and reports
//! through plain mpsc channels handed out at construction:
//!
//! - [`ActivationHandler`] presence/absence of the activation file as a
//!   stream of [`ActivationEvent`]s.
//! - [`ConfigurationHandler`] arrival of new configuration archives and
//!   on-demand atomic application of the staged archive to the live
//!   directory.
//! - [`ProcessHandler`] one payload child process: spawn, wait, signal.
//!
//! `close()` is idempotent on every handler and guarantees cleanup of
//! temporary inodes (the configuration hardlink in particular).

mod activation;
mod configuration;
mod process;
mod update;

pub use activation::{ActivationEvent, ActivationHandler};
pub use configuration::{ConfigChangedEvent, ConfigurationHandler};
pub use process::ProcessHandler;
pub use update::{Modification, UpdateResult};
