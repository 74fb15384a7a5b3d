//! # Supervisor configuration.
//!
//! [`Config`] names the watched filesystem paths and channel capacities;
//! [`PayloadSpec`] describes the payload command the supervisor manages.
//!
//! The activation file and the configuration archive must only ever be
//! **moved into** place by writers (rename on the same filesystem); the
//! staging and live directories must share a filesystem so updates can use
//! rename-based moves.
//!
//! # Example
//! ```
//! use entryvisor::Config;
//!
//! let cfg = Config::new(
//!     "/tmp/watched/activation/isactive",
//!     "/tmp/watched/configuration/config.tar",
//!     "/tmp/configuration/new",
//!     "/tmp/configuration/old",
//! );
//! assert!(cfg.hardlink_path().to_string_lossy().ends_with("config.tar_hardlink"));
//! ```

use std::path::{Path, PathBuf};

/// Suffix appended to the archive path to derive the hardlink pin.
const HARDLINK_SUFFIX: &str = "_hardlink";

/// Paths and capacities for a supervisor instance.
#[derive(Clone, Debug)]
pub struct Config {
    /// Activation flag file; only presence/absence is meaningful.
    pub activation_path: PathBuf,
    /// Configuration archive, atomically replaced by a writer via rename.
    pub archive_path: PathBuf,
    /// Extraction target for new archives; cleared before every update.
    pub staging_dir: PathBuf,
    /// The live directory the payload reads; reconciled in place.
    pub live_dir: PathBuf,
    /// Capacity of the per-handler event channels.
    pub chan_capacity: usize,
    /// Capacity of the observability event bus.
    pub bus_capacity: usize,
}

impl Config {
    /// Creates a configuration with default channel capacities:
    /// - `chan_capacity = 16`
    /// - `bus_capacity = 1024`
    pub fn new(
        activation_path: impl Into<PathBuf>,
        archive_path: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        live_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            activation_path: activation_path.into(),
            archive_path: archive_path.into(),
            staging_dir: staging_dir.into(),
            live_dir: live_dir.into(),
            chan_capacity: 16,
            bus_capacity: 1024,
        }
    }

    /// Derived path of the hardlink pin: the archive path with a fixed
    /// suffix. Managed exclusively by the configuration handler.
    pub fn hardlink_path(&self) -> PathBuf {
        hardlink_path_for(&self.archive_path)
    }

    /// Creates the directories the watched paths live in plus the live
    /// directory, the way an embedding `main` prepares the filesystem
    /// before booting the supervisor.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.activation_path.parent(),
            self.archive_path.parent(),
            Some(self.live_dir.as_path()),
        ]
        .into_iter()
        .flatten()
        {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Derives the hardlink pin path for an archive path.
pub(crate) fn hardlink_path_for(archive: &Path) -> PathBuf {
    let mut name = archive
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(HARDLINK_SUFFIX);
    archive.with_file_name(name)
}

/// The payload command the supervisor starts and kills.
///
/// A fresh process handler is built from this spec on every start.
#[derive(Clone, Debug)]
pub struct PayloadSpec {
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments passed to the program.
    pub args: Vec<String>,
}

impl PayloadSpec {
    /// Creates a spec with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Returns true when the program name is non-empty.
    pub(crate) fn is_runnable(&self) -> bool {
        self.program != Path::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardlink_path_appends_suffix() {
        let cfg = Config::new("/a/isactive", "/w/config.tar", "/n", "/o");
        assert_eq!(
            cfg.hardlink_path(),
            PathBuf::from("/w/config.tar_hardlink")
        );
    }

    #[test]
    fn empty_program_is_not_runnable() {
        assert!(!PayloadSpec::new("").is_runnable());
        assert!(PayloadSpec::new("/bin/true").is_runnable());
    }
}
