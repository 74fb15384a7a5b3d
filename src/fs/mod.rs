//! # Filesystem primitives behind a seam.
//!
//! [`Filesystem`] separates file operations from handler logic so the
//! handlers can be exercised against an injected implementation, and
//! [`RealFilesystem`] is the implementation used in production.
//!
//! The contracts mirror what the update algorithm relies on:
//! - [`Filesystem::hardlink`] deletes an existing destination first, so a
//!   stale pin from a previous archive is replaced, never linked over.
//! - [`Filesystem::delete_file`] treats a missing path as success.
//! - [`Filesystem::list_file_names`] flattens directories into relative
//!   paths and fails on anything that is not a regular file or symlink.

mod diff;
mod extract;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::error::FsError;

/// Shared handle to a filesystem implementation.
pub type FilesystemRef = Arc<dyn Filesystem>;

/// File system utilities used by the handlers and the update algorithm.
pub trait Filesystem: Send + Sync {
    /// Returns true if a stat of `path` succeeds.
    fn exists(&self, path: &Path) -> bool;
    /// Creates a hardlink of `from` at `to`. An existing `to` is deleted first.
    fn hardlink(&self, from: &Path, to: &Path) -> Result<(), FsError>;
    /// Deletes `path`. A missing path is not an error.
    fn delete_file(&self, path: &Path) -> Result<(), FsError>;
    /// Removes all contents of `dir`, recreating it empty.
    fn clear_dir(&self, dir: &Path) -> Result<(), FsError>;
    /// Moves `from` to `to`, creating missing parent directories of `to`.
    fn move_file(&self, from: &Path, to: &Path) -> Result<(), FsError>;
    /// Copies the content and mode of `from` to `to`.
    fn copy(&self, from: &Path, to: &Path) -> Result<(), FsError>;
    /// Lists file names (relative paths, not absolute) under `dir`,
    /// recursing into directories.
    fn list_file_names(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError>;
    /// Extracts a tar archive into `to_dir`.
    fn extract(&self, archive: &Path, to_dir: &Path) -> Result<(), FsError>;
    /// Returns true when the two files differ in content or file mode.
    fn are_files_different(&self, first: &Path, second: &Path) -> Result<bool, FsError>;
}

/// [`Filesystem`] implementation over the real operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct RealFilesystem;

impl RealFilesystem {
    /// Returns a shared handle.
    pub fn arc() -> FilesystemRef {
        Arc::new(RealFilesystem)
    }
}

impl Filesystem for RealFilesystem {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn hardlink(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.delete_file(to)?;
        fs::hard_link(from, to).map_err(|source| FsError::Hardlink {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })
    }

    fn delete_file(&self, path: &Path) -> Result<(), FsError> {
        if !self.exists(path) {
            return Ok(());
        }
        fs::remove_file(path).map_err(|source| FsError::Delete {
            path: path.to_path_buf(),
            source,
        })
    }

    fn clear_dir(&self, dir: &Path) -> Result<(), FsError> {
        let clear_err = |source| FsError::ClearDir {
            path: dir.to_path_buf(),
            source,
        };
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(clear_err)?;
        }
        fs::create_dir_all(dir).map_err(clear_err)
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        let move_err = |source| FsError::Move {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        };
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(move_err)?;
        }
        fs::rename(from, to).map_err(move_err)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        fs::copy(from, to)
            .map(|_| ())
            .map_err(|source| FsError::Copy {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            })
    }

    fn list_file_names(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        let mut names = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1) {
            let entry = entry.map_err(|source| FsError::ListDir {
                path: dir.to_path_buf(),
                source: source
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walk loop")),
            })?;
            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            if !(file_type.is_file() || file_type.is_symlink()) {
                return Err(FsError::UnlistableEntry {
                    path: entry.path().to_path_buf(),
                });
            }
            let relative = entry.path().strip_prefix(dir).map_err(|_| {
                FsError::ListDir {
                    path: dir.to_path_buf(),
                    source: std::io::Error::other("entry outside listed directory"),
                }
            })?;
            names.push(relative.to_path_buf());
        }
        Ok(names)
    }

    fn extract(&self, archive: &Path, to_dir: &Path) -> Result<(), FsError> {
        extract::extract_tar(archive, to_dir)
    }

    fn are_files_different(&self, first: &Path, second: &Path) -> Result<bool, FsError> {
        diff::are_files_different(first, second)
    }
}
