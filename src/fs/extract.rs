//! Tar extraction with a restricted entry-type policy.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tar::{Archive, EntryType};

use crate::error::FsError;

/// Extracts all entries of a tar archive into `to_dir`.
///
/// Only regular files, directories, hardlinks and symlinks are accepted;
/// any other entry type aborts with [`FsError::UnsupportedEntry`]. Symlink
/// targets are written verbatim, link resolution is left to the consumer of
/// the extracted tree. Entries that would escape `to_dir` are rejected.
pub(crate) fn extract_tar(archive: &Path, to_dir: &Path) -> Result<(), FsError> {
    let extract_err = |source| FsError::Extract {
        archive: archive.to_path_buf(),
        source,
    };

    let reader = File::open(archive).map_err(extract_err)?;
    let mut tar = Archive::new(reader);
    tar.set_preserve_permissions(true);

    for entry in tar.entries().map_err(extract_err)? {
        let mut entry = entry.map_err(extract_err)?;
        match entry.header().entry_type() {
            EntryType::Regular | EntryType::Directory | EntryType::Link | EntryType::Symlink => {
                let unpacked = entry.unpack_in(to_dir).map_err(extract_err)?;
                if !unpacked {
                    return Err(extract_err(io::Error::other(format!(
                        "{:?} escapes the extraction directory",
                        entry_name(&mut entry),
                    ))));
                }
            }
            _ => {
                return Err(FsError::UnsupportedEntry {
                    archive: archive.to_path_buf(),
                    name: entry_name(&mut entry),
                });
            }
        }
    }
    Ok(())
}

fn entry_name<R: io::Read>(entry: &mut tar::Entry<'_, R>) -> PathBuf {
    entry
        .path()
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| PathBuf::from("<unreadable name>"))
}
