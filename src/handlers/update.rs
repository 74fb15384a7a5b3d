//! # Update functions applied by the configuration handler.
//!
//! The tarred and single-file variants differ only in the closure handed to
//! the handler's worker, so both are built here as first-class values.
//!
//! The tarred algorithm keeps the live directory consistent under
//! mid-update failure by ordering operations so that old content is removed
//! only after its replacement was fully materialized in the staging
//! directory: `clear staging → extract → diff → (move | delete)`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::FsError;
use crate::fs::FilesystemRef;

/// What happened to a file while reconciling the live directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modification {
    Created,
    Modified,
    Deleted,
}

impl Modification {
    /// Returns the lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modification::Created => "created",
            Modification::Modified => "modified",
            Modification::Deleted => "deleted",
        }
    }
}

/// Outcome of one tarred update run.
///
/// `changed_files` maps relative file names to the modification applied.
/// On failure `error` is set and `changed_files` holds the partial set of
/// modifications applied before the abort.
#[derive(Debug, Default)]
pub struct UpdateResult {
    pub changed_files: BTreeMap<PathBuf, Modification>,
    pub error: Option<FsError>,
}

impl UpdateResult {
    fn failed(error: FsError) -> Self {
        Self {
            changed_files: BTreeMap::new(),
            error: Some(error),
        }
    }
}

const LIVE_FLAG: u8 = 1 << 0;
const STAGED_FLAG: u8 = 1 << 1;

/// Builds the tarred update function: extract the pinned archive into
/// `staging` and reconcile `live` to match it, moving only files that
/// actually differ in content or mode.
pub(crate) fn tarred_update(
    hardlink: PathBuf,
    staging: PathBuf,
    live: PathBuf,
    fs: FilesystemRef,
) -> impl Fn() -> UpdateResult + Send + Sync + 'static {
    move || {
        if let Err(e) = fs.clear_dir(&staging) {
            return UpdateResult::failed(e);
        }
        if let Err(e) = fs.extract(&hardlink, &staging) {
            return UpdateResult::failed(e);
        }
        let presence = match presence_map(&live, &staging, &fs) {
            Ok(map) => map,
            Err(e) => return UpdateResult::failed(e),
        };

        let mut changed_files = BTreeMap::new();
        for (name, flags) in presence {
            let staged_path = staging.join(&name);
            let live_path = live.join(&name);
            let step = match flags {
                STAGED_FLAG => fs
                    .move_file(&staged_path, &live_path)
                    .map(|()| Some(Modification::Created)),
                LIVE_FLAG => fs
                    .delete_file(&live_path)
                    .map(|()| Some(Modification::Deleted)),
                _ => fs
                    .are_files_different(&staged_path, &live_path)
                    .and_then(|different| {
                        if different {
                            fs.move_file(&staged_path, &live_path)
                                .map(|()| Some(Modification::Modified))
                        } else {
                            Ok(None)
                        }
                    }),
            };
            match step {
                Ok(Some(modification)) => {
                    changed_files.insert(name, modification);
                }
                Ok(None) => {}
                Err(error) => {
                    return UpdateResult {
                        changed_files,
                        error: Some(error),
                    }
                }
            }
        }
        UpdateResult {
            changed_files,
            error: None,
        }
    }
}

/// Builds the single-file update function: copy the pinned archive over the
/// target path.
pub(crate) fn single_file_update(
    hardlink: PathBuf,
    target: PathBuf,
    fs: FilesystemRef,
) -> impl Fn() -> Result<(), FsError> + Send + Sync + 'static {
    move || fs.copy(&hardlink, &target)
}

/// Lists both trees and flags each relative file name with the side(s) it
/// is present on. Directories are flattened away; their files carry the
/// relative path.
fn presence_map(
    live: &Path,
    staging: &Path,
    fs: &FilesystemRef,
) -> Result<BTreeMap<PathBuf, u8>, FsError> {
    let mut map = BTreeMap::new();
    for name in fs.list_file_names(live)? {
        *map.entry(name).or_insert(0) |= LIVE_FLAG;
    }
    for name in fs.list_file_names(staging)? {
        *map.entry(name).or_insert(0) |= STAGED_FLAG;
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File, Permissions};
    use std::io;
    use std::os::unix::fs::PermissionsExt;

    use tar::{Builder, EntryType, Header};
    use tempfile::{tempdir, TempDir};

    use crate::fs::RealFilesystem;

    use super::*;

    struct UpdateEnv {
        _root: TempDir,
        hardlink: PathBuf,
        staging: PathBuf,
        live: PathBuf,
    }

    fn env_with_archive(entries: &[(&str, &[u8], u32)]) -> UpdateEnv {
        let root = tempdir().expect("tempdir");
        let hardlink = root.path().join("config.tar_hardlink");
        let staging = root.path().join("staging");
        let live = root.path().join("live");
        fs::create_dir(&live).expect("mkdir");

        let mut builder = Builder::new(File::create(&hardlink).expect("create archive"));
        for (name, content, mode) in entries {
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_size(content.len() as u64);
            header.set_mode(*mode);
            builder
                .append_data(&mut header, name, io::Cursor::new(content.to_vec()))
                .expect("append");
        }
        builder.finish().expect("finish");

        UpdateEnv {
            _root: root,
            hardlink,
            staging,
            live,
        }
    }

    fn write_live(env: &UpdateEnv, name: &str, content: &[u8], mode: u32) {
        let path = env.live.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, content).expect("write");
        fs::set_permissions(&path, Permissions::from_mode(mode)).expect("chmod");
    }

    fn run(env: &UpdateEnv) -> UpdateResult {
        tarred_update(
            env.hardlink.clone(),
            env.staging.clone(),
            env.live.clone(),
            RealFilesystem::arc(),
        )()
    }

    #[test]
    fn records_created_modified_and_deleted_files() {
        let env = env_with_archive(&[
            ("fresh.conf", b"new", 0o644),
            ("same.conf", b"same", 0o644),
            ("edited.conf", b"after", 0o644),
        ]);
        write_live(&env, "same.conf", b"same", 0o644);
        write_live(&env, "edited.conf", b"before", 0o644);
        write_live(&env, "stale.conf", b"gone", 0o644);

        let result = run(&env);
        assert!(result.error.is_none(), "unexpected {:?}", result.error);
        assert_eq!(
            result.changed_files,
            BTreeMap::from([
                (PathBuf::from("fresh.conf"), Modification::Created),
                (PathBuf::from("edited.conf"), Modification::Modified),
                (PathBuf::from("stale.conf"), Modification::Deleted),
            ])
        );

        assert_eq!(fs::read(env.live.join("fresh.conf")).expect("read"), b"new");
        assert_eq!(
            fs::read(env.live.join("edited.conf")).expect("read"),
            b"after"
        );
        assert!(!env.live.join("stale.conf").exists());
        assert_eq!(fs::read(env.live.join("same.conf")).expect("read"), b"same");
    }

    #[test]
    fn mode_only_difference_counts_as_modified() {
        let env = env_with_archive(&[("app.conf", b"same", 0o600)]);
        write_live(&env, "app.conf", b"same", 0o644);

        let result = run(&env);
        assert!(result.error.is_none());
        assert_eq!(
            result.changed_files,
            BTreeMap::from([(PathBuf::from("app.conf"), Modification::Modified)])
        );
        let mode = fs::metadata(env.live.join("app.conf"))
            .expect("stat")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn applying_the_same_archive_twice_changes_nothing() {
        let env = env_with_archive(&[("a.conf", b"a", 0o644), ("b.conf", b"b", 0o600)]);

        let first = run(&env);
        assert!(first.error.is_none());
        assert_eq!(first.changed_files.len(), 2);

        let second = run(&env);
        assert!(second.error.is_none());
        assert!(second.changed_files.is_empty());
    }

    #[test]
    fn missing_archive_reports_the_extract_error() {
        let env = env_with_archive(&[]);
        fs::remove_file(&env.hardlink).expect("remove");

        let result = run(&env);
        assert!(matches!(result.error, Some(FsError::Extract { .. })));
        assert!(result.changed_files.is_empty());
    }

    #[test]
    fn nested_files_keep_their_relative_paths() {
        let env = env_with_archive(&[("conf.d/nested/inner.conf", b"x", 0o644)]);

        let result = run(&env);
        assert!(result.error.is_none(), "unexpected {:?}", result.error);
        assert_eq!(
            result.changed_files,
            BTreeMap::from([(
                PathBuf::from("conf.d/nested/inner.conf"),
                Modification::Created
            )])
        );
        assert_eq!(
            fs::read(env.live.join("conf.d/nested/inner.conf")).expect("read"),
            b"x"
        );
    }

    #[test]
    fn single_file_update_copies_the_pin_to_the_target() {
        let root = tempdir().expect("tempdir");
        let pin = root.path().join("config_hardlink");
        let target = root.path().join("app.conf");
        fs::write(&pin, b"payload").expect("write");

        let update = single_file_update(pin, target.clone(), RealFilesystem::arc());
        update().expect("copy");
        assert_eq!(fs::read(&target).expect("read"), b"payload");
    }
}
