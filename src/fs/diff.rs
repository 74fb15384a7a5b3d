//! Byte-wise file comparison used by the update algorithm.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::FsError;

/// Returns true when the two files differ in content or in file mode.
///
/// Both files must be readable and statable; the first failure aborts the
/// comparison with [`FsError::DiffRead`].
pub(crate) fn are_files_different(first: &Path, second: &Path) -> Result<bool, FsError> {
    let read_err = |source| FsError::DiffRead {
        first: first.to_path_buf(),
        second: second.to_path_buf(),
        source,
    };

    let content_first = fs::read(first).map_err(read_err)?;
    let content_second = fs::read(second).map_err(read_err)?;
    if content_first != content_second {
        return Ok(true);
    }

    let mode_first = fs::metadata(first).map_err(read_err)?.permissions().mode();
    let mode_second = fs::metadata(second).map_err(read_err)?.permissions().mode();
    Ok(mode_first != mode_second)
}

#[cfg(test)]
mod tests {
    use std::fs::Permissions;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn equal_files_are_not_different() {
        let dir = tempdir().expect("tempdir");
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"same").expect("write");
        fs::write(&b, b"same").expect("write");
        fs::set_permissions(&a, Permissions::from_mode(0o644)).expect("chmod");
        fs::set_permissions(&b, Permissions::from_mode(0o644)).expect("chmod");

        assert!(!are_files_different(&a, &b).expect("diff"));
    }

    #[test]
    fn content_difference_is_detected() {
        let dir = tempdir().expect("tempdir");
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"one").expect("write");
        fs::write(&b, b"two").expect("write");

        assert!(are_files_different(&a, &b).expect("diff"));
    }

    #[test]
    fn mode_difference_alone_is_detected() {
        let dir = tempdir().expect("tempdir");
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"same").expect("write");
        fs::write(&b, b"same").expect("write");
        fs::set_permissions(&a, Permissions::from_mode(0o600)).expect("chmod");
        fs::set_permissions(&b, Permissions::from_mode(0o644)).expect("chmod");

        assert!(are_files_different(&a, &b).expect("diff"));
    }

    #[test]
    fn unreadable_file_aborts_with_diff_read() {
        let dir = tempdir().expect("tempdir");
        let a = dir.path().join("a");
        fs::write(&a, b"x").expect("write");

        let err = are_files_different(&a, &dir.path().join("missing")).expect_err("compared");
        assert!(matches!(err, FsError::DiffRead { .. }));
    }
}
