//! Copying the staged files over the install directory.

use crate::error::{Result, UpdateError};
use std::{
    fs, io,
    path::Path,
    thread,
    time::Duration,
};
use walkdir::WalkDir;

/// Copies one file, replacing the destination's contents.
pub trait FileCopier {
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// `std::fs::copy`: truncates and rewrites the destination in place, so a
/// file is never deleted before its replacement is written.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsCopier;

impl FileCopier for FsCopier {
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }
}

#[cfg(windows)]
const LOCK_OS_ERRORS: &[i32] = &[32, 33]; // sharing violation, lock violation
#[cfg(not(windows))]
const LOCK_OS_ERRORS: &[i32] = &[16, 26]; // EBUSY, ETXTBSY

/// Whether `err` looks like another process still holding the file.
pub fn is_lock_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
        || err
            .raw_os_error()
            .is_some_and(|code| LOCK_OS_ERRORS.contains(&code))
}

/// Copy `from` to `to`. A lock error gets exactly one retry after
/// `retry_delay`; any other error, or a second failure, is returned.
pub fn copy_with_retry(
    copier: &impl FileCopier,
    from: &Path,
    to: &Path,
    retry_delay: Duration,
) -> Result<()> {
    match copier.copy_file(from, to) {
        Ok(()) => Ok(()),
        Err(e) if is_lock_error(&e) => {
            log::warn!(
                "{} is locked ({e}); retrying in {} ms",
                to.display(),
                retry_delay.as_millis()
            );
            thread::sleep(retry_delay);
            copier.copy_file(from, to).map_err(|e| {
                UpdateError::Copy(format!("{} still locked after retry: {e}", to.display()))
            })
        }
        Err(e) => Err(UpdateError::Copy(format!(
            "cannot copy {} to {}: {e}",
            from.display(),
            to.display()
        ))),
    }
}

/// Copy every file under `source` into `target`, keeping relative paths.
/// Returns the number of files copied. Stops at the first failure; files
/// already copied stay in place.
pub fn copy_tree(
    copier: &impl FileCopier,
    source: &Path,
    target: &Path,
    retry_delay: Duration,
) -> Result<usize> {
    if !source.is_dir() {
        return Err(UpdateError::Copy(format!(
            "source directory {} not found",
            source.display()
        )));
    }
    fs::create_dir_all(target)?;

    let mut copied = 0;
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(|e| UpdateError::Copy(format!("cannot read source tree: {e}")))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| UpdateError::Copy(format!("unexpected path {}: {e}", entry.path().display())))?;
        let dest = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_with_retry(copier, entry.path(), &dest, retry_delay)?;
        copied += 1;
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Fails the first `failures` attempts for files with the given name.
    struct FlakyCopier {
        name: &'static str,
        failures: usize,
        kind: io::ErrorKind,
        attempts: RefCell<HashMap<PathBuf, usize>>,
    }

    impl FlakyCopier {
        fn new(name: &'static str, failures: usize, kind: io::ErrorKind) -> Self {
            Self {
                name,
                failures,
                kind,
                attempts: RefCell::new(HashMap::new()),
            }
        }

        fn attempts_for(&self, path: &Path) -> usize {
            self.attempts.borrow().get(path).copied().unwrap_or(0)
        }
    }

    impl FileCopier for FlakyCopier {
        fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
            let mut attempts = self.attempts.borrow_mut();
            let n = attempts.entry(to.to_path_buf()).or_insert(0);
            *n += 1;
            if to.file_name().is_some_and(|f| f == self.name) && *n <= self.failures {
                return Err(io::Error::new(self.kind, "file in use"));
            }
            fs::copy(from, to).map(|_| ())
        }
    }

    fn staged_tree() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("v2.5.0");
        let target = root.path().join("app");
        fs::create_dir_all(source.join("lib/nested")).unwrap();
        fs::create_dir_all(source.join("empty")).unwrap();
        fs::write(source.join("kiota_ui_client"), b"new main").unwrap();
        fs::write(source.join("lib/a.dll"), b"a").unwrap();
        fs::write(source.join("lib/nested/b.dll"), b"b").unwrap();

        fs::create_dir_all(target.join("lib")).unwrap();
        fs::write(target.join("kiota_ui_client"), b"old main, longer than new").unwrap();
        fs::write(target.join("keep.txt"), b"user file").unwrap();
        (root, source, target)
    }

    #[test]
    fn copies_whole_tree_overwriting() {
        let (_root, source, target) = staged_tree();

        let copied = copy_tree(&FsCopier, &source, &target, Duration::ZERO).unwrap();

        assert_eq!(copied, 3);
        assert_eq!(fs::read(target.join("kiota_ui_client")).unwrap(), b"new main");
        assert_eq!(fs::read(target.join("lib/nested/b.dll")).unwrap(), b"b");
        assert!(target.join("empty").is_dir());
        assert_eq!(fs::read(target.join("keep.txt")).unwrap(), b"user file");

        // idempotent
        copy_tree(&FsCopier, &source, &target, Duration::ZERO).unwrap();
    }

    #[test]
    fn locked_file_succeeds_on_single_retry() {
        let (_root, source, target) = staged_tree();
        let copier = FlakyCopier::new("kiota_ui_client", 1, io::ErrorKind::PermissionDenied);

        copy_tree(&copier, &source, &target, Duration::from_millis(5)).unwrap();

        assert_eq!(copier.attempts_for(&target.join("kiota_ui_client")), 2);
        assert_eq!(fs::read(target.join("kiota_ui_client")).unwrap(), b"new main");
    }

    #[test]
    fn lock_that_persists_fails_after_one_retry() {
        let (_root, source, target) = staged_tree();
        let copier = FlakyCopier::new("kiota_ui_client", usize::MAX, io::ErrorKind::PermissionDenied);

        let err = copy_tree(&copier, &source, &target, Duration::from_millis(5)).unwrap_err();

        assert!(matches!(err, UpdateError::Copy(_)), "{err}");
        assert_eq!(copier.attempts_for(&target.join("kiota_ui_client")), 2);
    }

    #[test]
    fn non_lock_error_is_not_retried() {
        let (_root, source, target) = staged_tree();
        let copier = FlakyCopier::new("a.dll", usize::MAX, io::ErrorKind::InvalidData);

        let err = copy_tree(&copier, &source, &target, Duration::from_millis(5)).unwrap_err();

        assert!(matches!(err, UpdateError::Copy(_)), "{err}");
        assert_eq!(copier.attempts_for(&target.join("lib/a.dll")), 1);
    }

    #[test]
    fn missing_source_is_copy_error() {
        let root = tempfile::tempdir().unwrap();
        let err = copy_tree(
            &FsCopier,
            &root.path().join("gone"),
            &root.path().join("app"),
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, UpdateError::Copy(_)));
    }

    #[test]
    fn lock_classification() {
        assert!(is_lock_error(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_lock_error(&io::Error::from(io::ErrorKind::NotFound)));
        #[cfg(unix)]
        assert!(is_lock_error(&io::Error::from_raw_os_error(26)));
        #[cfg(windows)]
        assert!(is_lock_error(&io::Error::from_raw_os_error(32)));
    }
}
