//! Atomic file replacement and backup naming for snapshot files.
//!
//! Readers of a canonical path observe either the previous content or the new
//! content, never a partial write: new bytes go to a temp file in the same
//! directory and are moved into place with a single `rename`.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::UsageError;

/// Temp file used for writing `path` before it is renamed into place
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Replace `path` with `contents` atomically.
///
/// The parent directory is created if needed. The temp file is created with
/// O_CREAT|O_EXCL so a pre-planted symlink cannot redirect the write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), UsageError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| UsageError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let temp_path = temp_path_for(path);
    let write_err = |source| UsageError::Write {
        path: temp_path.clone(),
        source,
    };

    // Leftover from an interrupted write
    let _ = fs::remove_file(&temp_path);

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .map_err(write_err)?;
    file.write_all(contents).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    if let Err(source) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(UsageError::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}

/// Backup path `<stem>.<NN>.<ext>` for sequence number `seq`.
///
/// Two digits minimum; the number widens naturally past 99.
pub fn backup_path(path: &Path, seq: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.{:02}.{}", stem, seq, ext.to_string_lossy()),
        None => format!("{}.{:02}", stem, seq),
    };
    path.with_file_name(name)
}

/// Move `path` to the lowest free backup name.
///
/// Each name is claimed with `hard_link`, which fails instead of replacing an
/// existing file, so a backup created meanwhile by another process is skipped
/// rather than overwritten. Returns `None` when there was nothing to move.
pub fn move_to_backup(path: &Path) -> Result<Option<PathBuf>, UsageError> {
    let mut seq = 1;
    let backup = loop {
        let candidate = backup_path(path, seq);
        match fs::hard_link(path, &candidate) {
            Ok(()) => break candidate,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => seq += 1,
            Err(e) if e.kind() == ErrorKind::NotFound && !path.exists() => return Ok(None),
            Err(source) => {
                return Err(UsageError::Backup {
                    from: path.to_path_buf(),
                    to: candidate,
                    source,
                })
            }
        }
    };

    fs::remove_file(path).map_err(|source| UsageError::Backup {
        from: path.to_path_buf(),
        to: backup.clone(),
        source,
    })?;
    Ok(Some(backup))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_creates_parent_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token-usage.json");

        write_atomic(&path, b"{\"a\":1}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}");

        write_atomic(&path, b"{\"a\":2}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":2}");

        // No temp file left behind
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_write_atomic_ignores_stale_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token-usage.json");
        fs::write(temp_path_for(&path), "partial").unwrap();

        write_atomic(&path, b"full").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "full");
    }

    #[test]
    fn test_write_atomic_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let err = write_atomic(&blocker.join("token-usage.json"), b"{}").unwrap_err();
        assert!(matches!(err, UsageError::CreateDir { .. }));
    }

    #[test]
    fn test_backup_path_format() {
        let path = Path::new("/s/abc/token-usage.json");
        assert_eq!(
            backup_path(path, 1),
            PathBuf::from("/s/abc/token-usage.01.json")
        );
        assert_eq!(
            backup_path(path, 12),
            PathBuf::from("/s/abc/token-usage.12.json")
        );
        assert_eq!(
            backup_path(path, 100),
            PathBuf::from("/s/abc/token-usage.100.json")
        );
        assert_eq!(
            backup_path(Path::new("/s/usage"), 3),
            PathBuf::from("/s/usage.03")
        );
    }

    #[test]
    fn test_move_to_backup_never_replaces_existing_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token-usage.json");
        fs::write(backup_path(&path, 1), "one").unwrap();
        fs::write(backup_path(&path, 3), "three").unwrap();

        fs::write(&path, "current").unwrap();
        assert_eq!(move_to_backup(&path).unwrap(), Some(backup_path(&path, 2)));

        // Appears after the gap was filled, as if written by another process
        fs::write(backup_path(&path, 4), "four").unwrap();
        fs::write(&path, "next").unwrap();
        assert_eq!(move_to_backup(&path).unwrap(), Some(backup_path(&path, 5)));

        assert_eq!(fs::read_to_string(backup_path(&path, 1)).unwrap(), "one");
        assert_eq!(fs::read_to_string(backup_path(&path, 2)).unwrap(), "current");
        assert_eq!(fs::read_to_string(backup_path(&path, 3)).unwrap(), "three");
        assert_eq!(fs::read_to_string(backup_path(&path, 4)).unwrap(), "four");
        assert_eq!(fs::read_to_string(backup_path(&path, 5)).unwrap(), "next");
        assert!(!path.exists());
    }

    #[test]
    fn test_move_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token-usage.json");

        assert_eq!(move_to_backup(&path).unwrap(), None);

        fs::write(&path, "first").unwrap();
        let backup = move_to_backup(&path).unwrap().unwrap();
        assert_eq!(backup, backup_path(&path, 1));
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(&backup).unwrap(), "first");
    }
}
