//! Run location housekeeping

use super::LaunchError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn lock_file_path(run_location: &Path, jobname: &str) -> PathBuf {
    run_location.join(format!("{jobname}.lock"))
}

/// Refuse to start over a lock file, or remove it when `override_lock` is set.
pub fn check_lock_file(
    run_location: &Path,
    jobname: &str,
    override_lock: bool,
) -> Result<(), LaunchError> {
    let lock_file = lock_file_path(run_location, jobname);
    if !lock_file.is_file() {
        return Ok(());
    }

    if !override_lock {
        return Err(LaunchError::LockFile { path: lock_file });
    }

    fs::remove_file(&lock_file).map_err(|source| LaunchError::LockFileRemoval {
        path: lock_file.clone(),
        source,
    })?;
    debug!(path = %lock_file.display(), "removed lock file");
    Ok(())
}

/// Delete `*.err` files left behind by an earlier run of `jobname`.
pub fn remove_err_files(run_location: &Path, jobname: &str) -> Result<usize, LaunchError> {
    let io_error = |source| LaunchError::Io {
        path: run_location.to_path_buf(),
        source,
    };

    let mut removed = 0;
    for entry in fs::read_dir(run_location).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !file_name.ends_with(".err") || !file_name.contains(jobname) || !path.is_file() {
            continue;
        }

        fs::remove_file(&path).map_err(|source| {
            debug!(
                path = %path.display(),
                "unable to remove error file, another instance may be running here"
            );
            LaunchError::Io {
                path: path.clone(),
                source,
            }
        })?;
        debug!(path = %path.display(), "removed temporary error file");
        removed += 1;
    }

    Ok(removed)
}

/// Last `max_lines` lines of a text file, empty if unreadable.
pub fn tail(path: &Path, max_lines: usize) -> String {
    let Ok(content) = fs::read_to_string(path) else {
        return String::new();
    };
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_lock_file_is_fine() {
        let dir = TempDir::new().unwrap();
        check_lock_file(dir.path(), "file", false).unwrap();
    }

    #[test]
    fn lock_file_blocks_start() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("file.lock"), "").unwrap();

        let err = check_lock_file(dir.path(), "file", false).unwrap_err();

        assert!(matches!(err, LaunchError::LockFile { .. }));
        assert!(dir.path().join("file.lock").exists());
    }

    #[test]
    fn override_removes_lock_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("file.lock"), "").unwrap();

        check_lock_file(dir.path(), "file", true).unwrap();

        assert!(!dir.path().join("file.lock").exists());
    }

    #[test]
    fn only_matching_error_files_are_removed() {
        let dir = TempDir::new().unwrap();
        for name in ["file0.err", "file1.err", "other.err", "file.out"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let removed = remove_err_files(dir.path(), "file").unwrap();

        assert_eq!(removed, 2);
        assert!(!dir.path().join("file0.err").exists());
        assert!(dir.path().join("other.err").exists());
        assert!(dir.path().join("file.out").exists());
    }

    #[test]
    fn tail_keeps_last_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "a\nb\nc\n").unwrap();

        assert_eq!(tail(&path, 2), "b\nc");
        assert_eq!(tail(&dir.path().join("missing"), 2), "");
    }
}
