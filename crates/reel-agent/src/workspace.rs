//! Lock-guarded working directory for a run
//!
//! Scene sources, backups and renderer scratch files all live under the
//! working directory. An exclusive OS lock on `.reel.lock` keeps two runs
//! from writing to the same paths at once. The lock dies with the process,
//! so a lock file left behind by a killed run does not block the next one.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Name of the lock file inside the working directory
pub const LOCK_FILE: &str = ".reel.lock";

/// An exclusively claimed working directory. The lock is released on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    lock_file: File,
}

impl Workspace {
    /// Create `dir` if needed and claim it
    pub fn acquire(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let lock = dir.join(LOCK_FILE);

        let mut lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock)?;

        if let Err(e) = lock_file.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(Error::WorkspaceBusy { dir, lock });
            }
            return Err(e.into());
        }

        if let Err(e) = lock_file
            .set_len(0)
            .and_then(|()| writeln!(lock_file, "{}", std::process::id()))
        {
            tracing::warn!("Could not record pid in {}: {}", lock.display(), e);
        }
        tracing::debug!("claimed workspace {}", dir.display());
        Ok(Self { dir, lock_file })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persisted source for an entry point: `<dir>/<entry>.py`
    pub fn source_path(&self, entry_point: &str) -> PathBuf {
        self.dir.join(format!("{}.py", file_stem(entry_point)))
    }

    /// Kept copy of the last source handed to the renderer: `<dir>/<entry>.run.py`
    pub fn run_path(&self, entry_point: &str) -> PathBuf {
        self.dir.join(format!("{}.run.py", file_stem(entry_point)))
    }

    /// Throwaway file used when sources are not kept
    pub fn scratch_path(&self, entry_point: &str) -> PathBuf {
        self.dir.join(format!(".reel_scene_{}.py", file_stem(entry_point)))
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.dir.join("backups")
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.lock_file) {
            tracing::warn!("Failed to release lock in {}: {}", self.dir.display(), e);
        }
    }
}

/// Restrict a name to characters safe in a file name
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "scene".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let first = Workspace::acquire(dir.path()).unwrap();
        let err = Workspace::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, Error::WorkspaceBusy { .. }));
        drop(first);
        assert!(Workspace::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_acquire_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("renders").join("today");
        let workspace = Workspace::acquire(&nested).unwrap();
        assert!(nested.join(LOCK_FILE).exists());
        assert_eq!(workspace.source_path("circleScene"), nested.join("circleScene.py"));
        assert_eq!(workspace.run_path("circleScene"), nested.join("circleScene.run.py"));
        assert_eq!(
            workspace.scratch_path("circleScene"),
            nested.join(".reel_scene_circleScene.py")
        );
    }

    #[test]
    fn test_lock_file_records_pid() {
        let dir = tempfile::tempdir().unwrap();
        let _workspace = Workspace::acquire(dir.path()).unwrap();
        let contents = std::fs::read_to_string(dir.path().join(LOCK_FILE)).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_lock_file_left_by_killed_run_is_reclaimed() {
        // A run that died without dropping its guard leaves the file but no OS lock
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE), "4242424242\n").unwrap();
        let workspace = Workspace::acquire(dir.path()).unwrap();
        let contents = std::fs::read_to_string(dir.path().join(LOCK_FILE)).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
        drop(workspace);
        assert!(Workspace::acquire(dir.path()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_forgotten_guard_holds_lock_until_handle_released() {
        // Releasing the handle is what the OS does for a dead process
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(dir.path()).unwrap();
        let handle = workspace.lock_file.try_clone().unwrap();
        std::mem::forget(workspace);
        assert!(Workspace::acquire(dir.path()).is_err());
        FileExt::unlock(&handle).unwrap();
        assert!(Workspace::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_file_stem_sanitizes() {
        assert_eq!(file_stem("circleScene"), "circleScene");
        assert_eq!(file_stem("../etc/passwd"), "___etc_passwd");
        assert_eq!(file_stem(""), "scene");
    }
}
