//! Advisory lock around the counter read-modify-write.
//!
//! Uses an OS file lock (`flock` on Unix, `LockFileEx` on Windows) through
//! `fs4`. The kernel drops the lock when the holder exits, so a crashed job
//! can never leave a stale lock behind.
//!
//! The lock only serializes invocations that share a filesystem. Jobs on
//! different machines are arbitrated by push rejection instead.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use build_numbers_git::BranchName;
use fs4::fs_std::FileExt;
use tracing::{debug, info};

use crate::error::SyncError;

/// Directory (inside the git common dir) holding the per-branch lock files.
const LOCK_DIR: &str = "build-numbers";

/// Lock file for `branch` inside a repository's git common dir.
///
/// Every worktree of a clone shares the common dir, so every invocation on
/// the same clone contends on the same file.
#[must_use]
pub fn lock_path(common_dir: &Path, branch: &BranchName) -> PathBuf {
    common_dir
        .join(LOCK_DIR)
        .join(format!("{}.lock", branch.as_str().replace('/', "--")))
}

/// An exclusively held advisory lock.
///
/// Released by [`LockGuard::release`], or on drop if `release` was never
/// reached (early return, panic).
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    file: Option<File>,
}

impl LockGuard {
    /// Block until the exclusive lock on `path` is held.
    ///
    /// Creates the lock file and its parent directory if needed.
    ///
    /// # Errors
    /// [`SyncError::Lock`] if the file cannot be created or locked.
    pub fn acquire(path: &Path) -> Result<Self, SyncError> {
        let lock_err = |source: std::io::Error| SyncError::Lock {
            path: path.to_owned(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(lock_err)?;

        debug!(path = %path.display(), "waiting for lock");
        FileExt::lock_exclusive(&file).map_err(lock_err)?;
        info!(path = %path.display(), "lock acquired");

        Ok(Self {
            path: path.to_owned(),
            file: Some(file),
        })
    }

    /// Release the lock. Consumes the guard, so it runs at most once.
    ///
    /// # Errors
    /// [`SyncError::Lock`] if the unlock call fails. The file handle is
    /// closed regardless, which releases the lock at the OS level.
    pub fn release(mut self) -> Result<(), SyncError> {
        self.unlock().map_err(|source| SyncError::Lock {
            path: self.path.clone(),
            source,
        })
    }

    fn unlock(&mut self) -> std::io::Result<()> {
        match self.file.take() {
            Some(file) => {
                let result = FileExt::unlock(&file);
                debug!(path = %self.path.display(), "lock released");
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.file.is_some() {
            let _ = self.unlock();
        }
    }
}
