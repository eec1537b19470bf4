//! Error taxonomy for a build-number invocation.
//!
//! [`SyncError`] is the single error type returned by the store, the lock
//! guard, the workspace manager and the protocol. Messages name the failed
//! step and, where there is one, what to do about it: the top-level binary
//! prints exactly one of these as the action's failure reason.

use std::path::PathBuf;

use build_numbers_git::GitError;
use thiserror::Error;

/// Unified error type for the counter protocol.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The counter document could not be read or is not a JSON object of
    /// non-negative integers.
    #[error("failed to read {}: {message}", path.display())]
    Read {
        /// Document path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The counter document could not be written.
    #[error("failed to write {}: {message}", path.display())]
    Write {
        /// Document path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The advisory lock could not be acquired (or released).
    #[error("failed to lock {}: {source}", path.display())]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The storage branch could not be checked out or bootstrapped.
    #[error("could not prepare workspace for branch `{branch}`: {message}")]
    Workspace {
        /// Storage branch.
        branch: String,
        /// What went wrong.
        message: String,
    },

    /// Another invocation advanced the remote branch first.
    #[error(
        "push to `{branch}` was rejected because the remote branch moved: {message}\n  \
         Another job updated the counters concurrently; re-run this job \
         (or set push_retries) to retry on top of the new state."
    )]
    PushConflict {
        /// Storage branch.
        branch: String,
        /// Details reported by git.
        message: String,
    },

    /// Incrementing would exceed `u64::MAX`.
    #[error("build number for `{identifier}` cannot be incremented past {}", u64::MAX)]
    Overflow {
        /// The identifier whose counter is saturated.
        identifier: String,
    },

    /// The workspace could not be fully removed. Never fatal on its own.
    #[error("failed to tear down workspace {}: {message}", path.display())]
    Teardown {
        /// Workspace directory.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Any other git failure (identity, commit, fetch).
    #[error(transparent)]
    Git(#[from] GitError),
}

impl SyncError {
    /// Return `true` if this error is a lost push race.
    #[must_use]
    pub const fn is_push_conflict(&self) -> bool {
        matches!(self, Self::PushConflict { .. })
    }
}
