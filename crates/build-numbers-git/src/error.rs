//! Error types for git operations.
//!
//! [`GitError`] is the single error type returned by all [`GitRepo`](crate::GitRepo)
//! methods. Push outcomes are split so callers can tell "someone else advanced
//! the branch" apart from every other push failure without parsing messages.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`GitRepo`](crate::GitRepo) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// A requested object, ref, or worktree was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// Git printed something that should have been an OID but was not.
    #[error("invalid OID `{value}` from `{command}`")]
    InvalidOid {
        /// The command whose output was parsed.
        command: String,
        /// The raw value that failed validation.
        value: String,
    },

    /// An I/O error occurred (process spawn, pipe, etc.).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The remote refused the update because the branch moved underneath us
    /// (non-fast-forward, fetch first, lost ref-lock race).
    #[error("push of `{branch}` to `{remote}` rejected: {message}")]
    PushRejected {
        /// The remote name (e.g., `"origin"`).
        remote: String,
        /// The branch that could not be updated.
        branch: String,
        /// Details reported by git.
        message: String,
    },

    /// A push failed for any reason other than a concurrent update
    /// (network, authentication, hook refusal).
    #[error("push to `{remote}` failed: {message}")]
    PushFailed {
        /// The remote name.
        remote: String,
        /// Details reported by git.
        message: String,
    },

    /// A fast-forward was impossible because the histories diverged.
    #[error("cannot fast-forward worktree at {}: {message}", path.display())]
    NotFastForward {
        /// Worktree that could not be advanced.
        path: PathBuf,
        /// Details reported by git.
        message: String,
    },

    /// A git command exited non-zero for an unclassified reason.
    #[error("`{command}` failed{}: {stderr}", exit_code.map(|c| format!(" (exit code {c})")).unwrap_or_default())]
    CommandFailed {
        /// The command that was run (e.g., `"git worktree add ..."`).
        command: String,
        /// Stderr output from git, trimmed.
        stderr: String,
        /// Process exit code, if available.
        exit_code: Option<i32>,
    },
}

impl GitError {
    /// Return `true` if this error means a concurrent writer won the race.
    #[must_use]
    pub const fn is_push_rejection(&self) -> bool {
        matches!(self, Self::PushRejected { .. })
    }
}
