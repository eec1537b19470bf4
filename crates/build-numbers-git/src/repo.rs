//! The [`GitRepo`] trait: the abstraction boundary between the counter
//! protocol and git.
//!
//! | Group        | Methods                                              |
//! |--------------|------------------------------------------------------|
//! | Repository   | `root`, `common_dir`, `config_get`, `config_set`     |
//! | Rev-parse    | `rev_parse_opt`                                      |
//! | Objects      | `write_blob`, `write_tree`, `create_commit`          |
//! | Remote       | `fetch_branch`, `push`                               |
//! | Worktrees    | `worktree_add`, `worktree_remove`, `worktree_prune`  |
//! | In-worktree  | `stage`, `commit`, `fast_forward`, `reset_hard`, `head` |

use std::path::{Path, PathBuf};

use crate::error::GitError;
use crate::types::{BranchName, FetchOutcome, GitOid, TreeEntry};

/// The git abstraction trait.
///
/// Implementations may be backed by the git CLI ([`CliRepo`](crate::CliRepo))
/// or by a test double.
///
/// # Object safety
///
/// No generic methods and no `Self` in return position, so callers can hold
/// `&dyn GitRepo`.
pub trait GitRepo {
    // -----------------------------------------------------------------------
    // Repository
    // -----------------------------------------------------------------------

    /// Top-level directory of the main working tree.
    fn root(&self) -> &Path;

    /// The git directory shared by every worktree of this repository.
    ///
    /// Replaces: `git rev-parse --git-common-dir`.
    fn common_dir(&self) -> Result<PathBuf, GitError>;

    /// Read a repository-local config value, `None` if unset.
    ///
    /// Replaces: `git config --local --get <key>`.
    fn config_get(&self, key: &str) -> Result<Option<String>, GitError>;

    /// Write a repository-local config value.
    ///
    /// Replaces: `git config --local <key> <value>`.
    fn config_set(&self, key: &str, value: &str) -> Result<(), GitError>;

    // -----------------------------------------------------------------------
    // Rev-parse
    // -----------------------------------------------------------------------

    /// Resolve a revision to an OID, returning `None` if it does not exist.
    ///
    /// Replaces: `git rev-parse --verify --quiet <spec>`.
    fn rev_parse_opt(&self, spec: &str) -> Result<Option<GitOid>, GitError>;

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    /// Write a blob to the object store and return its OID.
    ///
    /// Replaces: `git hash-object -w --stdin`.
    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError>;

    /// Write a tree object from a flat list of entries.
    ///
    /// Replaces: `git mktree`.
    fn write_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, GitError>;

    /// Create a commit object without moving any ref.
    ///
    /// An empty `parents` slice produces a root (orphan) commit.
    ///
    /// Replaces: `git commit-tree`.
    fn create_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        message: &str,
    ) -> Result<GitOid, GitError>;

    // -----------------------------------------------------------------------
    // Remote
    // -----------------------------------------------------------------------

    /// Fetch `branch` from `remote` and return its tip.
    ///
    /// Safe to call concurrently on one repository: no shared ref (such as
    /// the remote-tracking ref) is written, so parallel fetches never fail
    /// on each other's ref locks.
    ///
    /// Returns [`FetchOutcome::Missing`] when the remote has no such branch.
    ///
    /// Replaces: `git fetch --refmap= <remote> +refs/heads/<b>:<private ref>`.
    fn fetch_branch(&self, remote: &str, branch: &BranchName) -> Result<FetchOutcome, GitError>;

    /// Push `source` to `refs/heads/<branch>` on `remote` (fast-forward only).
    ///
    /// Returns [`GitError::PushRejected`] when the remote branch has moved
    /// to something `source` does not descend from.
    ///
    /// Replaces: `git push <remote> <oid>:refs/heads/<branch>`.
    fn push(&self, remote: &str, source: GitOid, branch: &BranchName) -> Result<(), GitError>;

    // -----------------------------------------------------------------------
    // Worktrees
    // -----------------------------------------------------------------------

    /// Add a worktree at `path` with a detached HEAD at `target`.
    ///
    /// `path` must not exist or must be an empty directory.
    ///
    /// Replaces: `git worktree add --detach <path> <target>`.
    fn worktree_add(&self, path: &Path, target: GitOid) -> Result<(), GitError>;

    /// Remove the worktree at `path`, discarding local modifications.
    ///
    /// Returns [`GitError::NotFound`] if `path` is not a registered worktree.
    ///
    /// Replaces: `git worktree remove --force <path>`.
    fn worktree_remove(&self, path: &Path) -> Result<(), GitError>;

    /// Drop registrations of worktrees whose directories are gone.
    ///
    /// Replaces: `git worktree prune`.
    fn worktree_prune(&self) -> Result<(), GitError>;

    // -----------------------------------------------------------------------
    // In-worktree operations
    // -----------------------------------------------------------------------

    /// Stage `path` (relative to `worktree`).
    ///
    /// Replaces: `git -C <worktree> add -- <path>`.
    fn stage(&self, worktree: &Path, path: &Path) -> Result<(), GitError>;

    /// Commit the staged changes in `worktree` and return the new HEAD.
    ///
    /// Replaces: `git -C <worktree> commit -m <message>`.
    fn commit(&self, worktree: &Path, message: &str) -> Result<GitOid, GitError>;

    /// Fast-forward `worktree` to `target`.
    ///
    /// Returns [`GitError::NotFastForward`] if HEAD is not an ancestor.
    ///
    /// Replaces: `git -C <worktree> merge --ff-only <target>`.
    fn fast_forward(&self, worktree: &Path, target: GitOid) -> Result<(), GitError>;

    /// Reset `worktree` (index and files) to `target`.
    ///
    /// Replaces: `git -C <worktree> reset --hard <target>`.
    fn reset_hard(&self, worktree: &Path, target: GitOid) -> Result<(), GitError>;

    /// Current HEAD of `worktree`.
    ///
    /// Replaces: `git -C <worktree> rev-parse HEAD`.
    fn head(&self, worktree: &Path) -> Result<GitOid, GitError>;
}
