//! Per-invocation worktree on the storage branch.
//!
//! Each invocation gets its own detached worktree in a fresh temporary
//! directory, positioned at the tip of the storage branch. Detached HEADs
//! mean concurrent invocations on one clone never fight over a local branch
//! checkout; the branch itself only ever moves on the remote, by push.
//!
//! # Bootstrap
//!
//! When neither the remote nor the local repository has the branch, it is
//! created from scratch as a parentless commit holding `{}` and pushed. Two
//! jobs racing to do this is expected on a repository's first run; the
//! loser's push is rejected and it proceeds on the winner's branch.

use std::path::{Path, PathBuf};

use build_numbers_git::{
    BranchName, FetchOutcome, GitError, GitOid, GitRepo, TreeEntry,
};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use crate::error::SyncError;
use crate::store::CounterDocument;

/// Commit message of the root commit on a freshly created storage branch.
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit to initialize branch";

/// Prefix of the temporary worktree directories.
const WORKTREE_PREFIX: &str = "build-numbers-worktree-";

/// Where a workspace lives and what it holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceSpec {
    /// Storage branch.
    pub branch: BranchName,
    /// Remote the branch is fetched from and pushed to.
    pub remote: String,
    /// Counter document file name at the branch root.
    pub file_name: String,
    /// Parent directory for worktrees; the system temp dir if `None`.
    pub parent_dir: Option<PathBuf>,
}

/// Outcome of trying to create the storage branch on the remote.
#[derive(Debug)]
pub enum BranchCreation {
    /// This invocation created the branch at the given commit.
    Created(GitOid),
    /// Another invocation created it first.
    AlreadyExists,
    /// Creation failed for some other reason.
    Failed(GitError),
}

/// Create the storage branch on the remote as an orphan holding `{}`.
///
/// Never returns an error: the three possible results are encoded in
/// [`BranchCreation`] so the caller decides which ones abort.
pub fn create_orphan_branch(repo: &dyn GitRepo, spec: &WorkspaceSpec) -> BranchCreation {
    let seed = match seed_commit(repo, &spec.file_name) {
        Ok(oid) => oid,
        Err(e) => return BranchCreation::Failed(e),
    };
    match repo.push(&spec.remote, seed, &spec.branch) {
        Ok(()) => BranchCreation::Created(seed),
        Err(e) if e.is_push_rejection() => BranchCreation::AlreadyExists,
        Err(e) => BranchCreation::Failed(e),
    }
}

fn seed_commit(repo: &dyn GitRepo, file_name: &str) -> Result<GitOid, GitError> {
    let json = CounterDocument::default()
        .to_json()
        .map_err(|e| GitError::IoError(e.into()))?;
    let blob = repo.write_blob(json.as_bytes())?;
    let tree = repo.write_tree(&[TreeEntry {
        name: file_name.to_owned(),
        oid: blob,
    }])?;
    repo.create_commit(tree, &[], INITIAL_COMMIT_MESSAGE)
}

/// An isolated worktree bound to one invocation.
///
/// Torn down by [`Workspace::teardown`], or on drop if teardown was never
/// reached.
pub struct Workspace<'r> {
    repo: &'r dyn GitRepo,
    spec: WorkspaceSpec,
    path: PathBuf,
    dir: Option<TempDir>,
    torn_down: bool,
}

impl<'r> Workspace<'r> {
    /// Check out the storage branch into a new worktree, creating the branch
    /// first if it exists nowhere.
    ///
    /// # Errors
    /// [`SyncError::Workspace`] if the branch cannot be resolved, created or
    /// checked out.
    #[instrument(skip(repo, spec), fields(branch = %spec.branch, remote = %spec.remote))]
    pub fn setup(repo: &'r dyn GitRepo, spec: WorkspaceSpec) -> Result<Self, SyncError> {
        let start = resolve_start(repo, &spec)?;

        let dir = temp_dir(spec.parent_dir.as_deref()).map_err(|e| workspace_err(&spec, &e))?;
        let path = dir.path().to_owned();
        repo.worktree_add(&path, start)
            .map_err(|e| workspace_err(&spec, &e))?;
        info!(path = %path.display(), commit = %start.short(), "workspace ready");

        Ok(Self {
            repo,
            spec,
            path,
            dir: Some(dir),
            torn_down: false,
        })
    }

    /// Worktree directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute path of the counter document inside the worktree.
    #[must_use]
    pub fn document_path(&self) -> PathBuf {
        self.path.join(&self.spec.file_name)
    }

    /// Storage branch this workspace is bound to.
    #[must_use]
    pub const fn branch(&self) -> &BranchName {
        &self.spec.branch
    }

    /// Bring the worktree up to the remote tip.
    ///
    /// A branch that exists only locally has nothing to sync against.
    ///
    /// # Errors
    /// [`SyncError::Workspace`] if the fetch fails or the worktree cannot
    /// be fast-forwarded.
    pub fn sync(&self) -> Result<(), SyncError> {
        match self
            .repo
            .fetch_branch(&self.spec.remote, &self.spec.branch)
            .map_err(|e| workspace_err(&self.spec, &e))?
        {
            FetchOutcome::Fetched(tip) => {
                self.repo
                    .fast_forward(&self.path, tip)
                    .map_err(|e| workspace_err(&self.spec, &e))?;
                debug!(commit = %tip.short(), "workspace synced");
            }
            FetchOutcome::Missing => {
                debug!("branch not on remote yet; nothing to sync");
            }
        }
        Ok(())
    }

    /// Throw away local commits and move to the remote tip.
    ///
    /// Used after a rejected push, before redoing the update.
    ///
    /// # Errors
    /// [`SyncError::Workspace`] if the fetch or reset fails, or the branch
    /// has vanished from the remote.
    pub fn reset_to_remote(&self) -> Result<(), SyncError> {
        match self
            .repo
            .fetch_branch(&self.spec.remote, &self.spec.branch)
            .map_err(|e| workspace_err(&self.spec, &e))?
        {
            FetchOutcome::Fetched(tip) => self
                .repo
                .reset_hard(&self.path, tip)
                .map_err(|e| workspace_err(&self.spec, &e)),
            FetchOutcome::Missing => Err(SyncError::Workspace {
                branch: self.spec.branch.to_string(),
                message: format!("branch disappeared from `{}`", self.spec.remote),
            }),
        }
    }

    /// Stage the counter document and commit it.
    ///
    /// # Errors
    /// [`SyncError::Git`] if staging or committing fails.
    pub fn commit(&self, message: &str) -> Result<GitOid, SyncError> {
        self.repo
            .stage(&self.path, Path::new(&self.spec.file_name))?;
        let oid = self.repo.commit(&self.path, message)?;
        info!(commit = %oid.short(), "{message}");
        Ok(oid)
    }

    /// Push `commit` to the storage branch.
    ///
    /// # Errors
    /// [`SyncError::PushConflict`] if the remote branch moved;
    /// [`SyncError::Git`] for any other push failure.
    pub fn push(&self, commit: GitOid) -> Result<(), SyncError> {
        match self.repo.push(&self.spec.remote, commit, &self.spec.branch) {
            Ok(()) => {
                info!(commit = %commit.short(), branch = %self.spec.branch, "pushed");
                Ok(())
            }
            Err(GitError::PushRejected { branch, message, .. }) => {
                Err(SyncError::PushConflict { branch, message })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the worktree and its directory.
    ///
    /// An already-missing worktree counts as removed.
    ///
    /// # Errors
    /// [`SyncError::Teardown`] if something could not be removed. Callers
    /// treat this as a warning.
    pub fn teardown(mut self) -> Result<(), SyncError> {
        self.remove()
    }

    fn remove(&mut self) -> Result<(), SyncError> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let mut problems = Vec::new();
        match self.repo.worktree_remove(&self.path) {
            Ok(()) | Err(GitError::NotFound { .. }) => {}
            Err(e) => problems.push(e.to_string()),
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => problems.push(e.to_string()),
        }
        // Already empty or gone; dropping it only clears the handle.
        drop(self.dir.take());
        if let Err(e) = self.repo.worktree_prune() {
            problems.push(e.to_string());
        }

        if problems.is_empty() {
            debug!(path = %self.path.display(), "workspace removed");
            Ok(())
        } else {
            Err(SyncError::Teardown {
                path: self.path.clone(),
                message: problems.join("; "),
            })
        }
    }
}

impl Drop for Workspace<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!(error = %e, "workspace cleanup failed");
        }
    }
}

impl std::fmt::Debug for Workspace<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("spec", &self.spec)
            .field("path", &self.path)
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

/// Pick the commit the worktree starts at: remote tip, else local branch,
/// else a freshly bootstrapped branch.
fn resolve_start(repo: &dyn GitRepo, spec: &WorkspaceSpec) -> Result<GitOid, SyncError> {
    let fetch = |spec: &WorkspaceSpec| {
        repo.fetch_branch(&spec.remote, &spec.branch)
            .map_err(|e| workspace_err(spec, &e))
    };

    if let FetchOutcome::Fetched(tip) = fetch(spec)? {
        info!(branch = %spec.branch, "using existing branch from {}", spec.remote);
        return Ok(tip);
    }
    if let Some(local) = repo
        .rev_parse_opt(&spec.branch.local_ref())
        .map_err(|e| workspace_err(spec, &e))?
    {
        info!(branch = %spec.branch, "using local branch (not yet on {})", spec.remote);
        return Ok(local);
    }

    info!(branch = %spec.branch, "branch does not exist; creating it as an orphan");
    match create_orphan_branch(repo, spec) {
        BranchCreation::Created(seed) => {
            info!(commit = %seed.short(), "created and published {}", spec.branch);
            Ok(seed)
        }
        BranchCreation::AlreadyExists => {
            info!(branch = %spec.branch, "another job created the branch first; using it");
            match fetch(spec)? {
                FetchOutcome::Fetched(tip) => Ok(tip),
                FetchOutcome::Missing => Err(SyncError::Workspace {
                    branch: spec.branch.to_string(),
                    message: format!(
                        "push reported the branch exists but `{}` does not have it",
                        spec.remote
                    ),
                }),
            }
        }
        BranchCreation::Failed(e) => Err(workspace_err(spec, &e)),
    }
}

fn temp_dir(parent: Option<&Path>) -> std::io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(WORKTREE_PREFIX);
    match parent {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            builder.tempdir_in(parent)
        }
        None => builder.tempdir(),
    }
}

fn workspace_err(spec: &WorkspaceSpec, e: &dyn std::fmt::Display) -> SyncError {
    SyncError::Workspace {
        branch: spec.branch.to_string(),
        message: e.to_string(),
    }
}
