//! The increment-or-read protocol.
//!
//! One invocation walks these states:
//!
//! ```text
//! Start → CredentialsSet → WorkspaceReady → Locked → Synced → Loaded
//!       → Decided ─┬─ Increment → Mutated → Committed → Pushed ─┐
//!                  └─ ReadOnly ──────────────────────────────────┤
//!                                                 Unlocked → TornDown → Done
//! ```
//!
//! Any failure jumps to `Failed`, but only after the lock is released and
//! the workspace removed. Cleanup failures are logged and never replace the
//! error (or the value) the forward steps produced.

use std::time::Duration;

use build_numbers_git::{GitOid, GitRepo};
use tracing::{debug, info, instrument, warn};

use crate::error::SyncError;
use crate::lock::{self, LockGuard};
use crate::store::{self, CounterDocument, Identifier};
use crate::workspace::{Workspace, WorkspaceSpec};

/// Committer identity for automated commits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// `user.name`.
    pub name: String,
    /// `user.email`.
    pub email: String,
}

/// Everything about *where* the counters live and *how* to update them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Storage branch, remote, document name and worktree location.
    pub workspace: WorkspaceSpec,
    /// Identity written to the repository config before any commit.
    pub identity: Identity,
    /// How many times to rebuild the update on top of a newer remote tip
    /// after a rejected push. 0 surfaces the first conflict.
    pub push_retries: u32,
}

/// What one invocation was asked to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Counter to read or advance.
    pub identifier: Identifier,
    /// Advance the counter (`true`) or only read it.
    pub increment: bool,
}

/// Which branch of the decision the invocation took.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdatePath {
    /// The counter was advanced, committed and pushed.
    Incremented,
    /// The counter was only read; nothing was committed.
    ReadOnly,
}

/// Result of a successful invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// The counter that was read or advanced.
    pub identifier: Identifier,
    /// Final value to report.
    pub value: u64,
    /// Path taken.
    pub path: UpdatePath,
    /// Commit pushed to the storage branch, if any.
    pub commit: Option<GitOid>,
    /// Push attempts made (0 on the read-only path).
    pub attempts: u32,
}

/// A counter still at 0 is always advanced, whatever the caller asked, so the
/// first value ever reported for an identifier is 1.
#[must_use]
pub const fn should_increment(requested: bool, current: u64) -> bool {
    requested || current == 0
}

/// Make sure automated commits have an author.
///
/// Only writes the config keys that differ, so repeated runs on one clone
/// do not contend on the config file lock. Invocations starting together
/// on a fresh clone do contend: a failed write is retried, and succeeds as
/// soon as the value reads back as wanted.
///
/// # Errors
/// [`SyncError::Git`] if the config cannot be read, or still cannot be
/// written after [`CONFIG_WRITE_ATTEMPTS`] tries.
pub fn set_identity(repo: &dyn GitRepo, identity: &Identity) -> Result<(), SyncError> {
    for (key, value) in [
        ("user.name", identity.name.as_str()),
        ("user.email", identity.email.as_str()),
    ] {
        let mut attempt = 0;
        while repo.config_get(key)?.as_deref() != Some(value) {
            attempt += 1;
            match repo.config_set(key, value) {
                Ok(()) => break,
                Err(e) if attempt < CONFIG_WRITE_ATTEMPTS => {
                    debug!(key, attempt, error = %e, "config write failed; retrying");
                    std::thread::sleep(CONFIG_RETRY_DELAY * attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

/// Tries per identity key before giving up.
pub const CONFIG_WRITE_ATTEMPTS: u32 = 5;

const CONFIG_RETRY_DELAY: Duration = Duration::from_millis(25);

/// Run one invocation end to end.
///
/// # Errors
/// The first error any forward step raised. Lock release and workspace
/// teardown have already happened when this returns.
#[instrument(
    skip_all,
    fields(
        identifier = %request.identifier,
        increment = request.increment,
        branch = %settings.workspace.branch,
    )
)]
pub fn run(
    repo: &dyn GitRepo,
    settings: &Settings,
    request: &Request,
) -> Result<Outcome, SyncError> {
    info!("Using branch: {}", settings.workspace.branch);
    info!("Using identifier: {}", request.identifier);
    info!("Increment flag: {}", request.increment);

    set_identity(repo, &settings.identity)?;
    let workspace = Workspace::setup(repo, settings.workspace.clone())?;

    let result = locked_update(repo, &workspace, settings, request);

    if let Err(e) = workspace.teardown() {
        warn!(error = %e, "workspace teardown failed");
    }
    result
}

/// Hold the lock around sync → read → decide → write.
fn locked_update(
    repo: &dyn GitRepo,
    workspace: &Workspace<'_>,
    settings: &Settings,
    request: &Request,
) -> Result<Outcome, SyncError> {
    let common_dir = repo.common_dir()?;
    let guard = LockGuard::acquire(&lock::lock_path(&common_dir, workspace.branch()))?;

    let result = update(workspace, settings, request);

    if let Err(e) = guard.release() {
        warn!(error = %e, "lock release failed");
    }
    result
}

fn update(
    workspace: &Workspace<'_>,
    settings: &Settings,
    request: &Request,
) -> Result<Outcome, SyncError> {
    let identifier = &request.identifier;
    let document_path = workspace.document_path();
    let mut attempts = 0;

    workspace.sync()?;
    loop {
        store::ensure_document(&document_path)?;
        let mut document = CounterDocument::load(&document_path)?;
        document.initialize(identifier);
        let current = document.get(identifier);

        if !should_increment(request.increment, current) {
            info!("Build number retrieval only, no increment performed.");
            return Ok(Outcome {
                identifier: identifier.clone(),
                value: current,
                path: UpdatePath::ReadOnly,
                commit: None,
                attempts,
            });
        }

        let value = document.increment(identifier)?;
        document.persist(&document_path)?;
        let commit =
            workspace.commit(&format!("Update build number for {identifier} to {value}"))?;

        attempts += 1;
        match workspace.push(commit) {
            Ok(()) => {
                return Ok(Outcome {
                    identifier: identifier.clone(),
                    value,
                    path: UpdatePath::Incremented,
                    commit: Some(commit),
                    attempts,
                });
            }
            Err(e) if e.is_push_conflict() && attempts <= settings.push_retries => {
                warn!(
                    attempt = attempts,
                    retries = settings.push_retries,
                    "push rejected; rebuilding on the new remote tip"
                );
                workspace.reset_to_remote()?;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_counter_is_always_incremented() {
        assert!(should_increment(false, 0));
        assert!(should_increment(true, 0));
    }

    #[test]
    fn existing_counter_follows_the_flag() {
        assert!(should_increment(true, 7));
        assert!(!should_increment(false, 7));
    }
}
