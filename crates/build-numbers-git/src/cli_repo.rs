//! [`GitRepo`] backed by the `git` binary.
//!
//! Every method is one (occasionally two) git subprocess invocations run
//! with `LC_ALL=C` so failure classification can match git's messages, and
//! with terminal prompts disabled so a missing credential fails instead of
//! hanging a CI job.

use std::ffi::{OsStr, OsString};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::error::GitError;
use crate::repo::GitRepo;
use crate::types::{BranchName, FetchOutcome, GitOid, TreeEntry};

/// Substrings git prints when a push lost a race against another writer.
const CONCURRENT_UPDATE_MARKERS: &[&str] = &[
    "[rejected]",
    "non-fast-forward",
    "fetch first",
    "stale info",
    "cannot lock ref",
    "failed to update ref",
    "incorrect old value",
];

/// Namespace for the short-lived refs a fetch writes into.
const FETCH_REF_PREFIX: &str = "refs/build-numbers/fetch";

/// Per-process counter making fetch refs unique across threads.
static FETCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// A [`GitRepo`] implementation that shells out to `git`.
///
/// Construct via [`CliRepo::open`].
#[derive(Clone, Debug)]
pub struct CliRepo {
    root: PathBuf,
}

/// Captured result of one git invocation.
struct GitOutput {
    command: String,
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    success: bool,
}

impl GitOutput {
    fn into_error(self) -> GitError {
        GitError::CommandFailed {
            command: self.command,
            stderr: self.stderr.trim().to_owned(),
            exit_code: self.exit_code,
        }
    }

    /// Both streams, for classifying failures git reports on either.
    fn transcript(&self) -> String {
        format!("{}\n{}", self.stdout.trim(), self.stderr.trim())
            .trim()
            .to_owned()
    }
}

impl CliRepo {
    /// Open the git repository containing `path`.
    ///
    /// # Errors
    /// Returns an error if `path` is not inside a git working tree.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let toplevel = run(path, ["rev-parse", "--show-toplevel"])?;
        Ok(Self {
            root: PathBuf::from(toplevel.trim()),
        })
    }
}

impl GitRepo for CliRepo {
    fn root(&self) -> &Path {
        &self.root
    }

    fn common_dir(&self) -> Result<PathBuf, GitError> {
        let raw = run(&self.root, ["rev-parse", "--git-common-dir"])?;
        let dir = PathBuf::from(raw.trim());
        Ok(if dir.is_absolute() {
            dir
        } else {
            self.root.join(dir)
        })
    }

    fn config_get(&self, key: &str) -> Result<Option<String>, GitError> {
        let out = exec(&self.root, ["config", "--local", "--get", key], None)?;
        if out.success {
            return Ok(Some(out.stdout.trim().to_owned()));
        }
        // Exit code 1 means "key not set".
        if out.exit_code == Some(1) {
            return Ok(None);
        }
        Err(out.into_error())
    }

    fn config_set(&self, key: &str, value: &str) -> Result<(), GitError> {
        run(&self.root, ["config", "--local", key, value]).map(drop)
    }

    fn rev_parse_opt(&self, spec: &str) -> Result<Option<GitOid>, GitError> {
        let out = exec(&self.root, ["rev-parse", "--verify", "--quiet", spec], None)?;
        if out.success {
            return parse_oid(&out.command, &out.stdout).map(Some);
        }
        if out.exit_code == Some(1) {
            return Ok(None);
        }
        Err(out.into_error())
    }

    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError> {
        let out = exec(&self.root, ["hash-object", "-w", "--stdin"], Some(data))?;
        if !out.success {
            return Err(out.into_error());
        }
        parse_oid(&out.command, &out.stdout)
    }

    fn write_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, GitError> {
        let listing: String = entries
            .iter()
            .map(|e| format!("100644 blob {}\t{}\n", e.oid, e.name))
            .collect();
        let out = exec(&self.root, ["mktree"], Some(listing.as_bytes()))?;
        if !out.success {
            return Err(out.into_error());
        }
        parse_oid(&out.command, &out.stdout)
    }

    fn create_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        message: &str,
    ) -> Result<GitOid, GitError> {
        let mut args = vec!["commit-tree".to_owned(), tree.to_string()];
        for parent in parents {
            args.push("-p".to_owned());
            args.push(parent.to_string());
        }
        args.push("-m".to_owned());
        args.push(message.to_owned());
        let stdout = run(&self.root, &args)?;
        parse_oid("git commit-tree", &stdout)
    }

    fn fetch_branch(&self, remote: &str, branch: &BranchName) -> Result<FetchOutcome, GitError> {
        // Each fetch lands on its own ref. `--refmap=` stops git from also
        // updating refs/remotes/<remote>/<branch>, which concurrent fetches
        // on one clone would contend for.
        let scratch = format!(
            "{FETCH_REF_PREFIX}/{}-{}",
            std::process::id(),
            FETCH_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let refspec = format!("+{}:{scratch}", branch.local_ref());
        let out = exec(
            &self.root,
            [
                "fetch",
                "--no-tags",
                "--quiet",
                "--refmap=",
                remote,
                refspec.as_str(),
            ],
            None,
        )?;
        if !out.success {
            if out.stderr.contains("couldn't find remote ref") {
                debug!(%remote, %branch, "remote has no such branch");
                return Ok(FetchOutcome::Missing);
            }
            return Err(out.into_error());
        }

        let tip = self.rev_parse_opt(&scratch);
        match exec(&self.root, ["update-ref", "-d", scratch.as_str()], None) {
            Ok(del) if del.success => {}
            Ok(del) => debug!(%scratch, stderr = %del.stderr.trim(), "could not delete fetch ref"),
            Err(e) => debug!(%scratch, error = %e, "could not delete fetch ref"),
        }
        match tip? {
            Some(oid) => Ok(FetchOutcome::Fetched(oid)),
            None => Err(GitError::NotFound {
                message: format!("{scratch} missing right after fetch"),
            }),
        }
    }

    fn push(&self, remote: &str, source: GitOid, branch: &BranchName) -> Result<(), GitError> {
        let refspec = format!("{source}:{}", branch.local_ref());
        let out = exec(
            &self.root,
            ["push", "--porcelain", remote, refspec.as_str()],
            None,
        )?;
        if out.success {
            return Ok(());
        }
        let transcript = out.transcript();
        if is_concurrent_update(&transcript) {
            return Err(GitError::PushRejected {
                remote: remote.to_owned(),
                branch: branch.to_string(),
                message: summarize_push(&transcript),
            });
        }
        Err(GitError::PushFailed {
            remote: remote.to_owned(),
            message: summarize_push(&transcript),
        })
    }

    fn worktree_add(&self, path: &Path, target: GitOid) -> Result<(), GitError> {
        let target = target.to_string();
        run(
            &self.root,
            [
                OsStr::new("worktree"),
                OsStr::new("add"),
                OsStr::new("--detach"),
                OsStr::new("--quiet"),
                path.as_os_str(),
                OsStr::new(&target),
            ],
        )
        .map(drop)
    }

    fn worktree_remove(&self, path: &Path) -> Result<(), GitError> {
        let out = exec(
            &self.root,
            [
                OsStr::new("worktree"),
                OsStr::new("remove"),
                OsStr::new("--force"),
                path.as_os_str(),
            ],
            None,
        )?;
        if out.success {
            return Ok(());
        }
        if out.stderr.contains("is not a working tree") || out.stderr.contains("does not exist")
        {
            return Err(GitError::NotFound {
                message: format!("worktree {}", path.display()),
            });
        }
        Err(out.into_error())
    }

    fn worktree_prune(&self) -> Result<(), GitError> {
        run(&self.root, ["worktree", "prune"]).map(drop)
    }

    fn stage(&self, worktree: &Path, path: &Path) -> Result<(), GitError> {
        run(
            worktree,
            [OsStr::new("add"), OsStr::new("--"), path.as_os_str()],
        )
        .map(drop)
    }

    fn commit(&self, worktree: &Path, message: &str) -> Result<GitOid, GitError> {
        run(worktree, ["commit", "--quiet", "-m", message])?;
        self.head(worktree)
    }

    fn fast_forward(&self, worktree: &Path, target: GitOid) -> Result<(), GitError> {
        let target = target.to_string();
        let out = exec(
            worktree,
            ["merge", "--ff-only", "--quiet", target.as_str()],
            None,
        )?;
        if out.success {
            return Ok(());
        }
        if out
            .stderr
            .to_ascii_lowercase()
            .contains("not possible to fast-forward")
        {
            return Err(GitError::NotFastForward {
                path: worktree.to_owned(),
                message: out.stderr.trim().to_owned(),
            });
        }
        Err(out.into_error())
    }

    fn reset_hard(&self, worktree: &Path, target: GitOid) -> Result<(), GitError> {
        let target = target.to_string();
        run(worktree, ["reset", "--hard", "--quiet", target.as_str()]).map(drop)
    }

    fn head(&self, worktree: &Path) -> Result<GitOid, GitError> {
        let stdout = run(worktree, ["rev-parse", "HEAD"])?;
        parse_oid("git rev-parse HEAD", &stdout)
    }
}

// ---------------------------------------------------------------------------
// Subprocess helpers
// ---------------------------------------------------------------------------

fn exec<I, S>(dir: &Path, args: I, stdin: Option<&[u8]>) -> Result<GitOutput, GitError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
    let command = std::iter::once("git".to_owned())
        .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
        .collect::<Vec<_>>()
        .join(" ");
    debug!(dir = %dir.display(), %command, "running git");

    let mut cmd = Command::new("git");
    cmd.args(&args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .env("GIT_TERMINAL_PROMPT", "0");

    let output = match stdin {
        Some(input) => {
            let mut child = cmd
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()?;
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input)?;
            }
            child.wait_with_output()?
        }
        None => cmd.output()?,
    };

    Ok(GitOutput {
        command,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
        success: output.status.success(),
    })
}

/// Run git and return stdout, or [`GitError::CommandFailed`] on non-zero exit.
fn run<I, S>(dir: &Path, args: I) -> Result<String, GitError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let out = exec(dir, args, None)?;
    if out.success {
        Ok(out.stdout)
    } else {
        Err(out.into_error())
    }
}

fn parse_oid(command: &str, raw: &str) -> Result<GitOid, GitError> {
    let value = raw.trim();
    value.parse().map_err(|_| GitError::InvalidOid {
        command: command.to_owned(),
        value: value.to_owned(),
    })
}

fn is_concurrent_update(transcript: &str) -> bool {
    CONCURRENT_UPDATE_MARKERS
        .iter()
        .any(|marker| transcript.contains(marker))
}

/// Keep the lines that say what happened to the ref; fall back to everything.
fn summarize_push(transcript: &str) -> String {
    let relevant: Vec<&str> = transcript
        .lines()
        .map(str::trim)
        .filter(|l| l.contains("rejected") || l.starts_with("error:") || l.starts_with("fatal:"))
        .collect();
    if relevant.is_empty() {
        transcript.to_owned()
    } else {
        relevant.join("; ")
    }
}
