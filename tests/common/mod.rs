//! Shared test helpers for build-numbers integration tests.
//!
//! All tests use temp directories with a local bare repository standing in
//! for the remote. Nothing touches the real repo or the network.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use build_numbers::config::{BuildNumbersConfig, Overrides};
use build_numbers::protocol::{Request, Settings};
use build_numbers::store::Identifier;
use tempfile::TempDir;

/// Default storage branch used throughout the tests.
pub const BRANCH: &str = "build-numbers";

/// Run git in `dir`, assert success, return trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = git_output(dir, args);
    assert!(
        out.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_owned()
}

/// Run git in `dir` without asserting.
pub fn git_output(dir: &Path, args: &[&str]) -> Output {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("failed to run git")
}

/// Create a bare remote and one clone with an initial commit on its
/// default branch pushed.
///
/// Returns `(clone, remote)`. The remote is configured as `origin`.
pub fn setup_with_remote() -> (TempDir, TempDir) {
    let remote = TempDir::new().expect("failed to create remote temp dir");
    git(remote.path(), &["init", "--bare", "--quiet"]);

    let repo = clone_of(&remote);
    std::fs::write(repo.path().join("README.md"), "# test repo\n").unwrap();
    git(repo.path(), &["add", "README.md"]);
    git(repo.path(), &["commit", "--quiet", "-m", "initial commit"]);
    git(repo.path(), &["push", "--quiet", "origin", "HEAD"]);

    (repo, remote)
}

/// Another clone of `remote`, as a job on a different machine would have.
pub fn clone_of(remote: &TempDir) -> TempDir {
    let repo = TempDir::new().expect("failed to create clone temp dir");
    git(
        repo.path(),
        &["clone", "--quiet", &remote.path().display().to_string(), "."],
    );
    git(repo.path(), &["config", "user.name", "Test"]);
    git(repo.path(), &["config", "user.email", "test@example.com"]);
    repo
}

/// Default settings, with worktrees created under `workspace_dir` so tests
/// can check that teardown leaves nothing behind.
pub fn settings(workspace_dir: &Path) -> Settings {
    settings_with_retries(workspace_dir, 0)
}

/// Like [`settings`], with `push_retries` set.
pub fn settings_with_retries(workspace_dir: &Path, push_retries: u32) -> Settings {
    let mut config = BuildNumbersConfig::default();
    config.sync.workspace_dir = Some(workspace_dir.to_owned());
    config.sync.push_retries = push_retries;
    config
        .resolve(&Overrides::default())
        .expect("default config resolves")
}

/// Request for `identifier`.
pub fn request(identifier: &str, increment: bool) -> Request {
    Request {
        identifier: Identifier::new(identifier).unwrap(),
        increment,
    }
}

/// Tip of `branch` on the bare remote, if it exists.
pub fn remote_tip(remote: &TempDir, branch: &str) -> Option<String> {
    let out = git_output(
        remote.path(),
        &["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")],
    );
    out.status
        .success()
        .then(|| String::from_utf8_lossy(&out.stdout).trim().to_owned())
}

/// Counter document at the tip of `branch` on the bare remote.
pub fn remote_document(remote: &TempDir, branch: &str) -> serde_json::Value {
    let raw = git(
        remote.path(),
        &["show", &format!("refs/heads/{branch}:build_numbers.json")],
    );
    serde_json::from_str(&raw).expect("counter document is valid JSON")
}

/// Number of commits reachable from `branch` on the bare remote.
pub fn remote_commit_count(remote: &TempDir, branch: &str) -> usize {
    git(
        remote.path(),
        &["rev-list", "--count", &format!("refs/heads/{branch}")],
    )
    .parse()
    .unwrap()
}

/// Worktrees registered in `repo`, including the main one.
pub fn worktree_count(repo: &Path) -> usize {
    git(repo, &["worktree", "list", "--porcelain"])
        .lines()
        .filter(|l| l.starts_with("worktree "))
        .count()
}

/// Entries left in `dir`.
pub fn entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|rd| rd.map(|e| e.unwrap().path()).collect())
        .unwrap_or_default()
}

/// Run the `build-numbers` binary in `dir` with a clean Actions environment.
pub fn build_numbers_in(dir: &Path, args: &[&str], envs: &[(&str, &Path)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_build-numbers"));
    cmd.args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .env("GIT_TERMINAL_PROMPT", "0")
        .env_remove("GITHUB_OUTPUT")
        .env_remove("GITHUB_ENV")
        .env_remove("INPUT_IDENTIFIER")
        .env_remove("INPUT_BRANCH")
        .env_remove("INPUT_INCREMENT")
        .env_remove("BUILD_NUMBERS_CONFIG");
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd.output().expect("failed to run build-numbers")
}
