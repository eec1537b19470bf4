use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use build_numbers_git::{
    BranchName, CliRepo, FetchOutcome, GitError, GitOid, GitRepo, TreeEntry,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {}: {e}", args.join(" ")));
    assert!(
        out.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_owned()
}

/// A bare remote plus a clone of it with one commit pushed.
fn setup_clone() -> (TempDir, TempDir, CliRepo) {
    let remote = TempDir::new().unwrap();
    git(remote.path(), &["init", "--bare", "--quiet"]);

    let clone = TempDir::new().unwrap();
    git(
        clone.path(),
        &["clone", "--quiet", &remote.path().display().to_string(), "."],
    );
    git(clone.path(), &["config", "user.email", "test@test.com"]);
    git(clone.path(), &["config", "user.name", "Test User"]);
    std::fs::write(clone.path().join("README.md"), "# test repo\n").unwrap();
    git(clone.path(), &["add", "README.md"]);
    git(clone.path(), &["commit", "--quiet", "-m", "initial commit"]);
    git(clone.path(), &["push", "--quiet", "origin", "HEAD"]);

    let repo = CliRepo::open(clone.path()).unwrap();
    (remote, clone, repo)
}

fn orphan_commit(repo: &CliRepo, contents: &str, message: &str) -> GitOid {
    let blob = repo.write_blob(contents.as_bytes()).unwrap();
    let tree = repo
        .write_tree(&[TreeEntry {
            name: "counters.json".to_owned(),
            oid: blob,
        }])
        .unwrap();
    repo.create_commit(tree, &[], message).unwrap()
}

fn branch() -> BranchName {
    BranchName::new("build-numbers").unwrap()
}

// ===========================================================================
// Repository
// ===========================================================================

#[test]
fn open_discovers_toplevel_from_subdirectory() {
    let (_remote, clone, _repo) = setup_clone();
    let sub = clone.path().join("nested");
    std::fs::create_dir_all(&sub).unwrap();
    let repo = CliRepo::open(&sub).unwrap();
    assert_eq!(
        repo.root().canonicalize().unwrap(),
        clone.path().canonicalize().unwrap()
    );
}

#[test]
fn open_outside_repo_fails() {
    let dir = TempDir::new().unwrap();
    assert!(CliRepo::open(dir.path()).is_err());
}

#[test]
fn common_dir_is_dot_git() {
    let (_remote, clone, repo) = setup_clone();
    let common = repo.common_dir().unwrap();
    assert_eq!(
        common.canonicalize().unwrap(),
        clone.path().join(".git").canonicalize().unwrap()
    );
}

#[test]
fn config_roundtrip() {
    let (_remote, _clone, repo) = setup_clone();
    assert_eq!(repo.config_get("buildnumbers.test").unwrap(), None);
    repo.config_set("buildnumbers.test", "hello").unwrap();
    assert_eq!(
        repo.config_get("buildnumbers.test").unwrap().as_deref(),
        Some("hello")
    );
}

#[test]
fn rev_parse_opt_missing_branch_is_none() {
    let (_remote, _clone, repo) = setup_clone();
    assert_eq!(repo.rev_parse_opt("refs/heads/nope").unwrap(), None);
    assert!(repo.rev_parse_opt("HEAD").unwrap().is_some());
}

// ===========================================================================
// Objects
// ===========================================================================

#[test]
fn orphan_commit_has_no_parents() {
    let (_remote, clone, repo) = setup_clone();
    let commit = orphan_commit(&repo, "{}\n", "seed");
    let parents = git(
        clone.path(),
        &["rev-list", "--parents", "-n", "1", &commit.to_string()],
    );
    assert_eq!(parents, commit.to_string());
    let contents = git(clone.path(), &["show", &format!("{commit}:counters.json")]);
    assert_eq!(contents, "{}");
}

// ===========================================================================
// Remote
// ===========================================================================

#[test]
fn fetch_missing_branch_reports_missing() {
    let (_remote, _clone, repo) = setup_clone();
    assert_eq!(
        repo.fetch_branch("origin", &branch()).unwrap(),
        FetchOutcome::Missing
    );
}

#[test]
fn push_creates_branch_then_fetch_finds_it() {
    let (_remote, _clone, repo) = setup_clone();
    let commit = orphan_commit(&repo, "{}\n", "seed");
    repo.push("origin", commit, &branch()).unwrap();
    assert_eq!(
        repo.fetch_branch("origin", &branch()).unwrap(),
        FetchOutcome::Fetched(commit)
    );
}

#[test]
fn parallel_fetches_after_remote_moved_all_succeed() {
    let (remote, clone, repo) = setup_clone();
    let seed = orphan_commit(&repo, "{}\n", "seed");
    repo.push("origin", seed, &branch()).unwrap();
    assert_eq!(
        repo.fetch_branch("origin", &branch()).unwrap(),
        FetchOutcome::Fetched(seed)
    );

    // Another machine advances the branch, leaving this clone behind.
    let other = TempDir::new().unwrap();
    git(
        other.path(),
        &["clone", "--quiet", &remote.path().display().to_string(), "."],
    );
    git(other.path(), &["config", "user.email", "other@test.com"]);
    git(other.path(), &["config", "user.name", "Other"]);
    git(other.path(), &["fetch", "--quiet", "origin", "build-numbers"]);
    let advanced = git(
        other.path(),
        &["commit-tree", "FETCH_HEAD^{tree}", "-p", "FETCH_HEAD", "-m", "advance"],
    );
    git(
        other.path(),
        &["push", "--quiet", "origin", &format!("{advanced}:refs/heads/build-numbers")],
    );
    let advanced: GitOid = advanced.parse().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repo = repo.clone();
            std::thread::spawn(move || repo.fetch_branch("origin", &branch()))
        })
        .collect();
    for handle in handles {
        assert_eq!(
            handle.join().unwrap().unwrap(),
            FetchOutcome::Fetched(advanced)
        );
    }

    // Per-fetch refs are cleaned up.
    assert_eq!(git(clone.path(), &["for-each-ref", "refs/build-numbers/"]), "");
}

#[test]
fn push_of_unrelated_history_is_rejected() {
    let (_remote, _clone, repo) = setup_clone();
    let first = orphan_commit(&repo, "{}\n", "first");
    let second = orphan_commit(&repo, "{\"a\": 1}\n", "second");
    repo.push("origin", first, &branch()).unwrap();

    let err = repo.push("origin", second, &branch()).unwrap_err();
    assert!(err.is_push_rejection(), "expected rejection, got {err}");
}

#[test]
fn push_to_unknown_remote_is_a_failure_not_a_rejection() {
    let (_remote, _clone, repo) = setup_clone();
    let commit = orphan_commit(&repo, "{}\n", "seed");
    let err = repo.push("nowhere", commit, &branch()).unwrap_err();
    assert!(matches!(err, GitError::PushFailed { .. }), "got {err}");
}

// ===========================================================================
// Worktrees
// ===========================================================================

#[test]
fn worktree_lifecycle() {
    let (_remote, clone, repo) = setup_clone();
    let seed = orphan_commit(&repo, "{}\n", "seed");
    let parent = TempDir::new().unwrap();
    let wt = parent.path().join("wt");

    repo.worktree_add(&wt, seed).unwrap();
    assert_eq!(repo.head(&wt).unwrap(), seed);
    assert_eq!(
        std::fs::read_to_string(wt.join("counters.json")).unwrap(),
        "{}\n"
    );

    std::fs::write(wt.join("counters.json"), "{\"a\": 1}\n").unwrap();
    repo.stage(&wt, Path::new("counters.json")).unwrap();
    let next = repo.commit(&wt, "bump").unwrap();
    assert_ne!(next, seed);

    repo.reset_hard(&wt, seed).unwrap();
    assert_eq!(repo.head(&wt).unwrap(), seed);
    repo.fast_forward(&wt, next).unwrap();
    assert_eq!(repo.head(&wt).unwrap(), next);

    repo.worktree_remove(&wt).unwrap();
    assert!(!wt.exists());
    let listing = git(clone.path(), &["worktree", "list", "--porcelain"]);
    assert_eq!(listing.matches("worktree ").count(), 1, "{listing}");
}

#[test]
fn worktree_add_into_empty_existing_dir() {
    let (_remote, _clone, repo) = setup_clone();
    let seed = orphan_commit(&repo, "{}\n", "seed");
    let dir = TempDir::new().unwrap();
    repo.worktree_add(dir.path(), seed).unwrap();
    assert!(dir.path().join("counters.json").exists());
    repo.worktree_remove(dir.path()).unwrap();
}

#[test]
fn worktree_remove_unknown_path_is_not_found() {
    let (_remote, _clone, repo) = setup_clone();
    let dir = TempDir::new().unwrap();
    let err = repo.worktree_remove(&dir.path().join("ghost")).unwrap_err();
    assert!(matches!(err, GitError::NotFound { .. }), "got {err}");
    repo.worktree_prune().unwrap();
}

#[test]
fn fast_forward_refuses_divergent_history() {
    let (_remote, _clone, repo) = setup_clone();
    let a = orphan_commit(&repo, "{}\n", "a");
    let b = orphan_commit(&repo, "{\"x\": 2}\n", "b");
    let parent = TempDir::new().unwrap();
    let wt = parent.path().join("wt");
    repo.worktree_add(&wt, a).unwrap();

    let err = repo.fast_forward(&wt, b).unwrap_err();
    assert!(
        matches!(err, GitError::NotFastForward { .. } | GitError::CommandFailed { .. }),
        "got {err}"
    );
    assert_eq!(repo.head(&wt).unwrap(), a);
    repo.worktree_remove(&wt).unwrap();
}
