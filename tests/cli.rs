//! End-to-end runs of the `build-numbers` binary.

mod common;

use std::path::Path;

use common::{BRANCH, build_numbers_in, entries, remote_document, remote_tip};
use serde_json::json;
use tempfile::TempDir;

fn stdout(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

/// Point worktrees at `work` through the repository config file.
fn write_config(repo: &Path, work: &Path, extra: &str) {
    std::fs::create_dir_all(repo.join(".github")).unwrap();
    std::fs::write(
        repo.join(".github/build-numbers.toml"),
        format!("[sync]\nworkspace_dir = {:?}\n{extra}", work.display().to_string()),
    )
    .unwrap();
}

#[test]
fn prints_and_publishes_the_build_number() {
    let (repo, remote) = common::setup_with_remote();
    let work = TempDir::new().unwrap();
    write_config(repo.path(), work.path(), "");
    let files = TempDir::new().unwrap();
    let output_file = files.path().join("output");
    let env_file = files.path().join("env");

    for expected in 1..=2 {
        let out = build_numbers_in(
            repo.path(),
            &["--identifier", "app"],
            &[
                ("GITHUB_OUTPUT", output_file.as_path()),
                ("GITHUB_ENV", env_file.as_path()),
            ],
        );
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        assert_eq!(stdout(&out), format!("build-number={expected}\n"));
    }

    assert_eq!(
        std::fs::read_to_string(&output_file).unwrap(),
        "build-number=1\nbuild-number=2\n"
    );
    assert_eq!(
        std::fs::read_to_string(&env_file).unwrap(),
        "BUILD_NUMBER=1\nBUILD_NUMBER=2\n"
    );
    assert_eq!(remote_document(&remote, BRANCH), json!({ "app": 2 }));
    assert!(entries(work.path()).is_empty());
}

#[test]
fn increment_false_reads_without_pushing() {
    let (repo, remote) = common::setup_with_remote();
    let work = TempDir::new().unwrap();
    write_config(repo.path(), work.path(), "");

    let out = build_numbers_in(repo.path(), &["--identifier", "app"], &[]);
    assert!(out.status.success());
    let tip = remote_tip(&remote, BRANCH);

    let out = build_numbers_in(
        repo.path(),
        &["--identifier", "app", "--increment", "False"],
        &[],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout(&out), "build-number=1\n");
    assert_eq!(remote_tip(&remote, BRANCH), tip);
}

#[test]
fn inputs_come_from_action_environment() {
    let (repo, remote) = common::setup_with_remote();
    let work = TempDir::new().unwrap();
    write_config(repo.path(), work.path(), "");

    let mut cmd = std::process::Command::new(env!("CARGO_BIN_EXE_build-numbers"));
    let out = cmd
        .current_dir(repo.path())
        .env_remove("GITHUB_OUTPUT")
        .env_remove("GITHUB_ENV")
        .env("INPUT_IDENTIFIER", "docs")
        .env("INPUT_BRANCH", "ci-counters")
        .env("INPUT_INCREMENT", "")
        .output()
        .unwrap();

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout(&out), "build-number=1\n");
    assert_eq!(remote_document(&remote, "ci-counters"), json!({ "docs": 1 }));
}

#[test]
fn config_file_settings_apply() {
    let (repo, remote) = common::setup_with_remote();
    let work = TempDir::new().unwrap();
    write_config(
        repo.path(),
        work.path(),
        "\n[store]\nbranch = \"from-config\"\n\n[git]\nuser_name = \"ci-bot\"\n",
    );

    let out = build_numbers_in(repo.path(), &["--identifier", "app"], &[]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(remote_tip(&remote, "from-config").is_some());
    let author = common::git(
        remote.path(),
        &["log", "-1", "--format=%an", "refs/heads/from-config"],
    );
    assert_eq!(author, "ci-bot");
}

#[test]
fn missing_identifier_fails_with_annotation() {
    let (repo, _remote) = common::setup_with_remote();

    let out = build_numbers_in(repo.path(), &[], &[]);

    assert_eq!(out.status.code(), Some(1));
    assert!(
        stdout(&out).starts_with("::error::Action failed with error: "),
        "{}",
        stdout(&out)
    );
}

#[test]
fn bad_config_fails_with_annotation() {
    let (repo, _remote) = common::setup_with_remote();
    std::fs::create_dir_all(repo.path().join(".github")).unwrap();
    std::fs::write(
        repo.path().join(".github/build-numbers.toml"),
        "[store]\nbranchh = \"x\"\n",
    )
    .unwrap();

    let out = build_numbers_in(repo.path(), &["--identifier", "app"], &[]);

    assert_eq!(out.status.code(), Some(1));
    let text = stdout(&out);
    assert!(text.starts_with("::error::Action failed with error: "), "{text}");
    assert!(text.contains("line 2"), "{text}");
}

#[test]
fn unreachable_remote_fails_with_annotation() {
    let (repo, _remote) = common::setup_with_remote();
    let work = TempDir::new().unwrap();
    write_config(repo.path(), work.path(), "");
    common::git(repo.path(), &["remote", "set-url", "origin", "/nonexistent/remote.git"]);

    let out = build_numbers_in(repo.path(), &["--identifier", "app"], &[]);

    assert_eq!(out.status.code(), Some(1));
    assert!(stdout(&out).starts_with("::error::"), "{}", stdout(&out));
    assert!(entries(work.path()).is_empty());
}
