//! End-to-end tests of both strategies against real git repositories.
//!
//! An "origin" repository is built with a few branches and cloned into a
//! working copy that the gateway drives. No network I/O: the remote is a
//! local path.
//!
//! Tests skip gracefully if `git` is not installed.

use std::path::Path;
use std::process::{Command, Stdio};

use tempfile::TempDir;

use mergeorder_core::config::{AppConfig, Strategy};
use mergeorder_core::errors::{CoreError, SearchError, VcsError};
use mergeorder_core::search::{run_search, SearchOutcome, StepOutcome};
use mergeorder_core::vcs::{GitCli, VcsGateway};

// ===========================================================================
// Helpers
// ===========================================================================

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=Test User", "-c", "user.email=test@example.com"])
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn commit_file(dir: &Path, path: &str, content: &str, message: &str) {
    std::fs::write(dir.join(path), content).unwrap();
    git(dir, &["add", path]);
    git(dir, &["commit", "-q", "-m", message]);
}

/// Origin with `main`, `left` (edits the line `main` later changes too) and
/// `docs` (touches an unrelated file), cloned into `work`.
fn setup(tmp: &Path) -> std::path::PathBuf {
    let origin = tmp.join("origin");
    std::fs::create_dir_all(&origin).unwrap();
    git(&origin, &["init", "-q"]);
    git(&origin, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    commit_file(&origin, "config.toml", "name = \"demo\"\nversion = 1\ntimeout = 30\n", "initial");
    commit_file(&origin, "README.md", "# demo\n", "readme");

    git(&origin, &["checkout", "-q", "-b", "left"]);
    commit_file(&origin, "config.toml", "name = \"left\"\nversion = 1\ntimeout = 30\n", "left");

    git(&origin, &["checkout", "-q", "main"]);
    git(&origin, &["checkout", "-q", "-b", "docs"]);
    commit_file(&origin, "README.md", "# demo\n\nUsage.\n", "docs");

    git(&origin, &["checkout", "-q", "main"]);
    commit_file(
        &origin,
        "config.toml",
        "name = \"main\"\nversion = 1\ntimeout = 30\n",
        "main moves",
    );

    clone_into(&origin, &tmp.join("work"))
}

fn clone_into(origin: &Path, work: &Path) -> std::path::PathBuf {
    let status = Command::new("git")
        .arg("clone")
        .arg("-q")
        .arg(origin)
        .arg(work)
        .status()
        .expect("failed to run git clone");
    assert!(status.success(), "git clone failed");
    work.to_path_buf()
}

/// Origin where `accent` and `main` both rewrite the single line of
/// `café.txt`, cloned into `work`.
fn setup_non_ascii(tmp: &Path) -> std::path::PathBuf {
    let origin = tmp.join("origin");
    std::fs::create_dir_all(&origin).unwrap();
    git(&origin, &["init", "-q"]);
    git(&origin, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    commit_file(&origin, "café.txt", "menu\n", "initial");

    git(&origin, &["checkout", "-q", "-b", "accent"]);
    commit_file(&origin, "café.txt", "menu du jour\n", "accent");

    git(&origin, &["checkout", "-q", "main"]);
    commit_file(&origin, "café.txt", "carte\n", "main moves");

    clone_into(&origin, &tmp.join("work"))
}

fn config_for(work: &Path, strategy: Strategy) -> AppConfig {
    let mut config = AppConfig::default();
    config.repo.path = work.to_path_buf();
    config.repo.command_timeout_secs = 60;
    config.search.strategy = strategy;
    config
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn test_exhaustive_simulation_on_real_repo() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let work = setup(tmp.path());
    let config = config_for(&work, Strategy::Exhaustive);
    let gateway = GitCli::from_config(&config.repo);

    let report = run_search(&gateway, &config, &names(&["left", "docs"]), false)
        .await
        .unwrap();
    let SearchOutcome::Exhaustive(order) = report.outcome else {
        panic!("expected exhaustive outcome");
    };

    assert_eq!(order.permutations_evaluated, 2);
    assert_eq!(order.order.names(), vec!["left", "docs"]);
    assert!(order.order.cumulative_score > 0.0);
    let left = &order.steps[0];
    assert_eq!(left.outcome, StepOutcome::Conflict);
    assert_eq!(left.signal.touched_file_count, 1);
    assert_eq!(left.signal.conflict_block_count, 1);
    assert_eq!(order.steps[1].outcome, StepOutcome::Clean);

    // Checkout restored, simulation branch gone, tree clean.
    assert_eq!(git(&work, &["symbolic-ref", "--short", "HEAD"]).trim(), "main");
    assert_eq!(git(&work, &["branch", "--format=%(refname:short)"]).trim(), "main");
    assert!(git(&work, &["status", "--porcelain"]).trim().is_empty());
}

#[tokio::test]
async fn test_independent_ranking_on_real_repo() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let work = setup(tmp.path());
    let config = config_for(&work, Strategy::Independent);
    let gateway = GitCli::from_config(&config.repo);
    let head_before = git(&work, &["rev-parse", "HEAD"]);

    let report = run_search(&gateway, &config, &names(&["left", "docs"]), false)
        .await
        .unwrap();
    let SearchOutcome::Independent(ranking) = report.outcome else {
        panic!("expected independent outcome");
    };

    assert_eq!(ranking.names(), vec!["docs", "left"]);
    assert_eq!(ranking.ranking[0].score.final_score, 0.0);
    let left = &ranking.ranking[1];
    assert_eq!(left.signal.conflict_block_count, 1);
    assert_eq!(left.signal.touched_file_count, 1);
    assert!(left.score.final_score > 0.0);
    assert_eq!(git(&work, &["rev-parse", "HEAD"]), head_before);
}

#[tokio::test]
async fn test_dirty_real_repo_is_refused() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let work = setup(tmp.path());
    std::fs::write(work.join("scratch.txt"), "wip\n").unwrap();
    let config = config_for(&work, Strategy::Exhaustive);
    let gateway = GitCli::from_config(&config.repo);

    let err = run_search(&gateway, &config, &names(&["left"]), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Search(SearchError::Vcs(VcsError::DirtyWorkingTree { ref entries }))
            if entries == &vec!["?? scratch.txt".to_string()]
    ));
}

#[tokio::test]
async fn test_resolve_missing_branch() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let work = setup(tmp.path());
    let gateway = GitCli::from_config(&config_for(&work, Strategy::Exhaustive).repo);

    let left = gateway.resolve_branch("left").await.unwrap();
    assert_eq!(left.revision.len(), 40);
    assert!(matches!(
        gateway.resolve_branch("missing").await,
        Err(VcsError::RefNotFound(r)) if r == "origin/missing"
    ));
    assert!(!gateway.branch_exists("left").await.unwrap());
    assert!(gateway.branch_exists("main").await.unwrap());
}

#[tokio::test]
async fn test_exhaustive_runs_without_configured_identity() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let work = setup(tmp.path());
    // An empty local name shadows any global identity, so git would refuse
    // to merge or commit unless the gateway supplies one.
    git(&work, &["config", "user.name", ""]);
    git(&work, &["config", "user.email", ""]);
    let config = config_for(&work, Strategy::Exhaustive);
    let gateway = GitCli::from_config(&config.repo);

    let report = run_search(&gateway, &config, &names(&["left"]), false)
        .await
        .unwrap();
    let SearchOutcome::Exhaustive(order) = report.outcome else {
        panic!("expected exhaustive outcome");
    };
    assert_eq!(order.steps[0].outcome, StepOutcome::Conflict);
    assert_eq!(order.steps[0].signal.conflict_block_count, 1);
    assert_eq!(git(&work, &["symbolic-ref", "--short", "HEAD"]).trim(), "main");
}

#[tokio::test]
async fn test_non_ascii_conflicted_path_is_read() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let work = setup_non_ascii(tmp.path());
    git(&work, &["config", "merge.conflictStyle", "merge"]);
    let config = config_for(&work, Strategy::Exhaustive);
    let gateway = GitCli::from_config(&config.repo);

    let report = run_search(&gateway, &config, &names(&["accent"]), false)
        .await
        .unwrap();
    let SearchOutcome::Exhaustive(order) = report.outcome else {
        panic!("expected exhaustive outcome");
    };
    let step = &order.steps[0];
    assert_eq!(step.outcome, StepOutcome::Conflict);
    assert_eq!(step.signal.touched_file_count, 1);
    assert_eq!(step.signal.conflict_block_count, 1);
    assert_eq!(step.signal.conflict_line_count, 5);
    assert!(git(&work, &["status", "--porcelain"]).trim().is_empty());
}
