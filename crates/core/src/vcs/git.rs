//! Asynchronous `git` CLI gateway.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::{BranchRef, TrialMergeOutcome, VcsGateway};
use crate::config::{RepoConfig, ResolutionPolicy};
use crate::errors::VcsError;

const SIM_USER_NAME: &str = "mergeorder";
const SIM_USER_EMAIL: &str = "mergeorder@localhost";

/// Raw result of a git invocation that may legitimately exit non-zero.
struct GitOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Gateway that shells out to `git` inside one checkout.
///
/// Every invocation is bounded by `timeout`; a command that does not finish
/// in time is killed and reported as [`VcsError::Timeout`].
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_path: PathBuf,
    remote: String,
    timeout: Duration,
}

impl GitCli {
    pub fn new(
        repo_path: impl Into<PathBuf>,
        remote: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let cli = Self {
            repo_path: repo_path.into(),
            remote: remote.into(),
            timeout,
        };
        info!(path = %cli.repo_path.display(), remote = %cli.remote, "created GitCli");
        cli
    }

    pub fn from_config(config: &RepoConfig) -> Self {
        Self::new(
            config.path.clone(),
            config.remote.clone(),
            Duration::from_secs(config.command_timeout_secs),
        )
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Run git and fail on any non-zero exit.
    async fn run_git(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = self.run_git_unchecked(args).await?;
        if !output.success() {
            warn!(exit_code = output.exit_code, stderr = %output.stderr, "git command failed");
            return Err(command_failed(args, &output));
        }
        Ok(output.stdout)
    }

    /// Run git and hand back the exit code for the caller to interpret.
    async fn run_git_unchecked(&self, args: &[&str]) -> Result<GitOutput, VcsError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.repo_path)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            // Merges and commits on the simulation branch need an identity
            // even where none is configured.
            .env("GIT_AUTHOR_NAME", SIM_USER_NAME)
            .env("GIT_AUTHOR_EMAIL", SIM_USER_EMAIL)
            .env("GIT_COMMITTER_NAME", SIM_USER_NAME)
            .env("GIT_COMMITTER_EMAIL", SIM_USER_EMAIL)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(cmd = ?format!("git {}", args.join(" ")), "running git command");
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| VcsError::Timeout {
                command: render_command(args),
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    VcsError::BinaryNotFound("git".into())
                } else {
                    VcsError::IoError(e)
                }
            })?;

        Ok(GitOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Take one side of every path still unresolved after a strategy-option
    /// merge (modify/delete and similar conflicts `-X` cannot settle).
    async fn settle_unresolved(&self, policy: ResolutionPolicy) -> Result<(), VcsError> {
        let side = match policy {
            ResolutionPolicy::PreferBase => "--ours",
            ResolutionPolicy::PreferIncoming => "--theirs",
        };
        for path in self.unresolved_files().await? {
            let taken = self.run_git_unchecked(&["checkout", side, "--", &path]).await?;
            if taken.success() {
                self.run_git(&["add", "--", &path]).await?;
            } else {
                // The preferred side deleted the file.
                debug!(path = %path, "preferred side has no such file, removing");
                self.run_git(&["rm", "--quiet", "--", &path]).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VcsGateway for GitCli {
    #[instrument(skip(self), fields(path = %self.repo_path.display()))]
    async fn working_tree_status(&self) -> Result<Vec<String>, VcsError> {
        let output = self.run_git(&["status", "--porcelain"]).await?;
        Ok(parse_porcelain(&output))
    }

    #[instrument(skip(self), fields(remote = %self.remote))]
    async fn fetch(&self) -> Result<(), VcsError> {
        self.run_git(&["fetch", &self.remote]).await?;
        info!("fetched remote refs");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn resolve_branch(&self, name: &str) -> Result<BranchRef, VcsError> {
        let remote_ref = format!("{}/{}", self.remote, name);
        let spec = format!("{remote_ref}^{{commit}}");
        let output = self
            .run_git_unchecked(&["rev-parse", "--verify", "--quiet", &spec])
            .await?;
        if !output.success() {
            return Err(VcsError::RefNotFound(remote_ref));
        }
        let revision = first_line(&output.stdout)
            .ok_or_else(|| VcsError::RefNotFound(remote_ref.clone()))?;
        debug!(revision = %revision, "resolved branch");
        Ok(BranchRef {
            name: name.to_string(),
            revision,
        })
    }

    #[instrument(skip(self))]
    async fn merge_base(&self, a: &str, b: &str) -> Result<String, VcsError> {
        let output = self.run_git_unchecked(&["merge-base", a, b]).await?;
        match (output.success(), first_line(&output.stdout)) {
            (true, Some(base)) => Ok(base),
            // Exit 1 with no output: unrelated histories.
            (false, None) if output.exit_code == 1 => {
                Err(VcsError::RefNotFound(format!("merge base of {a} and {b}")))
            }
            _ => Err(command_failed(&["merge-base", a, b], &output)),
        }
    }

    #[instrument(skip(self))]
    async fn merge_preview(
        &self,
        base: &str,
        head: &str,
        branch: &str,
    ) -> Result<String, VcsError> {
        self.run_git(&["merge-tree", base, head, branch]).await
    }

    async fn current_checkout(&self) -> Result<String, VcsError> {
        let output = self
            .run_git_unchecked(&["symbolic-ref", "--quiet", "--short", "HEAD"])
            .await?;
        if let (true, Some(name)) = (output.success(), first_line(&output.stdout)) {
            return Ok(name);
        }
        let detached = self.run_git(&["rev-parse", "HEAD"]).await?;
        first_line(&detached).ok_or_else(|| VcsError::RefNotFound("HEAD".into()))
    }

    async fn branch_exists(&self, name: &str) -> Result<bool, VcsError> {
        let local_ref = format!("refs/heads/{name}");
        let output = self
            .run_git_unchecked(&["rev-parse", "--verify", "--quiet", &local_ref])
            .await?;
        Ok(output.success())
    }

    #[instrument(skip(self))]
    async fn reset_branch(&self, name: &str, revision: &str) -> Result<(), VcsError> {
        self.run_git(&["checkout", "--quiet", "-B", name, revision]).await?;
        debug!("simulation branch reset");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn trial_merge(&self, revision: &str) -> Result<TrialMergeOutcome, VcsError> {
        let args = ["merge", "--no-commit", "--no-ff", revision];
        let output = self.run_git_unchecked(&args).await?;
        if output.success() {
            return Ok(TrialMergeOutcome::Clean);
        }
        let unresolved = self.unresolved_files().await?;
        if unresolved.is_empty() {
            // Non-zero without conflicts is a real failure.
            return Err(command_failed(&args, &output));
        }
        debug!(count = unresolved.len(), "trial merge conflicted");
        Ok(TrialMergeOutcome::Conflicted { unresolved })
    }

    async fn unresolved_files(&self) -> Result<Vec<String>, VcsError> {
        let output = self
            .run_git(&[
                "-c",
                "core.quotePath=false",
                "diff",
                "--name-only",
                "-z",
                "--diff-filter=U",
            ])
            .await?;
        Ok(split_nul(&output))
    }

    async fn read_worktree_file(&self, path: &str) -> Result<String, VcsError> {
        match tokio::fs::read(self.repo_path.join(path)).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(VcsError::IoError(e)),
        }
    }

    async fn abort_merge(&self) -> Result<(), VcsError> {
        self.run_git(&["merge", "--abort"]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn forced_merge(&self, revision: &str, policy: ResolutionPolicy) -> Result<(), VcsError> {
        let strategy = match policy {
            ResolutionPolicy::PreferBase => "ours",
            ResolutionPolicy::PreferIncoming => "theirs",
        };
        let args = ["merge", "--no-commit", "--no-ff", "-X", strategy, revision];
        let output = self.run_git_unchecked(&args).await?;
        if output.success() {
            return Ok(());
        }
        if self.unresolved_files().await?.is_empty() {
            return Err(command_failed(&args, &output));
        }
        self.settle_unresolved(policy).await
    }

    async fn commit(&self, message: &str) -> Result<(), VcsError> {
        self.run_git(&[
            "commit",
            "--quiet",
            "--allow-empty",
            "--no-verify",
            "-m",
            message,
        ])
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn checkout(&self, target: &str) -> Result<(), VcsError> {
        self.run_git(&["checkout", "--quiet", target]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_branch(&self, name: &str) -> Result<(), VcsError> {
        self.run_git(&["branch", "-D", name]).await?;
        info!("deleted simulation branch");
        Ok(())
    }
}

fn render_command(args: &[&str]) -> String {
    format!("git {}", args.join(" "))
}

fn command_failed(args: &[&str], output: &GitOutput) -> VcsError {
    VcsError::CommandFailed {
        command: render_command(args),
        exit_code: output.exit_code,
        stderr: output.stderr.trim().to_string(),
    }
}

fn first_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Paths of a `-z` listing, verbatim.
fn split_nul(output: &str) -> Vec<String> {
    output
        .split('\0')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Porcelain entries keep their two status columns.
fn parse_porcelain(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.trim_end().to_string())
        .collect()
}
