//! Version-control gateway.
//!
//! The search strategies only talk to a VCS through [`VcsGateway`].
//! [`GitCli`] drives a real `git` checkout; [`MemoryRepo`] is an in-process
//! repository of file snapshots used by the tests.

pub mod git;
pub mod memory;

pub use git::GitCli;
pub use memory::MemoryRepo;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ResolutionPolicy;
use crate::errors::VcsError;

/// A branch name and the revision it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchRef {
    pub name: String,
    pub revision: String,
}

/// Outcome of a non-committing trial merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialMergeOutcome {
    /// Merged without conflicts; the merge is staged but not committed.
    Clean,
    /// The merge stopped with unresolved paths.
    Conflicted { unresolved: Vec<String> },
}

impl TrialMergeOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }
}

/// Capabilities the order search needs from a version-control system.
///
/// Read-only operations come first; everything from
/// [`reset_branch`](Self::reset_branch) on mutates the checkout and must
/// only ever be pointed at the disposable simulation branch.
#[async_trait]
pub trait VcsGateway: Send + Sync {
    /// Porcelain status entries; empty when the working tree is clean.
    async fn working_tree_status(&self) -> Result<Vec<String>, VcsError>;

    /// Fetch refs from the configured remote.
    async fn fetch(&self) -> Result<(), VcsError>;

    /// Resolve a remote branch name to its tip revision.
    async fn resolve_branch(&self, name: &str) -> Result<BranchRef, VcsError>;

    /// Common ancestor of two revisions.
    async fn merge_base(&self, a: &str, b: &str) -> Result<String, VcsError>;

    /// Non-mutating three-way merge preview of `branch` into `head` from
    /// `base`, in `git merge-tree` text form.
    async fn merge_preview(&self, base: &str, head: &str, branch: &str)
        -> Result<String, VcsError>;

    /// Name of the checked-out branch, or the revision when detached.
    async fn current_checkout(&self) -> Result<String, VcsError>;

    /// Whether a local branch with this name exists.
    async fn branch_exists(&self, name: &str) -> Result<bool, VcsError>;

    /// Create or reset local branch `name` to `revision` and check it out.
    async fn reset_branch(&self, name: &str, revision: &str) -> Result<(), VcsError>;

    /// Merge `revision` into the checkout without committing.
    async fn trial_merge(&self, revision: &str) -> Result<TrialMergeOutcome, VcsError>;

    /// Paths that currently have unresolved conflicts.
    async fn unresolved_files(&self) -> Result<Vec<String>, VcsError>;

    /// Working-tree content of `path`; empty when the file is absent.
    async fn read_worktree_file(&self, path: &str) -> Result<String, VcsError>;

    /// Abort the merge in progress.
    async fn abort_merge(&self) -> Result<(), VcsError>;

    /// Merge `revision` resolving every conflict toward one side, leaving
    /// the result staged but not committed.
    async fn forced_merge(&self, revision: &str, policy: ResolutionPolicy)
        -> Result<(), VcsError>;

    /// Commit the staged state.
    async fn commit(&self, message: &str) -> Result<(), VcsError>;

    /// Check out a branch or revision.
    async fn checkout(&self, target: &str) -> Result<(), VcsError>;

    /// Force-delete a local branch.
    async fn delete_branch(&self, name: &str) -> Result<(), VcsError>;
}
