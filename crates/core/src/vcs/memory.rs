//! In-process repository of file snapshots.
//!
//! Implements every [`VcsGateway`] operation over an immutable commit graph
//! and a mutable working tree, merging file contents with [`Merger`]. Merge
//! previews are rendered in the legacy `git merge-tree` text form so they go
//! through the same extractor as real output.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::{BranchRef, TrialMergeOutcome, VcsGateway};
use crate::config::ResolutionPolicy;
use crate::conflict::{scan_conflict_regions, Merger};
use crate::errors::VcsError;

type Files = BTreeMap<String, String>;

#[derive(Debug, Clone)]
struct Commit {
    parents: Vec<usize>,
    files: Files,
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Head {
    Branch(String),
    Detached(usize),
}

#[derive(Debug)]
struct PendingMerge {
    incoming: usize,
    unresolved: BTreeSet<String>,
}

#[derive(Debug)]
struct RepoState {
    commits: Vec<Commit>,
    remote: String,
    remote_branches: BTreeMap<String, usize>,
    local_branches: BTreeMap<String, usize>,
    head: Head,
    worktree: Files,
    pending: Option<PendingMerge>,
    dirty: Vec<String>,
    fetches: usize,
}

/// Outcome of merging one path.
enum PathMerge {
    Content(String),
    Deleted,
    Conflicted(Option<String>),
}

fn revision_of(idx: usize) -> String {
    format!("mem{idx:04}")
}

fn failed(command: &str, stderr: impl Into<String>) -> VcsError {
    VcsError::CommandFailed {
        command: command.to_string(),
        exit_code: 1,
        stderr: stderr.into(),
    }
}

fn blob_id(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

impl RepoState {
    fn commit_index(&self, revision: &str) -> Result<usize, VcsError> {
        revision
            .strip_prefix("mem")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|idx| *idx < self.commits.len())
            .or_else(|| self.local_branches.get(revision).copied())
            .ok_or_else(|| VcsError::RefNotFound(revision.to_string()))
    }

    fn head_commit(&self) -> Result<usize, VcsError> {
        match &self.head {
            Head::Branch(name) => self
                .local_branches
                .get(name)
                .copied()
                .ok_or_else(|| VcsError::RefNotFound(name.clone())),
            Head::Detached(idx) => Ok(*idx),
        }
    }

    fn ancestors(&self, start: usize) -> HashSet<usize> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            if seen.insert(idx) {
                queue.extend(self.commits[idx].parents.iter().copied());
            }
        }
        seen
    }

    /// Nearest ancestor of `b` that is also an ancestor of `a`.
    fn merge_base(&self, a: usize, b: usize) -> Option<usize> {
        let of_a = self.ancestors(a);
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([b]);
        while let Some(idx) = queue.pop_front() {
            if of_a.contains(&idx) {
                return Some(idx);
            }
            if seen.insert(idx) {
                queue.extend(self.commits[idx].parents.iter().copied());
            }
        }
        None
    }

    fn ensure_no_merge(&self, command: &str) -> Result<(), VcsError> {
        if self.pending.is_some() {
            return Err(failed(command, "a merge is in progress"));
        }
        Ok(())
    }

    /// Three-way merge of `incoming` into the checked-out commit.
    fn merge_into_worktree(
        &mut self,
        incoming: usize,
        policy: Option<ResolutionPolicy>,
    ) -> Result<BTreeSet<String>, VcsError> {
        self.ensure_no_merge("merge")?;
        let ours_idx = self.head_commit()?;
        let base_idx = self
            .merge_base(ours_idx, incoming)
            .ok_or_else(|| failed("merge", "refusing to merge unrelated histories"))?;

        let base = &self.commits[base_idx].files;
        let ours = &self.commits[ours_idx].files;
        let theirs = &self.commits[incoming].files;
        let paths: BTreeSet<&String> = base
            .keys()
            .chain(ours.keys())
            .chain(theirs.keys())
            .collect();

        let mut merged = Files::new();
        let mut unresolved = BTreeSet::new();
        for path in paths {
            let outcome = merge_path(
                base.get(path).map(String::as_str),
                ours.get(path).map(String::as_str),
                theirs.get(path).map(String::as_str),
                policy,
            );
            match outcome {
                PathMerge::Content(content) => {
                    merged.insert(path.clone(), content);
                }
                PathMerge::Deleted => {}
                PathMerge::Conflicted(content) => {
                    if let Some(content) = content {
                        merged.insert(path.clone(), content);
                    }
                    unresolved.insert(path.clone());
                }
            }
        }

        self.worktree = merged;
        self.pending = Some(PendingMerge {
            incoming,
            unresolved: unresolved.clone(),
        });
        Ok(unresolved)
    }
}

/// Merge one path given its presence on each side.
fn merge_path(
    base: Option<&str>,
    ours: Option<&str>,
    theirs: Option<&str>,
    policy: Option<ResolutionPolicy>,
) -> PathMerge {
    match (ours, theirs) {
        (Some(o), Some(t)) => {
            let b = base.unwrap_or("");
            match policy {
                Some(policy) => PathMerge::Content(Merger::forced_merge(b, o, t, policy)),
                None => {
                    let result = Merger::three_way_merge(b, o, t);
                    if result.has_conflicts {
                        PathMerge::Conflicted(Some(result.merged_content))
                    } else {
                        PathMerge::Content(result.merged_content)
                    }
                }
            }
        }
        (None, None) => PathMerge::Deleted,
        (Some(kept), None) | (None, Some(kept)) => {
            let kept_is_ours = ours.is_some();
            match base {
                // Added on one side only.
                None => PathMerge::Content(kept.to_string()),
                // Deleted on one side, untouched on the other.
                Some(b) if b == kept => PathMerge::Deleted,
                // Modify/delete.
                Some(_) => match policy {
                    None => PathMerge::Conflicted(Some(kept.to_string())),
                    Some(ResolutionPolicy::PreferBase) if kept_is_ours => {
                        PathMerge::Content(kept.to_string())
                    }
                    Some(ResolutionPolicy::PreferIncoming) if !kept_is_ours => {
                        PathMerge::Content(kept.to_string())
                    }
                    Some(_) => PathMerge::Deleted,
                },
            }
        }
    }
}

/// In-process [`VcsGateway`] over file snapshots, driven by the tests.
#[derive(Debug)]
pub struct MemoryRepo {
    state: Mutex<RepoState>,
    base_branch: String,
}

impl MemoryRepo {
    /// Repository with one commit holding `files`, published as
    /// `origin/<base_branch>` and checked out locally.
    pub fn new(base_branch: &str, files: &[(&str, &str)]) -> Self {
        let files: Files = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        let state = RepoState {
            commits: vec![Commit {
                parents: Vec::new(),
                files: files.clone(),
                message: "initial".into(),
            }],
            remote: "origin".into(),
            remote_branches: BTreeMap::from([(base_branch.to_string(), 0)]),
            local_branches: BTreeMap::from([(base_branch.to_string(), 0)]),
            head: Head::Branch(base_branch.to_string()),
            worktree: files,
            pending: None,
            dirty: Vec::new(),
            fetches: 0,
        };
        Self {
            state: Mutex::new(state),
            base_branch: base_branch.to_string(),
        }
    }

    /// Publish a remote branch forked from the base, with `changes` applied.
    /// A `None` content deletes the path.
    pub fn with_branch_changes(self, name: &str, changes: &[(&str, Option<&str>)]) -> Self {
        {
            let mut state = self.lock();
            let parent = state.remote_branches.get(&self.base_branch).copied().unwrap_or(0);
            let mut files = state.commits[parent].files.clone();
            for (path, content) in changes {
                match content {
                    Some(content) => {
                        files.insert(path.to_string(), content.to_string());
                    }
                    None => {
                        files.remove(*path);
                    }
                }
            }
            state.commits.push(Commit {
                parents: vec![parent],
                files,
                message: format!("work on {name}"),
            });
            let idx = state.commits.len() - 1;
            state.remote_branches.insert(name.to_string(), idx);
        }
        self
    }

    /// Publish a remote branch that writes `files` on top of the base.
    pub fn with_branch(self, name: &str, files: &[(&str, &str)]) -> Self {
        let changes: Vec<(&str, Option<&str>)> =
            files.iter().map(|(p, c)| (*p, Some(*c))).collect();
        self.with_branch_changes(name, &changes)
    }

    /// Report uncommitted entries from `working_tree_status`.
    pub fn set_dirty(&self, entries: &[&str]) {
        self.lock().dirty = entries.iter().map(|e| e.to_string()).collect();
    }

    pub fn local_branches(&self) -> Vec<String> {
        self.lock().local_branches.keys().cloned().collect()
    }

    pub fn head(&self) -> String {
        let state = self.lock();
        match &state.head {
            Head::Branch(name) => name.clone(),
            Head::Detached(idx) => revision_of(*idx),
        }
    }

    pub fn merge_in_progress(&self) -> bool {
        self.lock().pending.is_some()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    /// Files of the commit a local branch points at.
    pub fn branch_files(&self, name: &str) -> Option<BTreeMap<String, String>> {
        let state = self.lock();
        let idx = *state.local_branches.get(name)?;
        Some(state.commits[idx].files.clone())
    }

    /// Message of the commit a local branch points at.
    pub fn branch_message(&self, name: &str) -> Option<String> {
        let state = self.lock();
        let idx = *state.local_branches.get(name)?;
        Some(state.commits[idx].message.clone())
    }

    fn lock(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl VcsGateway for MemoryRepo {
    async fn working_tree_status(&self) -> Result<Vec<String>, VcsError> {
        Ok(self.lock().dirty.clone())
    }

    async fn fetch(&self) -> Result<(), VcsError> {
        self.lock().fetches += 1;
        Ok(())
    }

    async fn resolve_branch(&self, name: &str) -> Result<BranchRef, VcsError> {
        let state = self.lock();
        state
            .remote_branches
            .get(name)
            .map(|idx| BranchRef {
                name: name.to_string(),
                revision: revision_of(*idx),
            })
            .ok_or_else(|| VcsError::RefNotFound(format!("{}/{}", state.remote, name)))
    }

    async fn merge_base(&self, a: &str, b: &str) -> Result<String, VcsError> {
        let state = self.lock();
        let (a_idx, b_idx) = (state.commit_index(a)?, state.commit_index(b)?);
        state
            .merge_base(a_idx, b_idx)
            .map(revision_of)
            .ok_or_else(|| VcsError::RefNotFound(format!("merge base of {a} and {b}")))
    }

    async fn merge_preview(
        &self,
        base: &str,
        head: &str,
        branch: &str,
    ) -> Result<String, VcsError> {
        let state = self.lock();
        let base = &state.commits[state.commit_index(base)?].files;
        let ours = &state.commits[state.commit_index(head)?].files;
        let theirs = &state.commits[state.commit_index(branch)?].files;
        Ok(render_merge_tree(base, ours, theirs))
    }

    async fn current_checkout(&self) -> Result<String, VcsError> {
        Ok(self.head())
    }

    async fn branch_exists(&self, name: &str) -> Result<bool, VcsError> {
        Ok(self.lock().local_branches.contains_key(name))
    }

    async fn reset_branch(&self, name: &str, revision: &str) -> Result<(), VcsError> {
        let mut state = self.lock();
        state.ensure_no_merge("checkout -B")?;
        let idx = state.commit_index(revision)?;
        state.local_branches.insert(name.to_string(), idx);
        state.head = Head::Branch(name.to_string());
        state.worktree = state.commits[idx].files.clone();
        Ok(())
    }

    async fn trial_merge(&self, revision: &str) -> Result<TrialMergeOutcome, VcsError> {
        let mut state = self.lock();
        let incoming = state.commit_index(revision)?;
        let unresolved = state.merge_into_worktree(incoming, None)?;
        if unresolved.is_empty() {
            Ok(TrialMergeOutcome::Clean)
        } else {
            debug!(count = unresolved.len(), "in-memory merge conflicted");
            Ok(TrialMergeOutcome::Conflicted {
                unresolved: unresolved.into_iter().collect(),
            })
        }
    }

    async fn unresolved_files(&self) -> Result<Vec<String>, VcsError> {
        Ok(self
            .lock()
            .pending
            .as_ref()
            .map(|p| p.unresolved.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn read_worktree_file(&self, path: &str) -> Result<String, VcsError> {
        Ok(self.lock().worktree.get(path).cloned().unwrap_or_default())
    }

    async fn abort_merge(&self) -> Result<(), VcsError> {
        let mut state = self.lock();
        if state.pending.take().is_none() {
            return Err(failed("merge --abort", "there is no merge to abort"));
        }
        let head = state.head_commit()?;
        state.worktree = state.commits[head].files.clone();
        Ok(())
    }

    async fn forced_merge(&self, revision: &str, policy: ResolutionPolicy) -> Result<(), VcsError> {
        let mut state = self.lock();
        let incoming = state.commit_index(revision)?;
        state.merge_into_worktree(incoming, Some(policy))?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<(), VcsError> {
        let mut state = self.lock();
        if state
            .pending
            .as_ref()
            .is_some_and(|p| !p.unresolved.is_empty())
        {
            return Err(failed("commit", "committing is not possible with unmerged files"));
        }
        let head = state.head_commit()?;
        let mut parents = vec![head];
        if let Some(pending) = state.pending.take() {
            parents.push(pending.incoming);
        }
        let files = state.worktree.clone();
        state.commits.push(Commit {
            parents,
            files,
            message: message.to_string(),
        });
        let idx = state.commits.len() - 1;
        match state.head.clone() {
            Head::Branch(name) => {
                state.local_branches.insert(name, idx);
            }
            Head::Detached(_) => state.head = Head::Detached(idx),
        }
        Ok(())
    }

    async fn checkout(&self, target: &str) -> Result<(), VcsError> {
        let mut state = self.lock();
        state.ensure_no_merge("checkout")?;
        let (head, idx) = match state.local_branches.get(target) {
            Some(idx) => (Head::Branch(target.to_string()), *idx),
            None => {
                let idx = state.commit_index(target)?;
                (Head::Detached(idx), idx)
            }
        };
        state.head = head;
        state.worktree = state.commits[idx].files.clone();
        Ok(())
    }

    async fn delete_branch(&self, name: &str) -> Result<(), VcsError> {
        let mut state = self.lock();
        if state.head == Head::Branch(name.to_string()) {
            return Err(failed(
                "branch -D",
                format!("cannot delete branch '{name}' checked out"),
            ));
        }
        state
            .local_branches
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| failed("branch -D", format!("branch '{name}' not found")))
    }
}

/// Render paths changed on both sides in legacy `git merge-tree` form.
fn render_merge_tree(base: &Files, ours: &Files, theirs: &Files) -> String {
    let mut out = String::new();
    let paths: BTreeSet<&String> = ours.keys().filter(|p| theirs.contains_key(*p)).collect();
    for path in paths {
        let (o, t) = (&ours[path], &theirs[path]);
        let b = base.get(path);
        let changed_both = b.map_or(o != t, |b| o != b && t != b && o != t);
        if !changed_both {
            continue;
        }

        match b {
            Some(b) => {
                out.push_str("changed in both\n");
                out.push_str(&format!("  base   100644 {} {}\n", blob_id(b), path));
            }
            None => out.push_str("added in both\n"),
        }
        out.push_str(&format!("  our    100644 {} {}\n", blob_id(o), path));
        out.push_str(&format!("  their  100644 {} {}\n", blob_id(t), path));

        let merged = Merger::three_way_merge(b.map_or("", String::as_str), o, t);
        let in_region: BTreeSet<usize> = scan_conflict_regions(&merged.merged_content)
            .iter()
            .flat_map(|r| r.start_line..=r.end_line)
            .collect();
        let line_total = merged.merged_content.lines().count();
        let base_total = b.map_or(0, |b| b.lines().count());
        out.push_str(&format!("@@ -1,{base_total} +1,{line_total} @@\n"));
        for (idx, line) in merged.merged_content.lines().enumerate() {
            let sign = if in_region.contains(&(idx + 1)) { '+' } else { ' ' };
            out.push(sign);
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::parse_comparison;

    const BASE: &str = "one\ntwo\nthree\nfour\nfive\n";

    fn repo() -> MemoryRepo {
        MemoryRepo::new("main", &[("notes.txt", BASE), ("keep.txt", "stable\n")])
            .with_branch("left", &[("notes.txt", "one\nTWO-left\nthree\nfour\nfive\n")])
            .with_branch("right", &[("notes.txt", "one\nTWO-right\nthree\nfour\nfive\n")])
            .with_branch("tail", &[("notes.txt", "one\ntwo\nthree\nfour\nFIVE\n")])
    }

    #[tokio::test]
    async fn test_resolve_and_merge_base() {
        let repo = repo();
        let main = repo.resolve_branch("main").await.unwrap();
        let left = repo.resolve_branch("left").await.unwrap();
        assert_eq!(repo.merge_base(&main.revision, &left.revision).await.unwrap(), main.revision);
        assert!(matches!(
            repo.resolve_branch("missing").await,
            Err(VcsError::RefNotFound(r)) if r == "origin/missing"
        ));
    }

    #[tokio::test]
    async fn test_preview_of_conflicting_branch_parses() {
        let repo = repo();
        let main = repo.resolve_branch("main").await.unwrap().revision;
        let left = repo.resolve_branch("left").await.unwrap().revision;
        let right = repo.resolve_branch("right").await.unwrap().revision;

        let text = repo.merge_preview(&main, &left, &right).await.unwrap();
        assert!(text.starts_with("changed in both\n"));
        let signal = parse_comparison(&text).unwrap();
        assert_eq!(signal.conflict_block_count, 1);
        assert_eq!(signal.touched_file_count, 1);

        // Against the base nothing changed on both sides.
        let text = repo.merge_preview(&main, &main, &left).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_trial_merge_conflict_then_forced_commit() {
        let repo = repo();
        let left = repo.resolve_branch("left").await.unwrap().revision;
        let right = repo.resolve_branch("right").await.unwrap().revision;
        let main = repo.resolve_branch("main").await.unwrap().revision;

        repo.reset_branch("sim", &main).await.unwrap();
        assert!(repo.trial_merge(&left).await.unwrap().is_clean());
        repo.commit("clean merge").await.unwrap();

        let outcome = repo.trial_merge(&right).await.unwrap();
        assert_eq!(
            outcome,
            TrialMergeOutcome::Conflicted {
                unresolved: vec!["notes.txt".into()]
            }
        );
        assert!(repo.read_worktree_file("notes.txt").await.unwrap().contains("<<<<<<<"));
        assert!(repo.commit("too early").await.is_err());

        repo.abort_merge().await.unwrap();
        repo.forced_merge(&right, ResolutionPolicy::PreferBase).await.unwrap();
        repo.commit("auto-resolved for simulation").await.unwrap();

        let files = repo.branch_files("sim").unwrap();
        assert_eq!(files["notes.txt"], "one\nTWO-left\nthree\nfour\nfive\n");
        assert_eq!(files["keep.txt"], "stable\n");
        assert_eq!(repo.branch_message("sim").unwrap(), "auto-resolved for simulation");
    }

    #[tokio::test]
    async fn test_prefer_incoming_takes_their_side() {
        let repo = repo();
        let left = repo.resolve_branch("left").await.unwrap().revision;
        let right = repo.resolve_branch("right").await.unwrap().revision;
        repo.reset_branch("sim", &left).await.unwrap();
        repo.forced_merge(&right, ResolutionPolicy::PreferIncoming)
            .await
            .unwrap();
        repo.commit("forced").await.unwrap();
        assert_eq!(
            repo.branch_files("sim").unwrap()["notes.txt"],
            "one\nTWO-right\nthree\nfour\nfive\n"
        );
    }

    #[tokio::test]
    async fn test_modify_delete_is_unresolved_without_markers() {
        let repo = MemoryRepo::new("main", &[("a.txt", "a\n")])
            .with_branch("edit", &[("a.txt", "A\n")])
            .with_branch_changes("drop", &[("a.txt", None)]);
        let edit = repo.resolve_branch("edit").await.unwrap().revision;
        let drop = repo.resolve_branch("drop").await.unwrap().revision;

        repo.reset_branch("sim", &edit).await.unwrap();
        let outcome = repo.trial_merge(&drop).await.unwrap();
        assert!(!outcome.is_clean());
        let content = repo.read_worktree_file("a.txt").await.unwrap();
        assert_eq!(content, "A\n");

        repo.abort_merge().await.unwrap();
        repo.forced_merge(&drop, ResolutionPolicy::PreferIncoming)
            .await
            .unwrap();
        repo.commit("forced").await.unwrap();
        assert!(!repo.branch_files("sim").unwrap().contains_key("a.txt"));
    }

    #[tokio::test]
    async fn test_checkout_and_delete_rules() {
        let repo = repo();
        let main = repo.resolve_branch("main").await.unwrap().revision;
        let right = repo.resolve_branch("right").await.unwrap().revision;
        let left = repo.resolve_branch("left").await.unwrap().revision;

        repo.reset_branch("sim", &left).await.unwrap();
        repo.trial_merge(&right).await.unwrap();
        assert!(repo.merge_in_progress());
        assert!(repo.checkout("main").await.is_err());
        assert!(repo.delete_branch("sim").await.is_err());

        repo.abort_merge().await.unwrap();
        assert!(repo.abort_merge().await.is_err());
        repo.checkout("main").await.unwrap();
        repo.delete_branch("sim").await.unwrap();
        assert_eq!(repo.local_branches(), vec!["main".to_string()]);
        assert_eq!(repo.head(), "main");
        assert_eq!(repo.current_checkout().await.unwrap(), "main");

        repo.checkout(&main).await.unwrap();
        assert_eq!(repo.head(), main);
    }
}
