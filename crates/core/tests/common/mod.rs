//! Scripted in-memory gateway shared by the integration tests.
//!
//! Each branch's conflict size is scripted per merge history: the key is the
//! sequence of branches already merged into the simulation branch plus the
//! incoming branch, the value is the number of lines of the single conflict
//! region the merge produces (0 or absent means a clean merge).

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use mergeorder_core::config::{AppConfig, ResolutionPolicy, ScoringConfig, Strategy};
use mergeorder_core::errors::VcsError;
use mergeorder_core::vcs::{BranchRef, TrialMergeOutcome, VcsGateway};

#[derive(Default)]
struct State {
    head: String,
    local_branches: BTreeSet<String>,
    merged: Vec<String>,
    pending: Option<(String, bool)>,
    dirty: Vec<String>,
    log: Vec<String>,
}

pub struct ScriptedGateway {
    base: String,
    known: BTreeSet<String>,
    script: HashMap<(Vec<String>, String), u32>,
    fail_merging: Option<String>,
    state: Mutex<State>,
}

impl ScriptedGateway {
    pub fn new(base: &str, branches: &[&str]) -> Self {
        let state = State {
            head: base.to_string(),
            local_branches: BTreeSet::from([base.to_string()]),
            ..State::default()
        };
        Self {
            base: base.to_string(),
            known: branches.iter().map(|b| b.to_string()).collect(),
            script: HashMap::new(),
            fail_merging: None,
            state: Mutex::new(state),
        }
    }

    /// Merging `branch` after exactly `after` yields a region of `lines`.
    pub fn conflict(mut self, after: &[&str], branch: &str, lines: u32) -> Self {
        let history = after.iter().map(|b| b.to_string()).collect();
        self.script.insert((history, branch.to_string()), lines);
        self
    }

    /// Any trial merge of `branch` fails like a broken VCS would.
    pub fn failing_on(mut self, branch: &str) -> Self {
        self.fail_merging = Some(branch.to_string());
        self
    }

    pub fn set_dirty(&self, entries: &[&str]) {
        self.state.lock().unwrap().dirty = entries.iter().map(|e| e.to_string()).collect();
    }

    pub fn head(&self) -> String {
        self.state.lock().unwrap().head.clone()
    }

    pub fn local_branches(&self) -> Vec<String> {
        self.state.lock().unwrap().local_branches.iter().cloned().collect()
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|l| l.starts_with(prefix)).count()
    }

    fn lines_for(&self, history: &[String], branch: &str) -> u32 {
        self.script
            .get(&(history.to_vec(), branch.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn branch_of(revision: &str) -> &str {
        revision.strip_prefix("rev-").unwrap_or(revision)
    }
}

/// One conflict region spanning exactly `lines` lines (`lines >= 3`).
pub fn conflict_region(lines: u32, sign: &str) -> String {
    let mut out = format!("{sign}<<<<<<< ours\n{sign}=======\n");
    for i in 0..lines.saturating_sub(3) {
        out.push_str(&format!("{sign}line {i}\n"));
    }
    out.push_str(&format!("{sign}>>>>>>> theirs\n"));
    out
}

#[async_trait]
impl VcsGateway for ScriptedGateway {
    async fn working_tree_status(&self) -> Result<Vec<String>, VcsError> {
        Ok(self.state.lock().unwrap().dirty.clone())
    }

    async fn fetch(&self) -> Result<(), VcsError> {
        self.state.lock().unwrap().log.push("fetch".into());
        Ok(())
    }

    async fn resolve_branch(&self, name: &str) -> Result<BranchRef, VcsError> {
        if name != self.base && !self.known.contains(name) {
            return Err(VcsError::RefNotFound(format!("origin/{name}")));
        }
        Ok(BranchRef {
            name: name.to_string(),
            revision: format!("rev-{name}"),
        })
    }

    async fn merge_base(&self, a: &str, _b: &str) -> Result<String, VcsError> {
        Ok(a.to_string())
    }

    async fn merge_preview(
        &self,
        _base: &str,
        _head: &str,
        branch: &str,
    ) -> Result<String, VcsError> {
        let name = Self::branch_of(branch);
        let lines = self.lines_for(&[], name);
        if lines == 0 {
            return Ok(String::new());
        }
        Ok(format!(
            "changed in both\n\
             \x20 base   100644 aaaaaaa {name}.txt\n\
             \x20 our    100644 bbbbbbb {name}.txt\n\
             \x20 their  100644 ccccccc {name}.txt\n\
             @@ -1,1 +1,{lines} @@\n{}",
            conflict_region(lines, "+")
        ))
    }

    async fn current_checkout(&self) -> Result<String, VcsError> {
        Ok(self.head())
    }

    async fn branch_exists(&self, name: &str) -> Result<bool, VcsError> {
        Ok(self.state.lock().unwrap().local_branches.contains(name))
    }

    async fn reset_branch(&self, name: &str, revision: &str) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("reset {name} {revision}"));
        state.local_branches.insert(name.to_string());
        state.head = name.to_string();
        state.merged.clear();
        state.pending = None;
        Ok(())
    }

    async fn trial_merge(&self, revision: &str) -> Result<TrialMergeOutcome, VcsError> {
        let name = Self::branch_of(revision).to_string();
        if self.fail_merging.as_deref() == Some(name.as_str()) {
            return Err(VcsError::CommandFailed {
                command: format!("git merge --no-commit --no-ff {revision}"),
                exit_code: 128,
                stderr: "fatal: simulated failure".into(),
            });
        }
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("merge {name}"));
        let lines = self.lines_for(&state.merged, &name);
        if lines == 0 {
            state.pending = Some((name, true));
            Ok(TrialMergeOutcome::Clean)
        } else {
            state.pending = Some((name.clone(), false));
            Ok(TrialMergeOutcome::Conflicted {
                unresolved: vec![format!("{name}.txt")],
            })
        }
    }

    async fn unresolved_files(&self) -> Result<Vec<String>, VcsError> {
        let state = self.state.lock().unwrap();
        Ok(match &state.pending {
            Some((name, false)) => vec![format!("{name}.txt")],
            _ => Vec::new(),
        })
    }

    async fn read_worktree_file(&self, path: &str) -> Result<String, VcsError> {
        let state = self.state.lock().unwrap();
        let Some((name, false)) = &state.pending else {
            return Ok(String::new());
        };
        if path != format!("{name}.txt") {
            return Ok(String::new());
        }
        let lines = self.lines_for(&state.merged, name);
        Ok(format!("header\n{}footer\n", conflict_region(lines, "")))
    }

    async fn abort_merge(&self) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state.log.push("abort".into());
        match state.pending.take() {
            Some(_) => Ok(()),
            None => Err(VcsError::CommandFailed {
                command: "git merge --abort".into(),
                exit_code: 128,
                stderr: "fatal: There is no merge to abort (MERGE_HEAD missing).".into(),
            }),
        }
    }

    async fn forced_merge(&self, revision: &str, policy: ResolutionPolicy) -> Result<(), VcsError> {
        let name = Self::branch_of(revision).to_string();
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("force {name} {policy}"));
        state.pending = Some((name, true));
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("commit {message}"));
        match state.pending.take() {
            Some((name, true)) => {
                state.merged.push(name);
                Ok(())
            }
            other => {
                state.pending = other;
                Err(VcsError::CommandFailed {
                    command: "git commit".into(),
                    exit_code: 1,
                    stderr: "nothing to commit or unmerged files".into(),
                })
            }
        }
    }

    async fn checkout(&self, target: &str) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("checkout {target}"));
        state.head = target.to_string();
        Ok(())
    }

    async fn delete_branch(&self, name: &str) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("delete {name}"));
        if state.head == name {
            return Err(VcsError::CommandFailed {
                command: format!("git branch -D {name}"),
                exit_code: 1,
                stderr: "cannot delete the checked-out branch".into(),
            });
        }
        state.local_branches.remove(name);
        Ok(())
    }
}

/// Config whose final score equals the conflict line count.
pub fn line_count_config(strategy: Strategy) -> AppConfig {
    let mut config = AppConfig::default();
    config.scoring = ScoringConfig {
        line_weight: 1.0,
        block_weight: 0.0,
        file_weight: 0.0,
        file_threshold: u32::MAX,
        threshold_bonus: 0.0,
    };
    config.search.strategy = strategy;
    config
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
