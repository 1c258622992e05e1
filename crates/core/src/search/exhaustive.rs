//! Exhaustive merge-order simulation.
//!
//! Every permutation of the candidate branches is merged, one branch at a
//! time, into the disposable simulation branch. A clean step commits and
//! scores zero. A conflicted step is scored from the unresolved files, then
//! aborted, force-resolved per the configured policy and committed so the
//! later branches of the same permutation see the accumulated state.
//!
//! The cost is `n!` simulations of `n` merges each; branch sets above the
//! configured cap are refused unless forced.

use tracing::{debug, info, instrument, warn};

use super::permutations::Permutations;
use super::report::{MergeOrder, OrderReport, StepOutcome, StepRecord};
use super::workspace::SimulationWorkspace;
use super::{preflight, resolve_all, validate_branch_set};
use crate::config::{AppConfig, ResolutionPolicy};
use crate::conflict::{extract_from_unresolved, UnresolvedFile};
use crate::errors::{SearchError, VcsError};
use crate::scoring::ConflictScorer;
use crate::vcs::{BranchRef, TrialMergeOutcome, VcsGateway};

pub const CLEAN_MERGE_MESSAGE: &str = "clean merge";
pub const FORCED_MERGE_MESSAGE: &str = "auto-resolved for simulation";

/// Knobs of one exhaustive run.
#[derive(Debug, Clone)]
pub struct ExhaustiveOptions {
    pub base_branch: String,
    pub workspace_prefix: String,
    pub fetch: bool,
    pub resolution: ResolutionPolicy,
    pub prune_dominated: bool,
    /// `None` lifts the branch-count cap.
    pub max_branches: Option<usize>,
}

impl ExhaustiveOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_branch: config.repo.base_branch.clone(),
            workspace_prefix: config.repo.workspace_prefix.clone(),
            fetch: config.repo.fetch,
            resolution: config.search.resolution,
            prune_dominated: config.search.prune_dominated,
            max_branches: Some(config.search.max_exhaustive_branches),
        }
    }
}

/// Best permutation seen so far, threaded through the search loop.
#[derive(Debug, Default)]
pub struct SearchAccumulator {
    best: Option<(MergeOrder, Vec<StepRecord>)>,
    evaluated: usize,
    pruned: usize,
}

impl SearchAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fully simulated permutation. Only a strictly lower total
    /// replaces the incumbent, so ties keep the first one seen.
    pub fn offer(&mut self, order: MergeOrder, steps: Vec<StepRecord>) -> bool {
        self.evaluated += 1;
        let improves = self
            .best
            .as_ref()
            .map_or(true, |(best, _)| order.cumulative_score < best.cumulative_score);
        if improves {
            debug!(order = ?order.names(), score = order.cumulative_score, "new best order");
            self.best = Some((order, steps));
        }
        improves
    }

    /// Record a permutation abandoned before completion.
    pub fn record_pruned(&mut self) {
        self.evaluated += 1;
        self.pruned += 1;
    }

    /// Cumulative score of the incumbent.
    pub fn bound(&self) -> Option<f64> {
        self.best.as_ref().map(|(best, _)| best.cumulative_score)
    }

    pub fn evaluated(&self) -> usize {
        self.evaluated
    }

    pub fn pruned(&self) -> usize {
        self.pruned
    }

    pub fn into_best(self) -> Option<(MergeOrder, Vec<StepRecord>, usize, usize)> {
        let (evaluated, pruned) = (self.evaluated, self.pruned);
        self.best
            .map(|(order, steps)| (order, steps, evaluated, pruned))
    }
}

/// Exhaustive simulation over one gateway.
pub struct ExhaustiveSearch<'a> {
    gateway: &'a dyn VcsGateway,
    scorer: &'a ConflictScorer,
    options: ExhaustiveOptions,
}

impl<'a> ExhaustiveSearch<'a> {
    pub fn new(
        gateway: &'a dyn VcsGateway,
        scorer: &'a ConflictScorer,
        options: ExhaustiveOptions,
    ) -> Self {
        Self {
            gateway,
            scorer,
            options,
        }
    }

    /// Find the order with the minimum cumulative score.
    ///
    /// Refuses to start on a dirty working tree. The simulation branch is
    /// removed on every exit path; cleanup failures after a successful
    /// search are returned, after a failed one they are only logged.
    #[instrument(skip(self), fields(base = %self.options.base_branch))]
    pub async fn run(&self, branches: &[String]) -> Result<(BranchRef, OrderReport), SearchError> {
        validate_branch_set(branches, self.options.max_branches)?;
        preflight(self.gateway).await?;
        let (base, candidates) = resolve_all(
            self.gateway,
            &self.options.base_branch,
            branches,
            self.options.fetch,
        )
        .await?;

        let mut workspace = SimulationWorkspace::create(
            self.gateway,
            &self.options.workspace_prefix,
            &base.revision,
        )
        .await?;
        let searched = self.search(&mut workspace, &candidates).await;
        let accumulator = match searched {
            Ok(accumulator) => {
                workspace.teardown().await?;
                accumulator
            }
            Err(e) => {
                workspace.teardown_best_effort().await;
                return Err(e.into());
            }
        };

        let (order, steps, evaluated, pruned) =
            accumulator.into_best().ok_or(SearchError::NoBranches)?;
        info!(
            order = ?order.names(),
            cumulative_score = order.cumulative_score,
            evaluated,
            pruned,
            "exhaustive search finished"
        );
        Ok((
            base,
            OrderReport {
                order,
                steps,
                permutations_evaluated: evaluated,
                permutations_pruned: pruned,
                resolution: self.options.resolution,
            },
        ))
    }

    async fn search(
        &self,
        workspace: &mut SimulationWorkspace<'_>,
        candidates: &[BranchRef],
    ) -> Result<SearchAccumulator, VcsError> {
        let mut accumulator = SearchAccumulator::new();
        for indices in Permutations::new(candidates.len()) {
            let order: Vec<&BranchRef> = indices.iter().map(|&i| &candidates[i]).collect();
            let bound = if self.options.prune_dominated {
                accumulator.bound()
            } else {
                None
            };
            let simulated = self.simulate(workspace, &order, bound).await?;
            match simulated {
                Some((cumulative_score, steps)) => {
                    let order = MergeOrder {
                        branches: order.into_iter().cloned().collect(),
                        cumulative_score,
                    };
                    accumulator.offer(order, steps);
                }
                None => accumulator.record_pruned(),
            }
        }
        Ok(accumulator)
    }

    /// Simulate one permutation. Returns `None` once the partial score
    /// reaches `bound`.
    async fn simulate(
        &self,
        workspace: &mut SimulationWorkspace<'_>,
        order: &[&BranchRef],
        bound: Option<f64>,
    ) -> Result<Option<(f64, Vec<StepRecord>)>, VcsError> {
        workspace.reset().await?;
        let mut cumulative = 0.0;
        let mut steps = Vec::with_capacity(order.len());

        for branch in order {
            let step = self.merge_step(branch).await?;
            cumulative += step.score.final_score;
            steps.push(step);

            if let Some(bound) = bound {
                if cumulative >= bound {
                    debug!(partial = cumulative, bound, "pruning dominated permutation");
                    return Ok(None);
                }
            }
        }
        Ok(Some((cumulative, steps)))
    }

    async fn merge_step(&self, branch: &BranchRef) -> Result<StepRecord, VcsError> {
        let unresolved = match self.gateway.trial_merge(&branch.revision).await? {
            TrialMergeOutcome::Clean => {
                self.gateway.commit(CLEAN_MERGE_MESSAGE).await?;
                debug!(branch = %branch.name, "clean merge");
                return Ok(StepRecord::clean(&branch.name));
            }
            TrialMergeOutcome::Conflicted { unresolved } => unresolved,
        };

        let mut files = Vec::with_capacity(unresolved.len());
        for path in unresolved {
            let content = self.gateway.read_worktree_file(&path).await?;
            files.push(UnresolvedFile { path, content });
        }
        let signal = extract_from_unresolved(&files);
        let score = self.scorer.score(&signal).await;
        if score.provenance.is_degraded() {
            warn!(
                branch = %branch.name,
                provenance = %score.provenance,
                "score uses degraded advisory value"
            );
        }

        self.gateway.abort_merge().await?;
        self.gateway
            .forced_merge(&branch.revision, self.options.resolution)
            .await?;
        self.gateway.commit(FORCED_MERGE_MESSAGE).await?;
        debug!(branch = %branch.name, %signal, final_score = score.final_score, "conflicted merge");

        Ok(StepRecord {
            branch: branch.name.clone(),
            outcome: StepOutcome::Conflict,
            signal,
            score,
        })
    }
}
