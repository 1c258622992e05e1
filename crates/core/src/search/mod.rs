//! Merge-order search.
//!
//! Two strategies share the same scoring pipeline:
//!
//! - [`ExhaustiveSearch`] simulates every permutation in a disposable branch
//!   and returns the order with the minimum cumulative score.
//! - [`IndependentEstimator`] previews each branch against the current base
//!   and ranks branches by their own difficulty.
//!
//! [`run_search`] picks the strategy from configuration.

pub mod exhaustive;
pub mod independent;
mod permutations;
pub mod report;
pub mod workspace;

pub use exhaustive::{ExhaustiveOptions, ExhaustiveSearch, SearchAccumulator};
pub use independent::IndependentEstimator;
pub use permutations::Permutations;
pub use report::{
    MergeOrder, MergeReport, OrderReport, RankedBranch, RankingReport, SearchOutcome, StepOutcome,
    StepRecord,
};
pub use workspace::SimulationWorkspace;

use std::collections::HashSet;

use tracing::{info, warn};

use crate::config::{AppConfig, Strategy};
use crate::errors::{CoreError, SearchError, VcsError};
use crate::scoring::ConflictScorer;
use crate::vcs::{BranchRef, VcsGateway};

/// Reject empty or duplicated branch sets, and sets larger than `limit`.
pub fn validate_branch_set(branches: &[String], limit: Option<usize>) -> Result<(), SearchError> {
    if branches.is_empty() {
        return Err(SearchError::NoBranches);
    }
    let mut seen = HashSet::new();
    for branch in branches {
        if !seen.insert(branch.as_str()) {
            return Err(SearchError::DuplicateBranch(branch.clone()));
        }
    }
    if let Some(limit) = limit {
        if branches.len() > limit {
            return Err(SearchError::TooManyBranches {
                count: branches.len(),
                limit,
            });
        }
    }
    Ok(())
}

/// Refuse to mutate a checkout with uncommitted changes.
pub(crate) async fn preflight(gateway: &dyn VcsGateway) -> Result<(), VcsError> {
    let entries = gateway.working_tree_status().await?;
    if !entries.is_empty() {
        return Err(VcsError::DirtyWorkingTree { entries });
    }
    Ok(())
}

/// Optionally fetch, then resolve the base and every candidate.
pub(crate) async fn resolve_all(
    gateway: &dyn VcsGateway,
    base_branch: &str,
    branches: &[String],
    fetch: bool,
) -> Result<(BranchRef, Vec<BranchRef>), VcsError> {
    if fetch {
        gateway.fetch().await?;
    }
    let base = gateway.resolve_branch(base_branch).await?;
    let mut candidates = Vec::with_capacity(branches.len());
    for name in branches {
        candidates.push(gateway.resolve_branch(name).await?);
    }
    Ok((base, candidates))
}

/// Run the configured strategy over `branches`.
///
/// `force` lifts the exhaustive branch-count cap.
pub async fn run_search(
    gateway: &dyn VcsGateway,
    config: &AppConfig,
    branches: &[String],
    force: bool,
) -> Result<MergeReport, CoreError> {
    config.validate()?;
    let scorer = ConflictScorer::from_config(config)?;

    let report = match config.search.strategy {
        Strategy::Exhaustive => {
            let mut options = ExhaustiveOptions::from_config(config);
            if force {
                if branches.len() > config.search.max_exhaustive_branches {
                    warn!(
                        count = branches.len(),
                        limit = config.search.max_exhaustive_branches,
                        "forcing exhaustive search past the branch cap; expect n! simulations"
                    );
                }
                options.max_branches = None;
            }
            let (base, report) = ExhaustiveSearch::new(gateway, &scorer, options)
                .run(branches)
                .await?;
            MergeReport::new(base, SearchOutcome::Exhaustive(report))
        }
        Strategy::Independent => {
            let (base, report) = IndependentEstimator::from_config(gateway, &scorer, config)
                .rank(branches)
                .await?;
            MergeReport::new(base, SearchOutcome::Independent(report))
        }
    };

    info!(strategy = %config.search.strategy, "search complete");
    Ok(report)
}
