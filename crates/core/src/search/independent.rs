//! Independent per-branch estimation.
//!
//! Each branch is previewed against the current base only, with no shared
//! workspace and no commits, and the branches are sorted by final score.
//! This assumes conflicts do not depend on merge order: it is a difficulty
//! ranking, not a cumulative minimum.

use std::cmp::Ordering;

use tracing::{debug, info, instrument};

use super::report::{RankedBranch, RankingReport};
use super::{resolve_all, validate_branch_set};
use crate::config::AppConfig;
use crate::conflict::extract_from_comparison;
use crate::errors::SearchError;
use crate::scoring::ConflictScorer;
use crate::vcs::{BranchRef, VcsGateway};

/// Scores each branch once against the base.
pub struct IndependentEstimator<'a> {
    gateway: &'a dyn VcsGateway,
    scorer: &'a ConflictScorer,
    base_branch: String,
    fetch: bool,
}

impl<'a> IndependentEstimator<'a> {
    pub fn new(
        gateway: &'a dyn VcsGateway,
        scorer: &'a ConflictScorer,
        base_branch: impl Into<String>,
        fetch: bool,
    ) -> Self {
        Self {
            gateway,
            scorer,
            base_branch: base_branch.into(),
            fetch,
        }
    }

    pub fn from_config(
        gateway: &'a dyn VcsGateway,
        scorer: &'a ConflictScorer,
        config: &AppConfig,
    ) -> Self {
        Self::new(gateway, scorer, config.repo.base_branch.clone(), config.repo.fetch)
    }

    /// Rank `branches` easiest first. Equal scores are ordered by name, so
    /// the result does not depend on the input order.
    #[instrument(skip(self), fields(base = %self.base_branch))]
    pub async fn rank(
        &self,
        branches: &[String],
    ) -> Result<(BranchRef, RankingReport), SearchError> {
        validate_branch_set(branches, None)?;
        let (base, candidates) =
            resolve_all(self.gateway, &self.base_branch, branches, self.fetch).await?;

        let mut ranking = Vec::with_capacity(candidates.len());
        for branch in candidates {
            let merge_base = self
                .gateway
                .merge_base(&base.revision, &branch.revision)
                .await?;
            let preview = self
                .gateway
                .merge_preview(&merge_base, &base.revision, &branch.revision)
                .await?;
            let signal = extract_from_comparison(&preview);
            let score = self.scorer.score(&signal).await;
            debug!(
                branch = %branch.name,
                %signal,
                final_score = score.final_score,
                "estimated branch"
            );
            ranking.push(RankedBranch {
                branch,
                merge_base,
                signal,
                score,
            });
        }

        ranking.sort_by(compare_ranked);
        info!(count = ranking.len(), "independent ranking finished");
        Ok((base, RankingReport::new(ranking)))
    }
}

fn compare_ranked(a: &RankedBranch, b: &RankedBranch) -> Ordering {
    a.score
        .final_score
        .total_cmp(&b.score.final_score)
        .then_with(|| a.branch.name.cmp(&b.branch.name))
}
