//! Results of an order search.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{ResolutionPolicy, Strategy};
use crate::conflict::ConflictSignal;
use crate::scoring::ScoreResult;
use crate::vcs::BranchRef;

/// How one simulated merge step went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Clean,
    Conflict,
}

/// One branch merged at one position of a simulated order.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub branch: String,
    pub outcome: StepOutcome,
    pub signal: ConflictSignal,
    pub score: ScoreResult,
}

impl StepRecord {
    pub fn clean(branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
            outcome: StepOutcome::Clean,
            signal: ConflictSignal::CLEAN,
            score: ScoreResult::clean(),
        }
    }
}

/// A permutation of the candidate branches and the summed final scores
/// observed while simulating it.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOrder {
    pub branches: Vec<BranchRef>,
    pub cumulative_score: f64,
}

impl MergeOrder {
    pub fn names(&self) -> Vec<&str> {
        self.branches.iter().map(|b| b.name.as_str()).collect()
    }
}

/// Result of the exhaustive strategy.
#[derive(Debug, Clone, Serialize)]
pub struct OrderReport {
    pub order: MergeOrder,
    /// Per-step records of the selected order.
    pub steps: Vec<StepRecord>,
    pub permutations_evaluated: usize,
    pub permutations_pruned: usize,
    pub resolution: ResolutionPolicy,
}

/// One branch scored against the current base.
#[derive(Debug, Clone, Serialize)]
pub struct RankedBranch {
    pub branch: BranchRef,
    pub merge_base: String,
    pub signal: ConflictSignal,
    pub score: ScoreResult,
}

/// Result of the independent strategy.
#[derive(Debug, Clone, Serialize)]
pub struct RankingReport {
    /// Easiest first.
    pub ranking: Vec<RankedBranch>,
    pub note: &'static str,
}

pub const RANKING_NOTE: &str = "per-branch difficulty against the current base; \
not a cumulative merge order";

impl RankingReport {
    pub fn new(ranking: Vec<RankedBranch>) -> Self {
        Self {
            ranking,
            note: RANKING_NOTE,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.ranking.iter().map(|r| r.branch.name.as_str()).collect()
    }
}

/// Strategy-specific part of a [`MergeReport`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SearchOutcome {
    Exhaustive(OrderReport),
    Independent(RankingReport),
}

impl SearchOutcome {
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Exhaustive(_) => Strategy::Exhaustive,
            Self::Independent(_) => Strategy::Independent,
        }
    }
}

/// Everything a run reports.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub generated_at: DateTime<Utc>,
    pub base: BranchRef,
    #[serde(flatten)]
    pub outcome: SearchOutcome,
}

impl MergeReport {
    pub fn new(base: BranchRef, outcome: SearchOutcome) -> Self {
        Self {
            generated_at: Utc::now(),
            base,
            outcome,
        }
    }

    /// Whether any advisory score in the report is a degraded fallback.
    pub fn has_degraded_scores(&self) -> bool {
        match &self.outcome {
            SearchOutcome::Exhaustive(r) => {
                r.steps.iter().any(|s| s.score.provenance.is_degraded())
            }
            SearchOutcome::Independent(r) => {
                r.ranking.iter().any(|b| b.score.provenance.is_degraded())
            }
        }
    }
}
