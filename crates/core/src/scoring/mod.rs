//! Conflict difficulty scoring.
//!
//! A [`ConflictScorer`] turns a [`ConflictSignal`] into a [`ScoreResult`]:
//! the deterministic structural score, the advisory oracle's score (or its
//! degraded fallback), and their blend. Scoring never fails.

pub mod advisory;
pub mod blend;
pub mod oracle;
pub mod structural;

pub use advisory::{AdvisoryOracle, AdvisoryScorer, AdvisoryVerdict, NEUTRAL_SCORE};
pub use blend::ScoreBlender;
pub use oracle::HttpOracle;
pub use structural::StructuralScorer;

use serde::Serialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::conflict::ConflictSignal;
use crate::errors::ConfigError;

/// Which scorers contributed to a final score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scorers", rename_all = "snake_case")]
pub enum ScoreProvenance {
    /// The signal was clean; nothing was scored.
    Clean,
    /// Only the structural scorer was used.
    StructuralOnly,
    /// Structural and advisory scores were blended.
    Blended,
    /// Blended, but the advisory score is the degraded fallback.
    BlendedDegraded { kind: String },
}

impl ScoreProvenance {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::BlendedDegraded { .. })
    }
}

impl std::fmt::Display for ScoreProvenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::StructuralOnly => write!(f, "structural"),
            Self::Blended => write!(f, "structural+advisory"),
            Self::BlendedDegraded { kind } => {
                write!(f, "structural+advisory (degraded: {kind})")
            }
        }
    }
}

/// Score of one branch at one position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub structural_score: f64,
    pub advisory_score: f64,
    pub advisory_reason: String,
    pub final_score: f64,
    pub provenance: ScoreProvenance,
}

impl ScoreResult {
    /// The zero score of a clean merge.
    pub fn clean() -> Self {
        Self {
            structural_score: 0.0,
            advisory_score: 0.0,
            advisory_reason: "clean merge".into(),
            final_score: 0.0,
            provenance: ScoreProvenance::Clean,
        }
    }
}

/// Structural scorer, optional advisory scorer, and their blender.
#[derive(Clone)]
pub struct ConflictScorer {
    structural: StructuralScorer,
    advisory: Option<AdvisoryScorer>,
    blender: ScoreBlender,
}

impl ConflictScorer {
    /// A blender that gives the advisory side any weight needs an advisory
    /// scorer to feed it.
    pub fn new(
        structural: StructuralScorer,
        advisory: Option<AdvisoryScorer>,
        blender: ScoreBlender,
    ) -> Result<Self, ConfigError> {
        if advisory.is_none() && !blender.is_structural_only() {
            return Err(ConfigError::InvalidConfiguration {
                field: "blend.advisory_weight".into(),
                detail: "advisory weight must be 0 when no advisory scorer is configured".into(),
            });
        }
        Ok(Self {
            structural,
            advisory,
            blender,
        })
    }

    /// Purely structural scoring.
    pub fn structural_only(structural: StructuralScorer) -> Self {
        Self {
            structural,
            advisory: None,
            blender: ScoreBlender::structural_only(),
        }
    }

    /// Build from configuration. With the advisory oracle disabled the
    /// configured blend weights are ignored in favour of `1 / 0`.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        config.scoring.validate()?;
        let structural = StructuralScorer::new(config.scoring.clone());
        if !config.advisory.enabled {
            debug!("advisory oracle disabled, scoring structurally");
            return Ok(Self::structural_only(structural));
        }
        let blender =
            ScoreBlender::new(config.blend.structural_weight, config.blend.advisory_weight)?;
        let advisory = AdvisoryScorer::from_config(&config.advisory);
        Self::new(structural, Some(advisory), blender)
    }

    pub fn blender(&self) -> &ScoreBlender {
        &self.blender
    }

    /// Score one signal. Never fails.
    pub async fn score(&self, signal: &ConflictSignal) -> ScoreResult {
        if signal.is_clean() {
            return ScoreResult::clean();
        }

        let structural_score = self.structural.score(signal);
        let advisory = match &self.advisory {
            Some(advisory) if !self.blender.is_structural_only() => advisory,
            _ => {
                return ScoreResult {
                    structural_score,
                    advisory_score: 0.0,
                    advisory_reason: "advisory scorer not consulted".into(),
                    final_score: structural_score,
                    provenance: ScoreProvenance::StructuralOnly,
                }
            }
        };

        let verdict = advisory.ask_advisory(signal).await;
        let final_score = self
            .blender
            .blend(structural_score, verdict.difficulty_score);
        let provenance = match verdict.degraded {
            Some(kind) => ScoreProvenance::BlendedDegraded {
                kind: kind.to_string(),
            },
            None => ScoreProvenance::Blended,
        };
        debug!(
            structural_score,
            advisory_score = verdict.difficulty_score,
            final_score,
            "scored signal"
        );

        ScoreResult {
            structural_score,
            advisory_score: verdict.difficulty_score,
            advisory_reason: verdict.reason,
            final_score,
            provenance,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::errors::AdvisoryError;

    struct PanickingOracle;

    #[async_trait]
    impl AdvisoryOracle for PanickingOracle {
        async fn consult(&self, _prompt: &str) -> Result<String, AdvisoryError> {
            panic!("oracle must not be consulted");
        }
    }

    struct FixedOracle(f64);

    #[async_trait]
    impl AdvisoryOracle for FixedOracle {
        async fn consult(&self, _prompt: &str) -> Result<String, AdvisoryError> {
            Ok(format!(r#"{{"difficulty_score": {}, "reason": "fixed"}}"#, self.0))
        }
    }

    fn conflicted() -> ConflictSignal {
        ConflictSignal {
            conflict_block_count: 1,
            conflict_line_count: 5,
            touched_file_count: 1,
        }
    }

    #[tokio::test]
    async fn test_clean_signal_scores_zero() {
        let scorer = ConflictScorer::structural_only(StructuralScorer::default());
        let result = scorer.score(&ConflictSignal::CLEAN).await;
        assert_eq!(result.final_score, 0.0);
        assert_eq!(result.provenance, ScoreProvenance::Clean);
    }

    #[tokio::test]
    async fn test_degenerate_weights_skip_advisory() {
        let advisory =
            AdvisoryScorer::new(Arc::new(PanickingOracle), Duration::from_secs(1));
        let scorer = ConflictScorer::new(
            StructuralScorer::default(),
            Some(advisory),
            ScoreBlender::new(1.0, 0.0).unwrap(),
        )
        .unwrap();
        let result = scorer.score(&conflicted()).await;
        assert_eq!(result.final_score, result.structural_score);
        assert_eq!(result.provenance, ScoreProvenance::StructuralOnly);
    }

    #[tokio::test]
    async fn test_blended_score() {
        let advisory = AdvisoryScorer::new(Arc::new(FixedOracle(80.0)), Duration::from_secs(1));
        let scorer = ConflictScorer::new(
            StructuralScorer::default(),
            Some(advisory),
            ScoreBlender::default(),
        )
        .unwrap();
        let result = scorer.score(&conflicted()).await;
        // 5 * 0.4 + 6 + 12 = 20
        assert!((result.structural_score - 20.0).abs() < 1e-9);
        assert!((result.final_score - 50.0).abs() < 1e-9);
        assert_eq!(result.provenance, ScoreProvenance::Blended);
    }

    #[tokio::test]
    async fn test_missing_credential_is_surfaced() {
        let scorer = ConflictScorer::new(
            StructuralScorer::default(),
            Some(AdvisoryScorer::without_credential("MERGE_ORDER_API_KEY")),
            ScoreBlender::default(),
        )
        .unwrap();
        let result = scorer.score(&conflicted()).await;
        assert_eq!(result.advisory_score, NEUTRAL_SCORE);
        assert!(result.provenance.is_degraded());
        assert!(result.advisory_reason.contains("missing_credential"));
    }

    #[test]
    fn test_advisory_weight_without_scorer_is_rejected() {
        let result =
            ConflictScorer::new(StructuralScorer::default(), None, ScoreBlender::default());
        assert!(matches!(result, Err(ConfigError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_from_config_disabled_advisory_is_structural() {
        let config = AppConfig::default();
        let scorer = ConflictScorer::from_config(&config).unwrap();
        assert!(scorer.blender().is_structural_only());
    }
}
