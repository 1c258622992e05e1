//! Deterministic structural difficulty score.

use crate::config::ScoringConfig;
use crate::conflict::ConflictSignal;

/// Weighted sum of the signal's counts plus a flat bonus once enough files
/// are touched.
///
/// Monotonic non-decreasing in every field because all weights are
/// validated to be non-negative. A clean signal scores exactly zero.
#[derive(Debug, Clone)]
pub struct StructuralScorer {
    weights: ScoringConfig,
}

impl StructuralScorer {
    pub fn new(weights: ScoringConfig) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringConfig {
        &self.weights
    }

    pub fn score(&self, signal: &ConflictSignal) -> f64 {
        let w = &self.weights;
        let mut score = f64::from(signal.conflict_line_count) * w.line_weight
            + f64::from(signal.conflict_block_count) * w.block_weight
            + f64::from(signal.touched_file_count) * w.file_weight;
        if signal.touched_file_count >= w.file_threshold {
            score += w.threshold_bonus;
        }
        score
    }
}

impl Default for StructuralScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(blocks: u32, lines: u32, files: u32) -> ConflictSignal {
        ConflictSignal {
            conflict_block_count: blocks,
            conflict_line_count: lines,
            touched_file_count: files,
        }
    }

    #[test]
    fn test_clean_signal_scores_zero() {
        assert_eq!(StructuralScorer::default().score(&ConflictSignal::CLEAN), 0.0);
    }

    #[test]
    fn test_reference_weights() {
        let scorer = StructuralScorer::default();
        // 10 * 0.4 + 2 * 6 + 2 * 12
        assert!((scorer.score(&signal(2, 10, 2)) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_bonus_applies_at_threshold() {
        let scorer = StructuralScorer::default();
        let below = scorer.score(&signal(4, 8, 4));
        let at = scorer.score(&signal(4, 8, 5));
        assert!((at - below - (12.0 + 25.0)).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_in_each_field() {
        let scorer = StructuralScorer::default();
        for blocks in 0..6 {
            for lines in (0..40).step_by(7) {
                for files in 0..8 {
                    let base = scorer.score(&signal(blocks, lines, files));
                    assert!(scorer.score(&signal(blocks + 1, lines, files)) >= base);
                    assert!(scorer.score(&signal(blocks, lines + 1, files)) >= base);
                    assert!(scorer.score(&signal(blocks, lines, files + 1)) >= base);
                }
            }
        }
    }

    #[test]
    fn test_custom_weights() {
        let scorer = StructuralScorer::new(ScoringConfig {
            line_weight: 1.0,
            block_weight: 0.0,
            file_weight: 0.0,
            file_threshold: u32::MAX,
            threshold_bonus: 0.0,
        });
        assert_eq!(scorer.score(&signal(3, 17, 2)), 17.0);
    }
}
