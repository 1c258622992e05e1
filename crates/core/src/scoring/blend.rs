//! Weighted blend of the structural and advisory scores.

use crate::config::validate_blend_weights;
use crate::errors::ConfigError;

/// `final = structural_weight * structural + advisory_weight * advisory`.
///
/// Weights are checked at construction: each in `[0, 1]`, summing to one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBlender {
    structural_weight: f64,
    advisory_weight: f64,
}

impl ScoreBlender {
    pub fn new(structural_weight: f64, advisory_weight: f64) -> Result<Self, ConfigError> {
        validate_blend_weights(structural_weight, advisory_weight)?;
        Ok(Self {
            structural_weight,
            advisory_weight,
        })
    }

    /// The degenerate `1 / 0` blend used when no advisory scorer exists.
    pub fn structural_only() -> Self {
        Self {
            structural_weight: 1.0,
            advisory_weight: 0.0,
        }
    }

    pub fn structural_weight(&self) -> f64 {
        self.structural_weight
    }

    pub fn advisory_weight(&self) -> f64 {
        self.advisory_weight
    }

    pub fn is_structural_only(&self) -> bool {
        self.advisory_weight == 0.0
    }

    /// Blend two scores. The result always lies between them.
    pub fn blend(&self, structural: f64, advisory: f64) -> f64 {
        if self.is_structural_only() {
            return structural;
        }
        let blended = self.structural_weight * structural + self.advisory_weight * advisory;
        blended.clamp(structural.min(advisory), structural.max(advisory))
    }
}

impl Default for ScoreBlender {
    fn default() -> Self {
        Self {
            structural_weight: 0.5,
            advisory_weight: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_even_split() {
        let blender = ScoreBlender::default();
        assert_eq!(blender.blend(40.0, 60.0), 50.0);
    }

    #[test]
    fn test_rejects_weights_not_summing_to_one() {
        assert!(matches!(
            ScoreBlender::new(0.5, 0.6),
            Err(ConfigError::InvalidConfiguration { .. })
        ));
        assert!(ScoreBlender::new(-0.5, 1.5).is_err());
    }

    #[test]
    fn test_blend_stays_between_inputs() {
        let weights = [(0.0, 1.0), (0.1, 0.9), (0.3, 0.7), (0.5, 0.5), (0.7, 0.3), (1.0, 0.0)];
        let pairs = [(0.0, 100.0), (37.3, 12.9), (250.0, 50.0), (1e-9, 1e9), (7.0, 7.0)];
        for (w1, w2) in weights {
            let blender = ScoreBlender::new(w1, w2).unwrap();
            for (s, a) in pairs {
                let f = blender.blend(s, a);
                assert!(f >= s.min(a) && f <= s.max(a), "{w1}/{w2} on {s},{a} gave {f}");
            }
        }
    }

    #[test]
    fn test_structural_only_is_exact() {
        let blender = ScoreBlender::new(1.0, 0.0).unwrap();
        assert!(blender.is_structural_only());
        assert_eq!(blender.blend(0.1 + 0.2, 99.0), 0.1 + 0.2);
        assert_eq!(blender, ScoreBlender::structural_only());
    }
}
