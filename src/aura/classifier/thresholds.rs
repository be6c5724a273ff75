use serde::{Deserialize, Serialize};

use crate::aura::config::ConfigError;
use crate::aura::types::{clamp01, CognitiveStateKind};

/// Smallest allowed distance between the fragmented ceiling and the deep-focus
/// floor after adaptation.
pub const MIN_BAND_GAP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub min: f64,
    pub optimal: f64,
    pub max: f64,
}

impl ThresholdBand {
    pub const fn new(min: f64, optimal: f64, max: f64) -> Self {
        Self { min, optimal, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn is_ordered(&self) -> bool {
        let in_unit = [self.min, self.optimal, self.max]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v));
        in_unit && self.min <= self.optimal && self.optimal <= self.max
    }
}

/// Attention cutoffs per regime. Never mutated in place: adaptation yields a
/// new value with a bumped `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveThresholds {
    pub version: u64,
    pub deep_focus: ThresholdBand,
    pub creative_flow: ThresholdBand,
    pub fragmented_attention: ThresholdBand,
    /// Adapts on entry into overload but no classification rule reads it;
    /// kept for seeding and analytics. Overload is decided by load and
    /// stress alone.
    pub cognitive_overload: ThresholdBand,
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self {
            version: 0,
            deep_focus: ThresholdBand::new(0.75, 0.85, 1.0),
            creative_flow: ThresholdBand::new(0.5, 0.65, 0.8),
            fragmented_attention: ThresholdBand::new(0.0, 0.3, 0.45),
            cognitive_overload: ThresholdBand::new(0.0, 0.2, 0.4),
        }
    }
}

impl AdaptiveThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bands = [
            ("deep_focus", &self.deep_focus),
            ("creative_flow", &self.creative_flow),
            ("fragmented_attention", &self.fragmented_attention),
            ("cognitive_overload", &self.cognitive_overload),
        ];
        for (name, band) in bands {
            if !band.is_ordered() {
                return Err(ConfigError::InvalidThresholds(format!(
                    "{name} band must satisfy 0 <= min <= optimal <= max <= 1"
                )));
            }
        }
        if self.fragmented_attention.max >= self.deep_focus.min {
            return Err(ConfigError::InvalidThresholds(
                "fragmented_attention.max must be below deep_focus.min".to_string(),
            ));
        }
        Ok(())
    }

    /// Attention boundaries that make a classification borderline.
    pub fn boundaries(&self) -> [f64; 2] {
        [self.fragmented_attention.max, self.deep_focus.min]
    }

    /// Threshold set nudged toward `attention` after a transition into
    /// `target`. Creative flow has no adaptive cutoff.
    pub fn adapted(&self, target: CognitiveStateKind, attention: f64, rate: f64) -> Option<Self> {
        let attention = clamp01(attention);
        let rate = clamp01(rate);
        let mut next = self.clone();

        match target {
            CognitiveStateKind::DeepFocus => {
                let band = &mut next.deep_focus;
                let floor = self.fragmented_attention.max + MIN_BAND_GAP;
                band.min = (band.min + rate * (attention - band.min)).clamp(floor.min(0.95), 0.95);
                band.optimal = band.optimal.max(band.min);
                band.max = band.max.max(band.optimal);
            }
            CognitiveStateKind::FragmentedAttention => {
                let band = &mut next.fragmented_attention;
                let ceiling = self.deep_focus.min - MIN_BAND_GAP;
                band.max = (band.max + rate * (attention - band.max)).clamp(0.05, ceiling.max(0.05));
                band.optimal = band.optimal.min(band.max);
                band.min = band.min.min(band.optimal);
            }
            CognitiveStateKind::CognitiveOverload => {
                let band = &mut next.cognitive_overload;
                band.max = (band.max + rate * (attention - band.max)).clamp(0.05, 0.95);
                band.optimal = band.optimal.min(band.max);
                band.min = band.min.min(band.optimal);
            }
            CognitiveStateKind::CreativeFlow => return None,
        }

        next.version = self.version + 1;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_are_valid() {
        assert!(AdaptiveThresholds::default().validate().is_ok());
    }

    #[test]
    fn deep_focus_floor_moves_toward_attention() {
        let base = AdaptiveThresholds::default();
        let next = base.adapted(CognitiveStateKind::DeepFocus, 0.95, 0.05).unwrap();
        assert!((next.deep_focus.min - (0.75 + 0.05 * 0.2)).abs() < 1e-12);
        assert_eq!(next.version, 1);
        // source value untouched
        assert_eq!(base.deep_focus.min, 0.75);
        assert_eq!(base.version, 0);
    }

    #[test]
    fn fragmented_ceiling_keeps_gap_below_focus_floor() {
        let mut thresholds = AdaptiveThresholds::default();
        for _ in 0..500 {
            thresholds = thresholds
                .adapted(CognitiveStateKind::FragmentedAttention, 1.0, 0.5)
                .unwrap();
        }
        assert!(thresholds.fragmented_attention.max <= thresholds.deep_focus.min - MIN_BAND_GAP + 1e-12);
        assert!(thresholds.validate().is_ok());
    }

    #[test]
    fn overload_ceiling_adapts() {
        let next = AdaptiveThresholds::default()
            .adapted(CognitiveStateKind::CognitiveOverload, 0.2, 0.05)
            .unwrap();
        assert!((next.cognitive_overload.max - 0.39).abs() < 1e-12);
    }

    #[test]
    fn creative_flow_does_not_adapt() {
        assert!(AdaptiveThresholds::default()
            .adapted(CognitiveStateKind::CreativeFlow, 0.6, 0.05)
            .is_none());
    }

    #[test]
    fn inverted_bands_are_rejected() {
        let mut thresholds = AdaptiveThresholds::default();
        thresholds.fragmented_attention.max = 0.8;
        thresholds.fragmented_attention.optimal = 0.5;
        assert!(thresholds.validate().is_err());
    }
}
