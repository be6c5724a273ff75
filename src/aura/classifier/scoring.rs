use serde::{Deserialize, Serialize};

use crate::aura::types::CognitiveStateKind;

/// Inputs to a classification tick. All unit-scaled fields are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub attention: f64,
    pub cognitive_load: f64,
    pub stability: f64,
    pub max_stress: f64,
    pub quality: f64,
    pub time_in_state_secs: f64,
    pub trend_slope: f64,
}

/// One score per regime, in [`CognitiveStateKind::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateScores(pub [f64; 4]);

impl StateScores {
    pub fn get(&self, kind: CognitiveStateKind) -> f64 {
        let idx = CognitiveStateKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(0);
        self.0[idx]
    }

    /// Highest score; ties and non-finite scores resolve to the earlier state.
    pub fn best(&self) -> CognitiveStateKind {
        let mut best = CognitiveStateKind::ALL[0];
        let mut best_score = f64::NEG_INFINITY;
        for (kind, score) in CognitiveStateKind::ALL.iter().zip(self.0.iter()) {
            if score.is_finite() && *score > best_score {
                best = *kind;
                best_score = *score;
            }
        }
        best
    }
}

/// Produces the provisional label before safety overrides run. Swap in a
/// trained model here without touching the override logic.
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn scores(&self, features: &FeatureVector) -> StateScores;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearWeights {
    pub attention: f64,
    pub cognitive_load: f64,
    pub stability: f64,
    pub bias: f64,
}

impl LinearWeights {
    pub const fn new(attention: f64, cognitive_load: f64, stability: f64, bias: f64) -> Self {
        Self {
            attention,
            cognitive_load,
            stability,
            bias,
        }
    }

    fn apply(&self, features: &FeatureVector) -> f64 {
        self.attention * features.attention
            + self.cognitive_load * features.cognitive_load
            + self.stability * features.stability
            + self.bias
    }
}

/// Hand-tuned weighted sum over attention, load and stability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearScorer {
    pub deep_focus: LinearWeights,
    pub creative_flow: LinearWeights,
    pub fragmented_attention: LinearWeights,
    pub cognitive_overload: LinearWeights,
}

impl Default for LinearScorer {
    fn default() -> Self {
        Self {
            deep_focus: LinearWeights::new(0.5, -0.3, 0.2, 0.0),
            creative_flow: LinearWeights::new(0.3, 0.1, 0.1, 0.0),
            fragmented_attention: LinearWeights::new(-0.4, 0.1, -0.2, 0.35),
            cognitive_overload: LinearWeights::new(-0.2, 0.6, -0.1, 0.0),
        }
    }
}

impl ScoringStrategy for LinearScorer {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn scores(&self, features: &FeatureVector) -> StateScores {
        StateScores([
            self.deep_focus.apply(features),
            self.creative_flow.apply(features),
            self.fragmented_attention.apply(features),
            self.cognitive_overload.apply(features),
        ])
    }
}
