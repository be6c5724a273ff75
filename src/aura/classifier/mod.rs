mod scoring;
mod state_machine;
mod thresholds;

pub use scoring::{FeatureVector, LinearScorer, LinearWeights, ScoringStrategy, StateScores};
pub use state_machine::{Classification, OverrideRule, StateClassifier, TransitionLog, METRICS_TRIGGER};
pub use thresholds::{AdaptiveThresholds, ThresholdBand, MIN_BAND_GAP};
