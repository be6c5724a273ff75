use crate::aura::config::PredictorParams;
use crate::aura::types::{clamp01, CognitiveState, CognitiveStateKind, StatePrediction};

/// Heuristic forecasts of the next regime. Advisory only: nothing here
/// touches the authoritative state.
#[derive(Debug, Clone, Default)]
pub struct StatePredictor {
    params: PredictorParams,
}

impl StatePredictor {
    pub fn new(params: PredictorParams) -> Self {
        Self { params }
    }

    pub fn predict(&self, state: &CognitiveState, trend_slope: f64) -> Vec<StatePrediction> {
        let p = &self.params;
        let minutes = state.duration_minutes();
        let declining = trend_slope < -p.trend_slope;
        let rising = trend_slope > p.trend_slope;
        let mut predictions = Vec::new();

        match state.state {
            CognitiveStateKind::DeepFocus => {
                if minutes > p.focus_fatigue_minutes || declining {
                    predictions.push(prediction(
                        CognitiveStateKind::FragmentedAttention,
                        0.7,
                        5.0,
                        &["fatigue", "attention-decline"],
                    ));
                }
                if state.cognitive_load > p.high_load {
                    predictions.push(prediction(
                        CognitiveStateKind::CognitiveOverload,
                        0.4,
                        10.0,
                        &["load-accumulation"],
                    ));
                }
            }
            CognitiveStateKind::CreativeFlow => {
                if rising && state.attention > 0.65 {
                    predictions.push(prediction(
                        CognitiveStateKind::DeepFocus,
                        0.6,
                        3.0,
                        &["attention-rising"],
                    ));
                }
                if minutes > p.creative_fatigue_minutes {
                    predictions.push(prediction(
                        CognitiveStateKind::FragmentedAttention,
                        0.5,
                        10.0,
                        &["fatigue"],
                    ));
                }
            }
            CognitiveStateKind::FragmentedAttention => {
                if rising {
                    predictions.push(prediction(
                        CognitiveStateKind::CreativeFlow,
                        0.6,
                        5.0,
                        &["attention-recovery"],
                    ));
                }
                if state.cognitive_load > p.high_load {
                    predictions.push(prediction(
                        CognitiveStateKind::CognitiveOverload,
                        0.5,
                        5.0,
                        &["load-accumulation"],
                    ));
                }
            }
            CognitiveStateKind::CognitiveOverload => {
                predictions.push(prediction(
                    CognitiveStateKind::FragmentedAttention,
                    0.8,
                    1.0,
                    &["recovery", "load-release"],
                ));
            }
        }

        predictions
    }
}

fn prediction(next_state: CognitiveStateKind, probability: f64, horizon_minutes: f64, triggers: &[&str]) -> StatePrediction {
    StatePrediction {
        next_state,
        probability: clamp01(probability),
        horizon_minutes,
        triggers: triggers.iter().map(|t| t.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn state(kind: CognitiveStateKind, duration_minutes: f64, load: f64) -> CognitiveState {
        let mut s = CognitiveState::initial(Utc::now());
        s.state = kind;
        s.duration_secs = duration_minutes * 60.0;
        s.cognitive_load = load;
        s.attention = 0.8;
        s
    }

    #[test]
    fn fresh_focus_has_no_forecast() {
        let predictor = StatePredictor::default();
        assert!(predictor
            .predict(&state(CognitiveStateKind::DeepFocus, 5.0, 0.2), 0.0)
            .is_empty());
    }

    #[test]
    fn long_focus_predicts_fragmentation() {
        let predictor = StatePredictor::default();
        let predictions = predictor.predict(&state(CognitiveStateKind::DeepFocus, 26.0, 0.2), 0.0);
        assert_eq!(predictions.len(), 1);
        let p = &predictions[0];
        assert_eq!(p.next_state, CognitiveStateKind::FragmentedAttention);
        assert_eq!(p.probability, 0.7);
        assert_eq!(p.horizon_minutes, 5.0);
        assert_eq!(p.triggers, vec!["fatigue".to_string(), "attention-decline".to_string()]);
    }

    #[test]
    fn declining_focus_predicts_fragmentation_early() {
        let predictor = StatePredictor::default();
        let predictions = predictor.predict(&state(CognitiveStateKind::DeepFocus, 2.0, 0.2), -0.05);
        assert_eq!(predictions[0].next_state, CognitiveStateKind::FragmentedAttention);
    }

    #[test]
    fn overload_always_predicts_recovery() {
        let predictor = StatePredictor::default();
        let predictions = predictor.predict(&state(CognitiveStateKind::CognitiveOverload, 0.0, 0.95), 0.0);
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].next_state, CognitiveStateKind::FragmentedAttention);
        assert_eq!(predictions[0].probability, 0.8);
        assert_eq!(predictions[0].horizon_minutes, 1.0);
    }

    #[test]
    fn recovering_fragmentation_predicts_flow() {
        let predictor = StatePredictor::default();
        let predictions = predictor.predict(&state(CognitiveStateKind::FragmentedAttention, 3.0, 0.8), 0.04);
        let next: Vec<_> = predictions.iter().map(|p| p.next_state).collect();
        assert_eq!(
            next,
            vec![CognitiveStateKind::CreativeFlow, CognitiveStateKind::CognitiveOverload]
        );
    }
}
