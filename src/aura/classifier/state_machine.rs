use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aura::classifier::scoring::{FeatureVector, LinearScorer, ScoringStrategy};
use crate::aura::classifier::thresholds::AdaptiveThresholds;
use crate::aura::config::{ClassifierParams, ConfigError, SmoothingParams};
use crate::aura::history::BoundedHistory;
use crate::aura::modeling::attention::contextual_ema;
use crate::aura::modeling::trend::slope;
use crate::aura::types::{
    clamp01, CognitiveState, CognitiveStateKind, MetricsUpdate, StatePrediction, StateTransition,
};

const OVERLOAD_STRESS: f64 = 0.8;
const OVERLOAD_LOAD: f64 = 0.9;
const DEEP_FOCUS_MAX_LOAD: f64 = 0.6;
const CREATIVE_MAX_LOAD: f64 = 0.5;
const CREATIVE_MIN_STABILITY: f64 = 0.7;
const CREATIVE_MAX_STRESS: f64 = 0.3;
const CREATIVE_MIN_ENGAGEMENT: f64 = 0.5;
const BORDERLINE_PENALTY: f64 = 0.7;
const AGREEMENT_WINDOW: usize = 3;
const ATTENTION_HISTORY: usize = 50;

pub const METRICS_TRIGGER: &str = "metrics-driven";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideRule {
    OverloadSafety,
    LowAttention,
    SustainedFocus,
    CreativeIndicators,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub state: CognitiveState,
    pub transition: Option<StateTransition>,
    pub features: FeatureVector,
    pub provisional: CognitiveStateKind,
    pub override_rule: Option<OverrideRule>,
}

/// Records a transition whenever consecutive labels differ.
#[derive(Debug, Clone)]
pub struct TransitionLog {
    previous: CognitiveStateKind,
    next_sequence: u64,
    entries: BoundedHistory<StateTransition>,
}

impl TransitionLog {
    pub fn new(initial: CognitiveStateKind, cap: usize, keep: usize) -> Self {
        Self {
            previous: initial,
            next_sequence: 0,
            entries: BoundedHistory::new(cap, keep),
        }
    }

    pub fn observe(
        &mut self,
        label: CognitiveStateKind,
        timestamp: DateTime<Utc>,
        confidence: f64,
    ) -> Option<StateTransition> {
        if label == self.previous {
            return None;
        }
        let transition = StateTransition {
            sequence: self.next_sequence,
            from: self.previous,
            to: label,
            timestamp,
            trigger: METRICS_TRIGGER.to_string(),
            confidence: clamp01(confidence),
        };
        self.next_sequence += 1;
        self.previous = label;
        self.entries.push(transition.clone());
        Some(transition)
    }

    pub fn previous(&self) -> CognitiveStateKind {
        self.previous
    }

    pub fn entries(&self) -> Vec<StateTransition> {
        self.entries.to_vec()
    }

    /// Starts a new session at `initial`; sequence numbers keep increasing.
    pub fn restart(&mut self, initial: CognitiveStateKind) {
        self.previous = initial;
        self.entries.clear();
    }
}

pub struct StateClassifier {
    params: ClassifierParams,
    default_alpha: f64,
    scorer: Box<dyn ScoringStrategy>,
    thresholds: Arc<AdaptiveThresholds>,
    current: CognitiveState,
    last_tick: Option<DateTime<Utc>>,
    attention_history: BoundedHistory<f64>,
    state_history: BoundedHistory<CognitiveState>,
    transitions: TransitionLog,
}

impl StateClassifier {
    pub fn new(
        params: ClassifierParams,
        smoothing: &SmoothingParams,
        started_at: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        Self::with_scorer(params, smoothing, started_at, Box::new(LinearScorer::default()))
    }

    pub fn with_scorer(
        params: ClassifierParams,
        smoothing: &SmoothingParams,
        started_at: DateTime<Utc>,
        scorer: Box<dyn ScoringStrategy>,
    ) -> Result<Self, ConfigError> {
        params.thresholds.validate()?;
        if !(1..=3).contains(&params.creative_flow_min_indicators) {
            return Err(ConfigError::InvalidIndicatorCount(params.creative_flow_min_indicators));
        }
        let initial = CognitiveState::initial(started_at);
        Ok(Self {
            default_alpha: smoothing.default_alpha,
            scorer,
            thresholds: Arc::new(params.thresholds.clone()),
            transitions: TransitionLog::new(
                initial.state,
                params.transition_history_cap,
                params.transition_history_keep,
            ),
            state_history: BoundedHistory::new(params.state_history_cap, params.state_history_keep),
            attention_history: BoundedHistory::new(ATTENTION_HISTORY, ATTENTION_HISTORY / 2),
            current: initial,
            last_tick: None,
            params,
        })
    }

    pub fn classify(&mut self, update: &MetricsUpdate) -> Classification {
        let metrics = &update.metrics;
        let attention = clamp01(metrics.filtered_attention);
        self.attention_history.push(attention);

        let elapsed_secs = match self.last_tick {
            Some(previous) => (metrics.timestamp - previous).num_milliseconds().max(0) as f64 / 1000.0,
            None => 0.0,
        };
        self.last_tick = Some(match self.last_tick {
            Some(previous) if previous > metrics.timestamp => previous,
            _ => metrics.timestamp,
        });

        let features = self.build_features(update, attention, elapsed_secs);
        let provisional = self.scorer.scores(&features).best();
        let (label, override_rule) = self.apply_overrides(&features, provisional);

        let thresholds = Arc::clone(&self.thresholds);
        let confidence = self.confidence(label, &features, &thresholds);
        let transition = self.transitions.observe(label, metrics.timestamp, confidence);

        let (entered_at, duration_secs) = if transition.is_some() {
            (metrics.timestamp, 0.0)
        } else {
            (self.current.entered_at, self.current.duration_secs + elapsed_secs)
        };

        let state = CognitiveState {
            state: label,
            attention: contextual_ema(attention, self.current.attention, label.as_str(), self.default_alpha),
            cognitive_load: features.cognitive_load,
            stability: features.stability,
            confidence,
            entered_at,
            duration_secs,
            predictions: Vec::new(),
        };

        if let Some(ref t) = transition {
            info!(
                from = t.from.as_str(),
                to = t.to.as_str(),
                sequence = t.sequence,
                confidence = t.confidence,
                "Cognitive state transition"
            );
            if let Some(next) = thresholds.adapted(label, attention, self.params.learning_rate) {
                debug!(version = next.version, state = label.as_str(), "Thresholds adapted");
                self.thresholds = Arc::new(next);
            }
        }

        self.state_history.push(state.clone());
        self.current = state.clone();

        debug!(
            state = label.as_str(),
            provisional = provisional.as_str(),
            scorer = self.scorer.name(),
            attention,
            confidence,
            "Classified tick"
        );

        Classification {
            state,
            transition,
            features,
            provisional,
            override_rule,
        }
    }

    /// Attaches advisory forecasts to the authoritative state.
    pub fn set_predictions(&mut self, predictions: Vec<StatePrediction>) {
        self.current.predictions = predictions.clone();
        if let Some(last) = self.state_history.last_mut() {
            last.predictions = predictions;
        }
    }

    pub fn current(&self) -> CognitiveState {
        self.current.clone()
    }

    pub fn thresholds(&self) -> Arc<AdaptiveThresholds> {
        Arc::clone(&self.thresholds)
    }

    /// Replaces thresholds, e.g. with values seeded from storage.
    pub fn seed_thresholds(&mut self, thresholds: AdaptiveThresholds) -> Result<(), ConfigError> {
        thresholds.validate()?;
        self.thresholds = Arc::new(thresholds);
        Ok(())
    }

    pub fn transitions(&self) -> Vec<StateTransition> {
        self.transitions.entries()
    }

    pub fn state_history(&self) -> Vec<CognitiveState> {
        self.state_history.to_vec()
    }

    /// Resets per-session state. Thresholds survive.
    pub fn reset_session(&mut self, at: DateTime<Utc>) {
        self.current = CognitiveState::initial(at);
        self.last_tick = None;
        self.attention_history.clear();
        self.state_history.clear();
        self.transitions.restart(self.current.state);
    }

    fn build_features(&self, update: &MetricsUpdate, attention: f64, elapsed_secs: f64) -> FeatureVector {
        let enough_history = self.attention_history.len() >= self.params.min_history;
        let (stability, trend_slope) = if enough_history {
            let recent: Vec<f64> = self
                .attention_history
                .recent(self.params.trend_window)
                .copied()
                .collect();
            (clamp01(update.stats.stability), slope(&recent, self.params.trend_window))
        } else {
            (0.5, 0.0)
        };

        FeatureVector {
            attention,
            cognitive_load: clamp01(update.metrics.cognitive_load),
            stability,
            max_stress: clamp01(update.metrics.max_stress()),
            quality: clamp01(update.metrics.quality_score),
            time_in_state_secs: self.current.duration_secs + elapsed_secs,
            trend_slope,
        }
    }

    fn apply_overrides(
        &self,
        features: &FeatureVector,
        provisional: CognitiveStateKind,
    ) -> (CognitiveStateKind, Option<OverrideRule>) {
        let thresholds = &self.thresholds;

        if features.max_stress > OVERLOAD_STRESS || features.cognitive_load > OVERLOAD_LOAD {
            return (CognitiveStateKind::CognitiveOverload, Some(OverrideRule::OverloadSafety));
        }
        if features.attention < thresholds.fragmented_attention.max {
            return (CognitiveStateKind::FragmentedAttention, Some(OverrideRule::LowAttention));
        }
        if features.attention > thresholds.deep_focus.min && features.cognitive_load < DEEP_FOCUS_MAX_LOAD {
            return (CognitiveStateKind::DeepFocus, Some(OverrideRule::SustainedFocus));
        }

        let indicators = [
            thresholds.creative_flow.contains(features.attention)
                && features.cognitive_load < CREATIVE_MAX_LOAD,
            features.stability > CREATIVE_MIN_STABILITY,
            features.max_stress < CREATIVE_MAX_STRESS && features.attention > CREATIVE_MIN_ENGAGEMENT,
        ];
        let met = indicators.iter().filter(|hit| **hit).count();
        if met >= self.params.creative_flow_min_indicators {
            return (CognitiveStateKind::CreativeFlow, Some(OverrideRule::CreativeIndicators));
        }

        (provisional, None)
    }

    fn confidence(
        &self,
        label: CognitiveStateKind,
        features: &FeatureVector,
        thresholds: &AdaptiveThresholds,
    ) -> f64 {
        let mut confidence = features.quality;

        let borderline = thresholds
            .boundaries()
            .iter()
            .any(|boundary| (features.attention - boundary).abs() < self.params.borderline_margin);
        if borderline {
            confidence *= BORDERLINE_PENALTY;
        }

        let mut window: Vec<CognitiveStateKind> = self
            .state_history
            .recent(AGREEMENT_WINDOW - 1)
            .map(|s| s.state)
            .collect();
        window.push(label);
        let agreeing = window.iter().filter(|k| **k == label).count() as f64;
        let agreement = agreeing / window.len() as f64;

        clamp01(confidence * (0.5 + 0.5 * agreement))
    }
}
