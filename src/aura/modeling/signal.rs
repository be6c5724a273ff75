use std::collections::VecDeque;

use tracing::debug;

use crate::aura::config::{ConfigError, SignalParams};
use crate::aura::history::BoundedHistory;
use crate::aura::modeling::attention::{compute_attention, normalize_blink_rate};
use crate::aura::modeling::trend::{slope, variance};
use crate::aura::types::{
    clamp01, AdvisoryDirection, CognitiveSample, ContextSnapshot, DistractionRisk,
    MetricsUpdate, NetworkQuality, ProcessedMetrics, SessionStats, StateAdvisory,
};

/// Minimum history before stability is computed rather than assumed neutral.
const MIN_STABILITY_SAMPLES: usize = 5;

#[derive(Debug, Clone)]
pub struct SignalOutput {
    pub update: MetricsUpdate,
    pub advisory: Option<StateAdvisory>,
}

pub struct SignalProcessor {
    params: SignalParams,
    buffer: VecDeque<f64>,
    history: BoundedHistory<ProcessedMetrics>,
    stats: SessionStats,
}

impl SignalProcessor {
    pub fn new(params: SignalParams) -> Result<Self, ConfigError> {
        if params.buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize(params.buffer_size));
        }
        if params.history_cap == 0 || params.history_keep == 0 || params.history_keep > params.history_cap {
            return Err(ConfigError::InvalidHistoryBounds {
                name: "metrics history",
                cap: params.history_cap,
                keep: params.history_keep,
            });
        }
        if !(0.0..=1.0).contains(&params.context_stress_trigger) {
            return Err(ConfigError::OutOfUnitRange {
                name: "context stress trigger",
                value: params.context_stress_trigger,
            });
        }
        Ok(Self {
            buffer: VecDeque::with_capacity(params.buffer_size + 1),
            history: BoundedHistory::new(params.history_cap, params.history_keep),
            stats: SessionStats::default(),
            params,
        })
    }

    /// Pushes a raw attention value and returns the outlier-robust blend
    /// 0.6 * median + 0.4 * mean of the rolling buffer.
    pub fn filter(&mut self, raw_value: f64) -> f64 {
        self.buffer.push_back(clamp01(raw_value));
        while self.buffer.len() > self.params.buffer_size {
            self.buffer.pop_front();
        }

        let mean = self.buffer.iter().sum::<f64>() / self.buffer.len() as f64;
        let median = median(self.buffer.iter().copied());
        clamp01(0.6 * median + 0.4 * mean)
    }

    pub fn cognitive_load(&self, sample: &CognitiveSample) -> f64 {
        let context = context_of(sample);
        cognitive_load_with(sample, &context)
    }

    pub fn stress_indicators(&self, sample: &CognitiveSample) -> Vec<f64> {
        let context = context_of(sample);
        stress_indicators_with(sample, &context, self.params.context_stress_trigger)
    }

    pub fn quality_score(&self, sample: &CognitiveSample) -> f64 {
        let context = context_of(sample);
        quality_score_with(sample, &context)
    }

    pub fn process(&mut self, sample: CognitiveSample) -> SignalOutput {
        let sample = sample.sanitized();
        let context = context_of(&sample);

        let cognitive_load = cognitive_load_with(&sample, &context);
        let raw_attention = compute_attention(
            sample.gaze_stability,
            sample.head_stillness,
            normalize_blink_rate(sample.blink_rate),
            &context,
            cognitive_load,
        );
        let filtered_attention = self.filter(raw_attention);

        let metrics = ProcessedMetrics {
            timestamp: sample.timestamp,
            raw_attention,
            filtered_attention,
            cognitive_load,
            stress_indicators: stress_indicators_with(&sample, &context, self.params.context_stress_trigger),
            quality_score: quality_score_with(&sample, &context),
        };

        let evicted = self.history.push(metrics.clone());
        if evicted > 0 {
            debug!(evicted, retained = self.history.len(), "Metrics history truncated");
        }
        self.stats = self.compute_stats();
        let advisory = self.check_advisory(sample.timestamp);

        debug!(
            raw = raw_attention,
            filtered = filtered_attention,
            load = cognitive_load,
            quality = metrics.quality_score,
            "Sample processed"
        );

        SignalOutput {
            update: MetricsUpdate {
                metrics,
                stats: self.stats.clone(),
            },
            advisory,
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.clone()
    }

    pub fn recent_metrics(&self, n: usize) -> Vec<ProcessedMetrics> {
        self.history.recent_vec(n)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.history.clear();
        self.stats = SessionStats::default();
    }

    fn filtered_values(&self) -> Vec<f64> {
        self.history.iter().map(|m| m.filtered_attention).collect()
    }

    fn compute_stats(&self) -> SessionStats {
        let values = self.filtered_values();
        if values.is_empty() {
            return SessionStats::default();
        }

        let average = values.iter().sum::<f64>() / values.len() as f64;
        let peak = values.iter().copied().fold(f64::MIN, f64::max);
        let min = values.iter().copied().fold(f64::MAX, f64::min);

        let stability = if values.len() >= MIN_STABILITY_SAMPLES {
            let start = values.len().saturating_sub(self.params.stability_window.max(2));
            clamp01(1.0 - variance(&values[start..]).sqrt())
        } else {
            0.5
        };

        SessionStats {
            sample_count: values.len(),
            average_attention: clamp01(average),
            peak_attention: clamp01(peak),
            min_attention: clamp01(min),
            stability,
            trend_slope: slope(&values, self.params.trend_window),
        }
    }

    fn check_advisory(&self, timestamp: chrono::DateTime<chrono::Utc>) -> Option<StateAdvisory> {
        if self.history.len() < self.params.trend_window {
            return None;
        }
        let recent: Vec<f64> = self
            .history
            .recent(self.params.trend_window)
            .map(|m| m.filtered_attention)
            .collect();
        let trailing_slope = slope(&recent, self.params.trend_window);
        let average = recent.iter().sum::<f64>() / recent.len() as f64;

        let direction = if trailing_slope < -self.params.advisory_slope
            && average < self.params.advisory_low_average
        {
            AdvisoryDirection::Declining
        } else if trailing_slope > self.params.advisory_slope
            && average > self.params.advisory_high_average
        {
            AdvisoryDirection::Improving
        } else {
            return None;
        };

        Some(StateAdvisory {
            timestamp,
            direction,
            slope: trailing_slope,
            average_attention: average,
        })
    }
}

fn context_of(sample: &CognitiveSample) -> ContextSnapshot {
    sample
        .context
        .clone()
        .unwrap_or_else(|| ContextSnapshot::fallback(sample.timestamp))
}

fn cognitive_load_with(sample: &CognitiveSample, context: &ContextSnapshot) -> f64 {
    let mut load = 0.0;
    if sample.blink_rate > 20.0 {
        load += 0.3;
    }
    if sample.gaze_stability < 0.5 {
        load += 0.4;
    }
    load += 0.3 * clamp01(context.interaction.cognitive_load_indicator);
    if context.location.distraction_risk == DistractionRisk::High {
        load += 0.2;
    }
    clamp01(load)
}

fn stress_indicators_with(sample: &CognitiveSample, context: &ContextSnapshot, context_trigger: f64) -> Vec<f64> {
    let mut indicators = Vec::with_capacity(4);
    if sample.blink_rate > 22.0 {
        indicators.push(0.8);
    }
    if sample.gaze_stability < 0.3 {
        indicators.push(0.7);
    }
    if sample.head_stillness < 0.4 {
        indicators.push(0.6);
    }
    let context_stress = clamp01(context.interaction.stress_indicator);
    if context_stress > context_trigger {
        indicators.push(context_stress);
    }
    indicators
}

fn quality_score_with(sample: &CognitiveSample, context: &ContextSnapshot) -> f64 {
    let mut quality = sample.confidence_or_default();
    if context.location.distraction_risk == DistractionRisk::High {
        quality *= 0.7;
    }
    if context.device.battery_level < 0.2 {
        quality *= 0.8;
    }
    if context.device.network_quality == NetworkQuality::Poor {
        quality *= 0.9;
    }
    quality.clamp(0.1, 1.0)
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
