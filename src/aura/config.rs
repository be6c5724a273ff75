use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aura::classifier::AdaptiveThresholds;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid buffer size: {0}")]
    InvalidBufferSize(usize),
    #[error("invalid history bounds for {name}: cap {cap}, keep {keep}")]
    InvalidHistoryBounds {
        name: &'static str,
        cap: usize,
        keep: usize,
    },
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),
    #[error("creative flow indicator count must be 1..=3, got {0}")]
    InvalidIndicatorCount(usize),
    #[error("utc offset out of range: {0} minutes")]
    InvalidUtcOffset(i32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalParams {
    pub buffer_size: usize,
    pub history_cap: usize,
    pub history_keep: usize,
    pub stability_window: usize,
    pub trend_window: usize,
    pub advisory_slope: f64,
    pub advisory_low_average: f64,
    pub advisory_high_average: f64,
    /// Context stress counts as an indicator only above this level.
    pub context_stress_trigger: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            buffer_size: 50,
            history_cap: 1000,
            history_keep: 500,
            stability_window: 20,
            trend_window: 10,
            advisory_slope: 0.02,
            advisory_low_average: 0.4,
            advisory_high_average: 0.7,
            context_stress_trigger: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothingParams {
    pub default_alpha: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self { default_alpha: 0.3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextParams {
    pub cache_ttl_secs: i64,
    pub refresh_interval_secs: u64,
    pub emit_min_interval_secs: i64,
    pub emit_score_delta: f64,
    pub layer_timeout_ms: u64,
    pub retention_days: i64,
    pub max_snapshots: usize,
    pub housekeeping_interval_secs: u64,
    pub known_location_history: usize,
    pub known_location_radius_m: f64,
    /// Known locations kept; the least recently seen is evicted first.
    pub known_location_cap: usize,
    pub utc_offset_minutes: i32,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            refresh_interval_secs: 120,
            emit_min_interval_secs: 30,
            emit_score_delta: 0.05,
            layer_timeout_ms: 2000,
            retention_days: 30,
            max_snapshots: 5000,
            housekeeping_interval_secs: 3600,
            known_location_history: 20,
            known_location_radius_m: 100.0,
            known_location_cap: 50,
            utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierParams {
    pub thresholds: AdaptiveThresholds,
    pub learning_rate: f64,
    pub creative_flow_min_indicators: usize,
    pub borderline_margin: f64,
    pub trend_window: usize,
    pub min_history: usize,
    pub state_history_cap: usize,
    pub state_history_keep: usize,
    pub transition_history_cap: usize,
    pub transition_history_keep: usize,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            thresholds: AdaptiveThresholds::default(),
            learning_rate: 0.05,
            creative_flow_min_indicators: 2,
            borderline_margin: 0.1,
            trend_window: 5,
            min_history: 5,
            state_history_cap: 100,
            state_history_keep: 50,
            transition_history_cap: 500,
            transition_history_keep: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorParams {
    pub focus_fatigue_minutes: f64,
    pub creative_fatigue_minutes: f64,
    pub trend_slope: f64,
    pub high_load: f64,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            focus_fatigue_minutes: 25.0,
            creative_fatigue_minutes: 40.0,
            trend_slope: 0.02,
            high_load: 0.7,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuraConfig {
    pub signal: SignalParams,
    pub smoothing: SmoothingParams,
    pub context: ContextParams,
    pub classifier: ClassifierParams,
    pub predictor: PredictorParams,
}

impl AuraConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = env_parse("AURA_BUFFER_SIZE") {
            config.signal.buffer_size = val;
        }
        if let Some(val) = env_parse("AURA_HISTORY_CAP") {
            config.signal.history_cap = val;
        }
        if let Some(val) = env_parse("AURA_HISTORY_KEEP") {
            config.signal.history_keep = val;
        }
        if let Some(val) = env_parse("AURA_CONTEXT_STRESS_TRIGGER") {
            config.signal.context_stress_trigger = val;
        }
        if let Some(val) = env_parse("AURA_KNOWN_LOCATION_CAP") {
            config.context.known_location_cap = val;
        }
        if let Some(val) = env_parse("AURA_EMA_ALPHA") {
            config.smoothing.default_alpha = val;
        }
        if let Some(val) = env_parse("AURA_CONTEXT_TTL_SECS") {
            config.context.cache_ttl_secs = val;
        }
        if let Some(val) = env_parse("AURA_CONTEXT_REFRESH_SECS") {
            config.context.refresh_interval_secs = val;
        }
        if let Some(val) = env_parse("AURA_EMIT_MIN_INTERVAL_SECS") {
            config.context.emit_min_interval_secs = val;
        }
        if let Some(val) = env_parse("AURA_EMIT_SCORE_DELTA") {
            config.context.emit_score_delta = val;
        }
        if let Some(val) = env_parse("AURA_RETENTION_DAYS") {
            config.context.retention_days = val;
        }
        if let Some(val) = env_parse("AURA_MAX_SNAPSHOTS") {
            config.context.max_snapshots = val;
        }
        if let Some(val) = env_parse("AURA_UTC_OFFSET_MINUTES") {
            config.context.utc_offset_minutes = val;
        }
        if let Some(val) = env_parse("AURA_CREATIVE_FLOW_MIN_INDICATORS") {
            config.classifier.creative_flow_min_indicators = val;
        }
        if let Some(val) = env_parse("AURA_THRESHOLD_LEARNING_RATE") {
            config.classifier.learning_rate = val;
        }
        if let Some(val) = env_parse("AURA_FOCUS_FATIGUE_MINUTES") {
            config.predictor.focus_fatigue_minutes = val;
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signal.buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize(self.signal.buffer_size));
        }
        check_history("metrics history", self.signal.history_cap, self.signal.history_keep)?;
        check_history(
            "state history",
            self.classifier.state_history_cap,
            self.classifier.state_history_keep,
        )?;
        check_history(
            "transition history",
            self.classifier.transition_history_cap,
            self.classifier.transition_history_keep,
        )?;
        check_unit("context stress trigger", self.signal.context_stress_trigger)?;
        check_unit("default alpha", self.smoothing.default_alpha)?;
        check_unit("learning rate", self.classifier.learning_rate)?;
        check_unit("emit score delta", self.context.emit_score_delta)?;
        if !(1..=3).contains(&self.classifier.creative_flow_min_indicators) {
            return Err(ConfigError::InvalidIndicatorCount(
                self.classifier.creative_flow_min_indicators,
            ));
        }
        if self.context.cache_ttl_secs < 0 {
            return Err(ConfigError::NotPositive {
                name: "cache ttl",
                value: self.context.cache_ttl_secs as f64,
            });
        }
        if self.context.retention_days <= 0 {
            return Err(ConfigError::NotPositive {
                name: "retention days",
                value: self.context.retention_days as f64,
            });
        }
        if self.context.max_snapshots == 0 {
            return Err(ConfigError::NotPositive {
                name: "max snapshots",
                value: 0.0,
            });
        }
        if self.context.known_location_cap == 0 {
            return Err(ConfigError::NotPositive {
                name: "known location cap",
                value: 0.0,
            });
        }
        if self.context.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::InvalidUtcOffset(self.context.utc_offset_minutes));
        }
        if self.context.refresh_interval_secs == 0 {
            return Err(ConfigError::NotPositive {
                name: "refresh interval",
                value: 0.0,
            });
        }
        self.classifier.thresholds.validate()
    }
}

fn check_history(name: &'static str, cap: usize, keep: usize) -> Result<(), ConfigError> {
    if cap == 0 || keep == 0 || keep > cap {
        return Err(ConfigError::InvalidHistoryBounds { name, cap, keep });
    }
    Ok(())
}

fn check_unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfUnitRange { name, value });
    }
    Ok(())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
