use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub(crate) fn clamp01(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ========== Cognitive regimes ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum CognitiveStateKind {
    DeepFocus,
    CreativeFlow,
    #[default]
    FragmentedAttention,
    CognitiveOverload,
}

impl CognitiveStateKind {
    pub const ALL: [CognitiveStateKind; 4] = [
        Self::DeepFocus,
        Self::CreativeFlow,
        Self::FragmentedAttention,
        Self::CognitiveOverload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeepFocus => "deep_focus",
            Self::CreativeFlow => "creative_flow",
            Self::FragmentedAttention => "fragmented_attention",
            Self::CognitiveOverload => "cognitive_overload",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "deep_focus" | "deepfocus" => Some(Self::DeepFocus),
            "creative_flow" | "creativeflow" => Some(Self::CreativeFlow),
            "fragmented_attention" | "fragmentedattention" => Some(Self::FragmentedAttention),
            "cognitive_overload" | "cognitiveoverload" => Some(Self::CognitiveOverload),
            _ => None,
        }
    }
}

impl std::fmt::Display for CognitiveStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========== Context snapshot ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum EnvironmentClass {
    Home,
    Library,
    Office,
    Cafe,
    Commute,
    Outdoor,
    #[default]
    Unknown,
}

impl EnvironmentClass {
    pub fn privacy_level(&self) -> f64 {
        match self {
            Self::Home => 0.9,
            Self::Library => 0.6,
            Self::Office => 0.5,
            Self::Cafe => 0.3,
            Self::Commute => 0.2,
            Self::Outdoor => 0.3,
            Self::Unknown => 0.5,
        }
    }

    pub fn base_stability(&self) -> f64 {
        match self {
            Self::Home | Self::Library => 0.8,
            Self::Office => 0.7,
            Self::Cafe => 0.5,
            Self::Outdoor => 0.4,
            Self::Commute => 0.2,
            Self::Unknown => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum SocialSetting {
    Alone,
    SmallGroup,
    Crowd,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum DistractionRisk {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum InteractionState {
    Focused,
    Exploring,
    Fragmented,
    Idle,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum NetworkQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Offline,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum RecommendedAction {
    #[default]
    Proceed,
    OptimizeEnvironment,
    TakeBreak,
    Reschedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    EnergyDecline,
    OptimalWindowEnding,
    OptimalWindowStarting,
    LocationDestabilizing,
    BatteryDepletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Great-circle distance in meters.
    pub fn distance_m(&self, other: &Coordinates) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeIntelligence {
    pub circadian_hour: u32,
    /// 0 = Monday.
    pub day_of_week: u32,
    pub energy_level: f64,
    pub historical_performance: f64,
    pub in_optimal_window: bool,
    pub minutes_to_next_optimal_window: Option<u32>,
}

impl Default for TimeIntelligence {
    fn default() -> Self {
        Self {
            circadian_hour: 12,
            day_of_week: 0,
            energy_level: 0.75,
            historical_performance: 0.5,
            in_optimal_window: false,
            minutes_to_next_optimal_window: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationContext {
    pub environment: EnvironmentClass,
    pub noise_level: f64,
    pub social_setting: SocialSetting,
    pub stability: f64,
    pub privacy_level: f64,
    pub distraction_risk: DistractionRisk,
    pub coordinates: Option<Coordinates>,
}

impl Default for LocationContext {
    fn default() -> Self {
        Self {
            environment: EnvironmentClass::Unknown,
            noise_level: 0.5,
            social_setting: SocialSetting::Unknown,
            stability: 0.5,
            privacy_level: 0.5,
            distraction_risk: DistractionRisk::Medium,
            coordinates: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalBodyLanguage {
    pub state: InteractionState,
    pub app_switch_frequency: f64,
    pub scroll_velocity: f64,
    pub typing_speed: f64,
    pub typing_error_rate: f64,
    pub cognitive_load_indicator: f64,
    pub stress_indicator: f64,
}

impl Default for DigitalBodyLanguage {
    fn default() -> Self {
        Self {
            state: InteractionState::Unknown,
            app_switch_frequency: 0.0,
            scroll_velocity: 0.0,
            typing_speed: 0.0,
            typing_error_rate: 0.0,
            cognitive_load_indicator: 0.3,
            stress_indicator: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub battery_level: f64,
    pub charging: bool,
    pub network_quality: NetworkQuality,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            battery_level: 0.5,
            charging: false,
            network_quality: NetworkQuality::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnticipatedChange {
    pub kind: ChangeKind,
    pub timeframe_minutes: u32,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub timestamp: DateTime<Utc>,
    pub time: TimeIntelligence,
    pub location: LocationContext,
    pub interaction: DigitalBodyLanguage,
    pub device: DeviceState,
    pub overall_optimality: f64,
    pub recommended_action: RecommendedAction,
    pub quality_score: f64,
    pub anticipated_changes: Vec<AnticipatedChange>,
}

impl ContextSnapshot {
    /// Snapshot used when no sensor layer produced anything.
    pub fn fallback(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            time: TimeIntelligence::default(),
            location: LocationContext::default(),
            interaction: DigitalBodyLanguage::default(),
            device: DeviceState::default(),
            overall_optimality: 0.5,
            recommended_action: RecommendedAction::Proceed,
            quality_score: 0.1,
            anticipated_changes: Vec::new(),
        }
    }

    /// Fallback for every external layer around a time layer computed
    /// from the clock.
    pub fn fallback_with_time(timestamp: DateTime<Utc>, time: TimeIntelligence) -> Self {
        Self {
            time,
            ..Self::fallback(timestamp)
        }
    }
}

// ========== Samples and metrics ==========

fn default_gaze() -> f64 {
    0.5
}

fn default_head() -> f64 {
    0.5
}

fn default_blink_rate() -> f64 {
    15.0
}

pub const DEFAULT_SAMPLE_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveSample {
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_gaze")]
    pub gaze_stability: f64,
    #[serde(default = "default_head")]
    pub head_stillness: f64,
    /// Blinks per minute.
    #[serde(default = "default_blink_rate")]
    pub blink_rate: f64,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub context: Option<ContextSnapshot>,
}

impl CognitiveSample {
    pub fn new(timestamp: DateTime<Utc>, gaze_stability: f64, head_stillness: f64, blink_rate: f64) -> Self {
        Self {
            timestamp,
            gaze_stability,
            head_stillness,
            blink_rate,
            confidence: None,
            context: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_context(mut self, context: ContextSnapshot) -> Self {
        self.context = Some(context);
        self
    }

    /// Replaces non-finite or out-of-range fields with defaults so a partial
    /// sample still flows through the pipeline.
    pub fn sanitized(mut self) -> Self {
        self.gaze_stability = finite_or(self.gaze_stability, default_gaze()).clamp(0.0, 1.0);
        self.head_stillness = finite_or(self.head_stillness, default_head()).clamp(0.0, 1.0);
        self.blink_rate = finite_or(self.blink_rate, default_blink_rate()).max(0.0);
        let confidence = self
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(DEFAULT_SAMPLE_CONFIDENCE);
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn confidence_or_default(&self) -> f64 {
        self.confidence
            .filter(|c| c.is_finite())
            .map(clamp01)
            .unwrap_or(DEFAULT_SAMPLE_CONFIDENCE)
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedMetrics {
    pub timestamp: DateTime<Utc>,
    pub raw_attention: f64,
    pub filtered_attention: f64,
    pub cognitive_load: f64,
    pub stress_indicators: Vec<f64>,
    pub quality_score: f64,
}

impl ProcessedMetrics {
    pub fn max_stress(&self) -> f64 {
        self.stress_indicators.iter().copied().fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub sample_count: usize,
    pub average_attention: f64,
    pub peak_attention: f64,
    pub min_attention: f64,
    pub stability: f64,
    pub trend_slope: f64,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            sample_count: 0,
            average_attention: 0.5,
            peak_attention: 0.0,
            min_attention: 0.0,
            stability: 0.5,
            trend_slope: 0.0,
        }
    }
}

/// Payload of the `metrics.updated` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsUpdate {
    pub metrics: ProcessedMetrics,
    pub stats: SessionStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryDirection {
    Declining,
    Improving,
}

/// Non-authoritative hint that attention is moving strongly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateAdvisory {
    pub timestamp: DateTime<Utc>,
    pub direction: AdvisoryDirection,
    pub slope: f64,
    pub average_attention: f64,
}

// ========== Classifier output ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePrediction {
    pub next_state: CognitiveStateKind,
    pub probability: f64,
    pub horizon_minutes: f64,
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveState {
    pub state: CognitiveStateKind,
    pub attention: f64,
    pub cognitive_load: f64,
    pub stability: f64,
    pub confidence: f64,
    pub entered_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub predictions: Vec<StatePrediction>,
}

impl CognitiveState {
    pub fn initial(at: DateTime<Utc>) -> Self {
        Self {
            state: CognitiveStateKind::default(),
            attention: 0.5,
            cognitive_load: 0.0,
            stability: 0.5,
            confidence: 0.5,
            entered_at: at,
            duration_secs: 0.0,
            predictions: Vec::new(),
        }
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration_secs / 60.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    /// Processing order; monotonically increasing within an engine.
    pub sequence: u64,
    pub from: CognitiveStateKind,
    pub to: CognitiveStateKind,
    pub timestamp: DateTime<Utc>,
    pub trigger: String,
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn state_kind_round_trips_labels() {
        for kind in CognitiveStateKind::ALL {
            assert_eq!(CognitiveStateKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CognitiveStateKind::parse("DeepFocus"), Some(CognitiveStateKind::DeepFocus));
        assert_eq!(CognitiveStateKind::parse("daydreaming"), None);
    }

    #[test]
    fn partial_sample_is_defaulted() {
        let json = r#"{"timestamp":"2024-03-04T09:00:00Z","blinkRate":18.0}"#;
        let sample: CognitiveSample = serde_json::from_str(json).unwrap();
        let sample = sample.sanitized();
        assert_eq!(sample.gaze_stability, 0.5);
        assert_eq!(sample.head_stillness, 0.5);
        assert_eq!(sample.confidence, Some(DEFAULT_SAMPLE_CONFIDENCE));
        assert!(sample.context.is_none());
    }

    #[test]
    fn non_finite_fields_fall_back() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let sample = CognitiveSample::new(ts, f64::NAN, 2.0, f64::INFINITY)
            .with_confidence(f64::NAN)
            .sanitized();
        assert_eq!(sample.gaze_stability, 0.5);
        assert_eq!(sample.head_stillness, 1.0);
        assert_eq!(sample.blink_rate, 15.0);
        assert_eq!(sample.confidence, Some(0.8));
    }

    #[test]
    fn distance_is_roughly_correct() {
        let a = Coordinates { latitude: 52.5200, longitude: 13.4050 };
        let b = Coordinates { latitude: 52.5209, longitude: 13.4050 };
        let d = a.distance_m(&b);
        assert!(d > 90.0 && d < 110.0, "distance {d}");
    }
}
