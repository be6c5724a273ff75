use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::patterns::{LearnedPatterns, LocationLimits};
use super::providers::{ContextProviders, DeviceReading, InteractionReading, LocationReading, SensorError};
use crate::aura::config::{ConfigError, ContextParams};
use crate::aura::history::BoundedHistory;
use crate::aura::modeling::attention::{circadian_energy, location_multiplier, LOCATION_FACTOR_MAX};
use crate::aura::persistence::AuraStore;
use crate::aura::types::{
    clamp01, AnticipatedChange, ChangeKind, ContextSnapshot, DeviceState, DigitalBodyLanguage,
    DistractionRisk, EnvironmentClass, InteractionState, LocationContext, RecommendedAction,
    SocialSetting, TimeIntelligence,
};
use crate::clock::Clock;

const TIME_WEIGHT: f64 = 0.40;
const LOCATION_WEIGHT: f64 = 0.35;
const INTERACTION_WEIGHT: f64 = 0.25;

const MIN_QUALITY: f64 = 0.1;
const EXTERNAL_LAYERS: f64 = 3.0;

const LOW_ENERGY: f64 = 0.6;
const HIGH_STRESS: f64 = 0.7;
const LOW_OPTIMALITY: f64 = 0.3;
const LOW_LOCATION_SCORE: f64 = 0.5;
const LOCATION_LEARNING_OPTIMALITY: f64 = 0.7;

const ENERGY_DROP: f64 = 0.1;
const UNSTABLE_LOCATION: f64 = 0.4;
const LOW_BATTERY: f64 = 0.2;
const EMERGENCY_RETENTION_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy)]
struct EmissionRecord {
    at: DateTime<Utc>,
    optimality: f64,
    quality: f64,
}

/// Outcome of one retention pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HousekeepingReport {
    pub memory_removed: usize,
    pub stored_removed: usize,
    pub emergency: bool,
    pub failed: bool,
}

/// Fuses time, location, interaction and device layers into scored
/// [`ContextSnapshot`]s, with TTL caching, emission debounce and pattern
/// learning.
pub struct ContextSensor {
    params: ContextParams,
    offset: FixedOffset,
    providers: ContextProviders,
    store: Arc<dyn AuraStore>,
    clock: Arc<dyn Clock>,
    cache: Mutex<Option<ContextSnapshot>>,
    last_emission: Mutex<Option<EmissionRecord>>,
    history: Mutex<BoundedHistory<ContextSnapshot>>,
    patterns: RwLock<LearnedPatterns>,
}

impl ContextSensor {
    pub fn new(
        params: ContextParams,
        providers: ContextProviders,
        store: Arc<dyn AuraStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let offset = FixedOffset::east_opt(params.utc_offset_minutes.saturating_mul(60))
            .ok_or(ConfigError::InvalidUtcOffset(params.utc_offset_minutes))?;
        if params.max_snapshots == 0 {
            return Err(ConfigError::NotPositive {
                name: "max snapshots",
                value: 0.0,
            });
        }
        let keep = (params.max_snapshots / 2).max(1);
        Ok(Self {
            history: Mutex::new(BoundedHistory::new(params.max_snapshots, keep)),
            offset,
            providers,
            store,
            clock,
            cache: Mutex::new(None),
            last_emission: Mutex::new(None),
            patterns: RwLock::new(LearnedPatterns::default()),
            params,
        })
    }

    /// Cached snapshot while younger than the TTL, otherwise a fresh one.
    pub async fn get_current_context(&self, force_refresh: bool) -> ContextSnapshot {
        let now = self.clock.now();
        if !force_refresh {
            if let Some(cached) = self.cached(now) {
                return cached;
            }
        }

        let snapshot = self.gather(now).await;
        *self.cache.lock() = Some(snapshot.clone());
        self.history.lock().push(snapshot.clone());
        self.learn(&snapshot);

        if let Err(e) = self.store.append_snapshot(&snapshot).await {
            warn!(error = %e, "Failed to persist context snapshot");
        }
        snapshot
    }

    fn cached(&self, now: DateTime<Utc>) -> Option<ContextSnapshot> {
        let cache = self.cache.lock();
        cache
            .as_ref()
            .filter(|s| now - s.timestamp < Duration::seconds(self.params.cache_ttl_secs))
            .cloned()
    }

    async fn gather(&self, now: DateTime<Utc>) -> ContextSnapshot {
        let limit = StdDuration::from_millis(self.params.layer_timeout_ms);
        let (location, interaction, device) = tokio::join!(
            read_layer("location", limit, self.providers.location.read_location()),
            read_layer("interaction", limit, self.providers.interaction.read_interaction()),
            read_layer("device", limit, self.providers.device.read_device()),
        );

        let live = [location.is_ok(), interaction.is_ok(), device.is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count();
        let local = now.with_timezone(&self.offset);
        let patterns = self.patterns.read().clone();
        let time = time_layer(&patterns, local.hour(), local.weekday().num_days_from_monday(), local.minute());

        if live == 0 {
            warn!("All context layers failed; using fallback snapshot");
            return ContextSnapshot::fallback_with_time(now, time);
        }

        let location = match location {
            Ok(reading) => {
                let known = reading
                    .coordinates
                    .as_ref()
                    .and_then(|c| patterns.nearest_location(c, self.params.known_location_radius_m))
                    .map(|k| k.average_performance());
                derive_location(reading, known)
            }
            Err(_) => LocationContext::default(),
        };
        let interaction = interaction.map(derive_interaction).unwrap_or_default();
        let device = device.map(derive_device).unwrap_or_default();

        let location_score = location_score(&location);
        let overall_optimality = clamp01(
            TIME_WEIGHT * time_score(&time)
                + LOCATION_WEIGHT * location_score
                + INTERACTION_WEIGHT * interaction_score(&interaction),
        );
        let recommended_action = recommend(&time, &location, &interaction, location_score, overall_optimality);
        let anticipated_changes = anticipate(&patterns, &time, local.minute(), &location, &device);
        let quality_score = (live as f64 / EXTERNAL_LAYERS).max(MIN_QUALITY);

        debug!(
            optimality = overall_optimality,
            quality = quality_score,
            action = ?recommended_action,
            "Context gathered"
        );

        ContextSnapshot {
            timestamp: now,
            time,
            location,
            interaction,
            device,
            overall_optimality,
            recommended_action,
            quality_score,
            anticipated_changes,
        }
    }

    fn learn(&self, snapshot: &ContextSnapshot) {
        let mut patterns = self.patterns.write();
        if snapshot.time.in_optimal_window {
            patterns.record_window(
                snapshot.time.circadian_hour,
                snapshot.time.day_of_week,
                snapshot.overall_optimality,
            );
        }
        if snapshot.overall_optimality > LOCATION_LEARNING_OPTIMALITY {
            if let Some(coordinates) = snapshot.location.coordinates {
                patterns.record_location(
                    coordinates,
                    snapshot.location.environment,
                    snapshot.overall_optimality,
                    snapshot.timestamp,
                    LocationLimits {
                        radius_m: self.params.known_location_radius_m,
                        history_cap: self.params.known_location_history,
                        max_locations: self.params.known_location_cap,
                    },
                );
            }
        }
    }

    /// True when the snapshot is worth broadcasting; records the emission.
    pub fn should_emit(&self, snapshot: &ContextSnapshot) -> bool {
        let now = self.clock.now();
        let mut last = self.last_emission.lock();
        let due = match *last {
            None => true,
            Some(prev) => {
                now - prev.at >= Duration::seconds(self.params.emit_min_interval_secs)
                    || (snapshot.overall_optimality - prev.optimality).abs() > self.params.emit_score_delta
                    || (snapshot.quality_score - prev.quality).abs() > self.params.emit_score_delta
            }
        };
        if due {
            *last = Some(EmissionRecord {
                at: now,
                optimality: snapshot.overall_optimality,
                quality: snapshot.quality_score,
            });
        }
        due
    }

    /// Applies retention to memory and the store. Never fails; store errors
    /// fall through to an emergency prune and are logged.
    pub async fn housekeeping(&self) -> HousekeepingReport {
        let now = self.clock.now();
        let cutoff = now - Duration::days(self.params.retention_days);
        let max = self.params.max_snapshots;
        let mut report = HousekeepingReport {
            memory_removed: self.prune_memory(cutoff),
            ..Default::default()
        };

        match self.store.prune_snapshots(cutoff, max).await {
            Ok(removed) => report.stored_removed = removed,
            Err(e) => {
                warn!(error = %e, "Snapshot prune failed; running emergency prune");
                report.emergency = true;
                let emergency_cutoff = now - Duration::hours(EMERGENCY_RETENTION_HOURS);
                report.memory_removed += self.prune_memory(emergency_cutoff);
                match self.store.prune_snapshots(emergency_cutoff, max).await {
                    Ok(removed) => report.stored_removed = removed,
                    Err(e) => {
                        error!(error = %e, "Emergency snapshot prune failed");
                        report.failed = true;
                    }
                }
            }
        }

        if report.memory_removed > 0 || report.stored_removed > 0 {
            info!(
                memory_removed = report.memory_removed,
                stored_removed = report.stored_removed,
                emergency = report.emergency,
                "Context housekeeping completed"
            );
        }
        report
    }

    fn prune_memory(&self, cutoff: DateTime<Utc>) -> usize {
        let mut history = self.history.lock();
        let expired = history.retain(|s| s.timestamp >= cutoff);
        expired + history.truncate_front(self.params.max_snapshots)
    }

    pub fn latest(&self) -> Option<ContextSnapshot> {
        self.cache.lock().clone()
    }

    pub fn patterns(&self) -> LearnedPatterns {
        self.patterns.read().clone()
    }

    pub fn seed_patterns(&self, patterns: LearnedPatterns) {
        *self.patterns.write() = patterns;
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn refresh_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.params.refresh_interval_secs)
    }

    pub fn housekeeping_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.params.housekeeping_interval_secs.max(1))
    }
}

async fn read_layer<T, F>(layer: &'static str, limit: StdDuration, read: F) -> Result<T, SensorError>
where
    F: Future<Output = Result<T, SensorError>>,
{
    let result = match tokio::time::timeout(limit, read).await {
        Ok(result) => result,
        Err(_) => Err(SensorError::Timeout(limit.as_millis() as u64)),
    };
    if let Err(ref e) = result {
        warn!(layer, error = %e, "Context layer degraded");
    }
    result
}

fn time_layer(patterns: &LearnedPatterns, hour: u32, weekday: u32, minute: u32) -> TimeIntelligence {
    TimeIntelligence {
        circadian_hour: hour,
        day_of_week: weekday,
        energy_level: circadian_energy(hour),
        historical_performance: patterns.window(hour, weekday).map(|w| w.performance).unwrap_or(0.5),
        in_optimal_window: patterns.is_optimal_window(hour, weekday),
        minutes_to_next_optimal_window: patterns.minutes_to_next_window(hour, weekday, minute),
    }
}

fn derive_location(reading: LocationReading, known_performance: Option<f64>) -> LocationContext {
    let noise_level = clamp01(reading.noise_level.unwrap_or(0.5));
    let distraction_risk = if noise_level > 0.7 || reading.social_setting == SocialSetting::Crowd {
        DistractionRisk::High
    } else if noise_level > 0.4 || reading.social_setting == SocialSetting::SmallGroup {
        DistractionRisk::Medium
    } else {
        DistractionRisk::Low
    };
    let base = reading.environment.base_stability();
    let stability = match known_performance {
        Some(performance) => clamp01(0.5 * base + 0.5 * performance),
        None => base,
    };
    LocationContext {
        environment: reading.environment,
        noise_level,
        social_setting: reading.social_setting,
        stability,
        privacy_level: reading.environment.privacy_level(),
        distraction_risk,
        coordinates: reading.coordinates,
    }
}

fn derive_interaction(reading: InteractionReading) -> DigitalBodyLanguage {
    let switches = reading.app_switches_per_minute.max(0.0);
    let scroll = reading.scroll_velocity.abs();
    let error_rate = clamp01(reading.typing_error_rate);

    let state = if reading.idle_seconds > 120.0 {
        InteractionState::Idle
    } else if switches > 4.0 {
        InteractionState::Fragmented
    } else if scroll > 1500.0 {
        InteractionState::Exploring
    } else {
        InteractionState::Focused
    };

    DigitalBodyLanguage {
        state,
        app_switch_frequency: switches,
        scroll_velocity: scroll,
        typing_speed: reading.typing_speed.max(0.0),
        typing_error_rate: error_rate,
        cognitive_load_indicator: clamp01(
            0.4 * (switches / 6.0).min(1.0) + 0.3 * error_rate + 0.3 * (scroll / 3000.0).min(1.0),
        ),
        stress_indicator: clamp01(0.5 * (switches / 8.0).min(1.0) + 0.5 * error_rate),
    }
}

fn derive_device(reading: DeviceReading) -> DeviceState {
    DeviceState {
        battery_level: clamp01(reading.battery_level),
        charging: reading.charging,
        network_quality: reading.network_quality,
    }
}

fn time_score(time: &TimeIntelligence) -> f64 {
    clamp01(0.5 * time.energy_level + 0.5 * time.historical_performance)
}

fn location_score(location: &LocationContext) -> f64 {
    clamp01(
        location_multiplier(location.environment, location.noise_level, location.distraction_risk)
            / LOCATION_FACTOR_MAX,
    )
}

fn interaction_score(interaction: &DigitalBodyLanguage) -> f64 {
    let base = 1.0 - 0.5 * interaction.cognitive_load_indicator - 0.5 * interaction.stress_indicator;
    let state_factor = match interaction.state {
        InteractionState::Fragmented => 0.6,
        InteractionState::Idle => 0.8,
        _ => 1.0,
    };
    clamp01(base * state_factor)
}

fn recommend(
    time: &TimeIntelligence,
    location: &LocationContext,
    interaction: &DigitalBodyLanguage,
    location_score: f64,
    optimality: f64,
) -> RecommendedAction {
    if time.energy_level < LOW_ENERGY || interaction.stress_indicator > HIGH_STRESS {
        RecommendedAction::TakeBreak
    } else if optimality < LOW_OPTIMALITY {
        RecommendedAction::Reschedule
    } else if location_score < LOW_LOCATION_SCORE || location.distraction_risk == DistractionRisk::High {
        RecommendedAction::OptimizeEnvironment
    } else {
        RecommendedAction::Proceed
    }
}

fn anticipate(
    patterns: &LearnedPatterns,
    time: &TimeIntelligence,
    minute: u32,
    location: &LocationContext,
    device: &DeviceState,
) -> Vec<AnticipatedChange> {
    let mut changes = Vec::new();
    let minutes_left = 60 - minute.min(59);
    let next_hour = (time.circadian_hour + 1) % 24;
    let next_weekday = if next_hour == 0 {
        (time.day_of_week + 1) % 7
    } else {
        time.day_of_week
    };

    if circadian_energy(next_hour) < time.energy_level - ENERGY_DROP {
        changes.push(AnticipatedChange {
            kind: ChangeKind::EnergyDecline,
            timeframe_minutes: minutes_left,
            confidence: 0.7,
        });
    }
    if time.in_optimal_window && !patterns.is_optimal_window(next_hour, next_weekday) {
        changes.push(AnticipatedChange {
            kind: ChangeKind::OptimalWindowEnding,
            timeframe_minutes: minutes_left,
            confidence: 0.6,
        });
    }
    if !time.in_optimal_window {
        if let Some(minutes) = time.minutes_to_next_optimal_window.filter(|m| *m <= 60) {
            changes.push(AnticipatedChange {
                kind: ChangeKind::OptimalWindowStarting,
                timeframe_minutes: minutes,
                confidence: 0.5,
            });
        }
    }
    if location.stability < UNSTABLE_LOCATION || location.environment == EnvironmentClass::Commute {
        changes.push(AnticipatedChange {
            kind: ChangeKind::LocationDestabilizing,
            timeframe_minutes: 10,
            confidence: 0.5,
        });
    }
    if device.battery_level < LOW_BATTERY && !device.charging {
        changes.push(AnticipatedChange {
            kind: ChangeKind::BatteryDepletion,
            timeframe_minutes: 15,
            confidence: 0.8,
        });
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aura::context::providers::{
        DeviceProvider, FixedReading, InteractionProvider, LocationProvider, UnavailableSensor,
    };
    use crate::aura::persistence::{InMemoryStore, StorageError};
    use crate::aura::types::{Coordinates, NetworkQuality, StateTransition};
    use crate::aura::classifier::AdaptiveThresholds;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn monday_at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap()
    }

    fn library() -> LocationReading {
        LocationReading {
            environment: EnvironmentClass::Library,
            noise_level: Some(0.1),
            social_setting: SocialSetting::Alone,
            coordinates: Some(Coordinates {
                latitude: 51.7520,
                longitude: -1.2577,
            }),
        }
    }

    fn calm_typing() -> InteractionReading {
        InteractionReading {
            app_switches_per_minute: 0.5,
            scroll_velocity: 200.0,
            typing_speed: 240.0,
            typing_error_rate: 0.02,
            idle_seconds: 3.0,
        }
    }

    fn healthy_device() -> DeviceReading {
        DeviceReading {
            battery_level: 0.9,
            charging: false,
            network_quality: NetworkQuality::Good,
        }
    }

    fn live_providers() -> ContextProviders {
        ContextProviders::new(
            Arc::new(FixedReading(library())),
            Arc::new(FixedReading(calm_typing())),
            Arc::new(FixedReading(healthy_device())),
        )
    }

    fn sensor_with(providers: ContextProviders, clock: Arc<ManualClock>) -> ContextSensor {
        ContextSensor::new(ContextParams::default(), providers, Arc::new(InMemoryStore::new()), clock).unwrap()
    }

    struct CountingLocation(AtomicUsize);

    #[async_trait]
    impl LocationProvider for CountingLocation {
        async fn read_location(&self) -> Result<LocationReading, SensorError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(library())
        }
    }

    struct SlowInteraction;

    #[async_trait]
    impl InteractionProvider for SlowInteraction {
        async fn read_interaction(&self) -> Result<InteractionReading, SensorError> {
            tokio::time::sleep(StdDuration::from_secs(10)).await;
            Ok(calm_typing())
        }
    }

    #[tokio::test]
    async fn fresh_snapshot_scores_a_quiet_library() {
        let clock = Arc::new(ManualClock::new(monday_at(10, 0)));
        let sensor = sensor_with(live_providers(), clock);
        let snapshot = sensor.get_current_context(false).await;

        assert_eq!(snapshot.quality_score, 1.0);
        assert!(snapshot.time.in_optimal_window);
        assert_eq!(snapshot.location.distraction_risk, DistractionRisk::Low);
        assert_eq!(snapshot.interaction.state, InteractionState::Focused);
        assert!(snapshot.overall_optimality > 0.7, "optimality {}", snapshot.overall_optimality);
        assert_eq!(snapshot.recommended_action, RecommendedAction::Proceed);
    }

    #[tokio::test]
    async fn cache_is_served_within_ttl() {
        let clock = Arc::new(ManualClock::new(monday_at(10, 0)));
        let location = Arc::new(CountingLocation(AtomicUsize::new(0)));
        let providers = ContextProviders::new(
            location.clone(),
            Arc::new(FixedReading(calm_typing())),
            Arc::new(FixedReading(healthy_device())),
        );
        let sensor = sensor_with(providers, clock.clone());

        let first = sensor.get_current_context(false).await;
        clock.advance(Duration::seconds(60));
        let second = sensor.get_current_context(false).await;
        assert_eq!(first.timestamp, second.timestamp);
        assert_eq!(location.0.load(Ordering::SeqCst), 1);

        clock.advance(Duration::seconds(300));
        let third = sensor.get_current_context(false).await;
        assert!(third.timestamp > first.timestamp);
        assert_eq!(location.0.load(Ordering::SeqCst), 2);

        sensor.get_current_context(true).await;
        assert_eq!(location.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn all_layers_failing_yields_fallback() {
        let clock = Arc::new(ManualClock::new(monday_at(10, 0)));
        let sensor = sensor_with(ContextProviders::unavailable(), clock);
        let snapshot = sensor.get_current_context(true).await;
        assert_eq!(snapshot.quality_score, 0.1);
        assert_eq!(snapshot.overall_optimality, 0.5);
        assert_eq!(snapshot.location, LocationContext::default());
    }

    #[tokio::test]
    async fn fallback_snapshot_keeps_the_clock_time() {
        let wednesday_3am = Utc.with_ymd_and_hms(2024, 3, 6, 3, 0, 0).unwrap();
        let sensor = sensor_with(ContextProviders::unavailable(), Arc::new(ManualClock::new(wednesday_3am)));
        let snapshot = sensor.get_current_context(true).await;

        assert_eq!(snapshot.quality_score, 0.1);
        assert_eq!(snapshot.time.circadian_hour, 3);
        assert_eq!(snapshot.time.day_of_week, 2);
        assert_eq!(snapshot.time.energy_level, circadian_energy(3));
        assert!(!snapshot.time.in_optimal_window);
        assert_eq!(snapshot.device, DeviceState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_layer_is_replaced_by_fallback() {
        let clock = Arc::new(ManualClock::new(monday_at(10, 0)));
        let providers = ContextProviders::new(
            Arc::new(FixedReading(library())),
            Arc::new(SlowInteraction),
            Arc::new(UnavailableSensor) as Arc<dyn DeviceProvider>,
        );
        let sensor = sensor_with(providers, clock);
        let snapshot = sensor.get_current_context(true).await;

        assert!((snapshot.quality_score - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(snapshot.interaction, DigitalBodyLanguage::default());
        assert_eq!(snapshot.device, DeviceState::default());
        assert_eq!(snapshot.location.environment, EnvironmentClass::Library);
    }

    #[tokio::test]
    async fn emission_is_debounced() {
        let clock = Arc::new(ManualClock::new(monday_at(10, 0)));
        let sensor = sensor_with(live_providers(), clock.clone());
        let snapshot = sensor.get_current_context(true).await;

        assert!(sensor.should_emit(&snapshot));
        clock.advance(Duration::seconds(10));
        assert!(!sensor.should_emit(&snapshot));

        let mut moved = snapshot.clone();
        moved.overall_optimality -= 0.2;
        assert!(sensor.should_emit(&moved));

        clock.advance(Duration::seconds(31));
        assert!(sensor.should_emit(&moved));
    }

    #[tokio::test]
    async fn quality_change_alone_triggers_emission() {
        let clock = Arc::new(ManualClock::new(monday_at(10, 0)));
        let sensor = sensor_with(live_providers(), clock.clone());
        let snapshot = sensor.get_current_context(true).await;
        assert!(sensor.should_emit(&snapshot));

        clock.advance(Duration::seconds(5));
        let mut nudged = snapshot.clone();
        nudged.quality_score -= 0.04;
        assert!(!sensor.should_emit(&nudged));

        let mut degraded = snapshot.clone();
        degraded.quality_score = 1.0 / 3.0;
        assert_eq!(degraded.overall_optimality, snapshot.overall_optimality);
        assert!(sensor.should_emit(&degraded));
    }

    #[tokio::test]
    async fn late_night_recommends_a_break() {
        let clock = Arc::new(ManualClock::new(monday_at(2, 0)));
        let sensor = sensor_with(live_providers(), clock);
        let snapshot = sensor.get_current_context(true).await;
        assert_eq!(snapshot.recommended_action, RecommendedAction::TakeBreak);
        assert!(!snapshot.time.in_optimal_window);
    }

    #[tokio::test]
    async fn anticipates_window_end_and_battery() {
        let clock = Arc::new(ManualClock::new(monday_at(11, 40)));
        let providers = ContextProviders::new(
            Arc::new(FixedReading(library())),
            Arc::new(FixedReading(calm_typing())),
            Arc::new(FixedReading(DeviceReading {
                battery_level: 0.1,
                charging: false,
                network_quality: NetworkQuality::Fair,
            })),
        );
        let sensor = sensor_with(providers, clock);
        let snapshot = sensor.get_current_context(true).await;
        let kinds: Vec<_> = snapshot.anticipated_changes.iter().map(|c| c.kind).collect();

        assert!(kinds.contains(&ChangeKind::EnergyDecline));
        assert!(kinds.contains(&ChangeKind::OptimalWindowEnding));
        assert!(kinds.contains(&ChangeKind::BatteryDepletion));
        let ending = snapshot
            .anticipated_changes
            .iter()
            .find(|c| c.kind == ChangeKind::OptimalWindowEnding)
            .unwrap();
        assert_eq!(ending.timeframe_minutes, 20);
    }

    #[tokio::test]
    async fn fresh_snapshots_feed_pattern_learning() {
        let clock = Arc::new(ManualClock::new(monday_at(10, 0)));
        let sensor = sensor_with(live_providers(), clock);
        let snapshot = sensor.get_current_context(true).await;
        let patterns = sensor.patterns();

        let window = patterns.window(10, 0).unwrap();
        assert_eq!(window.performance, snapshot.overall_optimality);
        assert_eq!(patterns.locations.len(), 1);
        assert_eq!(patterns.locations[0].environment, EnvironmentClass::Library);
    }

    #[tokio::test]
    async fn timezone_offset_shifts_the_hour() {
        let clock = Arc::new(ManualClock::new(monday_at(23, 30)));
        let params = ContextParams {
            utc_offset_minutes: 120,
            ..Default::default()
        };
        let sensor = ContextSensor::new(params, live_providers(), Arc::new(InMemoryStore::new()), clock).unwrap();
        let snapshot = sensor.get_current_context(true).await;
        assert_eq!(snapshot.time.circadian_hour, 1);
        assert_eq!(snapshot.time.day_of_week, 1);
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let clock = Arc::new(ManualClock::new(monday_at(10, 0)));
        let params = ContextParams {
            utc_offset_minutes: 24 * 60,
            ..Default::default()
        };
        let result = ContextSensor::new(params, live_providers(), Arc::new(InMemoryStore::new()), clock);
        assert!(matches!(result, Err(ConfigError::InvalidUtcOffset(1440))));
    }

    #[tokio::test]
    async fn housekeeping_enforces_retention() {
        let clock = Arc::new(ManualClock::new(monday_at(10, 0)));
        let store = Arc::new(InMemoryStore::new());
        let sensor = ContextSensor::new(ContextParams::default(), live_providers(), store.clone(), clock.clone()).unwrap();

        sensor.get_current_context(true).await;
        clock.advance(Duration::days(31));
        sensor.get_current_context(true).await;

        let report = sensor.housekeeping().await;
        assert_eq!(report.memory_removed, 1);
        assert_eq!(report.stored_removed, 1);
        assert!(!report.emergency);
        assert_eq!(sensor.history_len(), 1);
        assert_eq!(store.snapshot_count(), 1);
    }

    /// Store whose first prune fails.
    struct FlakyStore {
        inner: InMemoryStore,
        prunes: AtomicUsize,
        fail_all: bool,
    }

    #[async_trait]
    impl AuraStore for FlakyStore {
        async fn append_snapshot(&self, snapshot: &ContextSnapshot) -> Result<(), StorageError> {
            self.inner.append_snapshot(snapshot).await
        }
        async fn append_transition(&self, transition: &StateTransition) -> Result<(), StorageError> {
            self.inner.append_transition(transition).await
        }
        async fn save_patterns(&self, patterns: &LearnedPatterns) -> Result<(), StorageError> {
            self.inner.save_patterns(patterns).await
        }
        async fn load_patterns(&self) -> Result<Option<LearnedPatterns>, StorageError> {
            self.inner.load_patterns().await
        }
        async fn save_thresholds(&self, thresholds: &AdaptiveThresholds) -> Result<(), StorageError> {
            self.inner.save_thresholds(thresholds).await
        }
        async fn load_thresholds(&self) -> Result<Option<AdaptiveThresholds>, StorageError> {
            self.inner.load_thresholds().await
        }
        async fn snapshots_since(&self, since: DateTime<Utc>) -> Result<Vec<ContextSnapshot>, StorageError> {
            self.inner.snapshots_since(since).await
        }
        async fn transitions_since(&self, since: DateTime<Utc>) -> Result<Vec<StateTransition>, StorageError> {
            self.inner.transitions_since(since).await
        }
        async fn prune_snapshots(&self, older_than: DateTime<Utc>, max_entries: usize) -> Result<usize, StorageError> {
            let attempt = self.prunes.fetch_add(1, Ordering::SeqCst);
            if self.fail_all || attempt == 0 {
                return Err(StorageError::Exhausted("quota exceeded".to_string()));
            }
            self.inner.prune_snapshots(older_than, max_entries).await
        }
    }

    #[tokio::test]
    async fn failed_prune_triggers_emergency_cleanup() {
        let clock = Arc::new(ManualClock::new(monday_at(10, 0)));
        let store = Arc::new(FlakyStore {
            inner: InMemoryStore::new(),
            prunes: AtomicUsize::new(0),
            fail_all: false,
        });
        let sensor = ContextSensor::new(ContextParams::default(), live_providers(), store.clone(), clock.clone()).unwrap();

        sensor.get_current_context(true).await;
        clock.advance(Duration::hours(2));
        sensor.get_current_context(true).await;

        let report = sensor.housekeeping().await;
        assert!(report.emergency);
        assert!(!report.failed);
        assert_eq!(report.stored_removed, 1);
        assert_eq!(store.inner.snapshot_count(), 1);
        assert_eq!(sensor.history_len(), 1);
    }

    #[tokio::test]
    async fn failed_emergency_prune_is_reported_not_raised() {
        let clock = Arc::new(ManualClock::new(monday_at(10, 0)));
        let store = Arc::new(FlakyStore {
            inner: InMemoryStore::new(),
            prunes: AtomicUsize::new(0),
            fail_all: true,
        });
        let sensor = ContextSensor::new(ContextParams::default(), live_providers(), store, clock).unwrap();
        sensor.get_current_context(true).await;

        let report = sensor.housekeeping().await;
        assert!(report.emergency);
        assert!(report.failed);
    }
}
