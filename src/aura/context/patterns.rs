use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aura::modeling::attention::circadian_multiplier;
use crate::aura::types::{clamp01, Coordinates, EnvironmentClass};

/// Learned performance at or above this marks an hour as optimal.
pub const OPTIMAL_PERFORMANCE: f64 = 0.7;
/// Circadian peak hours stop counting as optimal below this learned score.
const PEAK_DEMOTION: f64 = 0.5;
const PEAK_MULTIPLIER: f64 = 1.1;
const WINDOW_DECAY: f64 = 0.8;
const HOURS_PER_WEEK: u32 = 24 * 7;

/// Bounds applied by [`LearnedPatterns::record_location`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationLimits {
    /// Readings within this distance belong to the same place.
    pub radius_m: f64,
    pub history_cap: usize,
    pub max_locations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowPattern {
    pub hour: u32,
    pub weekday: u32,
    pub performance: f64,
    pub samples: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownLocation {
    pub id: String,
    pub coordinates: Coordinates,
    pub environment: EnvironmentClass,
    pub performance_history: Vec<f64>,
    pub visits: u32,
    pub last_seen: DateTime<Utc>,
}

impl KnownLocation {
    pub fn average_performance(&self) -> f64 {
        if self.performance_history.is_empty() {
            return 0.5;
        }
        self.performance_history.iter().sum::<f64>() / self.performance_history.len() as f64
    }
}

/// Long-lived time and location knowledge. Survives session switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedPatterns {
    pub windows: Vec<WindowPattern>,
    pub locations: Vec<KnownLocation>,
}

impl LearnedPatterns {
    pub fn window(&self, hour: u32, weekday: u32) -> Option<&WindowPattern> {
        self.windows
            .iter()
            .find(|w| w.hour == hour && w.weekday == weekday)
    }

    /// Exponentially weighted update; a new entry starts at the observed value.
    pub fn record_window(&mut self, hour: u32, weekday: u32, performance: f64) -> f64 {
        let performance = clamp01(performance);
        match self
            .windows
            .iter_mut()
            .find(|w| w.hour == hour && w.weekday == weekday)
        {
            Some(entry) => {
                entry.performance = WINDOW_DECAY * entry.performance + (1.0 - WINDOW_DECAY) * performance;
                entry.samples = entry.samples.saturating_add(1);
                entry.performance
            }
            None => {
                self.windows.push(WindowPattern {
                    hour,
                    weekday,
                    performance,
                    samples: 1,
                });
                performance
            }
        }
    }

    pub fn is_optimal_window(&self, hour: u32, weekday: u32) -> bool {
        let learned = self.window(hour % 24, weekday % 7).map(|w| w.performance);
        let circadian_peak = circadian_multiplier(hour) >= PEAK_MULTIPLIER;
        match learned {
            Some(score) => score >= OPTIMAL_PERFORMANCE || (circadian_peak && score >= PEAK_DEMOTION),
            None => circadian_peak,
        }
    }

    /// Minutes until the next optimal window begins, searching one week ahead.
    pub fn minutes_to_next_window(&self, hour: u32, weekday: u32, minute: u32) -> Option<u32> {
        let at = |offset: u32| {
            let absolute = weekday * 24 + hour + offset;
            ((absolute % 24), (absolute / 24) % 7)
        };
        (1..=HOURS_PER_WEEK).find_map(|offset| {
            let (h, d) = at(offset);
            let (ph, pd) = at(offset - 1);
            if self.is_optimal_window(h, d) && !self.is_optimal_window(ph, pd) {
                Some(offset * 60 - minute.min(59))
            } else {
                None
            }
        })
    }

    pub fn nearest_location(&self, coordinates: &Coordinates, radius_m: f64) -> Option<&KnownLocation> {
        self.locations
            .iter()
            .map(|loc| (loc, loc.coordinates.distance_m(coordinates)))
            .filter(|(_, d)| *d <= radius_m)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(loc, _)| loc)
    }

    pub fn record_location(
        &mut self,
        coordinates: Coordinates,
        environment: EnvironmentClass,
        performance: f64,
        at: DateTime<Utc>,
        limits: LocationLimits,
    ) {
        let nearest = self
            .locations
            .iter()
            .enumerate()
            .map(|(i, loc)| (i, loc.coordinates.distance_m(&coordinates)))
            .filter(|(_, d)| *d <= limits.radius_m)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);

        match nearest {
            Some(idx) => {
                let loc = &mut self.locations[idx];
                loc.performance_history.push(clamp01(performance));
                let excess = loc.performance_history.len().saturating_sub(limits.history_cap.max(1));
                loc.performance_history.drain(..excess);
                loc.visits = loc.visits.saturating_add(1);
                loc.last_seen = at;
                if environment != EnvironmentClass::Unknown {
                    loc.environment = environment;
                }
            }
            None => {
                while self.locations.len() >= limits.max_locations.max(1) {
                    if !self.evict_stalest_location() {
                        break;
                    }
                }
                self.locations.push(KnownLocation {
                    id: uuid::Uuid::new_v4().to_string(),
                    coordinates,
                    environment,
                    performance_history: vec![clamp01(performance)],
                    visits: 1,
                    last_seen: at,
                });
            }
        }
    }

    /// Drops the least recently seen location, fewest visits breaking ties.
    fn evict_stalest_location(&mut self) -> bool {
        let stalest = self
            .locations
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.last_seen.cmp(&b.last_seen).then(a.visits.cmp(&b.visits)))
            .map(|(i, _)| i);
        match stalest {
            Some(idx) => {
                self.locations.remove(idx);
                true
            }
            None => false,
        }
    }
}
