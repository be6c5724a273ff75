use crate::aura::types::{
    clamp01, CognitiveStateKind, ContextSnapshot, DistractionRisk, EnvironmentClass,
};

/// Blinks per minute mapped to 1.0 by [`normalize_blink_rate`].
pub const BLINK_RATE_CEILING: f64 = 30.0;

pub const LOCATION_FACTOR_MIN: f64 = 0.3;
pub const LOCATION_FACTOR_MAX: f64 = 1.5;
pub const CIRCADIAN_MIN: f64 = 0.6;
pub const CIRCADIAN_MAX: f64 = 1.2;

pub fn normalize_blink_rate(blinks_per_minute: f64) -> f64 {
    clamp01(blinks_per_minute / BLINK_RATE_CEILING)
}

/// Weighted gaze/head/blink score adjusted for environment, distraction and
/// overload. Always within [0, 1].
pub fn compute_attention(
    gaze_stability: f64,
    head_stillness: f64,
    normalized_blink: f64,
    context: &ContextSnapshot,
    cognitive_load: f64,
) -> f64 {
    let gaze = clamp01(gaze_stability);
    let head = clamp01(head_stillness);
    let blink = clamp01(normalized_blink);

    let base = 0.5 * gaze + 0.2 * head + 0.3 * (1.0 - blink);

    let environment_factor = match context.location.environment {
        EnvironmentClass::Library => 1.2,
        EnvironmentClass::Home => clamp01(context.location.privacy_level),
        EnvironmentClass::Commute => 0.7,
        _ => 1.0,
    };

    let distraction_penalty = match context.location.distraction_risk {
        DistractionRisk::High => 0.7,
        _ => 1.0,
    };

    let overload_dampener = if cognitive_load > 0.8 { 0.8 } else { 1.0 };

    clamp01(base * environment_factor * distraction_penalty * overload_dampener)
}

/// Smoothing coefficient per regime: responsive in deep focus, heavy under
/// overload and fragmentation.
pub fn state_alpha(state: CognitiveStateKind) -> f64 {
    match state {
        CognitiveStateKind::DeepFocus => 0.4,
        CognitiveStateKind::CreativeFlow => 0.3,
        CognitiveStateKind::FragmentedAttention => 0.2,
        CognitiveStateKind::CognitiveOverload => 0.15,
    }
}

pub fn contextual_ema(raw: f64, previous_ema: f64, state_label: &str, default_alpha: f64) -> f64 {
    let alpha = CognitiveStateKind::parse(state_label)
        .map(state_alpha)
        .unwrap_or(default_alpha)
        .clamp(0.0, 1.0);
    clamp01(alpha * raw + (1.0 - alpha) * previous_ema)
}

/// Performance multiplier by local hour of day.
pub fn circadian_multiplier(hour: u32) -> f64 {
    let value: f64 = match hour % 24 {
        6..=8 => 0.9,
        9..=11 => 1.2,   // Morning peak
        12..=13 => 0.9,
        14..=15 => 0.8,  // Post-lunch dip
        16..=18 => 1.1,  // Afternoon recovery
        19..=21 => 0.9,
        22..=23 => 0.7,  // Evening decline
        _ => 0.6,        // Late night low
    };
    value.clamp(CIRCADIAN_MIN, CIRCADIAN_MAX)
}

pub fn circadian_energy(hour: u32) -> f64 {
    clamp01(circadian_multiplier(hour) / CIRCADIAN_MAX)
}

pub fn location_multiplier(environment: EnvironmentClass, noise_level: f64, risk: DistractionRisk) -> f64 {
    let environment_factor = match environment {
        EnvironmentClass::Library => 1.2,
        EnvironmentClass::Office => 1.1,
        EnvironmentClass::Home => 1.0,
        EnvironmentClass::Cafe => 0.8,
        EnvironmentClass::Outdoor => 0.8,
        EnvironmentClass::Commute => 0.7,
        EnvironmentClass::Unknown => 1.0,
    };
    let noise_factor = 1.1 - 0.5 * clamp01(noise_level);
    let risk_factor = match risk {
        DistractionRisk::Low => 1.1,
        DistractionRisk::Medium => 1.0,
        DistractionRisk::High => 0.7,
    };
    (environment_factor * noise_factor * risk_factor).clamp(LOCATION_FACTOR_MIN, LOCATION_FACTOR_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn context_in(environment: EnvironmentClass, risk: DistractionRisk) -> ContextSnapshot {
        let mut context = ContextSnapshot::fallback(Utc::now());
        context.location.environment = environment;
        context.location.privacy_level = environment.privacy_level();
        context.location.distraction_risk = risk;
        context
    }

    #[test]
    fn base_formula_without_adjustments() {
        let context = context_in(EnvironmentClass::Office, DistractionRisk::Low);
        let score = compute_attention(0.8, 0.5, 0.2, &context, 0.3);
        let expected = 0.5 * 0.8 + 0.2 * 0.5 + 0.3 * 0.8;
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn library_boost_is_clamped() {
        let context = context_in(EnvironmentClass::Library, DistractionRisk::Low);
        assert_eq!(compute_attention(1.0, 1.0, 0.0, &context, 0.0), 1.0);
    }

    #[test]
    fn penalties_stack() {
        let context = context_in(EnvironmentClass::Commute, DistractionRisk::High);
        let score = compute_attention(1.0, 1.0, 0.0, &context, 0.9);
        assert!((score - 0.7 * 0.7 * 0.8).abs() < 1e-12);
    }

    #[test]
    fn home_scales_by_privacy() {
        let mut context = context_in(EnvironmentClass::Home, DistractionRisk::Low);
        context.location.privacy_level = 0.5;
        let score = compute_attention(1.0, 1.0, 0.0, &context, 0.0);
        assert!((score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ema_extremes() {
        assert_eq!(contextual_ema(0.9, 0.1, "unknown", 1.0), 0.9);
        assert_eq!(contextual_ema(0.9, 0.1, "unknown", 0.0), 0.1);
    }

    #[test]
    fn ema_uses_state_alpha() {
        let value = contextual_ema(1.0, 0.0, "deep_focus", 0.9);
        assert!((value - 0.4).abs() < 1e-12);
        let value = contextual_ema(1.0, 0.0, "cognitive_overload", 0.9);
        assert!((value - 0.15).abs() < 1e-12);
    }

    #[test]
    fn circadian_table_follows_the_day() {
        assert_eq!(circadian_multiplier(10), 1.2);
        assert_eq!(circadian_multiplier(14), 0.8);
        assert_eq!(circadian_multiplier(17), 1.1);
        assert_eq!(circadian_multiplier(3), 0.6);
        assert_eq!(circadian_multiplier(34), circadian_multiplier(10));
        assert_eq!(circadian_energy(10), 1.0);
    }

    #[test]
    fn tables_stay_in_range() {
        for hour in 0..48 {
            let m = circadian_multiplier(hour);
            assert!((CIRCADIAN_MIN..=CIRCADIAN_MAX).contains(&m));
            assert!((0.0..=1.0).contains(&circadian_energy(hour)));
        }
        let best = location_multiplier(EnvironmentClass::Library, 0.0, DistractionRisk::Low);
        let worst = location_multiplier(EnvironmentClass::Commute, 1.0, DistractionRisk::High);
        assert!(best <= LOCATION_FACTOR_MAX);
        assert!(worst >= LOCATION_FACTOR_MIN);
        assert!(best > worst);
    }
}
