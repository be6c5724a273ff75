use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use cognitive_aura::aura::config::SignalParams;
use cognitive_aura::aura::modeling::{compute_attention, contextual_ema, SignalProcessor};
use cognitive_aura::aura::types::{CognitiveSample, ContextSnapshot, DistractionRisk, EnvironmentClass};

fn environment_strategy() -> impl Strategy<Value = EnvironmentClass> {
    prop_oneof![
        Just(EnvironmentClass::Home),
        Just(EnvironmentClass::Library),
        Just(EnvironmentClass::Office),
        Just(EnvironmentClass::Cafe),
        Just(EnvironmentClass::Commute),
        Just(EnvironmentClass::Outdoor),
        Just(EnvironmentClass::Unknown),
    ]
}

fn risk_strategy() -> impl Strategy<Value = DistractionRisk> {
    prop_oneof![
        Just(DistractionRisk::Low),
        Just(DistractionRisk::Medium),
        Just(DistractionRisk::High),
    ]
}

fn context_strategy() -> impl Strategy<Value = ContextSnapshot> {
    (environment_strategy(), risk_strategy(), 0.0f64..=1.0).prop_map(|(environment, risk, privacy)| {
        let mut context = ContextSnapshot::fallback(Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap());
        context.location.environment = environment;
        context.location.distraction_risk = risk;
        context.location.privacy_level = privacy;
        context
    })
}

proptest! {
    #[test]
    fn prop_attention_is_unit_bounded(
        gaze in -1.0f64..2.0,
        head in -1.0f64..2.0,
        blink in -1.0f64..2.0,
        load in 0.0f64..=1.0,
        context in context_strategy(),
    ) {
        let attention = compute_attention(gaze, head, blink, &context, load);
        prop_assert!((0.0..=1.0).contains(&attention));
    }

    #[test]
    fn prop_attention_non_decreasing_in_gaze(
        low in 0.0f64..=1.0,
        delta in 0.0f64..=1.0,
        head in 0.0f64..=1.0,
        blink in 0.0f64..=1.0,
        load in 0.0f64..=1.0,
        context in context_strategy(),
    ) {
        let high = (low + delta).min(1.0);
        let a = compute_attention(low, head, blink, &context, load);
        let b = compute_attention(high, head, blink, &context, load);
        prop_assert!(b + 1e-12 >= a);
    }

    #[test]
    fn prop_ema_stays_between_inputs(
        raw in 0.0f64..=1.0,
        previous in 0.0f64..=1.0,
        alpha in 0.0f64..=1.0,
    ) {
        let smoothed = contextual_ema(raw, previous, "unlabelled", alpha);
        prop_assert!(smoothed >= raw.min(previous) - 1e-12);
        prop_assert!(smoothed <= raw.max(previous) + 1e-12);
    }

    #[test]
    fn prop_processed_metrics_are_bounded(
        samples in prop::collection::vec((-1.0f64..2.0, -1.0f64..2.0, -5.0f64..60.0), 1..80),
    ) {
        let mut processor = SignalProcessor::new(SignalParams::default()).unwrap();
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        for (i, (gaze, head, blink)) in samples.iter().enumerate() {
            let sample = CognitiveSample::new(base + chrono::Duration::seconds(i as i64), *gaze, *head, *blink);
            let output = processor.process(sample);
            let m = &output.update.metrics;
            prop_assert!((0.0..=1.0).contains(&m.raw_attention));
            prop_assert!((0.0..=1.0).contains(&m.filtered_attention));
            prop_assert!((0.0..=1.0).contains(&m.cognitive_load));
            prop_assert!((0.1..=1.0).contains(&m.quality_score));
            prop_assert!((0.0..=1.0).contains(&output.update.stats.stability));
        }
        prop_assert_eq!(processor.stats().sample_count, samples.len());
    }
}
