use serde::{Deserialize, Serialize};

/// Sample count at which a fit earns full confidence.
const FULL_CONFIDENCE_SAMPLES: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendEstimate {
    pub slope: f64,
    pub next_value: f64,
    pub r_squared: f64,
    pub confidence: f64,
}

impl TrendEstimate {
    fn flat(next_value: f64) -> Self {
        Self {
            slope: 0.0,
            next_value,
            r_squared: 0.0,
            confidence: 0.0,
        }
    }
}

/// Least-squares line over the newest `window` samples, index as x.
pub fn linear_trend(samples: &[f64], window: usize) -> TrendEstimate {
    let start = samples.len().saturating_sub(window.max(2));
    let recent = &samples[start..];

    if recent.len() < 2 {
        return TrendEstimate::flat(recent.last().copied().unwrap_or(0.5));
    }

    let n = recent.len() as f64;
    let sum_x: f64 = (0..recent.len()).map(|i| i as f64).sum();
    let sum_y: f64 = recent.iter().sum();
    let sum_xy: f64 = recent
        .iter()
        .enumerate()
        .map(|(i, y)| i as f64 * y)
        .sum();
    let sum_xx: f64 = (0..recent.len()).map(|i| (i as f64).powi(2)).sum();

    let denominator = n * sum_xx - sum_x.powi(2);
    if denominator.abs() < 1e-10 {
        return TrendEstimate::flat(recent[recent.len() - 1]);
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    let next_value = intercept + slope * n;

    let mean_y = sum_y / n;
    let ss_tot: f64 = recent.iter().map(|y| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = recent
        .iter()
        .enumerate()
        .map(|(i, y)| (y - (intercept + slope * i as f64)).powi(2))
        .sum();

    // A constant series is fitted exactly.
    let r_squared = if ss_tot < 1e-12 {
        1.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };
    let sample_factor = (n / FULL_CONFIDENCE_SAMPLES).min(1.0);

    TrendEstimate {
        slope,
        next_value,
        r_squared,
        confidence: (r_squared * sample_factor).clamp(0.0, 1.0),
    }
}

/// Slope only; 0 when fewer than two samples are available.
pub fn slope(samples: &[f64], window: usize) -> f64 {
    linear_trend(samples, window).slope
}

pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_line() {
        let trend = linear_trend(&[1.0, 2.0, 3.0, 4.0, 5.0], 10);
        assert!((trend.slope - 1.0).abs() < 1e-12);
        assert!((trend.next_value - 6.0).abs() < 1e-12);
        assert!((trend.r_squared - 1.0).abs() < 1e-12);
        // five points out of ten
        assert!((trend.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn full_confidence_with_enough_points() {
        let samples: Vec<f64> = (0..12).map(|i| 0.1 + 0.05 * i as f64).collect();
        let trend = linear_trend(&samples, 12);
        assert!((trend.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(linear_trend(&[], 5), TrendEstimate::flat(0.5));
        assert_eq!(linear_trend(&[0.7], 5), TrendEstimate::flat(0.7));
    }

    #[test]
    fn window_uses_newest_samples() {
        let samples = [9.0, 9.0, 9.0, 1.0, 2.0, 3.0];
        let trend = linear_trend(&samples, 3);
        assert!((trend.slope - 1.0).abs() < 1e-12);
        assert!((trend.next_value - 4.0).abs() < 1e-12);
    }

    #[test]
    fn noisy_series_has_partial_fit() {
        let trend = linear_trend(&[0.5, 0.9, 0.4, 0.8, 0.3, 0.7], 10);
        assert!(trend.r_squared < 0.5);
        assert!(trend.confidence < 0.5);
    }

    #[test]
    fn variance_of_constant_is_zero() {
        assert!(variance(&[0.4; 8]).abs() < 1e-12);
        assert!((variance(&[0.0, 1.0]) - 0.25).abs() < 1e-12);
        assert_eq!(variance(&[]), 0.0);
    }
}
