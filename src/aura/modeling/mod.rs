pub mod attention;
pub mod signal;
pub mod trend;

pub use attention::{circadian_energy, circadian_multiplier, compute_attention, contextual_ema, location_multiplier};
pub use signal::{SignalOutput, SignalProcessor};
pub use trend::{linear_trend, TrendEstimate};
