mod patterns;
mod providers;
mod sensor;

pub use patterns::{KnownLocation, LearnedPatterns, LocationLimits, WindowPattern, OPTIMAL_PERFORMANCE};
pub use providers::{
    ContextProviders, DeviceProvider, DeviceReading, FixedReading, InteractionProvider, InteractionReading,
    LocationProvider, LocationReading, SensorError, UnavailableSensor,
};
pub use sensor::{ContextSensor, HousekeepingReport};
