use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aura::types::{Coordinates, EnvironmentClass, NetworkQuality, SocialSetting};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SensorError {
    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),
    #[error("sensor unavailable: {0}")]
    Unavailable(&'static str),
    #[error("sensor timed out after {0} ms")]
    Timeout(u64),
    #[error("sensor api error: {0}")]
    Api(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationReading {
    pub environment: EnvironmentClass,
    pub noise_level: Option<f64>,
    pub social_setting: SocialSetting,
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionReading {
    pub app_switches_per_minute: f64,
    /// Pixels per second.
    pub scroll_velocity: f64,
    /// Characters per minute.
    pub typing_speed: f64,
    pub typing_error_rate: f64,
    pub idle_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceReading {
    pub battery_level: f64,
    pub charging: bool,
    pub network_quality: NetworkQuality,
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn read_location(&self) -> Result<LocationReading, SensorError>;
}

#[async_trait]
pub trait InteractionProvider: Send + Sync {
    async fn read_interaction(&self) -> Result<InteractionReading, SensorError>;
}

#[async_trait]
pub trait DeviceProvider: Send + Sync {
    async fn read_device(&self) -> Result<DeviceReading, SensorError>;
}

/// The external collaborators behind a [`ContextSensor`](super::ContextSensor).
#[derive(Clone)]
pub struct ContextProviders {
    pub location: Arc<dyn LocationProvider>,
    pub interaction: Arc<dyn InteractionProvider>,
    pub device: Arc<dyn DeviceProvider>,
}

impl ContextProviders {
    pub fn new(
        location: Arc<dyn LocationProvider>,
        interaction: Arc<dyn InteractionProvider>,
        device: Arc<dyn DeviceProvider>,
    ) -> Self {
        Self {
            location,
            interaction,
            device,
        }
    }

    /// Every layer reports unavailable, so snapshots are built from fallbacks.
    pub fn unavailable() -> Self {
        let sensor = Arc::new(UnavailableSensor);
        Self {
            location: sensor.clone(),
            interaction: sensor.clone(),
            device: sensor,
        }
    }
}

/// Stand-in for hardware that is absent on this host.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSensor;

#[async_trait]
impl LocationProvider for UnavailableSensor {
    async fn read_location(&self) -> Result<LocationReading, SensorError> {
        Err(SensorError::Unavailable("location"))
    }
}

#[async_trait]
impl InteractionProvider for UnavailableSensor {
    async fn read_interaction(&self) -> Result<InteractionReading, SensorError> {
        Err(SensorError::Unavailable("interaction"))
    }
}

#[async_trait]
impl DeviceProvider for UnavailableSensor {
    async fn read_device(&self) -> Result<DeviceReading, SensorError> {
        Err(SensorError::Unavailable("device"))
    }
}

/// Provider that always returns the same reading; used for replays and
/// fixed-desk setups.
#[derive(Debug, Clone)]
pub struct FixedReading<T>(pub T);

#[async_trait]
impl LocationProvider for FixedReading<LocationReading> {
    async fn read_location(&self) -> Result<LocationReading, SensorError> {
        Ok(self.0.clone())
    }
}

#[async_trait]
impl InteractionProvider for FixedReading<InteractionReading> {
    async fn read_interaction(&self) -> Result<InteractionReading, SensorError> {
        Ok(self.0.clone())
    }
}

#[async_trait]
impl DeviceProvider for FixedReading<DeviceReading> {
    async fn read_device(&self) -> Result<DeviceReading, SensorError> {
        Ok(self.0.clone())
    }
}
