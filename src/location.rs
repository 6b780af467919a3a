use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::common::config::LocationConfig;
use crate::common::LocationError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        let coordinates = Self { latitude, longitude };
        coordinates.validate()?;
        Ok(coordinates)
    }

    /// A fix at exactly 0,0 is what an unset position looks like, so it
    /// counts as missing.
    pub fn validate(&self) -> Result<(), LocationError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(LocationError::Unavailable("coordinates are not finite".to_string()));
        }
        if self.latitude.abs() > 90.0 || self.longitude.abs() > 180.0 {
            return Err(LocationError::Unavailable(format!(
                "coordinates out of range: {}, {}",
                self.latitude, self.longitude
            )));
        }
        if self.latitude == 0.0 || self.longitude == 0.0 {
            return Err(LocationError::Unavailable("no position fix".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current(&self) -> Result<Coordinates, LocationError>;
}

/// A terminal installed at a known spot.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinates);

impl FixedLocation {
    pub fn from_config(config: &LocationConfig) -> Option<Self> {
        match (config.latitude, config.longitude) {
            (Some(latitude), Some(longitude)) => Some(Self(Coordinates { latitude, longitude })),
            _ => None,
        }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current(&self) -> Result<Coordinates, LocationError> {
        self.0.validate()?;
        Ok(self.0)
    }
}

/// No positioning available on this device.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

#[async_trait]
impl LocationProvider for NoLocation {
    async fn current(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::Unavailable("no location source configured".to_string()))
    }
}
