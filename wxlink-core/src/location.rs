use crate::{
    Config,
    error::LocationError,
    location::ipapi::IpLocation,
    model::Coordinate,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt::Debug, time::Duration};

pub mod ipapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationSource {
    Fixed,
    Ip,
}

impl LocationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationSource::Fixed => "fixed",
            LocationSource::Ip => "ip",
        }
    }

    pub const fn all() -> &'static [LocationSource] {
        &[LocationSource::Fixed, LocationSource::Ip]
    }
}

impl std::fmt::Display for LocationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for LocationSource {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "fixed" => Ok(LocationSource::Fixed),
            "ip" => Ok(LocationSource::Ip),
            _ => Err(anyhow::anyhow!(
                "Unknown location source '{value}'. Supported sources: fixed, ip."
            )),
        }
    }
}

/// Single-shot position fix, not a subscription.
#[async_trait]
pub trait LocationProvider: Send + Sync + Debug {
    async fn current_position(&self, high_accuracy: bool) -> Result<Coordinate, LocationError>;
}

/// Always reports the same coordinate.
#[derive(Debug, Clone)]
pub struct FixedLocation {
    coordinate: Coordinate,
}

impl FixedLocation {
    pub fn new(coordinate: Coordinate) -> Self {
        Self { coordinate }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self, _high_accuracy: bool) -> Result<Coordinate, LocationError> {
        Ok(self.coordinate)
    }
}

/// Construct the configured location provider.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn LocationProvider>> {
    let boxed: Box<dyn LocationProvider> = match config.location.source {
        LocationSource::Fixed => {
            let coordinate = config.fixed_coordinate()?.ok_or_else(|| {
                anyhow::anyhow!(
                    "No coordinate configured for location source 'fixed'.\n\
                     Hint: run `wxlink configure` or pass --lat/--lon."
                )
            })?;
            Box::new(FixedLocation::new(coordinate))
        }
        LocationSource::Ip => {
            Box::new(IpLocation::new(Duration::from_secs(config.location.timeout_secs))?)
        }
    };

    Ok(boxed)
}
