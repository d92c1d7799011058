use crate::error::LocationError;

/// A single position fix. Only constructed through [`Coordinate::new`], so the range is always valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        let valid = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        if !valid {
            return Err(LocationError::OutOfRange { latitude, longitude });
        }

        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Local wall-clock hour and minute. Hour is in 0..=23, minute in 0..=59.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
}

/// Weather reduced to what the watch face shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedWeather {
    pub surface_pressure: i32,
    pub temperature: i32,
    pub apparent_temperature: i32,
    pub sunrise: ClockTime,
    pub sunset: ClockTime,
    pub next_sunrise: ClockTime,
}

/// Device-side event that starts one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Ready,
    RefreshRequest,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Ready => "ready",
            Trigger::RefreshRequest => "refresh",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Trigger {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "ready" => Ok(Trigger::Ready),
            "refresh" | "appmessage" => Ok(Trigger::RefreshRequest),
            _ => Err(anyhow::anyhow!(
                "Unknown trigger '{value}'. Supported triggers: ready, refresh."
            )),
        }
    }
}
