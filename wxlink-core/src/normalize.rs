//! Reduce a forecast payload to the integers the watch face displays.
//!
//! Rounding is round-half-away-from-zero ([`f64::round`]): `2.5` becomes `3`, `-2.5` becomes `-3`.
//! Sun times are local ISO-8601 strings, already in the timezone Open-Meteo resolved for the
//! coordinate (`timezone=auto`), so hour and minute are taken as written.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::{
    error::SchemaError,
    forecast::ForecastResponse,
    model::{ClockTime, NormalizedWeather},
};

/// `current` fields read below; must stay a subset of the requested fields.
pub const CURRENT_FIELDS_READ: &[&str] = &["surface_pressure", "temperature_2m", "apparent_temperature"];

/// `daily` fields read below.
pub const DAILY_FIELDS_READ: &[&str] = &["sunrise", "sunset"];

/// Which daily entry supplies the "next sunrise" slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NextSunrise {
    /// Repeat today's sunrise (`daily.sunrise[0]`), as the first watch face release did.
    SameDay,
    /// Tomorrow's sunrise (`daily.sunrise[1]`).
    #[default]
    NextDay,
}

impl NextSunrise {
    pub fn as_str(&self) -> &'static str {
        match self {
            NextSunrise::SameDay => "same-day",
            NextSunrise::NextDay => "next-day",
        }
    }

    pub const fn all() -> &'static [NextSunrise] {
        &[NextSunrise::SameDay, NextSunrise::NextDay]
    }

    fn day_index(&self) -> usize {
        match self {
            NextSunrise::SameDay => 0,
            NextSunrise::NextDay => 1,
        }
    }
}

impl std::fmt::Display for NextSunrise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for NextSunrise {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "same-day" => Ok(NextSunrise::SameDay),
            "next-day" => Ok(NextSunrise::NextDay),
            _ => Err(anyhow::anyhow!(
                "Unknown next-sunrise mode '{value}'. Supported modes: same-day, next-day."
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Payload {
    current: Current,
    daily: Daily,
}

#[derive(Debug, Deserialize)]
struct Current {
    temperature_2m: f64,
    apparent_temperature: f64,
    surface_pressure: f64,
}

#[derive(Debug, Deserialize)]
struct Daily {
    sunrise: Vec<String>,
    sunset: Vec<String>,
}

pub fn normalize(
    response: &ForecastResponse,
    next_sunrise: NextSunrise,
) -> Result<NormalizedWeather, SchemaError> {
    let payload = Payload::deserialize(response.as_value())
        .map_err(|e| SchemaError(e.to_string()))?;

    let current = &payload.current;
    let daily = &payload.daily;

    Ok(NormalizedWeather {
        surface_pressure: round_to_device("current.surface_pressure", current.surface_pressure)?,
        temperature: round_to_device("current.temperature_2m", current.temperature_2m)?,
        apparent_temperature: round_to_device(
            "current.apparent_temperature",
            current.apparent_temperature,
        )?,
        sunrise: clock_time("daily.sunrise", &daily.sunrise, 0)?,
        sunset: clock_time("daily.sunset", &daily.sunset, 0)?,
        next_sunrise: clock_time("daily.sunrise", &daily.sunrise, next_sunrise.day_index())?,
    })
}

/// Nearest integer, halves away from zero, limited to the watch's 16-bit display width.
pub fn round_to_device(field: &str, value: f64) -> Result<i32, SchemaError> {
    if !value.is_finite() {
        return Err(SchemaError(format!("{field} is not a finite number")));
    }

    let rounded = value.round();
    if rounded < f64::from(i16::MIN) || rounded > f64::from(i16::MAX) {
        return Err(SchemaError(format!("{field} = {value} exceeds the device range")));
    }

    Ok(rounded as i32)
}

fn clock_time(field: &str, series: &[String], day: usize) -> Result<ClockTime, SchemaError> {
    let raw = series
        .get(day)
        .ok_or_else(|| SchemaError(format!("{field}[{day}] is missing")))?;

    parse_local_time(raw).ok_or_else(|| SchemaError(format!("{field}[{day}] = {raw:?} is not a local timestamp")))
}

/// Hour and minute of `YYYY-MM-DDTHH:MM` (seconds optional).
pub fn parse_local_time(raw: &str) -> Option<ClockTime> {
    let parsed = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;

    Some(ClockTime { hour: parsed.hour() as u8, minute: parsed.minute() as u8 })
}
