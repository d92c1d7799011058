//! Forecast request construction and response screening for the Open-Meteo API.

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

use crate::{
    error::{Error, FetchError, Result},
    model::Coordinate,
    normalize::NextSunrise,
};

pub mod openmeteo;

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

/// The next sunrise lives on day 1, so the horizon never drops below two days.
pub const MIN_FORECAST_DAYS: u8 = 2;

pub const TIMEZONE: &str = "auto";

pub const WIND_SPEED_UNIT: &str = "kn";

/// `daily` fields, in request order.
pub const DAILY_FIELDS: &[&str] = &[
    "sunrise",
    "sunset",
    "temperature_2m_max",
    "temperature_2m_min",
    "apparent_temperature_max",
    "apparent_temperature_min",
];

/// `current` fields, in request order.
pub const CURRENT_FIELDS: &[&str] = &[
    "temperature_2m",
    "relative_humidity_2m",
    "is_day",
    "apparent_temperature",
    "cloud_cover",
    "surface_pressure",
    "snowfall",
    "showers",
    "rain",
    "precipitation",
    "wind_speed_10m",
    "wind_direction_10m",
    "wind_gusts_10m",
    "visibility",
];

/// Forecast API settings, the `[forecast]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastSettings {
    pub base_url: String,
    pub forecast_days: u8,
    pub next_sunrise: NextSunrise,
    pub timeout_secs: u64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            forecast_days: MIN_FORECAST_DAYS,
            next_sunrise: NextSunrise::default(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastRequest {
    coordinate: Coordinate,
    forecast_days: u8,
}

impl ForecastRequest {
    pub fn new(coordinate: Coordinate, settings: &ForecastSettings) -> Self {
        Self {
            coordinate,
            forecast_days: settings.forecast_days.max(MIN_FORECAST_DAYS),
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn forecast_days(&self) -> u8 {
        self.forecast_days
    }

    /// Query parameters in a fixed order so the URL is reproducible.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", self.coordinate.latitude().to_string()),
            ("longitude", self.coordinate.longitude().to_string()),
            ("timezone", TIMEZONE.to_string()),
            ("forecast_days", self.forecast_days.to_string()),
            ("wind_speed_unit", WIND_SPEED_UNIT.to_string()),
            ("daily", DAILY_FIELDS.join(",")),
            ("current", CURRENT_FIELDS.join(",")),
        ]
    }

    pub fn to_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut().clear().extend_pairs(self.query_pairs());
        url
    }
}

/// Parsed forecast payload that carried no error indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResponse(Value);

impl ForecastResponse {
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

#[async_trait]
pub trait ForecastSource: Send + Sync + Debug {
    async fn fetch(&self, request: &ForecastRequest) -> Result<ForecastResponse>;
}

/// Screen a completed HTTP exchange.
///
/// An `error` member wins over the status code: Open-Meteo answers bad parameters with HTTP 400
/// and `{"error": true, "reason": "..."}`.
pub fn parse_body(status: u16, body: &str) -> Result<ForecastResponse> {
    let success = (200..300).contains(&status);

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) if !success => {
            return Err(FetchError::Status { status, body: truncate_body(body) }.into());
        }
        Err(e) => return Err(Error::Parse(e)),
    };

    if let Some(indicator) = value.get("error") {
        if !matches!(indicator, Value::Null | Value::Bool(false)) {
            let reason = value
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("no reason given")
                .to_string();
            return Err(Error::Api { reason });
        }
    }

    if !success {
        return Err(FetchError::Status { status, body: truncate_body(body) }.into());
    }

    Ok(ForecastResponse(value))
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
