use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    forecast::{ForecastSettings, MIN_FORECAST_DAYS},
    location::LocationSource,
    model::Coordinate,
    transmit::OutputFormat,
};

/// Where the position fix comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub source: LocationSource,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub high_accuracy: bool,
    pub timeout_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            source: LocationSource::Ip,
            latitude: None,
            longitude: None,
            high_accuracy: true,
            timeout_secs: 10,
        }
    }
}

/// Longest accepted refresh interval: one day.
pub const MAX_REFRESH_MINUTES: u64 = 24 * 60;

/// Companion device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Interval of the watch face's own refresh request.
    pub refresh_minutes: u64,
    pub format: OutputFormat,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { refresh_minutes: 30, format: OutputFormat::Json }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [location]
/// source = "fixed"
/// latitude = 52.52
/// longitude = 13.405
///
/// [forecast]
/// next_sunrise = "next-day"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub location: LocationConfig,
    pub forecast: ForecastSettings,
    pub device: DeviceConfig,
}

impl Config {
    /// Configured fixed coordinate, if both halves are present.
    pub fn fixed_coordinate(&self) -> Result<Option<Coordinate>> {
        match (self.location.latitude, self.location.longitude) {
            (Some(lat), Some(lon)) => Ok(Some(Coordinate::new(lat, lon)?)),
            (None, None) => Ok(None),
            _ => bail!("Both latitude and longitude must be set for a fixed location."),
        }
    }

    /// Store a fixed coordinate and switch the location source to it.
    pub fn set_fixed_location(&mut self, coordinate: Coordinate) {
        self.location.source = LocationSource::Fixed;
        self.location.latitude = Some(coordinate.latitude());
        self.location.longitude = Some(coordinate.longitude());
    }

    pub fn validate(&self) -> Result<()> {
        if self.forecast.forecast_days < MIN_FORECAST_DAYS {
            bail!(
                "forecast_days must be at least {MIN_FORECAST_DAYS} (got {}); \
                 the next sunrise is read from the second day.",
                self.forecast.forecast_days
            );
        }

        if !(1..=MAX_REFRESH_MINUTES).contains(&self.device.refresh_minutes) {
            bail!(
                "refresh_minutes must be between 1 and {MAX_REFRESH_MINUTES} (got {}).",
                self.device.refresh_minutes
            );
        }

        let fixed = self.fixed_coordinate()?;
        if self.location.source == LocationSource::Fixed && fixed.is_none() {
            bail!(
                "Location source is 'fixed' but no coordinate is configured.\n\
                 Hint: run `wxlink configure` or pass --lat/--lon."
            );
        }

        Ok(())
    }

    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "wxlink", "wxlink")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
