//! Core library for the `wxlink` watch companion.
//!
//! This crate defines:
//! - Configuration handling
//! - Location providers and the Open-Meteo forecast client
//! - Normalization into device units and the fixed device message schema
//! - The per-trigger pipeline that ties them together
//!
//! It is used by `wxlink-cli`, but can also be embedded in other bridges to the watch.

pub mod config;
pub mod error;
pub mod forecast;
pub mod location;
pub mod message;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod transmit;

pub use config::{Config, DeviceConfig, LocationConfig};
pub use error::{Error, FetchError, LocationError, SchemaError, Stage, TransmitError};
pub use forecast::{ForecastRequest, ForecastResponse, ForecastSettings, ForecastSource};
pub use location::{LocationProvider, LocationSource};
pub use message::{DeviceMessage, SCHEMA, Slot};
pub use model::{ClockTime, Coordinate, NormalizedWeather, Trigger};
pub use normalize::NextSunrise;
pub use pipeline::{Orchestrator, PipelineState, RunReport};
pub use transmit::{OutputFormat, Transmitter};
