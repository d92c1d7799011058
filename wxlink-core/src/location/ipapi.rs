use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::{error::LocationError, model::Coordinate};

use super::LocationProvider;

const IP_API_URL: &str = "http://ip-api.com/json/?fields=status,message,country,city,lat,lon";

/// Coarse position from the public IP address. `high_accuracy` cannot be honored and is ignored.
#[derive(Debug, Clone)]
pub struct IpLocation {
    url: String,
    http: Client,
}

impl IpLocation {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Self::with_url(IP_API_URL, timeout)
    }

    pub fn with_url(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { url: url.into(), http })
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    city: Option<String>,
    country: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

fn to_location_error(err: reqwest::Error) -> LocationError {
    if err.is_timeout() {
        LocationError::Timeout
    } else {
        LocationError::Unavailable(err.to_string())
    }
}

fn coordinate_from(body: IpApiResponse) -> Result<Coordinate, LocationError> {
    if body.status != "success" {
        let message = body.message.unwrap_or_else(|| body.status.clone());
        return Err(LocationError::Unavailable(format!("ip lookup failed: {message}")));
    }

    match (body.lat, body.lon) {
        (Some(lat), Some(lon)) => {
            debug!(
                city = body.city.as_deref().unwrap_or(""),
                country = body.country.as_deref().unwrap_or(""),
                "resolved location from ip"
            );
            Coordinate::new(lat, lon)
        }
        _ => Err(LocationError::Unavailable("ip lookup returned no coordinates".into())),
    }
}

#[async_trait]
impl LocationProvider for IpLocation {
    async fn current_position(&self, _high_accuracy: bool) -> Result<Coordinate, LocationError> {
        let res = self.http.get(&self.url).send().await.map_err(to_location_error)?;

        let body: IpApiResponse = res.json().await.map_err(to_location_error)?;

        coordinate_from(body)
    }
}
