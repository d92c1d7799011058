use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

use crate::{
    error::{FetchError, Result},
    forecast::{ForecastRequest, ForecastResponse, ForecastSettings, parse_body},
};

use super::ForecastSource;

/// reqwest-backed client for `GET <base>/v1/forecast`.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    endpoint: Url,
    http: Client,
}

impl OpenMeteoClient {
    pub fn new(settings: &ForecastSettings) -> anyhow::Result<Self> {
        let endpoint = format!("{}/v1/forecast", settings.base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&endpoint)
            .with_context(|| format!("Invalid forecast base_url: {}", settings.base_url))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ForecastSource for OpenMeteoClient {
    async fn fetch(&self, request: &ForecastRequest) -> Result<ForecastResponse> {
        let url = request.to_url(&self.endpoint);
        debug!(%url, "requesting forecast");

        let res = self.http.get(url).send().await.map_err(FetchError::Transport)?;

        let status = res.status();
        let body = res.text().await.map_err(FetchError::Transport)?;

        parse_body(status.as_u16(), &body)
    }
}
