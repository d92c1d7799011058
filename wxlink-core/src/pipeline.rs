//! One location -> forecast -> device message run per trigger.
//!
//! Runs share nothing mutable: overlapping triggers each get their own pipeline and their
//! sends reach the transmitter in whatever order they finish.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Stage},
    forecast::{ForecastRequest, ForecastSettings, ForecastSource},
    location::LocationProvider,
    message::{DeviceMessage, encode},
    model::Trigger,
    normalize::normalize,
    transmit::Transmitter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    LocationPending,
    FetchPending,
    Success,
    LocationFailed,
    FetchFailed,
    SchemaFailed,
    TransmitFailed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::LocationPending => "location-pending",
            PipelineState::FetchPending => "fetch-pending",
            PipelineState::Success => "success",
            PipelineState::LocationFailed => "location-failed",
            PipelineState::FetchFailed => "fetch-failed",
            PipelineState::SchemaFailed => "schema-failed",
            PipelineState::TransmitFailed => "transmit-failed",
        }
    }

    /// Terminal state a failed run ends in.
    pub fn for_error(err: &Error) -> Self {
        match err.stage() {
            Stage::Location => PipelineState::LocationFailed,
            Stage::Fetch => PipelineState::FetchFailed,
            Stage::Normalize => PipelineState::SchemaFailed,
            Stage::Transmit => PipelineState::TransmitFailed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            PipelineState::Idle | PipelineState::LocationPending | PipelineState::FetchPending
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one run.
#[derive(Debug)]
pub struct RunReport {
    pub trigger: Trigger,
    pub terminal: PipelineState,
    /// Every state the run passed through, starting and ending at `Idle`.
    pub path: Vec<PipelineState>,
    pub result: Result<DeviceMessage, Error>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.terminal == PipelineState::Success
    }
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    location: Arc<dyn LocationProvider>,
    forecast: Arc<dyn ForecastSource>,
    transmitter: Arc<dyn Transmitter>,
    settings: ForecastSettings,
    high_accuracy: bool,
}

impl Orchestrator {
    pub fn new(
        location: Arc<dyn LocationProvider>,
        forecast: Arc<dyn ForecastSource>,
        transmitter: Arc<dyn Transmitter>,
        settings: ForecastSettings,
    ) -> Self {
        Self { location, forecast, transmitter, settings, high_accuracy: true }
    }

    pub fn with_high_accuracy(mut self, high_accuracy: bool) -> Self {
        self.high_accuracy = high_accuracy;
        self
    }

    /// Run the pipeline once. Never fails; failures are logged and reported.
    pub async fn handle(&self, trigger: Trigger) -> RunReport {
        info!(%trigger, "pipeline triggered");

        let mut trace = Trace::new(trigger);
        let result = self.run(&mut trace).await;
        let terminal = match &result {
            Ok(_) => PipelineState::Success,
            Err(err) => PipelineState::for_error(err),
        };
        trace.enter(terminal);

        match &result {
            Ok(message) => info!(
                %trigger,
                state = %terminal,
                temperature = message.temperature(),
                surface_pressure = message.surface_pressure(),
                "weather sent to device"
            ),
            Err(err) => warn!(
                %trigger,
                state = %terminal,
                stage = %err.stage(),
                cause = %error_chain(err),
                "pipeline run failed"
            ),
        }
        trace.enter(PipelineState::Idle);

        RunReport { trigger, terminal, path: trace.path, result }
    }

    /// Start an independent run on the runtime.
    pub fn spawn(&self, trigger: Trigger) -> JoinHandle<RunReport> {
        let this = self.clone();
        tokio::spawn(async move { this.handle(trigger).await })
    }

    /// Stops in `FetchPending` at the latest; the terminal state is entered by the caller once
    /// the send outcome is known.
    async fn run(&self, trace: &mut Trace) -> Result<DeviceMessage, Error> {
        trace.enter(PipelineState::LocationPending);
        let coordinate = self.location.current_position(self.high_accuracy).await?;

        trace.enter(PipelineState::FetchPending);
        let request = ForecastRequest::new(coordinate, &self.settings);
        let response = self.forecast.fetch(&request).await?;
        let weather = normalize(&response, self.settings.next_sunrise)?;
        let message = encode(&weather);

        self.transmitter.send(&message).await?;

        Ok(message)
    }
}

struct Trace {
    trigger: Trigger,
    path: Vec<PipelineState>,
}

impl Trace {
    fn new(trigger: Trigger) -> Self {
        Self { trigger, path: vec![PipelineState::Idle] }
    }

    fn enter(&mut self, to: PipelineState) {
        let from = self.path.last().copied().unwrap_or(PipelineState::Idle);
        debug!(trigger = %self.trigger, %from, %to, "transition");
        self.path.push(to);
    }
}

fn error_chain(err: &Error) -> String {
    let mut out = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
