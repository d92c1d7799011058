use std::{future::Future, io::BufRead, sync::Arc, thread, time::Duration};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use inquire::{CustomType, Select};
use tokio::{
    sync::mpsc,
    time::{Instant, interval_at},
};
use tracing::{info, warn};
use wxlink_core::{
    Config, Coordinate, LocationProvider, LocationSource, NextSunrise, Orchestrator, OutputFormat, Trigger,
    forecast::openmeteo::OpenMeteoClient, location::provider_from_config,
    transmit::StdoutTransmitter,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "wxlink", version, about = "Feed current weather to the watch face")]
pub struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively set location, sunrise mode and output format.
    Configure,

    /// Run the pipeline once, as on the watch's "ready" event.
    Fetch(RunArgs),

    /// Run on "ready" at start, then on every trigger line read from stdin
    /// ("ready" or "refresh") and on the periodic refresh.
    Serve(RunArgs),
}

/// Overrides for the stored configuration.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Latitude of a fixed location; implies the "fixed" location source.
    #[arg(long, allow_hyphen_values = true, requires = "lon")]
    pub lat: Option<f64>,

    /// Longitude of a fixed location.
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    pub lon: Option<f64>,

    /// Which sunrise fills the next-sunrise slot: "same-day" or "next-day".
    #[arg(long)]
    pub next_sunrise: Option<String>,

    /// Message output: "json" or "hex".
    #[arg(long)]
    pub format: Option<String>,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            config.set_fixed_location(Coordinate::new(lat, lon)?);
        }
        if let Some(mode) = &self.next_sunrise {
            config.forecast.next_sunrise = NextSunrise::try_from(mode.as_str())?;
        }
        if let Some(format) = &self.format {
            config.device.format = OutputFormat::try_from(format.as_str())?;
        }
        Ok(())
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Fetch(args) => {
                let orchestrator = orchestrator(&load_config(&args)?)?;
                let report = orchestrator.handle(Trigger::Ready).await;
                report
                    .result
                    .map(|_| ())
                    .with_context(|| format!("Weather update ended in state '{}'", report.terminal))
            }
            Command::Serve(args) => {
                let config = load_config(&args)?;
                serve(orchestrator(&config)?, config.device.refresh_minutes).await
            }
        }
    }
}

fn load_config(args: &RunArgs) -> anyhow::Result<Config> {
    let mut config = Config::load()?;
    args.apply(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let location: Arc<dyn LocationProvider> = Arc::from(provider_from_config(config)?);
    let forecast = Arc::new(OpenMeteoClient::new(&config.forecast)?);
    let transmitter = Arc::new(StdoutTransmitter::new(config.device.format));

    Ok(Orchestrator::new(location, forecast, transmitter, config.forecast.clone())
        .with_high_accuracy(config.location.high_accuracy))
}

async fn serve(orchestrator: Orchestrator, refresh_minutes: u64) -> anyhow::Result<()> {
    let period = Duration::from_secs(refresh_minutes.saturating_mul(60));
    let (tx, rx) = mpsc::channel(16);
    spawn_stdin_reader(tx)?;

    info!(refresh_minutes, "serving weather updates");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    serve_loop(period, rx, shutdown, |trigger| {
        orchestrator.spawn(trigger);
    })
    .await;

    Ok(())
}

/// Reads trigger lines on a plain thread. Tokio's stdin parks a blocking task that keeps the
/// runtime from shutting down until the next line arrives, so it cannot be used here.
fn spawn_stdin_reader(tx: mpsc::Sender<Trigger>) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("stdin-triggers".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Failed to read trigger from stdin: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match Trigger::try_from(line.as_str()) {
                    Ok(trigger) => {
                        if tx.blocking_send(trigger).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("{e}"),
                }
            }
        })
        .context("Failed to start the stdin reader")?;
    Ok(())
}

/// Dispatches `Ready` once, then every received trigger and a `RefreshRequest` per `period`,
/// until `shutdown` resolves. A closed trigger channel leaves only the periodic refresh.
async fn serve_loop(
    period: Duration,
    mut triggers: mpsc::Receiver<Trigger>,
    shutdown: impl Future<Output = ()>,
    mut dispatch: impl FnMut(Trigger),
) {
    let mut refresh = interval_at(Instant::now() + period, period);
    let mut triggers_open = true;
    tokio::pin!(shutdown);

    dispatch(Trigger::Ready);

    loop {
        tokio::select! {
            trigger = triggers.recv(), if triggers_open => match trigger {
                Some(trigger) => dispatch(trigger),
                None => {
                    info!("stdin closed; continuing with periodic refresh only");
                    triggers_open = false;
                }
            },
            _ = refresh.tick() => dispatch(Trigger::RefreshRequest),
            _ = &mut shutdown => {
                info!("shutdown signal received");
                return;
            }
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let sources = LocationSource::all().to_vec();
    let cursor = sources.iter().position(|s| *s == config.location.source).unwrap_or(0);
    let source = Select::new("Location source:", sources).with_starting_cursor(cursor).prompt()?;

    match source {
        LocationSource::Fixed => {
            let latitude = CustomType::<f64>::new("Latitude:")
                .with_default(config.location.latitude.unwrap_or(0.0))
                .prompt()?;
            let longitude = CustomType::<f64>::new("Longitude:")
                .with_default(config.location.longitude.unwrap_or(0.0))
                .prompt()?;
            config.set_fixed_location(Coordinate::new(latitude, longitude)?);
        }
        LocationSource::Ip => config.location.source = LocationSource::Ip,
    }

    let modes = NextSunrise::all().to_vec();
    let cursor = modes.iter().position(|m| *m == config.forecast.next_sunrise).unwrap_or(0);
    config.forecast.next_sunrise =
        Select::new("Next sunrise slot:", modes).with_starting_cursor(cursor).prompt()?;

    let formats = OutputFormat::all().to_vec();
    let cursor = formats.iter().position(|f| *f == config.device.format).unwrap_or(0);
    config.device.format =
        Select::new("Message output:", formats).with_starting_cursor(cursor).prompt()?;

    config.device.refresh_minutes = CustomType::<u64>::new("Refresh every (minutes):")
        .with_default(config.device.refresh_minutes)
        .prompt()?;

    config.validate()?;
    config.save()?;

    let path = Config::config_file_path()?;
    println!("Configuration saved to {}", path.display());

    Ok(())
}
