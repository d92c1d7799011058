use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tokio::io::AsyncWriteExt;

use crate::{error::TransmitError, message::DeviceMessage};

/// Delivery channel to the watch. A failed send carries no retry obligation.
#[async_trait]
pub trait Transmitter: Send + Sync + Debug {
    async fn send(&self, message: &DeviceMessage) -> Result<(), TransmitError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Slot-name keyed JSON dictionary.
    #[default]
    Json,
    /// Dictionary wire bytes as lowercase hex.
    Hex,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Hex => "hex",
        }
    }

    pub const fn all() -> &'static [OutputFormat] {
        &[OutputFormat::Json, OutputFormat::Hex]
    }

    pub fn render(&self, message: &DeviceMessage) -> String {
        match self {
            OutputFormat::Json => message.to_dictionary().to_string(),
            OutputFormat::Hex => message.to_hex(),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for OutputFormat {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "hex" => Ok(OutputFormat::Hex),
            _ => Err(anyhow::anyhow!("Unknown output format '{value}'. Supported formats: json, hex.")),
        }
    }
}

/// Writes each message as one line on stdout, for piping into a device bridge.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutTransmitter {
    format: OutputFormat,
}

impl StdoutTransmitter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl Transmitter for StdoutTransmitter {
    async fn send(&self, message: &DeviceMessage) -> Result<(), TransmitError> {
        let mut line = self.format.render(message);
        line.push('\n');

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TransmitError(e.to_string()))?;
        stdout.flush().await.map_err(|e| TransmitError(e.to_string()))
    }
}
