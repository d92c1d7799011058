use thiserror::Error;

/// Pipeline stage an error was raised in; used for log fields and terminal state mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Location,
    Fetch,
    Normalize,
    Transmit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Location => "location",
            Stage::Fetch => "fetch",
            Stage::Normalize => "normalize",
            Stage::Transmit => "transmit",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to obtain a position fix.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    Unavailable(String),

    #[error("timed out waiting for a position fix")]
    Timeout,

    #[error("position fix out of range: latitude {latitude}, longitude {longitude}")]
    OutOfRange { latitude: f64, longitude: f64 },
}

impl LocationError {
    /// Map a geolocation platform error code (1 denied, 2 unavailable, 3 timeout).
    pub fn from_code(code: u16, message: &str) -> Self {
        match code {
            1 => LocationError::PermissionDenied,
            3 => LocationError::Timeout,
            _ => LocationError::Unavailable(format!("code {code}: {message}")),
        }
    }
}

/// Transport-level failure talking to the forecast API.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to forecast API failed")]
    Transport(#[from] reqwest::Error),

    #[error("forecast API returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Payload was valid JSON but not the shape the normalizer needs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unexpected forecast payload: {0}")]
pub struct SchemaError(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("device rejected message: {0}")]
pub struct TransmitError(pub String);

/// Every way a single pipeline run can end early.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("forecast API reported an error: {reason}")]
    Api { reason: String },

    #[error("forecast response is not valid JSON")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Transmit(#[from] TransmitError),
}

impl Error {
    pub fn stage(&self) -> Stage {
        match self {
            Error::Location(_) => Stage::Location,
            Error::Fetch(_) | Error::Api { .. } | Error::Parse(_) => Stage::Fetch,
            Error::Schema(_) => Stage::Normalize,
            Error::Transmit(_) => Stage::Transmit,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
