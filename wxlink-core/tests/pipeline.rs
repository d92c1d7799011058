use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use wxlink_core::{
    Coordinate, DeviceMessage, Error, ForecastRequest, ForecastResponse, ForecastSettings,
    ForecastSource, LocationError, LocationProvider, NextSunrise, Orchestrator, PipelineState,
    Transmitter, TransmitError, Trigger,
    forecast::{openmeteo::OpenMeteoClient, parse_body},
    location::{FixedLocation, ipapi::IpLocation},
};

const BERLIN_BODY: &str = r#"{
    "latitude": 52.52,
    "longitude": 13.419998,
    "timezone": "Europe/Berlin",
    "utc_offset_seconds": 7200,
    "current": {
        "time": "2024-06-01T12:00",
        "temperature_2m": 14.6,
        "relative_humidity_2m": 71,
        "is_day": 1,
        "apparent_temperature": 13.9,
        "surface_pressure": 1012.3
    },
    "daily": {
        "time": ["2024-06-01", "2024-06-02"],
        "sunrise": ["2024-06-01T04:50", "2024-06-02T04:52"],
        "sunset": ["2024-06-01T21:10", "2024-06-02T21:11"]
    }
}"#;

/// Answers every request with the same canned HTTP exchange.
#[derive(Debug)]
struct CannedForecast {
    status: u16,
    body: &'static str,
    requests: Mutex<Vec<ForecastRequest>>,
}

impl CannedForecast {
    fn ok(body: &'static str) -> Arc<Self> {
        Self::with_status(200, body)
    }

    fn with_status(status: u16, body: &'static str) -> Arc<Self> {
        Arc::new(Self { status, body, requests: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl ForecastSource for CannedForecast {
    async fn fetch(&self, request: &ForecastRequest) -> Result<ForecastResponse, Error> {
        self.requests.lock().unwrap().push(*request);
        tokio::task::yield_now().await;
        parse_body(self.status, self.body)
    }
}

#[derive(Debug)]
struct FailingLocation(LocationError);

#[async_trait]
impl LocationProvider for FailingLocation {
    async fn current_position(&self, _high_accuracy: bool) -> Result<Coordinate, LocationError> {
        Err(self.0.clone())
    }
}

#[derive(Debug, Default)]
struct RecordingTransmitter {
    sent: Mutex<Vec<DeviceMessage>>,
    reject: bool,
}

impl RecordingTransmitter {
    fn sent(&self) -> Vec<DeviceMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transmitter for RecordingTransmitter {
    async fn send(&self, message: &DeviceMessage) -> Result<(), TransmitError> {
        if self.reject {
            return Err(TransmitError("APP_MSG_BUSY".into()));
        }
        self.sent.lock().unwrap().push(*message);
        Ok(())
    }
}

fn berlin() -> Arc<FixedLocation> {
    Arc::new(FixedLocation::new(Coordinate::new(52.52, 13.405).unwrap()))
}

fn settings(next_sunrise: NextSunrise) -> ForecastSettings {
    ForecastSettings { next_sunrise, ..Default::default() }
}

#[tokio::test]
async fn end_to_end_same_day_sunrise() {
    let forecast = CannedForecast::ok(BERLIN_BODY);
    let transmitter = Arc::new(RecordingTransmitter::default());
    let orchestrator = Orchestrator::new(
        berlin(),
        forecast.clone(),
        transmitter.clone(),
        settings(NextSunrise::SameDay),
    );

    let report = orchestrator.handle(Trigger::Ready).await;
    assert_eq!(report.terminal, PipelineState::Success);
    assert_eq!(report.trigger, Trigger::Ready);
    assert_eq!(
        report.path,
        [
            PipelineState::Idle,
            PipelineState::LocationPending,
            PipelineState::FetchPending,
            PipelineState::Success,
            PipelineState::Idle,
        ]
    );

    let sent = transmitter.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].temperature(), 15);
    assert_eq!(sent[0].surface_pressure(), 1012);
    assert_eq!(sent[0].apparent_temperature(), 14);
    assert_eq!(sent[0].sun_times(), [4, 50, 21, 10, 4, 50]);
    assert_eq!(report.result.unwrap(), sent[0]);

    let requests = forecast.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].coordinate(), Coordinate::new(52.52, 13.405).unwrap());
    assert_eq!(requests[0].forecast_days(), 2);
}

#[tokio::test]
async fn end_to_end_next_day_sunrise() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let orchestrator = Orchestrator::new(
        berlin(),
        CannedForecast::ok(BERLIN_BODY),
        transmitter.clone(),
        settings(NextSunrise::NextDay),
    );

    let report = orchestrator.handle(Trigger::RefreshRequest).await;
    assert!(report.is_success());
    assert_eq!(transmitter.sent()[0].sun_times(), [4, 50, 21, 10, 4, 52]);
}

#[tokio::test]
async fn api_error_never_reaches_transmitter() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let orchestrator = Orchestrator::new(
        berlin(),
        CannedForecast::with_status(400, r#"{"error":true,"reason":"Cannot initialize WeatherVariable from invalid String value foo"}"#),
        transmitter.clone(),
        ForecastSettings::default(),
    );

    let report = orchestrator.handle(Trigger::Ready).await;
    assert_eq!(report.terminal, PipelineState::FetchFailed);
    assert!(matches!(report.result, Err(Error::Api { .. })));
    assert!(transmitter.sent().is_empty());
}

#[tokio::test]
async fn malformed_body_never_reaches_transmitter() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let orchestrator = Orchestrator::new(
        berlin(),
        CannedForecast::ok("{\"current\": {"),
        transmitter.clone(),
        ForecastSettings::default(),
    );

    let report = orchestrator.handle(Trigger::Ready).await;
    assert_eq!(report.terminal, PipelineState::FetchFailed);
    assert!(matches!(report.result, Err(Error::Parse(_))));
    assert!(transmitter.sent().is_empty());
}

#[tokio::test]
async fn missing_sunrise_is_schema_failure() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let orchestrator = Orchestrator::new(
        berlin(),
        CannedForecast::ok(
            r#"{"current":{"temperature_2m":14.6,"apparent_temperature":13.9,"surface_pressure":1012.3},
                "daily":{"sunset":["2024-06-01T21:10"]}}"#,
        ),
        transmitter.clone(),
        ForecastSettings::default(),
    );

    let report = orchestrator.handle(Trigger::Ready).await;
    assert_eq!(report.terminal, PipelineState::SchemaFailed);
    assert!(matches!(report.result, Err(Error::Schema(_))));
    assert!(transmitter.sent().is_empty());
}

#[tokio::test]
async fn location_failure_skips_fetch() {
    let forecast = CannedForecast::ok(BERLIN_BODY);
    let transmitter = Arc::new(RecordingTransmitter::default());
    let orchestrator = Orchestrator::new(
        Arc::new(FailingLocation(LocationError::from_code(1, "User denied Geolocation"))),
        forecast.clone(),
        transmitter.clone(),
        ForecastSettings::default(),
    );

    let report = orchestrator.handle(Trigger::Ready).await;
    assert_eq!(report.terminal, PipelineState::LocationFailed);
    assert!(matches!(report.result, Err(Error::Location(LocationError::PermissionDenied))));
    assert_eq!(
        report.path,
        [
            PipelineState::Idle,
            PipelineState::LocationPending,
            PipelineState::LocationFailed,
            PipelineState::Idle,
        ]
    );
    assert!(forecast.requests.lock().unwrap().is_empty());
    assert!(transmitter.sent().is_empty());
}

#[tokio::test]
async fn rejected_send_is_reported() {
    let transmitter = Arc::new(RecordingTransmitter { reject: true, ..Default::default() });
    let orchestrator = Orchestrator::new(
        berlin(),
        CannedForecast::ok(BERLIN_BODY),
        transmitter,
        ForecastSettings::default(),
    );

    let report = orchestrator.handle(Trigger::Ready).await;
    assert_eq!(report.terminal, PipelineState::TransmitFailed);
    assert!(matches!(report.result, Err(Error::Transmit(_))));

    // Success is only entered once the device accepted the message.
    assert!(!report.path.contains(&PipelineState::Success));
    assert_eq!(
        report.path,
        [
            PipelineState::Idle,
            PipelineState::LocationPending,
            PipelineState::FetchPending,
            PipelineState::TransmitFailed,
            PipelineState::Idle,
        ]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn overlapping_triggers_complete_independently() {
    const RUNS: usize = 8;

    let transmitter = Arc::new(RecordingTransmitter::default());
    let orchestrator = Orchestrator::new(
        berlin(),
        CannedForecast::ok(BERLIN_BODY),
        transmitter.clone(),
        settings(NextSunrise::NextDay),
    );

    let handles: Vec<_> = (0..RUNS)
        .map(|i| {
            let trigger = if i % 2 == 0 { Trigger::Ready } else { Trigger::RefreshRequest };
            orchestrator.spawn(trigger)
        })
        .collect();

    for handle in handles {
        let report = handle.await.expect("run task");
        assert!(report.is_success());
    }

    let sent = transmitter.sent();
    assert_eq!(sent.len(), RUNS);
    for message in sent {
        assert_eq!(message.sun_times(), [4, 50, 21, 10, 4, 52]);
        assert_eq!(message.temperature(), 15);
    }
}

#[tokio::test]
async fn overlapping_failures_do_not_affect_successes() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let good = Orchestrator::new(
        berlin(),
        CannedForecast::ok(BERLIN_BODY),
        transmitter.clone(),
        ForecastSettings::default(),
    );
    let bad = Orchestrator::new(
        berlin(),
        CannedForecast::ok("not json"),
        transmitter.clone(),
        ForecastSettings::default(),
    );

    let a = good.spawn(Trigger::Ready);
    let b = bad.spawn(Trigger::RefreshRequest);
    let c = good.spawn(Trigger::RefreshRequest);

    assert!(a.await.unwrap().is_success());
    assert_eq!(b.await.unwrap().terminal, PipelineState::FetchFailed);
    assert!(c.await.unwrap().is_success());
    assert_eq!(transmitter.sent().len(), 2);
}

/// Serve one canned HTTP response and hand back the request line.
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buf = vec![0u8; 8192];
        let mut read = 0;
        loop {
            let n = socket.read(&mut buf[read..]).await.unwrap();
            read += n;
            if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        let request = String::from_utf8_lossy(&buf[..read]).to_string();
        request.lines().next().unwrap_or_default().to_string()
    });

    (base_url, handle)
}

#[tokio::test]
async fn open_meteo_client_fetches_over_http() {
    let (base_url, server) = serve_once("200 OK", BERLIN_BODY).await;
    let settings = ForecastSettings { base_url, ..Default::default() };
    let client = OpenMeteoClient::new(&settings).unwrap();

    let request = ForecastRequest::new(Coordinate::new(52.52, 13.405).unwrap(), &settings);
    let response = client.fetch(&request).await.expect("fetch");
    assert_eq!(response.as_value()["timezone"], "Europe/Berlin");

    let request_line = server.await.unwrap();
    assert!(request_line.starts_with("GET /v1/forecast?latitude=52.52&longitude=13.405&timezone=auto&forecast_days=2&wind_speed_unit=kn&daily=sunrise"));
}

#[tokio::test]
async fn open_meteo_client_surfaces_api_error() {
    let (base_url, server) =
        serve_once("400 Bad Request", r#"{"error":true,"reason":"Latitude must be in range of -90 to 90°. Given: 91.0."}"#).await;
    let settings = ForecastSettings { base_url, ..Default::default() };
    let client = OpenMeteoClient::new(&settings).unwrap();

    let request = ForecastRequest::new(Coordinate::new(52.52, 13.405).unwrap(), &settings);
    let err = client.fetch(&request).await.unwrap_err();
    assert!(matches!(err, Error::Api { ref reason } if reason.starts_with("Latitude")));
    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_api_is_fetch_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let settings = ForecastSettings { base_url, ..Default::default() };
    let client = OpenMeteoClient::new(&settings).unwrap();
    let request = ForecastRequest::new(Coordinate::new(0.0, 0.0).unwrap(), &settings);

    let err = client.fetch(&request).await.unwrap_err();
    assert!(matches!(err, Error::Fetch(wxlink_core::FetchError::Transport(_))));
}

#[tokio::test]
async fn ip_lookup_resolves_coordinate_over_http() {
    let (base_url, server) = serve_once(
        "200 OK",
        r#"{"status":"success","country":"Germany","city":"Berlin","lat":52.52,"lon":13.405}"#,
    )
    .await;
    let location = IpLocation::with_url(format!("{base_url}/json/"), Duration::from_secs(5)).unwrap();

    let coordinate = location.current_position(true).await.expect("coordinate");
    assert_eq!(coordinate, Coordinate::new(52.52, 13.405).unwrap());
    assert!(server.await.unwrap().starts_with("GET /json/"));
}

#[tokio::test]
async fn ip_lookup_fail_status_is_unavailable() {
    let (base_url, server) =
        serve_once("200 OK", r#"{"status":"fail","message":"reserved range"}"#).await;
    let location = IpLocation::with_url(format!("{base_url}/json/"), Duration::from_secs(5)).unwrap();

    let err = location.current_position(true).await.unwrap_err();
    assert_eq!(err, LocationError::Unavailable("ip lookup failed: reserved range".into()));
    server.await.unwrap();
}

#[tokio::test]
async fn ip_lookup_timeout_is_location_timeout() {
    // Accept the connection but never answer.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/json/", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(socket);
    });

    let location = IpLocation::with_url(url, Duration::from_millis(200)).unwrap();
    let err = location.current_position(true).await.unwrap_err();
    assert_eq!(err, LocationError::Timeout);
    server.abort();
}

#[tokio::test]
async fn ip_lookup_timeout_fails_the_run_in_location_stage() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/json/", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(socket);
    });

    let forecast = CannedForecast::ok(BERLIN_BODY);
    let transmitter = Arc::new(RecordingTransmitter::default());
    let orchestrator = Orchestrator::new(
        Arc::new(IpLocation::with_url(url, Duration::from_millis(200)).unwrap()),
        forecast.clone(),
        transmitter.clone(),
        ForecastSettings::default(),
    );

    let report = orchestrator.handle(Trigger::Ready).await;
    assert_eq!(report.terminal, PipelineState::LocationFailed);
    assert!(matches!(report.result, Err(Error::Location(LocationError::Timeout))));
    assert!(forecast.requests.lock().unwrap().is_empty());
    assert!(transmitter.sent().is_empty());
    server.abort();
}
