//! ==============================================================================
//! fetcher.rs - per-device telemetry fetch
//! ==============================================================================
//!
//! purpose:
//!     performs the http fetch for ONE device and turns whatever happens into
//!     a PollOutcome. nothing escapes this boundary: timeouts, http errors,
//!     bad bodies and even panics while deriving display values all come back
//!     as a Failed outcome for that device only.
//!
//! relationships:
//!     - used by: scheduler.rs (through the TelemetrySource trait)
//!     - uses: parser.rs, delta.rs, series.rs
//!
//! outcome mapping:
//!
//! ```text
//!     transport timeout           -> Failed { Timeout }
//!     other transport / http 4xx-5xx -> Failed { NetworkError }
//!     not json / not an array     -> Failed { MalformedResponse }
//!     []                          -> Empty
//!     [ {...}, ... ]              -> Ok { metrics, series }
//!     panic while deriving        -> Failed { ProcessingError }
//! ```
//!
//! ==============================================================================

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::config::TelemetryConfig;
use crate::domain::{DeviceId, DeviceSnapshot, PollOutcome, ReadingHistory};
use crate::error::FailureKind;
use crate::{delta, parser, series};

/// anything that can produce one device's outcome for a cycle
///
/// implementations must not fail: every problem is reported as
/// `PollOutcome::Failed`.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch(&self, device: &DeviceId) -> PollOutcome;
}

/// fetches `GET {base_url}{device}` with reqwest
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    metrics: Arc<[String]>,
}

impl HttpFetcher {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        metrics: Vec<String>,
    ) -> Result<Self> {
        let base_url = base_url.into();
        ensure!(!base_url.is_empty(), "telemetry base url is empty");
        ensure!(!timeout.is_zero(), "fetch timeout must be greater than zero");

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;

        Ok(Self { client, base_url, metrics: metrics.into() })
    }

    pub fn from_config(telemetry: &TelemetryConfig, metrics: &[String]) -> Result<Self> {
        Self::new(telemetry.base_url.clone(), telemetry.timeout(), metrics.to_vec())
    }

    pub fn device_url(&self, device: &DeviceId) -> String {
        format!("{}{}", self.base_url, device)
    }
}

#[async_trait]
impl TelemetrySource for HttpFetcher {
    async fn fetch(&self, device: &DeviceId) -> PollOutcome {
        let url = self.device_url(device);
        tracing::debug!(device = %device, %url, "fetching reading history");

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return transport_failure(device, &e),
        };

        let response = match response.error_for_status() {
            Ok(response) => response,
            Err(e) => return transport_failure(device, &e),
        };

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return transport_failure(device, &e),
        };

        process_body(device, &body, &self.metrics)
    }
}

/// classify a reqwest error and log it
fn transport_failure(device: &DeviceId, error: &reqwest::Error) -> PollOutcome {
    let kind = if error.is_timeout() { FailureKind::Timeout } else { FailureKind::NetworkError };
    log_failure(device, kind, error);
    PollOutcome::failed(kind, device)
}

fn log_failure(device: &DeviceId, kind: FailureKind, detail: &dyn std::fmt::Display) {
    tracing::error!(device = %device, %kind, error = %detail, "device fetch failed");
}

/// everything after a successful http exchange
pub fn process_body(device: &DeviceId, body: &[u8], metrics: &[String]) -> PollOutcome {
    process_with(device, body, |history| snapshot(history, metrics))
}

fn process_with<F>(device: &DeviceId, body: &[u8], derive: F) -> PollOutcome
where
    F: FnOnce(&ReadingHistory) -> DeviceSnapshot,
{
    let history = match parser::parse_body(body) {
        Ok(history) => history,
        Err(e) => {
            log_failure(device, e.kind(), &e);
            return PollOutcome::failed(e.kind(), device);
        }
    };

    if history.is_empty() {
        tracing::warn!(device = %device, "no readings received for device");
        return PollOutcome::Empty;
    }

    match catch_unwind(AssertUnwindSafe(|| derive(&history))) {
        Ok(snapshot) => PollOutcome::Ok(snapshot),
        Err(panic) => {
            let detail = panic_message(panic.as_ref());
            log_failure(device, FailureKind::ProcessingError, &detail);
            PollOutcome::failed(FailureKind::ProcessingError, device)
        }
    }
}

/// current values, deltas and series, all from the same history
pub fn snapshot(history: &ReadingHistory, metrics: &[String]) -> DeviceSnapshot {
    DeviceSnapshot {
        readings: history.len(),
        metrics: metrics.iter().map(|m| (m.clone(), delta::compute(history, m))).collect(),
        series: series::build(history, metrics),
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::get, Router};
    use std::time::Instant;

    const METRICS: [&str; 2] = ["ph", "soil"];

    fn metrics() -> Vec<String> {
        METRICS.iter().map(|m| m.to_string()).collect()
    }

    /// stand-in for the telemetry service on an ephemeral port
    async fn spawn_telemetry() -> String {
        let app = Router::new()
            .route(
                "/find/data/:id",
                get(|Path(id): Path<String>| async move {
                    match id.as_str() {
                        "empty" => (StatusCode::OK, "[]".to_string()),
                        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
                        "html" => (StatusCode::OK, "<html>oops</html>".to_string()),
                        "object" => (StatusCode::OK, r#"{"ph": 6.5}"#.to_string()),
                        "slow" => {
                            tokio::time::sleep(Duration::from_secs(3)).await;
                            (StatusCode::OK, "[]".to_string())
                        }
                        _ => (
                            StatusCode::OK,
                            r#"[{"ph": 6.0, "soil": 40}, {"ph": 6.5, "soil": "bad"}]"#.to_string(),
                        ),
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/find/data/")
    }

    async fn fetcher(timeout: Duration) -> HttpFetcher {
        HttpFetcher::new(spawn_telemetry().await, timeout, metrics()).unwrap()
    }

    #[tokio::test]
    async fn healthy_device_yields_metrics_and_series() {
        let fetcher = fetcher(Duration::from_secs(5)).await;
        let outcome = fetcher.fetch(&DeviceId::from("pot-1")).await;

        let snapshot = outcome.snapshot().expect("ok outcome");
        assert_eq!(snapshot.readings, 2);
        assert_eq!(snapshot.metrics["ph"].current_label(), "6.5");
        assert_eq!(snapshot.metrics["ph"].delta_label(), "+0.50");
        assert_eq!(snapshot.metrics["soil"].current_label(), "N/A");
        assert_eq!(snapshot.metrics["soil"].delta_label(), "N/A");
        assert_eq!(snapshot.series["ph"].values(), vec![6.0, 6.5]);
        assert_eq!(snapshot.series["soil"].values(), vec![40.0]);
    }

    #[tokio::test]
    async fn empty_array_is_empty_not_failed() {
        let fetcher = fetcher(Duration::from_secs(5)).await;
        assert_eq!(fetcher.fetch(&DeviceId::from("empty")).await, PollOutcome::Empty);
    }

    #[tokio::test]
    async fn http_error_status_is_network_error() {
        let fetcher = fetcher(Duration::from_secs(5)).await;
        let outcome = fetcher.fetch(&DeviceId::from("broken")).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::NetworkError));
        assert_eq!(
            outcome,
            PollOutcome::Failed {
                kind: FailureKind::NetworkError,
                message: "Error fetching data for Pot broken.".into()
            }
        );
    }

    #[tokio::test]
    async fn bad_bodies_are_malformed() {
        let fetcher = fetcher(Duration::from_secs(5)).await;
        for id in ["html", "object"] {
            let outcome = fetcher.fetch(&DeviceId::from(id)).await;
            assert_eq!(outcome.failure_kind(), Some(FailureKind::MalformedResponse), "{id}");
        }
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_within_bound() {
        let fetcher = fetcher(Duration::from_millis(200)).await;
        let started = Instant::now();
        let outcome = fetcher.fetch(&DeviceId::from("slow")).await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        // bind then drop so nothing is listening on the port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher =
            HttpFetcher::new(format!("http://{addr}/"), Duration::from_secs(2), metrics()).unwrap();
        let outcome = fetcher.fetch(&DeviceId::from("pot-1")).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::NetworkError));
    }

    #[test]
    fn rejects_zero_timeout_and_empty_url() {
        assert!(HttpFetcher::new("http://localhost/", Duration::ZERO, metrics()).is_err());
        assert!(HttpFetcher::new("", Duration::from_secs(1), metrics()).is_err());
    }

    #[test]
    fn device_url_is_base_plus_id() {
        let fetcher = HttpFetcher::new(
            "https://api.example/find/data/",
            Duration::from_secs(10),
            metrics(),
        )
        .unwrap();
        assert_eq!(fetcher.device_url(&DeviceId::from("42")), "https://api.example/find/data/42");
    }

    #[test]
    fn panic_while_deriving_becomes_processing_error() {
        let device = DeviceId::from("pot-9");
        let outcome = process_with(&device, br#"[{"ph": 6.5}]"#, |_| panic!("index out of range"));
        assert_eq!(
            outcome,
            PollOutcome::Failed {
                kind: FailureKind::ProcessingError,
                message: "Error processing data for Pot pot-9.".into()
            }
        );
    }

    #[test]
    fn empty_body_never_reaches_derivation() {
        let device = DeviceId::from("pot-9");
        let outcome = process_with(&device, b"[]", |_| panic!("must not be called"));
        assert_eq!(outcome, PollOutcome::Empty);
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
