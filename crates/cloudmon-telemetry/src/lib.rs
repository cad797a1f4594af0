use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use time::{format_description, UtcOffset};
use tracing::Level;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;

/// Error type for telemetry initialisation failures.
///
/// This is intentionally lightweight so `cloudmon-telemetry` can be used
/// without depending on `cloudmon-core`. Callers can map this into their own
/// error types as needed.
#[derive(Debug)]
pub enum TelemetryError {
    /// Provided log level string could not be parsed.
    InvalidLevel(String),

    /// Failed to configure the subscriber (should be rare).
    SubscriberInit(String),
}

impl std::fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryError::InvalidLevel(level) => {
                write!(f, "invalid log level: {}", level)
            }
            TelemetryError::SubscriberInit(msg) => write!(f, "failed to init telemetry: {}", msg),
        }
    }
}

impl std::error::Error for TelemetryError {}

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Interface for recording API request metrics.
///
/// A connection reports every request it issues through this trait. The
/// trait does not prescribe a metrics backend; [`NoopMetricsRecorder`] is the
/// default and [`InMemoryMetricsRecorder`] keeps simple counters.
pub trait MetricsRecorder: Send + Sync + 'static {
    /// Record that a request has started.
    ///
    /// - `service`: resolved service key (e.g. "monitoring", "auth").
    /// - `method`: HTTP method.
    fn record_request_start(&self, service: &str, method: &str);

    /// Record that a request has completed.
    ///
    /// - `success`: whether the status was accepted by the connection.
    /// - `latency_secs`: wall-clock time spent in the transport.
    fn record_request_end(&self, service: &str, success: bool, latency_secs: f64);

    /// Record an error.
    ///
    /// - `kind`: a short, stable error kind string: "auth", "transport",
    ///   "status", "validation", "malformed" or "other".
    fn record_error(&self, service: &str, kind: &str);
}

/// A no-op metrics recorder that does nothing.
///
/// This is useful as a default implementation in environments where metrics
/// are not configured or desired.
#[derive(Debug, Clone, Default)]
pub struct NoopMetricsRecorder;

impl MetricsRecorder for NoopMetricsRecorder {
    fn record_request_start(&self, _service: &str, _method: &str) {}

    fn record_request_end(&self, _service: &str, _success: bool, _latency_secs: f64) {}

    fn record_error(&self, _service: &str, _kind: &str) {}
}

/// Snapshot of the counters kept by [`InMemoryMetricsRecorder`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub requests_started: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub total_latency_secs: f64,
    /// Error counts keyed by `(service, kind)`
    pub errors: HashMap<(String, String), u64>,
}

/// Process-local counters, handy for CLI summaries and tests.
#[derive(Debug, Default)]
pub struct InMemoryMetricsRecorder {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    latency_micros: AtomicU64,
    errors: Mutex<HashMap<(String, String), u64>>,
}

impl InMemoryMetricsRecorder {
    /// Create a recorder with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy out the current counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        let errors = self
            .errors
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();

        MetricsSnapshot {
            requests_started: self.started.load(Ordering::Relaxed),
            requests_succeeded: self.succeeded.load(Ordering::Relaxed),
            requests_failed: self.failed.load(Ordering::Relaxed),
            total_latency_secs: self.latency_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            errors,
        }
    }
}

impl MetricsRecorder for InMemoryMetricsRecorder {
    fn record_request_start(&self, _service: &str, _method: &str) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn record_request_end(&self, _service: &str, success: bool, latency_secs: f64) {
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let micros = (latency_secs.max(0.0) * 1_000_000.0) as u64;
        self.latency_micros.fetch_add(micros, Ordering::Relaxed);
    }

    fn record_error(&self, service: &str, kind: &str) {
        if let Ok(mut guard) = self.errors.lock() {
            *guard
                .entry((service.to_string(), kind.to_string()))
                .or_insert(0) += 1;
        }
    }
}

/// Initialise the global telemetry / logging subscriber.
///
/// This sets up a `tracing_subscriber` using `EnvFilter` and a formatted
/// output layer. It is intended to be called once at process startup
/// (typically from `main` in the CLI). Library code never calls it.
///
/// # Parameters
///
/// - `level`: Optional log level string. If `None`, the function will:
///   - Respect `RUST_LOG` if it is set, or
///   - Default to `"info"` otherwise.
///   If `Some(level)` is provided, it takes precedence over `RUST_LOG`.
///
/// # Examples
///
/// ```ignore
/// cloudmon_telemetry::init(Some("cloudmon_client=debug"))?;
/// ```
pub fn init(level: Option<&str>) -> Result<()> {
    let filter = if let Some(level_str) = level {
        parse_level_filter(level_str)?
    } else if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("info")
    };

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_timer(OffsetTime::new(
            // Local offset when it can be determined, UTC otherwise.
            UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
            format_description::parse(
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]",
            )
            .unwrap_or_default(),
        ));

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);

    subscriber
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    Ok(())
}

/// Parse a simple level string into an `EnvFilter`.
///
/// Supports both plain levels ("info", "debug", etc.) and full `EnvFilter`
/// expressions (like "info,cloudmon_client=debug").
fn parse_level_filter(level_str: &str) -> Result<EnvFilter> {
    if Level::from_str(level_str).is_ok() {
        return Ok(EnvFilter::new(level_str));
    }

    EnvFilter::builder()
        .parse(level_str)
        .map_err(|e| TelemetryError::InvalidLevel(format!("{} ({})", level_str, e)))
}
