// SPDX-License-Identifier: MIT
//! Telemetry initialization: traces, OTLP log shipping and console output.
//!
//! The public API is small:
//!
//! * [`TelemetryConfig`] – endpoint, resource metadata, export timeout and
//!   console record cap, loaded with [`TelemetryConfig::from_env`].
//! * [`init_telemetry`] – builds the providers and installs the subscriber.
//! * [`TelemetryHandle`] – owns every component; explicit flush and shutdown.
//!
//! # Environment
//! * `OTEL_EXPORTER_OTLP_ENDPOINT` – base endpoint (e.g. `http://localhost:4318`).
//! * `OTEL_SERVICE_NAME` – `service.name` resource attribute.
//! * `RUST_ENV` – `deployment.environment` resource attribute.
//! * `LOGSHIP_EXPORT_TIMEOUT` – exporter timeout, duration string (`10s`, `1m30s`).
//! * `LOGSHIP_MAX_RECORD_SIZE` – console record cap, size string (`16KB`).
//! * `LOGSHIP_CONSOLE` / `LOGSHIP_OTLP_LOGS` – toggle console output / log shipping.
//! * `RUST_LOG` – level filter, `info` when unset.
//!
//! # Example
//! ```no_run
//! use logship::telemetry::{init_telemetry, TelemetryConfig};
//! fn main() -> anyhow::Result<()> {
//!     let handle = init_telemetry(TelemetryConfig::from_env()?)?;
//!     // ... application logic ...
//!     handle.shutdown()?; // ensure final batches are exported
//!     Ok(())
//! }
//! ```
//!
//! # Shutdown
//! Call [`TelemetryHandle::shutdown`] before exiting the Tokio runtime to flush
//! remaining batches. Errors from each component are aggregated into one
//! `anyhow::Error`.
use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::env::{duration_var, flag_var, size_var, string_var};
use crate::error::ConfigError;
use crate::shipper::LogShipper;
use crate::stream::LogStream;

const DEFAULT_ENDPOINT: &str = "http://localhost:4318";
const DEFAULT_SERVICE_NAME: &str = "logship";
const DEFAULT_ENVIRONMENT: &str = "dev";
const DEFAULT_EXPORT_TIMEOUT: &str = "10s";
const DEFAULT_MAX_RECORD_SIZE: &str = "16KB";

// Events from the exporter's own HTTP stack must not be shipped back through it.
const EXPORTER_TARGETS: &[&str] = &[
    "hyper",
    "hyper_util",
    "h2",
    "tower",
    "reqwest",
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_otlp",
    "opentelemetry_http",
];

/// Configuration used when initializing telemetry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Base OTLP endpoint (without per-signal suffix). Example: `http://localhost:4318`.
    pub endpoint: String,
    /// Service name reported in resource attributes (`service.name`).
    pub service_name: String,
    /// Service version reported in resource attributes (`service.version`).
    pub service_version: String,
    /// Deployment environment (`deployment.environment`).
    pub environment: String,
    /// Timeout applied to each OTLP export request.
    pub export_timeout: Duration,
    /// Console record cap in bytes; `0` disables it.
    pub max_record_bytes: u64,
    /// Install the console formatting layer.
    pub console: bool,
    /// Ship `tracing` events as OTLP log records.
    pub ship_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            export_timeout: Duration::from_secs(10),
            max_record_bytes: 16 * 1024,
            console: true,
            ship_logs: true,
        }
    }
}

impl TelemetryConfig {
    /// Load the configuration from the environment, defaulting unset values.
    ///
    /// # Errors
    /// Returns [`ConfigError`] naming the first variable that fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            endpoint: string_var("OTEL_EXPORTER_OTLP_ENDPOINT", DEFAULT_ENDPOINT)?,
            service_name: string_var("OTEL_SERVICE_NAME", DEFAULT_SERVICE_NAME)?,
            service_version: defaults.service_version,
            environment: string_var("RUST_ENV", DEFAULT_ENVIRONMENT)?,
            export_timeout: duration_var("LOGSHIP_EXPORT_TIMEOUT", DEFAULT_EXPORT_TIMEOUT)?,
            max_record_bytes: size_var("LOGSHIP_MAX_RECORD_SIZE", DEFAULT_MAX_RECORD_SIZE)?,
            console: flag_var("LOGSHIP_CONSOLE", defaults.console)?,
            ship_logs: flag_var("LOGSHIP_OTLP_LOGS", defaults.ship_logs)?,
        })
    }

    /// Per-signal OTLP URL, e.g. `signal_endpoint("logs")` → `<endpoint>/v1/logs`.
    #[must_use]
    pub fn signal_endpoint(&self, signal: &str) -> String {
        format!("{}/v1/{signal}", self.endpoint.trim_end_matches('/'))
    }

    fn resource(&self) -> Resource {
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes([
                KeyValue::new("service.version", self.service_version.clone()),
                KeyValue::new("deployment.environment", self.environment.clone()),
            ])
            .build()
    }
}

fn is_exporter_internal(target: &str) -> bool {
    EXPORTER_TARGETS.iter().any(|prefix| {
        target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// Handle owning every telemetry component.
///
/// Dropping the handle without calling [`TelemetryHandle::shutdown`] may lose
/// the final batches. Call `shutdown()` at a controlled point, typically just
/// before process exit.
pub struct TelemetryHandle {
    tracer_provider: SdkTracerProvider,
    shipper: Option<LogShipper>,
    stream: LogStream,
}

impl TelemetryHandle {
    /// Console stream behind the fmt layer.
    #[must_use]
    pub fn log_stream(&self) -> &LogStream {
        &self.stream
    }

    /// Log shipper, when OTLP log shipping is enabled.
    #[must_use]
    pub fn shipper(&self) -> Option<&LogShipper> {
        self.shipper.as_ref()
    }

    /// Export pending spans and log records and flush the console stream.
    ///
    /// # Errors
    /// Returns a combined error naming every component that failed to flush.
    pub fn flush(&self) -> Result<()> {
        let mut errs = Vec::new();
        if let Err(e) = self.tracer_provider.force_flush() {
            errs.push(format!("tracer: {e}"));
        }
        if let Some(shipper) = &self.shipper {
            if let Err(e) = shipper.flush() {
                errs.push(e.to_string());
            }
        }
        if let Err(e) = self.stream.flush() {
            errs.push(format!("console: {e}"));
        }
        combine(errs)
    }

    /// Flush and shutdown all configured telemetry components.
    ///
    /// Returns `Ok(())` if every component shut down cleanly, otherwise a
    /// combined error including a message for each failing component.
    ///
    /// # Examples
    /// ```no_run
    /// # use logship::telemetry::{init_telemetry, TelemetryConfig};
    /// # fn main() -> anyhow::Result<()> {
    /// let handle = init_telemetry(TelemetryConfig::default())?;
    /// // work...
    /// handle.shutdown()?;
    /// # Ok(()) }
    /// ```
    pub fn shutdown(self) -> Result<()> {
        let mut errs = Vec::new();
        if let Err(e) = self.tracer_provider.shutdown() {
            errs.push(format!("tracer: {e}"));
        }
        if let Some(shipper) = self.shipper {
            if let Err(e) = shipper.shutdown() {
                errs.push(e.to_string());
            }
        }
        if let Err(e) = self.stream.close() {
            errs.push(format!("console: {e}"));
        }
        combine(errs)
    }
}

fn combine(errs: Vec<String>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        anyhow::bail!(errs.join(", "))
    }
}

/// Initialize tracing, log shipping and console output for the application.
///
/// This installs a global tracer provider and a subscriber registry composed
/// of an `RUST_LOG` filter, the console layer (when `console` is set), the
/// OTLP log bridge (when `ship_logs` is set) and the OpenTelemetry span layer.
///
/// # Errors
/// Returns an error if an exporter builder fails (e.g. invalid endpoint URL)
/// or a global subscriber is already installed.
///
/// # Examples
/// ```no_run
/// use logship::telemetry::{init_telemetry, TelemetryConfig};
/// let handle = init_telemetry(TelemetryConfig::default()).expect("init");
/// // ... run logic ...
/// handle.shutdown().expect("shutdown");
/// ```
pub fn init_telemetry(cfg: TelemetryConfig) -> Result<TelemetryHandle> {
    let resource = cfg.resource();

    // HTTP binary OTLP
    let span_exporter = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(cfg.signal_endpoint("traces"))
        .with_timeout(cfg.export_timeout)
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(resource.clone())
        .build();

    let shipper = if cfg.ship_logs {
        Some(LogShipper::new(
            cfg.signal_endpoint("logs"),
            cfg.export_timeout,
            resource,
        )?)
    } else {
        None
    };
    let bridge_layer = shipper.as_ref().map(|shipper| {
        OpenTelemetryTracingBridge::new(shipper.provider())
            .with_filter(filter_fn(|meta| !is_exporter_internal(meta.target())))
    });

    let stream = LogStream::stdout().with_max_record_bytes(cfg.max_record_bytes);
    let fmt_layer = cfg.console.then(|| {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .compact()
            .with_writer(stream.clone())
    });

    let otel_trace_layer = OpenTelemetryLayer::new(tracer_provider.tracer("logship"));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(bridge_layer)
        .with(otel_trace_layer)
        .try_init();
    // Global state is only touched once the subscriber is in place.
    if let Err(e) = installed {
        let _ = tracer_provider.shutdown();
        if let Some(shipper) = shipper {
            let _ = shipper.shutdown();
        }
        return Err(e).context("failed to install tracing subscriber");
    }
    global::set_tracer_provider(tracer_provider.clone());

    tracing::debug!(
        endpoint = %cfg.endpoint,
        console = cfg.console,
        ship_logs = cfg.ship_logs,
        "telemetry initialized"
    );

    Ok(TelemetryHandle {
        tracer_provider,
        shipper,
        stream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "OTEL_EXPORTER_OTLP_ENDPOINT",
        "OTEL_SERVICE_NAME",
        "RUST_ENV",
        "LOGSHIP_EXPORT_TIMEOUT",
        "LOGSHIP_MAX_RECORD_SIZE",
        "LOGSHIP_CONSOLE",
        "LOGSHIP_OTLP_LOGS",
    ];

    fn clear_vars() {
        for name in VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn from_env_without_vars_matches_default() {
        clear_vars();
        assert_eq!(
            TelemetryConfig::from_env().unwrap(),
            TelemetryConfig::default()
        );
    }

    #[test]
    #[serial]
    fn from_env_reads_every_field() {
        clear_vars();
        std::env::set_var("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4318/");
        std::env::set_var("OTEL_SERVICE_NAME", "ingest");
        std::env::set_var("RUST_ENV", "prod");
        std::env::set_var("LOGSHIP_EXPORT_TIMEOUT", "1m30s");
        std::env::set_var("LOGSHIP_MAX_RECORD_SIZE", "64K");
        std::env::set_var("LOGSHIP_CONSOLE", "no");
        std::env::set_var("LOGSHIP_OTLP_LOGS", "0");
        let cfg = TelemetryConfig::from_env();
        clear_vars();

        let cfg = cfg.unwrap();
        assert_eq!(cfg.endpoint, "http://collector:4318/");
        assert_eq!(cfg.service_name, "ingest");
        assert_eq!(cfg.environment, "prod");
        assert_eq!(cfg.export_timeout, Duration::from_secs(90));
        assert_eq!(cfg.max_record_bytes, 64 * 1024);
        assert!(!cfg.console);
        assert!(!cfg.ship_logs);
        assert_eq!(cfg.signal_endpoint("logs"), "http://collector:4318/v1/logs");
    }

    #[test]
    #[serial]
    fn from_env_rejects_malformed_values() {
        clear_vars();
        std::env::set_var("LOGSHIP_MAX_RECORD_SIZE", "huge");
        let result = TelemetryConfig::from_env();
        clear_vars();

        match result {
            Err(ConfigError::InvalidVar { name, source }) => {
                assert_eq!(name, "LOGSHIP_MAX_RECORD_SIZE");
                assert_eq!(source.rule.as_str(), "size");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn signal_endpoint_appends_path() {
        let cfg = TelemetryConfig::default();
        assert_eq!(cfg.signal_endpoint("traces"), "http://localhost:4318/v1/traces");
    }

    #[test]
    fn exporter_targets_are_filtered() {
        assert!(is_exporter_internal("hyper"));
        assert!(is_exporter_internal("hyper_util::client::legacy"));
        assert!(is_exporter_internal("opentelemetry_sdk::logs"));
        assert!(!is_exporter_internal("hyperion"));
        assert!(!is_exporter_internal("logship::shipper"));
    }

    #[tokio::test]
    #[serial]
    async fn telemetry_init_works() {
        use opentelemetry::trace::{Span as _, Tracer as _};

        clear_vars();
        std::env::remove_var("RUST_LOG");
        let handle = init_telemetry(TelemetryConfig::default()).expect("telemetry init");
        assert!(handle.shipper().is_some());
        assert!(!handle.log_stream().is_closed());

        // a second install fails and must leave the first provider global
        let second = init_telemetry(TelemetryConfig::default());
        assert!(second.is_err());

        handle.flush().expect("flush");
        let stream = handle.log_stream().clone();
        handle.shutdown().expect("shutdown");
        assert!(stream.is_closed());

        let span = global::tracer("logship-test").start("after-shutdown");
        assert!(!span.is_recording());
    }
}
