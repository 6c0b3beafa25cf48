// SPDX-License-Identifier: MIT
//! OTLP log shipping client.
//!
//! [`LogShipper`] owns the OpenTelemetry logger provider and its batch OTLP
//! exporter. It is built explicitly by the telemetry setup code and torn down
//! through [`LogShipper::shutdown`]; no provider is stored globally. To start
//! over, shut the shipper down and construct a new one.
use std::time::Duration;

use anyhow::{anyhow, Result};
use opentelemetry_otlp::{LogExporter, Protocol, WithExportConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::Resource;
use tracing::{debug, warn};

/// OTLP/HTTP log client with explicit flush and shutdown.
pub struct LogShipper {
    provider: SdkLoggerProvider,
    endpoint: String,
}

impl LogShipper {
    /// Build a shipper posting binary protobuf batches to `endpoint`
    /// (the full `/v1/logs` URL).
    ///
    /// # Errors
    /// Returns an error if the exporter cannot be built (e.g. invalid endpoint URL).
    pub fn new(
        endpoint: impl Into<String>,
        export_timeout: Duration,
        resource: Resource,
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        let exporter = LogExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_endpoint(endpoint.clone())
            .with_timeout(export_timeout)
            .build()?;

        let provider = SdkLoggerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build();

        debug!(%endpoint, timeout_secs = export_timeout.as_secs(), "log shipper created");
        Ok(Self { provider, endpoint })
    }

    /// Provider to bridge `tracing` events into.
    #[must_use]
    pub fn provider(&self) -> &SdkLoggerProvider {
        &self.provider
    }

    /// Endpoint the exporter posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Export every queued record now, blocking until the exporter answers.
    ///
    /// # Errors
    /// Returns the provider's flush error.
    pub fn flush(&self) -> Result<()> {
        self.provider.force_flush().map_err(|e| {
            warn!(endpoint = %self.endpoint, error = %e, "log flush failed");
            anyhow!("logger flush: {e}")
        })
    }

    /// Flush remaining records and stop the provider.
    ///
    /// # Errors
    /// Returns the provider's shutdown error.
    pub fn shutdown(self) -> Result<()> {
        debug!(endpoint = %self.endpoint, "log shipper shutting down");
        self.provider.shutdown().map_err(|e| {
            warn!(endpoint = %self.endpoint, error = %e, "log shutdown failed");
            anyhow!("logger: {e}")
        })
    }
}
